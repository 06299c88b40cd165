use std::any::Any;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::news::{NewsError, NewsService};
use crate::normalize::NormalizedItem;

const WARMING_UP_MESSAGE: &str = "Service is warming up, please retry shortly";

pub struct AppState {
    pub news: NewsService,
    /// strftime pattern for `published`
    pub published_format: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct NewsItemResponse {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_title: Option<String>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_summary: Option<String>,
    pub link: String,
    pub published: String,
    /// True when the feed gave no usable date and `published` is the fetch time
    pub published_estimated: bool,
    pub source: String,
}

impl NewsItemResponse {
    pub fn from_item(item: NormalizedItem, published_format: &str) -> Self {
        Self {
            published: item.published_at.format(published_format).to_string(),
            published_estimated: item.timestamp_source.is_estimated(),
            title: item.title,
            translated_title: item.translated_title,
            summary: item.summary,
            translated_summary: item.translated_summary,
            link: item.link,
            source: item.source,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SmartNewsResponse {
    pub news: Vec<NewsItemResponse>,
    pub fallback: bool,
}

/// Legacy list shape: a bare array with 1-based ids.
#[derive(Debug, Serialize, Deserialize)]
pub struct NumberedNewsItem {
    pub id: usize,
    #[serde(flatten)]
    pub item: NewsItemResponse,
}

pub struct AppError(NewsError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self.0 {
            NewsError::NotFound { link } => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "News item not found", "link": link })),
            )
                .into_response(),
            NewsError::InvalidRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
        }
    }
}

impl From<NewsError> for AppError {
    fn from(err: NewsError) -> Self {
        AppError(err)
    }
}

/// `Query` whose rejection uses the JSON error body.
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(AppError(NewsError::InvalidRequest(rejection.body_text()))),
        }
    }
}

/// Generic 500 body; internals are never exposed.
pub fn warming_up() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": WARMING_UP_MESSAGE })),
    )
        .into_response()
}

fn handle_panic(_err: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("Request handler panicked");
    warming_up()
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/smart_news", get(smart_news))
        .route("/latest_news", get(latest_news))
        .route("/get_news_by_link", get(get_news_by_link))
        .route("/search_news", get(search_news))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(handle_panic)),
        )
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub translate: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LinkQuery {
    pub url: Option<String>,
    pub translate: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub keyword: Option<String>,
    pub limit: Option<usize>,
}

// Route handlers
pub async fn health() -> &'static str {
    "Smart news service is running"
}

pub async fn smart_news(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<SmartNewsResponse>, AppError> {
    let translate = query.translate.unwrap_or_else(|| state.news.can_translate());
    let selection = state.news.list(query.limit, translate).await;

    Ok(Json(SmartNewsResponse {
        news: selection
            .items
            .into_iter()
            .map(|item| NewsItemResponse::from_item(item, &state.published_format))
            .collect(),
        fallback: selection.used_fallback,
    }))
}

pub async fn latest_news(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<Vec<NumberedNewsItem>>, AppError> {
    let translate = query.translate.unwrap_or_else(|| state.news.can_translate());
    let selection = state.news.list(query.limit, translate).await;

    Ok(Json(
        selection
            .items
            .into_iter()
            .enumerate()
            .map(|(index, item)| NumberedNewsItem {
                id: index + 1,
                item: NewsItemResponse::from_item(item, &state.published_format),
            })
            .collect(),
    ))
}

pub async fn get_news_by_link(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<LinkQuery>,
) -> Result<Json<NewsItemResponse>, AppError> {
    let url = query.url.unwrap_or_default();
    let translate = query.translate.unwrap_or_else(|| state.news.can_translate());

    let item = state.news.lookup(&url, translate).await?;
    Ok(Json(NewsItemResponse::from_item(item, &state.published_format)))
}

pub async fn search_news(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<Vec<NewsItemResponse>>, AppError> {
    let keyword = query.keyword.unwrap_or_default();

    let items = state.news.search(&keyword, query.limit).await?;
    Ok(Json(
        items
            .into_iter()
            .map(|item| NewsItemResponse::from_item(item, &state.published_format))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::news::test_support::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    const FEED_URL: &str = "https://feed.example/rss";

    fn create_test_app(source: StaticSource) -> Router {
        let news = NewsService::new(Arc::new(source), vec![feed("Test Feed", FEED_URL)]);
        router(Arc::new(AppState {
            news,
            published_format: "%Y-%m-%d %H:%M:%S".to_string(),
        }))
    }

    fn test_source() -> StaticSource {
        StaticSource::default().with_feed(
            FEED_URL,
            vec![
                entry("https://feed.example/1", "Election results", 1),
                entry("https://feed.example/2", "Weather", 2),
                entry("https://feed.example/3", "Markets", 30),
            ],
        )
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    mod health_tests {
        use super::*;

        #[tokio::test]
        async fn test_health_endpoint() {
            let app = create_test_app(StaticSource::default());

            let response = app
                .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let body = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(&body[..], b"Smart news service is running");
        }
    }

    mod smart_news_tests {
        use super::*;

        #[tokio::test]
        async fn test_envelope_shape() {
            let (status, body) = get_json(create_test_app(test_source()), "/smart_news").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["fallback"], Value::Bool(true));
            let news = body["news"].as_array().unwrap();
            assert_eq!(news.len(), 3);
            assert_eq!(news[0]["title"], "Election results");
            assert_eq!(news[0]["summary"], "Summary of Election results");
            assert_eq!(news[0]["source"], "Test Wire");
            assert_eq!(news[0]["published_estimated"], false);
            assert!(news[0].get("translated_title").is_none());
        }

        #[tokio::test]
        async fn test_published_format_applied() {
            let (_, body) = get_json(create_test_app(test_source()), "/smart_news").await;

            let published = body["news"][0]["published"].as_str().unwrap();
            assert!(chrono::NaiveDateTime::parse_from_str(published, "%Y-%m-%d %H:%M:%S").is_ok());
        }

        #[tokio::test]
        async fn test_limit_query() {
            let (_, body) = get_json(create_test_app(test_source()), "/smart_news?limit=1").await;
            assert_eq!(body["news"].as_array().unwrap().len(), 1);
        }

        #[tokio::test]
        async fn test_empty_feed() {
            let source = StaticSource::default().with_feed(FEED_URL, vec![]);
            let (status, body) = get_json(create_test_app(source), "/smart_news").await;

            assert_eq!(status, StatusCode::OK);
            assert!(body["news"].as_array().unwrap().is_empty());
            assert_eq!(body["fallback"], Value::Bool(false));
        }

        #[tokio::test]
        async fn test_unavailable_feed_is_empty_not_error() {
            let (status, body) = get_json(create_test_app(StaticSource::default()), "/smart_news").await;

            assert_eq!(status, StatusCode::OK);
            assert!(body["news"].as_array().unwrap().is_empty());
        }
    }

    mod latest_news_tests {
        use super::*;

        #[tokio::test]
        async fn test_numbered_array() {
            let (status, body) = get_json(create_test_app(test_source()), "/latest_news").await;

            assert_eq!(status, StatusCode::OK);
            let items = body.as_array().unwrap();
            assert_eq!(items.len(), 3);
            assert_eq!(items[0]["id"], 1);
            assert_eq!(items[2]["id"], 3);
            assert_eq!(items[0]["link"], "https://feed.example/1");
        }
    }

    mod get_news_by_link_tests {
        use super::*;

        #[tokio::test]
        async fn test_found() {
            let (status, body) = get_json(
                create_test_app(test_source()),
                "/get_news_by_link?url=https%3A%2F%2Ffeed.example%2F3",
            )
            .await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["title"], "Markets");
            assert_eq!(body["link"], "https://feed.example/3");
        }

        #[tokio::test]
        async fn test_not_found_echoes_link() {
            let (status, body) = get_json(
                create_test_app(test_source()),
                "/get_news_by_link?url=https%3A%2F%2Fnowhere.example%2Fx",
            )
            .await;

            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(body["link"], "https://nowhere.example/x");
            assert!(body["error"].is_string());
        }

        #[tokio::test]
        async fn test_missing_url() {
            let (status, body) = get_json(create_test_app(test_source()), "/get_news_by_link").await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Missing url");
        }
    }

    mod search_news_tests {
        use super::*;

        #[tokio::test]
        async fn test_matches() {
            let (status, body) = get_json(create_test_app(test_source()), "/search_news?keyword=ELECTION").await;

            assert_eq!(status, StatusCode::OK);
            let items = body.as_array().unwrap();
            assert_eq!(items.len(), 1);
            assert_eq!(items[0]["link"], "https://feed.example/1");
        }

        #[tokio::test]
        async fn test_no_matches() {
            let (status, body) = get_json(create_test_app(test_source()), "/search_news?keyword=volcano").await;

            assert_eq!(status, StatusCode::OK);
            assert!(body.as_array().unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_missing_keyword() {
            let (status, body) = get_json(create_test_app(test_source()), "/search_news").await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Missing keyword");
        }
    }

    mod error_tests {
        use super::*;

        #[tokio::test]
        async fn test_warming_up_body() {
            let response = warming_up();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

            let body = response.into_body().collect().await.unwrap().to_bytes();
            let body: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(body["error"], WARMING_UP_MESSAGE);
        }

        #[tokio::test]
        async fn test_malformed_limit_is_json_bad_request() {
            let (status, body) = get_json(create_test_app(test_source()), "/smart_news?limit=abc").await;

            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(body["error"].as_str().unwrap().contains("query string"));
        }

        #[tokio::test]
        async fn test_malformed_translate_flag_is_json_bad_request() {
            for uri in [
                "/latest_news?translate=1",
                "/get_news_by_link?url=https://feed.example/1&translate=yes",
                "/search_news?keyword=Weather&limit=-2",
            ] {
                let (status, body) = get_json(create_test_app(test_source()), uri).await;

                assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
                assert!(body["error"].is_string(), "{}", uri);
            }
        }

        #[tokio::test]
        async fn test_panic_maps_to_warming_up() {
            async fn boom() -> &'static str {
                panic!("upstream exploded")
            }

            let app = Router::new()
                .route("/boom", get(boom))
                .layer(CatchPanicLayer::custom(handle_panic));

            let (status, body) = get_json(app, "/boom").await;

            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body["error"], WARMING_UP_MESSAGE);
        }
    }

    mod query_tests {
        use super::*;

        #[test]
        fn test_list_query_defaults() {
            let query: ListQuery = serde_urlencoded::from_str("").unwrap();
            assert_eq!(query.limit, None);
            assert_eq!(query.translate, None);
        }

        #[test]
        fn test_list_query_values() {
            let query: ListQuery = serde_urlencoded::from_str("limit=5&translate=true").unwrap();
            assert_eq!(query.limit, Some(5));
            assert_eq!(query.translate, Some(true));
        }

        #[test]
        fn test_search_query_keyword() {
            let query: SearchQuery = serde_urlencoded::from_str("keyword=rust%20lang").unwrap();
            assert_eq!(query.keyword.as_deref(), Some("rust lang"));
        }
    }
}
