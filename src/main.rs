use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smart_news::config::Config;
use smart_news::fetcher::Fetcher;
use smart_news::news::NewsService;
use smart_news::routes::{self, AppState};
use smart_news::translate::{HttpTranslator, Translator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smart_news=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::var("SMART_NEWS_CONFIG").unwrap_or_else(|_| "feeds.toml".to_string());
    let config = Config::load(&config_path)?;
    info!("Loaded {} feeds from {}", config.feeds.len(), config_path);

    let fetcher = Arc::new(Fetcher::new(Duration::from_secs(config.request_timeout_secs))?);

    let translator = HttpTranslator::from_config(&config.translation)?
        .map(|t| Arc::new(t) as Arc<dyn Translator>);
    if translator.is_some() {
        info!("Translation enabled (target: {})", config.translation.target_language);
    }

    let state = Arc::new(AppState {
        news: NewsService::from_config(&config, fetcher, translator),
        published_format: config.published_format.clone(),
    });

    let app = routes::router(state);

    // Start server
    let listen_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| config.listen_addr.clone());
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!("Server starting on http://{}", listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
