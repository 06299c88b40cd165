//! Smart News - a news feed aggregator
//!
//! Fetches one or more RSS/Atom feeds per request, keeps the recent entries
//! (widening the window when too few qualify), and serves them as JSON along
//! with single-item lookup and keyword search.

pub mod config;
pub mod fetcher;
pub mod news;
pub mod normalize;
pub mod routes;
pub mod sanitize;
pub mod selection;
pub mod translate;
