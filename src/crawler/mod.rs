//! Crawler module for article fetching and processing
//!
//! This module contains the core pipeline logic, including:
//! - HTTP fetching and failure classification
//! - Article extraction from HTML
//! - Global rate limiting and retry policy
//! - The per-item worker and overall run coordination

mod coordinator;
mod extract;
mod fetcher;
mod limiter;
mod retry;
mod worker;

pub use coordinator::{run_pipeline, Coordinator, MAX_CONSECUTIVE_FLUSH_FAILURES};
pub use extract::{ExtractError, ExtractedArticle, Extractor};
pub use fetcher::{
    build_http_client, classify_status, fetch_page, parse_target, AttemptError, FailureKind,
    FetchResult, FetchedPage, UserAgentRotation,
};
pub use limiter::RateLimiter;
pub use retry::{RetryDecision, RetryPolicy};
pub use worker::Worker;
