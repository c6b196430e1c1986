//! Per-item processing: one work item from Pending to a terminal result
//!
//! A worker drives an item through its state machine:
//!
//! ```text
//! Pending -> InFlight -> Succeeded | FailedTerminal
//!               |  ^
//!               v  |
//!          AwaitingBackoff
//! ```
//!
//! Every attempt takes a slot from the shared rate limiter. Waiting for a
//! slot and sleeping through a backoff both give way to cancellation, in which
//! case the item is abandoned without a result and no further attempt starts.

use crate::config::Config;
use crate::crawler::extract::Extractor;
use crate::crawler::fetcher::{
    build_http_client, fetch_page, parse_target, AttemptError, FailureKind, FetchResult,
    UserAgentRotation,
};
use crate::crawler::limiter::RateLimiter;
use crate::crawler::retry::{RetryDecision, RetryPolicy};
use crate::state::{ItemState, WorkItem};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Fetches, extracts and validates articles; shared by all worker tasks
pub struct Worker {
    client: Client,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    extractor: Extractor,
    user_agents: UserAgentRotation,
    timeout: Duration,
    min_content_length: usize,
    cancel: CancellationToken,
}

impl Worker {
    /// Creates a worker from the pipeline configuration
    pub fn new(
        config: &Config,
        limiter: Arc<RateLimiter>,
        cancel: CancellationToken,
    ) -> crate::Result<Self> {
        let timeout = config.pipeline.timeout();
        Ok(Self {
            client: build_http_client(timeout)?,
            limiter,
            retry: RetryPolicy::from_config(&config.pipeline),
            extractor: Extractor::new(&config.extraction)?,
            user_agents: UserAgentRotation::new(config.user_agents.clone()),
            timeout,
            min_content_length: config.pipeline.min_content_length,
            cancel,
        })
    }

    /// Processes `item` until it reaches a terminal state
    ///
    /// # Returns
    ///
    /// * `Ok(Some(FetchResult))` - The item's terminal result
    /// * `Ok(None)` - Cancelled before a terminal result; the item stays incomplete
    /// * `Err(HarvestError)` - The item was handed over in a non-pending state
    pub async fn process(&self, item: &mut WorkItem) -> crate::Result<Option<FetchResult>> {
        let url = match parse_target(&item.url) {
            Ok(url) => url,
            Err(error) => {
                item.transition(ItemState::InFlight)?;
                item.transition(ItemState::FailedTerminal)?;
                tracing::warn!("Skipping {}: {}", item.url, error.message);
                return Ok(Some(error.into()));
            }
        };

        loop {
            item.transition(ItemState::InFlight)?;

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Abandoning {} while waiting for a request slot", item.url);
                    return Ok(None);
                }
                _ = self.limiter.acquire() => {}
            }

            let error = match self.attempt(&url).await {
                Ok(result) => {
                    item.transition(ItemState::Succeeded)?;
                    if let FetchResult::Success { size_bytes, .. } = &result {
                        tracing::debug!(
                            "Fetched {} ({:.2} KB, {} attempt(s))",
                            item.url,
                            *size_bytes as f64 / 1024.0,
                            item.attempts()
                        );
                    }
                    return Ok(Some(result));
                }
                Err(error) => error,
            };

            match self.retry.decide(error.kind, item.attempt_count) {
                RetryDecision::GiveUp => {
                    item.transition(ItemState::FailedTerminal)?;
                    tracing::error!(
                        "Giving up on {} after {} attempt(s): {}",
                        item.url,
                        item.attempts(),
                        error
                    );
                    return Ok(Some(error.into()));
                }
                RetryDecision::Retry { delay } => {
                    if self.cancel.is_cancelled() {
                        tracing::debug!("Abandoning {} instead of retrying", item.url);
                        return Ok(None);
                    }

                    item.begin_retry()?;
                    tracing::warn!(
                        "Attempt {} for {} failed: {}; retrying in {:?}",
                        item.attempt_count,
                        item.url,
                        error,
                        delay
                    );

                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            tracing::debug!("Abandoning {} during backoff", item.url);
                            return Ok(None);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// One fetch, extract and validate pass
    async fn attempt(&self, url: &Url) -> Result<FetchResult, AttemptError> {
        let agent = self.user_agents.next_agent();
        let page = fetch_page(&self.client, url, agent, self.timeout).await?;

        if page.final_url != url.as_str() {
            tracing::trace!("{} redirected to {}", url, page.final_url);
        }

        let article = self
            .extractor
            .extract(&page.body, page.last_modified.as_deref())
            .map_err(|e| AttemptError::new(FailureKind::Malformed, e.to_string()))?;

        let length = article.content.chars().count();
        if length < self.min_content_length {
            return Err(AttemptError::new(
                FailureKind::Validation,
                format!(
                    "Content too short ({} < {} characters)",
                    length, self.min_content_length
                ),
            ));
        }

        Ok(FetchResult::Success {
            size_bytes: article.content.len(),
            title: article.title,
            content: article.content,
            metadata: article.metadata,
        })
    }
}
