//! Run statistics accumulation and reporting
//!
//! `StatsAggregator` is updated once per terminal result and read concurrently
//! by the progress reporter and the checkpoint writer. The whole record sits
//! behind a single mutex so a snapshot never mixes counters from different
//! updates.

use crate::crawler::FetchResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

const MB: f64 = 1024.0 * 1024.0;

/// Cumulative statistics for a harvest, carried across resumed runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    /// Terminal results recorded (successes plus failures)
    pub attempted: u64,

    pub succeeded: u64,

    pub failed: u64,

    /// Extra attempts spent on retries, summed over terminal results
    pub retries: u64,

    /// Bytes of cleaned content stored
    pub total_bytes: u64,

    /// When the harvest first started (preserved across resumes)
    pub start_time: DateTime<Utc>,

    /// When the last checkpoint was flushed
    pub last_checkpoint_time: Option<DateTime<Utc>>,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            attempted: 0,
            succeeded: 0,
            failed: 0,
            retries: 0,
            total_bytes: 0,
            start_time: Utc::now(),
            last_checkpoint_time: None,
        }
    }
}

impl Stats {
    /// Seconds elapsed between `start_time` and `now`
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> f64 {
        let millis = (now - self.start_time).num_milliseconds().max(0);
        millis as f64 / 1000.0
    }

    pub fn total_megabytes(&self) -> f64 {
        self.total_bytes as f64 / MB
    }

    /// Average download rate in MB/s up to `now`
    pub fn megabytes_per_second(&self, now: DateTime<Utc>) -> f64 {
        let elapsed = self.elapsed_seconds(now);
        if elapsed > 0.0 {
            self.total_megabytes() / elapsed
        } else {
            0.0
        }
    }

    /// Success rate as a percentage of terminal results
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            return 0.0;
        }
        (self.succeeded as f64 / self.attempted as f64) * 100.0
    }

    /// Counter-only view, used to compare runs independent of timestamps
    pub fn counters(&self) -> (u64, u64, u64, u64, u64) {
        (
            self.attempted,
            self.succeeded,
            self.failed,
            self.retries,
            self.total_bytes,
        )
    }
}

/// Thread-safe accumulator of `Stats`
#[derive(Debug, Default)]
pub struct StatsAggregator {
    inner: Mutex<Stats>,
}

impl StatsAggregator {
    /// Creates an aggregator starting from `initial` (e.g. a checkpoint snapshot)
    pub fn new(initial: Stats) -> Self {
        Self {
            inner: Mutex::new(initial),
        }
    }

    /// Accounts for one terminal result that took `attempts` attempts
    pub fn update(&self, outcome: &FetchResult, attempts: u32) {
        let mut stats = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        stats.attempted += 1;
        stats.retries += u64::from(attempts.saturating_sub(1));
        match outcome {
            FetchResult::Success { size_bytes, .. } => {
                stats.succeeded += 1;
                stats.total_bytes += *size_bytes as u64;
            }
            FetchResult::Failure { .. } => stats.failed += 1,
        }
    }

    /// Records the time of a successful checkpoint flush
    pub fn mark_checkpoint(&self, at: DateTime<Utc>) {
        let mut stats = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        stats.last_checkpoint_time = Some(at);
    }

    /// Returns a consistent point-in-time copy
    pub fn snapshot(&self) -> Stats {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Logs a one-line progress report
pub fn log_progress(stats: &Stats, backlog: usize) {
    let now = Utc::now();
    tracing::info!(
        "Progress: {}/{} done ({} ok, {} failed, {} retries), {:.2} MB, {:.2} MB/s",
        stats.attempted,
        backlog,
        stats.succeeded,
        stats.failed,
        stats.retries,
        stats.total_megabytes(),
        stats.megabytes_per_second(now)
    );
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &Stats) {
    let now = Utc::now();

    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    println!("  Started: {}", stats.start_time.to_rfc3339());
    if let Some(checkpoint) = stats.last_checkpoint_time {
        println!("  Last checkpoint: {}", checkpoint.to_rfc3339());
    }
    println!("  Articles attempted: {}", stats.attempted);
    println!("  Successful downloads: {}", stats.succeeded);
    println!("  Failed downloads: {}", stats.failed);
    println!("  Retries: {}", stats.retries);
    println!();

    println!("Size:");
    println!("  Total content size: {:.2} MB", stats.total_megabytes());
    if stats.succeeded > 0 {
        println!(
            "  Average article size: {:.2} KB",
            stats.total_bytes as f64 / stats.succeeded as f64 / 1024.0
        );
    }
    println!();

    println!("Performance:");
    println!(
        "  Average download rate: {:.2} MB/s",
        stats.megabytes_per_second(now)
    );
    println!(
        "  Total execution time: {:.2} seconds",
        stats.elapsed_seconds(now)
    );
    println!();

    println!(
        "Success Rate: {:.1}% ({} / {} articles)",
        stats.success_rate(),
        stats.succeeded,
        stats.attempted
    );
}
