//! Output module for statistics and run summaries
//!
//! This module handles:
//! - Accumulating run statistics across workers
//! - Periodic progress reports and the final console report
//! - Writing a markdown summary of a finished run

mod markdown;
pub mod stats;

pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use stats::{log_progress, print_statistics, Stats, StatsAggregator};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Backlog fully drained
    Completed,
    /// Stopped by the operator before the backlog drained
    Interrupted,
    /// Stopped by a fatal error
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }
}

/// Summary of one pipeline run
#[derive(Debug, Clone)]
pub struct HarvestSummary {
    /// Cumulative statistics (including resumed runs)
    pub stats: Stats,

    pub status: RunStatus,

    /// URLs in the input after deduplication
    pub input_urls: usize,

    /// URLs that still needed fetching when this run started
    pub backlog: usize,

    /// URLs in the completed set after the final flush
    pub completed_urls: usize,

    /// Checkpoint flushes that failed during the run
    pub flush_failures: u32,

    pub config_hash: Option<String>,
}

impl HarvestSummary {
    /// Input URLs not yet completed
    pub fn remaining(&self) -> usize {
        self.input_urls.saturating_sub(self.completed_urls)
    }
}
