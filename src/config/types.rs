use serde::{Deserialize, Serialize};
use std::time::Duration;

/// User agent sent when the config file does not provide one
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Main configuration structure for Article-Harvester
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// User agents rotated round-robin across requests
    #[serde(rename = "user-agents")]
    pub user_agents: Vec<String>,

    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    pub output: OutputConfig,
}

/// Fetch pipeline behavior configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Retries allowed after the first attempt
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Per-attempt deadline (seconds)
    pub timeout: f64,

    /// Number of concurrent workers
    #[serde(rename = "batch-size")]
    pub batch_size: u32,

    /// Minimum cleaned content length (characters) for a page to count as fetched
    #[serde(rename = "min-content-length")]
    pub min_content_length: usize,

    /// Terminal results between checkpoint flushes
    #[serde(rename = "checkpoint-frequency")]
    pub checkpoint_frequency: u32,

    /// Minimum spacing between request starts across all workers (seconds)
    #[serde(rename = "rate-limit")]
    pub rate_limit: f64,

    /// Delay before the first retry (seconds); doubles per attempt
    #[serde(rename = "backoff-base", default = "default_backoff_base")]
    pub backoff_base: f64,

    /// Upper bound for the retry delay (seconds)
    #[serde(rename = "backoff-max", default = "default_backoff_max")]
    pub backoff_max: f64,

    /// Interval between progress reports (seconds)
    #[serde(rename = "progress-interval", default = "default_progress_interval")]
    pub progress_interval: f64,
}

impl PipelineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_secs_f64(self.rate_limit)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs_f64(self.backoff_base)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs_f64(self.backoff_max)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs_f64(self.progress_interval)
    }
}

/// Article extraction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// CSS selector of the element holding the article body
    #[serde(rename = "content-selector", default = "default_content_selector")]
    pub content_selector: String,

    /// CSS selector of category links
    #[serde(rename = "category-selector", default = "default_category_selector")]
    pub category_selector: String,
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database receiving article records
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the JSON checkpoint file
    #[serde(rename = "checkpoint-path")]
    pub checkpoint_path: String,

    /// Path to the markdown summary file
    #[serde(rename = "summary-path")]
    pub summary_path: String,
}

fn default_backoff_base() -> f64 {
    0.3
}

fn default_backoff_max() -> f64 {
    30.0
}

fn default_progress_interval() -> f64 {
    30.0
}

fn default_content_selector() -> String {
    "#mw-content-text".to_string()
}

fn default_category_selector() -> String {
    "div.mw-normal-catlinks a".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: 30.0,
            batch_size: 10,
            min_content_length: 100,
            checkpoint_frequency: 50,
            rate_limit: 1.0,
            backoff_base: default_backoff_base(),
            backoff_max: default_backoff_max(),
            progress_interval: default_progress_interval(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            content_selector: default_content_selector(),
            category_selector: default_category_selector(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "./articles.db".to_string(),
            checkpoint_path: "./harvest_checkpoint.json".to_string(),
            summary_path: "./harvest_summary.md".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agents: vec![DEFAULT_USER_AGENT.to_string()],
            pipeline: PipelineConfig::default(),
            extraction: ExtractionConfig::default(),
            output: OutputConfig::default(),
        }
    }
}
