use crate::config::types::{Config, ExtractionConfig, OutputConfig, PipelineConfig};
use crate::ConfigError;
use scraper::Selector;
use std::time::Duration;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_pipeline_config(&config.pipeline)?;
    validate_user_agents(&config.user_agents)?;
    validate_extraction_config(&config.extraction)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates pipeline configuration
///
/// Every seconds value must convert to a `Duration`, so nothing can panic
/// later when the pipeline turns them into timers.
fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    // max_retries >= 0 and min_content_length >= 0 always hold for unsigned types

    validate_positive_seconds("timeout", config.timeout)?;

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be >= 1, got {}",
            config.batch_size
        )));
    }

    if config.checkpoint_frequency < 1 {
        return Err(ConfigError::Validation(format!(
            "checkpoint_frequency must be >= 1, got {}",
            config.checkpoint_frequency
        )));
    }

    validate_non_negative_seconds("rate_limit", config.rate_limit)?;
    validate_non_negative_seconds("backoff_base", config.backoff_base)?;
    validate_non_negative_seconds("backoff_max", config.backoff_max)?;

    if config.backoff_max < config.backoff_base {
        return Err(ConfigError::Validation(format!(
            "backoff_max ({}) must be >= backoff_base ({})",
            config.backoff_max, config.backoff_base
        )));
    }

    validate_positive_seconds("progress_interval", config.progress_interval)?;

    Ok(())
}

fn to_duration(name: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        ConfigError::Validation(format!(
            "{} must be a non-negative number of seconds in range, got {}",
            name, value
        ))
    })
}

fn validate_non_negative_seconds(name: &str, value: f64) -> Result<(), ConfigError> {
    to_duration(name, value).map(|_| ())
}

/// Like `validate_non_negative_seconds`, also rejecting values that round to zero
fn validate_positive_seconds(name: &str, value: f64) -> Result<(), ConfigError> {
    if to_duration(name, value)?.is_zero() {
        return Err(ConfigError::Validation(format!(
            "{} must be > 0 seconds, got {}",
            name, value
        )));
    }
    Ok(())
}

/// Validates the user agent list
fn validate_user_agents(user_agents: &[String]) -> Result<(), ConfigError> {
    if user_agents.is_empty() {
        return Err(ConfigError::Validation(
            "user_agents must contain at least one entry".to_string(),
        ));
    }

    for agent in user_agents {
        if agent.trim().is_empty() {
            return Err(ConfigError::Validation(
                "user_agents cannot contain empty strings".to_string(),
            ));
        }

        // Must be usable as an HTTP header value
        if agent.chars().any(|c| c.is_control()) {
            return Err(ConfigError::Validation(format!(
                "user agent '{}' contains control characters",
                agent.escape_debug()
            )));
        }
    }

    Ok(())
}

/// Validates that the extraction selectors parse
fn validate_extraction_config(config: &ExtractionConfig) -> Result<(), ConfigError> {
    for selector in [&config.content_selector, &config.category_selector] {
        Selector::parse(selector)
            .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))?;
    }
    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.checkpoint_path.is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint_path cannot be empty".to_string(),
        ));
    }

    if config.summary_path.is_empty() {
        return Err(ConfigError::Validation(
            "summary_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
