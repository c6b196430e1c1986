//! Markdown summary generation
//!
//! This module generates a human-readable markdown summary of a harvest run.

use crate::output::{HarvestSummary, OutputResult};
use chrono::Utc;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown summary of `summary` to `output_path`
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(summary: &HarvestSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a harvest summary as markdown
pub fn format_markdown_summary(summary: &HarvestSummary) -> String {
    let now = Utc::now();
    let stats = &summary.stats;
    let mut md = String::new();

    md.push_str("# Article Harvest Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Status**: {}\n", summary.status.as_str()));
    md.push_str(&format!("- **Started**: {}\n", stats.start_time.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", now.to_rfc3339()));
    if let Some(checkpoint) = stats.last_checkpoint_time {
        md.push_str(&format!(
            "- **Last Checkpoint**: {}\n",
            checkpoint.to_rfc3339()
        ));
    }
    if let Some(hash) = &summary.config_hash {
        md.push_str(&format!("- **Config Hash**: {}\n", hash));
    }
    md.push('\n');

    // Progress
    md.push_str("## Progress\n\n");
    md.push_str("| Measure | Count |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Input URLs | {} |\n", summary.input_urls));
    md.push_str(&format!("| Backlog at start | {} |\n", summary.backlog));
    md.push_str(&format!("| Completed URLs | {} |\n", summary.completed_urls));
    md.push_str(&format!("| Remaining | {} |\n\n", summary.remaining()));

    // Outcomes
    md.push_str("## Outcomes\n\n");
    md.push_str("| Outcome | Count |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Attempted | {} |\n", stats.attempted));
    md.push_str(&format!("| Succeeded | {} |\n", stats.succeeded));
    md.push_str(&format!("| Failed | {} |\n", stats.failed));
    md.push_str(&format!("| Retries | {} |\n\n", stats.retries));
    md.push_str(&format!(
        "- **Success Rate**: {:.2}%\n\n",
        stats.success_rate()
    ));

    // Throughput
    md.push_str("## Throughput\n\n");
    md.push_str(&format!(
        "- **Total Content**: {:.2} MB\n",
        stats.total_megabytes()
    ));
    md.push_str(&format!(
        "- **Average Rate**: {:.2} MB/s\n",
        stats.megabytes_per_second(now)
    ));
    md.push_str(&format!(
        "- **Elapsed**: {:.2} seconds\n",
        stats.elapsed_seconds(now)
    ));

    if summary.flush_failures > 0 {
        md.push_str("\n## Warnings\n\n");
        md.push_str(&format!(
            "- {} checkpoint flush(es) failed during this run\n",
            summary.flush_failures
        ));
    }

    md
}
