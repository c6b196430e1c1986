//! Input URL list loading
//!
//! Two formats are accepted:
//! - Plain text, one URL per line
//! - CSV with a header row containing a `URL` column (matched
//!   case-insensitively), as produced by the link collector
//!
//! Blank lines and lines starting with `#` are skipped. The list is
//! deduplicated keeping the first occurrence of each URL.
//!
//! CSV records must fit on one line. A quoted field spanning lines shows up
//! as an unterminated quote and is rejected rather than misread.

use crate::HarvestError;
use std::collections::HashSet;
use std::path::Path;

/// Reads and deduplicates the URL list at `path`
pub fn read_urls(path: &Path) -> crate::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| HarvestError::Input(format!("{}: {}", path.display(), e)))?;

    let urls = parse_urls(&content)?;
    tracing::info!("Loaded {} URLs from {}", urls.len(), path.display());
    Ok(urls)
}

/// Parses a URL list from text in either accepted format
pub fn parse_urls(content: &str) -> crate::Result<Vec<String>> {
    let mut lines = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .peekable();

    let url_column = match lines.peek() {
        Some(header) if header.contains(',') || header.eq_ignore_ascii_case("url") => {
            split_csv_line(header)
                .ok_or_else(|| unterminated_quote(1, header))?
                .iter()
                .position(|column| column.trim().eq_ignore_ascii_case("url"))
        }
        _ => None,
    };

    let urls = match url_column {
        Some(index) => {
            lines.next();
            let mut urls = Vec::new();
            for (row, line) in lines.enumerate() {
                let fields = split_csv_line(line).ok_or_else(|| unterminated_quote(row + 2, line))?;
                match fields.get(index) {
                    Some(field) => urls.push(field.trim().to_string()),
                    None => {
                        return Err(HarvestError::Input(format!(
                            "row {} has no URL column: {}",
                            row + 2,
                            line
                        )))
                    }
                }
            }
            urls
        }
        None => lines.map(str::to_string).collect(),
    };

    Ok(dedupe_urls(urls))
}

/// Drops empty entries and repeats, preserving first-occurrence order
pub fn dedupe_urls(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let before = urls.len();

    let unique: Vec<String> = urls
        .into_iter()
        .filter(|url| !url.is_empty())
        .filter(|url| seen.insert(url.clone()))
        .collect();

    if unique.len() < before {
        tracing::debug!("Dropped {} duplicate or empty URLs", before - unique.len());
    }
    unique
}

fn unterminated_quote(row: usize, line: &str) -> HarvestError {
    HarvestError::Input(format!("row {} has an unterminated quoted field: {}", row, line))
}

/// Splits one CSV line, honoring double-quoted fields and `""` escapes
///
/// Returns `None` when a quote is left open at the end of the line.
fn split_csv_line(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    if in_quotes {
        return None;
    }
    fields.push(field);
    Some(fields)
}
