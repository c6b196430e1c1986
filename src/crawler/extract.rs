//! Article extraction from fetched HTML
//!
//! This module turns a page body into an article:
//! - Page title and category names
//! - Structured body text (paragraphs, headings, list items) from the
//!   configured content container
//! - Citation markers and stray symbols stripped from the text

use crate::config::ExtractionConfig;
use crate::ConfigError;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Elements whose text never belongs to the article
const EXCLUDED_TAGS: [&str; 5] = ["script", "style", "footer", "header", "nav"];

/// Blocks collected from the content container, in document order
const BLOCK_SELECTOR: &str = "p, h1, h2, h3, h4, h5, h6, ul, ol, table";

/// Placeholder emitted for each table
pub const TABLE_PLACEHOLDER: &str = "[Table content preserved]";

/// Errors that can occur during extraction
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("No main content found (selector {0})")]
    MissingContent(String),
}

/// An article extracted from one page
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedArticle {
    pub title: String,
    pub content: String,
    pub metadata: BTreeMap<String, Value>,
}

/// Compiled selectors and cleaning patterns, built once per run
#[derive(Debug)]
pub struct Extractor {
    content_selector: String,
    content: Selector,
    categories: Selector,
    title: Selector,
    blocks: Selector,
    list_items: Selector,
    citations: Regex,
    spaces: Regex,
    symbols: Regex,
}

fn parse_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::Validation(format!("bad pattern {}: {}", pattern, e)))
}

impl Extractor {
    /// Compiles the selectors named in `config`
    pub fn new(config: &ExtractionConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            content_selector: config.content_selector.clone(),
            content: parse_selector(&config.content_selector)?,
            categories: parse_selector(&config.category_selector)?,
            title: parse_selector("title")?,
            blocks: parse_selector(BLOCK_SELECTOR)?,
            list_items: parse_selector("li")?,
            citations: compile(r"\[\d+\]")?,
            spaces: compile(r"[ \t]+")?,
            symbols: compile(r"[^\w\s.,;?!():\-\n]")?,
        })
    }

    /// Extracts the article from `html`
    ///
    /// # Arguments
    ///
    /// * `html` - The page body
    /// * `last_modified` - The response's `Last-Modified` header, if any
    ///
    /// # Returns
    ///
    /// * `Ok(ExtractedArticle)` - Title, cleaned text and metadata
    /// * `Err(ExtractError)` - The page has no content container
    pub fn extract(
        &self,
        html: &str,
        last_modified: Option<&str>,
    ) -> Result<ExtractedArticle, ExtractError> {
        let document = Html::parse_document(html);

        let title = document
            .select(&self.title)
            .next()
            .map(|element| element.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let categories: Vec<Value> = document
            .select(&self.categories)
            .map(|element| element.text().collect::<String>().trim().to_string())
            .filter(|name| !name.is_empty())
            .map(Value::from)
            .collect();

        let container = document
            .select(&self.content)
            .find(|element| !is_excluded(element))
            .ok_or_else(|| ExtractError::MissingContent(self.content_selector.clone()))?;

        let mut blocks = Vec::new();
        for element in container.select(&self.blocks) {
            if is_excluded(&element) || inside_block_container(&element, &container) {
                continue;
            }

            match element.value().name() {
                "ul" | "ol" => {
                    for item in element.select(&self.list_items) {
                        blocks.push(format!("- {}", element_text(&item)));
                    }
                }
                "table" => blocks.push(TABLE_PLACEHOLDER.to_string()),
                name if name.starts_with('h') => {
                    blocks.push(format!("\n== {} ==\n", element_text(&element)))
                }
                _ => blocks.push(element_text(&element)),
            }
        }

        let content = self.clean_text(&blocks.join("\n"));

        let mut metadata = BTreeMap::new();
        metadata.insert("title".to_string(), Value::from(title.clone()));
        metadata.insert(
            "last_modified".to_string(),
            Value::from(last_modified.unwrap_or_default()),
        );
        metadata.insert("categories".to_string(), Value::Array(categories));

        Ok(ExtractedArticle {
            title,
            content,
            metadata,
        })
    }

    /// Strips citation markers and symbols, collapses runs of spaces, keeps newlines
    pub fn clean_text(&self, text: &str) -> String {
        let text = self.citations.replace_all(text, "");
        let text = self.spaces.replace_all(&text, " ");
        let text = self.symbols.replace_all(&text, "");
        text.trim().to_string()
    }
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// True if `element` sits inside a script, style, footer, header or nav
fn is_excluded(element: &ElementRef<'_>) -> bool {
    EXCLUDED_TAGS.contains(&element.value().name())
        || element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| EXCLUDED_TAGS.contains(&ancestor.value().name()))
}

/// True if a list or table between `element` and `container` already covers it
fn inside_block_container(element: &ElementRef<'_>, container: &ElementRef<'_>) -> bool {
    for ancestor in element.ancestors().filter_map(ElementRef::wrap) {
        if ancestor == *container {
            return false;
        }
        if matches!(ancestor.value().name(), "ul" | "ol" | "table") {
            return true;
        }
    }
    false
}
