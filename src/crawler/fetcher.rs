//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the pipeline, including:
//! - Building the shared HTTP client
//! - Rotating user agent strings across requests
//! - GET requests bounded by a per-attempt deadline
//! - Error classification into retryable and terminal failure kinds

use reqwest::{redirect::Policy, Client, StatusCode};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

/// Why an attempt (or a whole work item) failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Timeout, connection failure, HTTP 5xx or 429
    TransientNetwork,

    /// Malformed URL or an HTTP status that will not change on retry (404, 403, ...)
    PermanentRequest,

    /// The page was fetched but its extracted content is too short
    Validation,

    /// The page was fetched but has no recognizable article body
    Malformed,
}

impl FailureKind {
    /// Returns true if another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork | Self::Validation)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient_network",
            Self::PermanentRequest => "permanent_request",
            Self::Validation => "validation",
            Self::Malformed => "malformed",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal result of processing one work item
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult {
    /// Article fetched, extracted and validated
    Success {
        title: String,
        /// Cleaned article text
        content: String,
        /// Title, categories and last-modified stamp
        metadata: BTreeMap<String, Value>,
        /// Size of `content` in bytes
        size_bytes: usize,
    },

    /// Gave up on the item
    Failure {
        kind: FailureKind,
        /// Description of the last error
        message: String,
    },
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The failure kind, if this is a failure
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }
}

/// Error from a single attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptError {
    pub kind: FailureKind,
    pub message: String,
}

impl AttemptError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl From<AttemptError> for FetchResult {
    fn from(error: AttemptError) -> Self {
        FetchResult::Failure {
            kind: error.kind,
            message: error.message,
        }
    }
}

/// A page body received with a 2xx status
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: String,
    pub status_code: u16,
    /// `Last-Modified` header value, if any
    pub last_modified: Option<String>,
    pub body: String,
}

/// Round-robin source of User-Agent strings
#[derive(Debug)]
pub struct UserAgentRotation {
    agents: Vec<String>,
    next: AtomicUsize,
}

impl UserAgentRotation {
    /// Creates a rotation over `agents`, falling back to the default agent when empty
    pub fn new(agents: Vec<String>) -> Self {
        let agents = if agents.is_empty() {
            vec![crate::config::DEFAULT_USER_AGENT.to_string()]
        } else {
            agents
        };
        Self {
            agents,
            next: AtomicUsize::new(0),
        }
    }

    /// Returns the next agent in rotation
    pub fn next_agent(&self) -> &str {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.agents.len();
        &self.agents[index]
    }
}

/// Builds an HTTP client with proper configuration
///
/// The client carries no default user agent; each request sets one from the
/// rotation. `timeout` bounds a whole attempt, body download included.
///
/// # Arguments
///
/// * `timeout` - The per-attempt deadline
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Parses an input URL, rejecting anything that is not absolute http(s)
pub fn parse_target(raw: &str) -> Result<Url, AttemptError> {
    let url = Url::parse(raw.trim()).map_err(|e| {
        AttemptError::new(FailureKind::PermanentRequest, format!("Malformed URL: {}", e))
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(AttemptError::new(
            FailureKind::PermanentRequest,
            format!("Unsupported URL scheme: {}", scheme),
        )),
    }
}

/// Maps an HTTP status outside 2xx to a failure kind
///
/// | Status | Kind |
/// |--------|------|
/// | 429 | TransientNetwork |
/// | 5xx | TransientNetwork |
/// | anything else | PermanentRequest |
pub fn classify_status(status: StatusCode) -> FailureKind {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        FailureKind::TransientNetwork
    } else {
        FailureKind::PermanentRequest
    }
}

fn classify_request_error(e: &reqwest::Error) -> AttemptError {
    if e.is_timeout() {
        AttemptError::new(FailureKind::TransientNetwork, "Request timeout")
    } else if e.is_connect() {
        AttemptError::new(
            FailureKind::TransientNetwork,
            format!("Connection failed: {}", e),
        )
    } else if e.is_redirect() || e.is_builder() {
        AttemptError::new(FailureKind::PermanentRequest, e.to_string())
    } else {
        AttemptError::new(FailureKind::TransientNetwork, e.to_string())
    }
}

/// Performs one GET attempt
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `url` - The URL to fetch
/// * `user_agent` - User-Agent header for this attempt
/// * `timeout` - Deadline for the whole attempt
///
/// # Returns
///
/// * `Ok(FetchedPage)` - 2xx response with its body
/// * `Err(AttemptError)` - Classified failure
pub async fn fetch_page(
    client: &Client,
    url: &Url,
    user_agent: &str,
    timeout: Duration,
) -> Result<FetchedPage, AttemptError> {
    let response = client
        .get(url.clone())
        .header(reqwest::header::USER_AGENT, user_agent)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| classify_request_error(&e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AttemptError::new(
            classify_status(status),
            format!("HTTP {}", status.as_u16()),
        ));
    }

    let final_url = response.url().to_string();
    let last_modified = response
        .headers()
        .get(reqwest::header::LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = response
        .text()
        .await
        .map_err(|e| classify_request_error(&e))?;

    Ok(FetchedPage {
        final_url,
        status_code: status.as_u16(),
        last_modified,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_failure_kind_retryability() {
        assert!(FailureKind::TransientNetwork.is_retryable());
        assert!(FailureKind::Validation.is_retryable());
        assert!(!FailureKind::PermanentRequest.is_retryable());
        assert!(!FailureKind::Malformed.is_retryable());
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            FailureKind::TransientNetwork
        );
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE),
            FailureKind::TransientNetwork
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            FailureKind::TransientNetwork
        );
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND),
            FailureKind::PermanentRequest
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN),
            FailureKind::PermanentRequest
        );
    }

    #[test]
    fn test_parse_target() {
        assert!(parse_target("https://en.wikipedia.org/wiki/Carbon").is_ok());
        assert!(parse_target("  http://example.com/a  ").is_ok());

        let err = parse_target("not a url").unwrap_err();
        assert_eq!(err.kind, FailureKind::PermanentRequest);

        let err = parse_target("ftp://example.com/file").unwrap_err();
        assert_eq!(err.kind, FailureKind::PermanentRequest);
    }

    #[test]
    fn test_user_agent_rotation_is_round_robin() {
        let rotation = UserAgentRotation::new(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(rotation.next_agent(), "a");
        assert_eq!(rotation.next_agent(), "b");
        assert_eq!(rotation.next_agent(), "a");
    }

    #[test]
    fn test_user_agent_rotation_empty_falls_back() {
        let rotation = UserAgentRotation::new(Vec::new());
        assert_eq!(rotation.next_agent(), crate::config::DEFAULT_USER_AGENT);
    }

    #[tokio::test]
    async fn test_fetch_page_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wiki/Carbon"))
            .and(header("user-agent", "TestAgent/1.0"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Last-Modified", "Wed, 21 Oct 2015 07:28:00 GMT")
                    .set_body_string("<html></html>"),
            )
            .mount(&server)
            .await;

        let client = build_http_client(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/wiki/Carbon", server.uri())).unwrap();
        let page = fetch_page(&client, &url, "TestAgent/1.0", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(page.status_code, 200);
        assert_eq!(page.body, "<html></html>");
        assert_eq!(
            page.last_modified.as_deref(),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );
    }

    #[tokio::test]
    async fn test_fetch_page_classifies_statuses() {
        let server = MockServer::start().await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/broken"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = build_http_client(Duration::from_secs(5)).unwrap();

        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let err = fetch_page(&client, &url, "t", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::PermanentRequest);
        assert_eq!(err.message, "HTTP 404");

        let url = Url::parse(&format!("{}/broken", server.uri())).unwrap();
        let err = fetch_page(&client, &url, "t", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::TransientNetwork);
    }

    #[tokio::test]
    async fn test_fetch_page_timeout_is_transient() {
        let server = MockServer::start().await;
        Mock::given(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = build_http_client(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();
        let err = fetch_page(&client, &url, "t", Duration::from_millis(100))
            .await
            .unwrap_err();

        assert_eq!(err.kind, FailureKind::TransientNetwork);
        assert_eq!(err.message, "Request timeout");
    }
}
