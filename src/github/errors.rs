//! GitHub API Error Types
//!
//! Structured error handling for GitHub repository contents API calls.
//! Maps HTTP status codes to specific variants, then onto the store taxonomy.

use crate::store::StoreError;

/// GitHub API error types
#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    #[error("Bad credentials")]
    Unauthorized,

    #[error("Rate limited")]
    RateLimited,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Revision conflict: {0}")]
    Conflict(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("Request timeout")]
    Timeout,

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Request error: {0}")]
    Request(String),
}

impl GitHubError {
    /// Create a GitHubError from an HTTP status code and response body
    ///
    /// `rate_limited` is true when the `x-ratelimit-remaining` header is `0`,
    /// which GitHub pairs with either 403 or 429.
    pub fn from_status(status: u16, body: &str, rate_limited: bool) -> Self {
        match status {
            401 => GitHubError::Unauthorized,
            403 | 429 if rate_limited => GitHubError::RateLimited,
            429 => GitHubError::RateLimited,
            403 => GitHubError::Forbidden(body.to_string()),
            404 => GitHubError::NotFound(body.to_string()),
            408 => GitHubError::Timeout,
            409 => GitHubError::Conflict(body.to_string()),
            // Missing or mismatched blob sha on PUT/DELETE
            422 if body.contains("sha") => GitHubError::Conflict(body.to_string()),
            500..=599 => GitHubError::Server(status, body.to_string()),
            _ => GitHubError::Request(format!("HTTP {}: {}", status, body)),
        }
    }
}

impl From<reqwest::Error> for GitHubError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GitHubError::Timeout
        } else if e.is_decode() {
            GitHubError::Decode(e.to_string())
        } else {
            GitHubError::Network(e.to_string())
        }
    }
}

impl From<GitHubError> for StoreError {
    fn from(e: GitHubError) -> Self {
        match e {
            GitHubError::NotFound(msg) => StoreError::NotFound(msg),
            GitHubError::Conflict(msg) => StoreError::RevisionConflict(msg),
            other => StoreError::RemoteUnavailable(other.to_string()),
        }
    }
}
