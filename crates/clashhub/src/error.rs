use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur when talking to the backing repository.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Owner, repository name or token missing before a write.
    #[error("Repository configuration incomplete: missing {missing}")]
    ConfigIncomplete { missing: String },

    /// A write was attempted without a token, or the token was rejected.
    #[error("Authentication required")]
    AuthRequired,

    /// The path (or the repository itself) does not exist.
    #[error("Not found: {path}")]
    NotFound { path: String },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded{}", reset_suffix(.reset_at))]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    /// The supplied sha no longer matches the file's current state.
    #[error("Stale version of {path}, reload and retry: {message}")]
    Conflict { path: String, message: String },

    /// Network or connection error.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Unexpected status from the API.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Response body could not be decoded.
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// The current state of a file could not be determined.
    #[error("Could not determine the current state of {path}")]
    Indeterminate { path: String },
}

fn reset_suffix(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(at) => format!(". Resets at {at}"),
        None => String::new(),
    }
}

impl GatewayError {
    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Check if this error is a rate limit error.
    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Check if this error is an optimistic-concurrency conflict.
    #[inline]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Errors from the remote content fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Neither the direct request nor any relay returned a 2xx response.
    #[error("Unable to fetch content from {url} ({attempts} attempts failed)")]
    Unreachable { url: String, attempts: usize },
}

/// Errors that abort a sync run.
///
/// Failures of a single source or a single orphan deletion are recorded in
/// the report instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Cannot sync, repository configuration incomplete: missing {missing}")]
    ConfigIncomplete { missing: String },

    #[error("A sync is already running")]
    AlreadyRunning,

    #[error("Failed to save {path}: {source}")]
    Document {
        path: String,
        #[source]
        source: GatewayError,
    },

    #[error("Sync failed: {message}")]
    Fatal { message: String },
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message, which is useful for errors
/// that include multi-line details.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
