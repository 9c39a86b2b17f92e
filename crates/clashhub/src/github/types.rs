//! Wire types for the GitHub Contents API.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::http::HttpHeaders;
use crate::http::header_get;
use crate::model::RepoFileDescriptor;

/// A decoded file together with the sha needed to overwrite it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFile {
    pub sha: String,
    pub content: String,
}

/// Single-file response from `GET /contents/{path}`.
#[derive(Debug, Deserialize)]
pub(crate) struct FileContentResponse {
    pub sha: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

/// Body of `PUT /contents/{path}`.
#[derive(Debug, Serialize)]
pub(crate) struct PutFileBody<'a> {
    pub message: &'a str,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<&'a str>,
}

/// Body of `DELETE /contents/{path}`.
#[derive(Debug, Serialize)]
pub(crate) struct DeleteFileBody<'a> {
    pub message: String,
    pub sha: &'a str,
}

/// Error payload returned by the API.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

/// Payload of a relay that wraps the upstream body in a `contents` field.
#[derive(Debug, Deserialize)]
pub(crate) struct WrappedBody {
    #[serde(default)]
    pub contents: Option<String>,
}

/// Commit metadata returned by writes and deletes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Result of a create, update or delete.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommitResult {
    /// The written entry; `None` after a delete.
    #[serde(default)]
    pub content: Option<RepoFileDescriptor>,
    pub commit: CommitInfo,
}

/// Rate limit state reported in response headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Maximum requests allowed per period.
    pub limit: usize,
    /// Remaining requests in current period.
    pub remaining: usize,
    /// When the rate limit resets.
    pub reset_at: DateTime<Utc>,
}

impl RateLimitInfo {
    /// Extract rate limit info from GitHub response headers.
    pub fn from_headers(headers: &HttpHeaders) -> Option<Self> {
        let limit = header_get(headers, "x-ratelimit-limit")?.parse().ok()?;
        let remaining = header_get(headers, "x-ratelimit-remaining")?
            .parse()
            .ok()?;
        let reset_epoch: i64 = header_get(headers, "x-ratelimit-reset")?.parse().ok()?;
        let reset_at = DateTime::from_timestamp(reset_epoch, 0).unwrap_or_else(Utc::now);
        Some(Self {
            limit,
            remaining,
            reset_at,
        })
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Base64-encode UTF-8 text for the Contents API.
#[must_use]
pub fn encode_content(content: &str) -> String {
    STANDARD.encode(content.as_bytes())
}

/// Decode Contents API base64 (wrapped at 60 columns) back into UTF-8 text.
pub fn decode_content(encoded: &str) -> Result<String, GatewayError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| GatewayError::decode(format!("invalid base64 content: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| GatewayError::decode(format!("content is not valid UTF-8: {e}")))
}
