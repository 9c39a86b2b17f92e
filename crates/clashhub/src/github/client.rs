//! Repository gateway over the GitHub Contents API.

use std::sync::Arc;

use futures::FutureExt;

use super::types::{
    ApiErrorBody, CommitResult, DeleteFileBody, FileContentResponse, PutFileBody, RateLimitInfo,
    RepoFile, WrappedBody, decode_content, encode_content,
};
use crate::config::RepositoryConfig;
use crate::error::{GatewayError, Result, short_error_message};
use crate::http::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, cache_busted, encode_component,
};
use crate::model::{Lookup, RepoFileDescriptor};
use crate::strategy::{Strategy, try_in_order};

/// Default GitHub REST API base.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Default raw static mirror base.
pub const RAW_CONTENT_BASE: &str = "https://raw.githubusercontent.com";

/// Relay returning the upstream body inside a `contents` JSON field.
pub const WRAPPING_RELAY: &str = "https://api.allorigins.win/get?url=";

/// Relay returning the upstream body unchanged.
pub const DIRECT_RELAY: &str = "https://corsproxy.io/?";

const USER_AGENT: &str = "clashhub";
const ACCEPT: &str = "application/vnd.github.v3+json";

/// Endpoints used by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOptions {
    pub api_base: String,
    pub raw_base: String,
    pub wrapping_relay: String,
    pub direct_relay: String,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            api_base: GITHUB_API_BASE.to_string(),
            raw_base: RAW_CONTENT_BASE.to_string(),
            wrapping_relay: WRAPPING_RELAY.to_string(),
            direct_relay: DIRECT_RELAY.to_string(),
        }
    }
}

/// All reads and writes against one repository's content tree.
///
/// Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct RepoGateway {
    config: Arc<RepositoryConfig>,
    transport: Arc<dyn HttpTransport>,
    options: Arc<GatewayOptions>,
}

impl RepoGateway {
    pub fn new(config: RepositoryConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_options(config, transport, GatewayOptions::default())
    }

    pub fn with_options(
        config: RepositoryConfig,
        transport: Arc<dyn HttpTransport>,
        options: GatewayOptions,
    ) -> Self {
        Self {
            config: Arc::new(config),
            transport,
            options: Arc::new(options),
        }
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    pub(crate) fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    /// API URL for a path in the content tree.
    pub fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.options.api_base.trim_end_matches('/'),
            self.config.owner,
            self.config.repo_name,
            path.trim_start_matches('/')
        )
    }

    /// Raw static mirror URL for a path (not rate limited).
    pub fn raw_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.options.raw_base.trim_end_matches('/'),
            self.config.owner,
            self.config.repo_name,
            self.config.branch,
            path.trim_start_matches('/')
        )
    }

    fn api_request(&self, method: HttpMethod, url: impl Into<String>) -> HttpRequest {
        let mut request = HttpRequest::new(method, url)
            .header("Accept", ACCEPT)
            .header("User-Agent", USER_AGENT);
        if let Some(token) = self.config.token() {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        request
    }

    fn note_rate_limit(&self, response: &HttpResponse) -> Option<RateLimitInfo> {
        let info = RateLimitInfo::from_headers(&response.headers)?;
        if info.is_exhausted() {
            tracing::warn!(
                limit = info.limit,
                reset_at = %info.reset_at,
                "GitHub API rate limit exhausted"
            );
        } else {
            tracing::debug!(limit = info.limit, remaining = info.remaining, "GitHub API rate limit");
        }
        Some(info)
    }

    /// List the entries under `path`.
    ///
    /// `Absent` when owner/repo are unset or the directory does not exist;
    /// `Indeterminate` when the API and every relay failed (rate limited,
    /// blocked, or unparseable).
    pub async fn get_directory(&self, path: &str) -> Lookup<Vec<RepoFileDescriptor>> {
        if !self.config.has_repository() {
            return Lookup::Absent;
        }

        let api_url = self.contents_url(path);
        let api_url = api_url.as_str();
        let strategies = vec![
            Strategy::new("GitHub API", move || self.list_direct(api_url).boxed()),
            Strategy::new("wrapping relay", move || {
                async move {
                    let url = format!("{}{}", self.options.wrapping_relay, encode_component(api_url));
                    let response = self.send_plain(HttpRequest::get(url)).await?;
                    let wrapped: WrappedBody = serde_json::from_slice(&response.body)
                        .map_err(|e| format!("invalid relay payload: {e}"))?;
                    let contents = wrapped
                        .contents
                        .ok_or_else(|| "relay payload has no contents".to_string())?;
                    parse_listing(contents.as_bytes()).map(Lookup::Found)
                }
                .boxed()
            }),
            Strategy::new("direct relay", move || {
                async move {
                    let url = format!("{}{}", self.options.direct_relay, encode_component(api_url));
                    let response = self.send_plain(HttpRequest::get(url)).await?;
                    parse_listing(&response.body).map(Lookup::Found)
                }
                .boxed()
            }),
        ];

        match try_in_order(strategies).await {
            Ok(listing) => listing,
            Err(exhausted) => {
                tracing::warn!(
                    path,
                    attempts = exhausted.failures.len(),
                    "Directory listing unavailable from every source"
                );
                Lookup::Indeterminate
            }
        }
    }

    async fn list_direct(
        &self,
        api_url: &str,
    ) -> std::result::Result<Lookup<Vec<RepoFileDescriptor>>, String> {
        let response = self
            .transport
            .send(self.api_request(HttpMethod::Get, cache_busted(api_url)))
            .await
            .map_err(|e| short_error_message(&e))?;
        let rate_limit = self.note_rate_limit(&response);

        match response.status {
            200..=299 => parse_listing(&response.body).map(Lookup::Found),
            404 => Ok(Lookup::Absent),
            // Routine for anonymous visitors; fall through to the relays.
            403 | 429 => Err(match rate_limit {
                Some(info) => format!("rate limited until {}", info.reset_at),
                None => format!("HTTP {}", response.status),
            }),
            status => Err(format!("HTTP {status}")),
        }
    }

    async fn send_plain(&self, request: HttpRequest) -> std::result::Result<HttpResponse, String> {
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| short_error_message(&e))?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(format!("HTTP {}", response.status))
        }
    }

    /// Read and decode a single file.
    ///
    /// `Absent` only when the API answers 404 (or owner/repo are unset);
    /// every other failure is `Indeterminate`, so callers never mistake an
    /// unreachable file for a missing one.
    pub async fn get_file(&self, path: &str) -> Lookup<RepoFile> {
        if !self.config.has_repository() {
            return Lookup::Absent;
        }

        let request = self.api_request(HttpMethod::Get, cache_busted(&self.contents_url(path)));
        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(path, error = %e, "Failed to read file");
                return Lookup::Indeterminate;
            }
        };
        self.note_rate_limit(&response);

        match response.status {
            200..=299 => match decode_file(&response.body) {
                Ok(file) => Lookup::Found(file),
                Err(e) => {
                    tracing::warn!(path, error = %e, "Failed to decode file");
                    Lookup::Indeterminate
                }
            },
            404 => Lookup::Absent,
            status => {
                tracing::warn!(path, status, message = %api_message(&response), "Failed to read file");
                Lookup::Indeterminate
            }
        }
    }

    /// Create or update a file.
    ///
    /// `sha` must be the current sha when the file exists and `None` only for
    /// brand-new files. A stale sha yields [`GatewayError::Conflict`]; the
    /// caller must re-read rather than retry blindly.
    pub async fn put_file(
        &self,
        path: &str,
        content: &str,
        message: &str,
        sha: Option<&str>,
    ) -> Result<CommitResult> {
        self.writable()?;
        let body = PutFileBody {
            message,
            content: encode_content(content),
            sha,
        };
        let body = serde_json::to_vec(&body).map_err(|e| GatewayError::decode(e.to_string()))?;
        let request = self
            .api_request(HttpMethod::Put, self.contents_url(path))
            .header("Content-Type", "application/json")
            .body(body);

        let response = self.send_write(path, request).await?;
        tracing::debug!(path, created = response.status == 201, "Wrote file");
        parse_commit(&response)
    }

    /// Delete a file; `sha` must be its current sha.
    pub async fn delete_file(&self, path: &str, sha: &str) -> Result<CommitResult> {
        self.writable()?;
        let body = DeleteFileBody {
            message: format!("Delete redundant file: {path}"),
            sha,
        };
        let body = serde_json::to_vec(&body).map_err(|e| GatewayError::decode(e.to_string()))?;
        let request = self
            .api_request(HttpMethod::Delete, self.contents_url(path))
            .header("Content-Type", "application/json")
            .body(body);

        let response = self.send_write(path, request).await?;
        tracing::debug!(path, "Deleted file");
        parse_commit(&response)
    }

    fn writable(&self) -> Result<()> {
        if self.config.token().is_none() {
            return Err(GatewayError::AuthRequired);
        }
        if !self.config.has_repository() {
            return Err(GatewayError::ConfigIncomplete {
                missing: "owner, repository name".to_string(),
            });
        }
        Ok(())
    }

    async fn send_write(&self, path: &str, request: HttpRequest) -> Result<HttpResponse> {
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| GatewayError::network(e.to_string()))?;
        let rate_limit = self.note_rate_limit(&response);

        if response.is_success() {
            return Ok(response);
        }

        let message = api_message(&response);
        Err(match response.status {
            409 => GatewayError::Conflict {
                path: path.to_string(),
                message,
            },
            // Missing sha for an existing file is the same precondition failure.
            422 if message.contains("sha") => GatewayError::Conflict {
                path: path.to_string(),
                message,
            },
            401 => GatewayError::AuthRequired,
            403 | 429 if rate_limit.as_ref().is_some_and(RateLimitInfo::is_exhausted) => {
                GatewayError::RateLimited {
                    reset_at: rate_limit.map(|info| info.reset_at),
                }
            }
            404 => GatewayError::NotFound {
                path: path.to_string(),
            },
            status => GatewayError::Api { status, message },
        })
    }

    /// GET a raw mirror path as text.
    pub(crate) async fn raw_text(&self, path: &str) -> std::result::Result<String, String> {
        let response = self
            .send_plain(HttpRequest::get(cache_busted(&self.raw_url(path))))
            .await?;
        String::from_utf8(response.body).map_err(|e| e.to_string())
    }
}

fn parse_listing(body: &[u8]) -> std::result::Result<Vec<RepoFileDescriptor>, String> {
    serde_json::from_slice(body).map_err(|e| format!("not a directory listing: {e}"))
}

fn decode_file(body: &[u8]) -> Result<RepoFile> {
    let file: FileContentResponse =
        serde_json::from_slice(body).map_err(|e| GatewayError::decode(e.to_string()))?;
    if let Some(encoding) = file.encoding.as_deref()
        && encoding != "base64"
    {
        return Err(GatewayError::decode(format!(
            "unsupported content encoding: {encoding}"
        )));
    }
    let content = match file.content.as_deref() {
        Some(encoded) => decode_content(encoded)?,
        None => String::new(),
    };
    Ok(RepoFile {
        sha: file.sha,
        content,
    })
}

fn parse_commit(response: &HttpResponse) -> Result<CommitResult> {
    serde_json::from_slice(&response.body)
        .map_err(|e| GatewayError::decode(format!("unexpected commit response: {e}")))
}

fn api_message(response: &HttpResponse) -> String {
    serde_json::from_slice::<ApiErrorBody>(&response.body)
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| format!("HTTP {}", response.status))
}
