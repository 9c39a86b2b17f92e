//! Backing repository configuration.

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Repository owner used when none is configured.
pub const DEFAULT_OWNER: &str = "zhaifu";

/// Repository name used when none is configured.
pub const DEFAULT_REPO: &str = "clash10";

/// Public base URL subscription links are rendered with by default.
pub const DEFAULT_DOMAIN: &str = "https://clash.fastkj.eu.org";

/// Branch served by the raw static mirror.
pub const DEFAULT_BRANCH: &str = "main";

/// Identifies the GitHub repository backing the app.
///
/// Without a token the repository is read-only and subject to the anonymous
/// rate limit.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub owner: String,
    pub repo_name: String,
    pub display_domain: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            token: None,
            owner: DEFAULT_OWNER.to_string(),
            repo_name: DEFAULT_REPO.to_string(),
            display_domain: DEFAULT_DOMAIN.to_string(),
            branch: default_branch(),
        }
    }
}

// Keeps the token out of logs.
impl std::fmt::Debug for RepositoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("owner", &self.owner)
            .field("repo_name", &self.repo_name)
            .field("display_domain", &self.display_domain)
            .field("branch", &self.branch)
            .finish()
    }
}

impl RepositoryConfig {
    /// Build a config for `owner/repo_name` with the default domain and branch.
    pub fn new(owner: impl Into<String>, repo_name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo_name: repo_name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = if token.trim().is_empty() {
            None
        } else {
            Some(token)
        };
        self
    }

    #[must_use]
    pub fn with_display_domain(mut self, domain: impl Into<String>) -> Self {
        self.display_domain = domain.into();
        self
    }

    /// Replace blank owner/repo/branch with the built-in defaults.
    #[must_use]
    pub fn with_defaults_filled(mut self) -> Self {
        if self.owner.trim().is_empty() {
            self.owner = DEFAULT_OWNER.to_string();
        }
        if self.repo_name.trim().is_empty() {
            self.repo_name = DEFAULT_REPO.to_string();
        }
        if self.branch.trim().is_empty() {
            self.branch = default_branch();
        }
        self
    }

    /// The token, if one is configured and non-blank.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Whether owner and repository name are both set.
    #[must_use]
    pub fn has_repository(&self) -> bool {
        !self.owner.trim().is_empty() && !self.repo_name.trim().is_empty()
    }

    /// `owner/repo` for display.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo_name)
    }

    /// Check that token, owner and repository name are present.
    ///
    /// Required before any write; performs no network I/O.
    pub fn require_writable(&self) -> Result<(), GatewayError> {
        let mut missing = Vec::new();
        if self.token().is_none() {
            missing.push("token");
        }
        if self.owner.trim().is_empty() {
            missing.push("owner");
        }
        if self.repo_name.trim().is_empty() {
            missing.push("repository name");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::ConfigIncomplete {
                missing: missing.join(", "),
            })
        }
    }

    /// Public URL for a file under the display domain.
    #[must_use]
    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.display_domain.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Split an `owner/repo` path into its two trimmed parts.
///
/// Returns `None` when the input contains no `/`. Segments after the
/// repository name are ignored.
pub fn parse_repo_path(path: &str) -> Option<(String, String)> {
    let mut segments = path.split('/');
    let owner = segments.next()?;
    let repo = segments.next()?;
    Some((owner.trim().to_string(), repo.trim().to_string()))
}
