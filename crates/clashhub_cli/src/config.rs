//! Layered settings for the `clashhub` binary.
//!
//! Later layers win: built-in defaults, the user config file, `./clashhub.toml`,
//! then `CLASHHUB_*` variables (`CLASHHUB_REPOSITORY_TOKEN` and so on).
//! Command-line flags are applied on top by the commands themselves.
//!
//! ```toml
//! [repository]
//! owner = "zhaifu"
//! name = "clash10"
//! token = "ghp_..."  # or use CLASHHUB_REPOSITORY_TOKEN env var
//! domain = "https://clash.fastkj.eu.org"
//! branch = "main"
//!
//! [admin]
//! password = "admin"
//!
//! [cache]
//! path = "~/.local/state/clashhub/cache.json"  # optional, this is the default
//!
//! [http]
//! timeout = 30  # seconds
//! ```

use std::path::PathBuf;
use std::{fs, io};

use clashhub::RepositoryConfig;
use clashhub::config::{DEFAULT_BRANCH, DEFAULT_DOMAIN, DEFAULT_OWNER, DEFAULT_REPO};
use clashhub::session::DEFAULT_ADMIN_PASSWORD;
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

const APP_NAME: &str = "clashhub";

/// Everything the binary reads from files and the environment.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub repository: RepositorySection,
    pub admin: AdminConfig,
    pub cache: CacheConfig,
    pub http: HttpConfig,
}

/// The backing repository.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct RepositorySection {
    pub owner: Option<String>,
    pub name: Option<String>,
    /// Can also be set via CLASHHUB_REPOSITORY_TOKEN environment variable.
    pub token: Option<String>,
    /// Base URL subscription links are shown under.
    pub domain: Option<String>,
    pub branch: Option<String>,
}

impl std::fmt::Debug for RepositorySection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositorySection")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("domain", &self.domain)
            .field("branch", &self.branch)
            .finish()
    }
}

/// Admin gate.
#[derive(Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub password: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            password: DEFAULT_ADMIN_PASSWORD.to_string(),
        }
    }
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig").finish_non_exhaustive()
    }
}

/// Local cache location.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Defaults to `<state dir>/clashhub/cache.json`.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    pub timeout: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout: 30 }
    }
}

/// Fields written by `repo set`.
#[derive(Debug, Default)]
pub struct RepositoryUpdate {
    pub owner: Option<String>,
    pub name: Option<String>,
    pub token: Option<String>,
    pub domain: Option<String>,
    pub branch: Option<String>,
}

impl RepositoryUpdate {
    pub fn is_empty(&self) -> bool {
        self.owner.is_none()
            && self.name.is_none()
            && self.token.is_none()
            && self.domain.is_none()
            && self.branch.is_none()
    }

    fn fields(&self) -> [(&'static str, Option<&str>); 5] {
        [
            ("owner", self.owner.as_deref()),
            ("name", self.name.as_deref()),
            ("token", self.token.as_deref()),
            ("domain", self.domain.as_deref()),
            ("branch", self.branch.as_deref()),
        ]
    }
}

impl Config {
    /// Merge every layer. A broken file is logged and ignored so that a
    /// typo never locks the operator out of `repo set`.
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!(path = %xdg_config.display(), "Reading user config");
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("clashhub.toml");
        if local_config.exists() {
            tracing::debug!(path = "clashhub.toml", "Reading local config");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // e.g., CLASHHUB_REPOSITORY_TOKEN -> repository.token
        builder = builder.add_source(
            Environment::with_prefix("CLASHHUB")
                .separator("_")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(error = %e, "Config has invalid values, using defaults");
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Config could not be read, using defaults");
                Config::default()
            }
        }
    }

    /// The repository configuration, with blank fields falling back to the
    /// built-in defaults.
    pub fn repository_config(&self) -> RepositoryConfig {
        let section = &self.repository;
        let mut config = RepositoryConfig::new(
            section.owner.as_deref().unwrap_or(DEFAULT_OWNER),
            section.name.as_deref().unwrap_or(DEFAULT_REPO),
        )
        .with_token(section.token.clone().unwrap_or_default())
        .with_display_domain(
            section
                .domain
                .as_deref()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or(DEFAULT_DOMAIN),
        );
        config.branch = section
            .branch
            .clone()
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string());
        config.with_defaults_filled()
    }

    /// Where the local cache lives.
    pub fn cache_path(&self) -> Option<PathBuf> {
        self.cache
            .path
            .clone()
            .or_else(|| Self::default_state_dir().map(|dir| dir.join("cache.json")))
    }

    /// `<config dir>/clashhub/config.toml`.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// `$XDG_STATE_HOME/clashhub` where the platform has a state dir, the
    /// data dir elsewhere.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| {
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }

    /// Save repository fields to the user config file.
    ///
    /// The file is created on first use. Only the given keys of the `[repository]` section change; formatting,
    /// comments and other settings are preserved.
    pub fn save_repository(update: &RepositoryUpdate) -> io::Result<PathBuf> {
        let config_path = Self::default_config_path().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "no config directory on this platform",
            )
        })?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = if config_path.exists() {
            fs::read_to_string(&config_path)?
        } else {
            String::new()
        };

        fs::write(&config_path, apply_repository_update(&content, update)?)?;
        Ok(config_path)
    }
}

fn apply_repository_update(content: &str, update: &RepositoryUpdate) -> io::Result<String> {
    use toml_edit::{DocumentMut, value};

    let mut doc: DocumentMut = content.parse().map_err(|e| {
        io::Error::new(io::ErrorKind::InvalidData, format!("config file is not valid TOML: {e}"))
    })?;

    if !doc.contains_key("repository") {
        doc["repository"] = toml_edit::table();
    }
    for (key, field) in update.fields() {
        if let Some(field) = field {
            doc["repository"][key] = value(field);
        }
    }
    Ok(doc.to_string())
}
