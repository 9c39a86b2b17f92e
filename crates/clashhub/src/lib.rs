//! ClashHub - mirror Clash subscription sources into a GitHub repository.
//!
//! An operator curates a list of subscription URLs and a few navigation
//! links. A sync fetches each source and republishes it as
//! `clash/Neat_config{n}.yml` in a repository used as static storage; the
//! public view lists those files under a display domain.
//!
//! # Features
//!
//! - `test-util` - Exposes [`http::MockTransport`] for tests outside this crate.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use clashhub::{RepoGateway, RepositoryConfig, MemoryStore, load_public_view};
//! use clashhub::http::ReqwestTransport;
//!
//! let transport = Arc::new(ReqwestTransport::new(reqwest::Client::new()));
//! let gateway = RepoGateway::new(RepositoryConfig::default(), transport);
//! let view = load_public_view(&gateway, &MemoryStore::new()).await;
//! for file in &view.files {
//!     println!("{}", file.public_url);
//! }
//! ```

pub mod cache;
pub mod config;
pub mod documents;
pub mod error;
pub mod fetcher;
pub mod github;
pub mod home;
pub mod http;
pub mod model;
pub mod session;
pub mod strategy;
pub mod sync;

pub use cache::{CacheError, JsonFileStore, KeyValueStore, MemoryStore};
pub use config::{RepositoryConfig, parse_repo_path};
pub use documents::{
    fetch_custom_links, fetch_sources, load_custom_links, load_sources, probe_known_files,
    save_custom_links, save_sources,
};
pub use error::{FetchError, GatewayError, SyncError};
pub use fetcher::RemoteFetcher;
pub use github::{CommitResult, RepoFile, RepoGateway};
pub use home::{Documents, PublicView, ViewOrigin, load_public_view, reconcile_documents};
pub use model::{CustomLinkEntry, Lookup, RepoFileDescriptor, SourceEntry};
pub use session::{AdminGate, AdminSession, GateError};
pub use sync::{SyncEngine, SyncReport, SyncRequest};
