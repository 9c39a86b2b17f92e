//! Load and save the JSON documents kept in the backing repository.
//!
//! Reads try the raw static mirror first (no rate limit) and fall back to the
//! Contents API. Writes always re-read the current sha first and replace the
//! whole document.

use futures::FutureExt;
use futures::future::join_all;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::GatewayError;
use crate::github::{CommitResult, RepoGateway};
use crate::http::HttpRequest;
use crate::model::{
    CustomLinkEntry, EntryType, LINKS_PATH, Lookup, MIRROR_DIR, RepoFileDescriptor, SOURCES_PATH,
    SourceEntry,
};
use crate::session::AdminSession;
use crate::strategy::{Strategy, try_in_order};

/// Filenames probed when no directory listing is available.
pub const DEFAULT_PROBE_CANDIDATES: [&str; 7] = [
    "Neat_config1.yml",
    "Neat_config2.yml",
    "Neat_config3.yml",
    "Neat_config4.yml",
    "Neat_config5.yml",
    "Neat_config6.yml",
    "Neat_config7.yml",
];

/// Custom links with the tagged read result.
pub async fn fetch_custom_links(gateway: &RepoGateway) -> Lookup<Vec<CustomLinkEntry>> {
    fetch_document(gateway, LINKS_PATH).await
}

/// Custom links, or an empty list when they cannot be read.
pub async fn load_custom_links(gateway: &RepoGateway) -> Vec<CustomLinkEntry> {
    fetch_custom_links(gateway).await.unwrap_or_default()
}

/// Replace `clash/link.json` with `links`.
pub async fn save_custom_links(
    gateway: &RepoGateway,
    session: &AdminSession,
    links: &[CustomLinkEntry],
) -> Result<CommitResult, GatewayError> {
    let message = format!("Update links {}", chrono::Utc::now().timestamp_millis());
    save_document(gateway, session, LINKS_PATH, links, &message).await
}

/// Sources with the tagged read result.
pub async fn fetch_sources(gateway: &RepoGateway) -> Lookup<Vec<SourceEntry>> {
    fetch_document(gateway, SOURCES_PATH).await
}

/// Sources, or an empty list when they cannot be read.
pub async fn load_sources(gateway: &RepoGateway) -> Vec<SourceEntry> {
    fetch_sources(gateway).await.unwrap_or_default()
}

/// Replace `clash/sources.json` with `sources`.
pub async fn save_sources(
    gateway: &RepoGateway,
    session: &AdminSession,
    sources: &[SourceEntry],
) -> Result<CommitResult, GatewayError> {
    let message = format!("Update sources.json {}", chrono::Utc::now().timestamp_millis());
    save_document(gateway, session, SOURCES_PATH, sources, &message).await
}

async fn fetch_document<T: DeserializeOwned + Send>(
    gateway: &RepoGateway,
    path: &str,
) -> Lookup<Vec<T>> {
    if !gateway.config().has_repository() {
        return Lookup::Absent;
    }

    let strategies = vec![
        Strategy::new("raw mirror", move || {
            async move {
                let text = gateway.raw_text(path).await?;
                serde_json::from_str::<Vec<T>>(&text)
                    .map(Lookup::Found)
                    .map_err(|e| format!("malformed document: {e}"))
            }
            .boxed()
        }),
        Strategy::new("contents API", move || {
            async move {
                Ok(match gateway.get_file(path).await {
                    Lookup::Found(file) => Lookup::Found(parse_document(path, &file.content)),
                    Lookup::Absent => Lookup::Absent,
                    Lookup::Indeterminate => Lookup::Indeterminate,
                })
            }
            .boxed()
        }),
    ];

    try_in_order(strategies)
        .await
        .unwrap_or(Lookup::Indeterminate)
}

/// Parse a document, failing closed to an empty list.
fn parse_document<T: DeserializeOwned>(path: &str, content: &str) -> Vec<T> {
    if content.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str(content).unwrap_or_else(|e| {
        tracing::warn!(path, error = %e, "Malformed document, treating as empty");
        Vec::new()
    })
}

async fn save_document<T: Serialize + ?Sized>(
    gateway: &RepoGateway,
    _session: &AdminSession,
    path: &str,
    document: &T,
    message: &str,
) -> Result<CommitResult, GatewayError> {
    gateway.config().require_writable()?;

    let sha = match gateway.get_file(path).await {
        Lookup::Found(file) => Some(file.sha),
        Lookup::Absent => None,
        // Writing without a sha here could clobber or fail; refuse instead.
        Lookup::Indeterminate => {
            return Err(GatewayError::Indeterminate {
                path: path.to_string(),
            });
        }
    };

    let body = serde_json::to_string_pretty(document)
        .map_err(|e| GatewayError::decode(e.to_string()))?;
    gateway.put_file(path, &body, message, sha.as_deref()).await
}

/// Check which candidate mirror files exist on the raw static mirror.
///
/// Used only when directory listing is unavailable. Requests run
/// concurrently; results keep candidate order and carry no sha.
pub async fn probe_known_files(gateway: &RepoGateway, candidates: &[&str]) -> Vec<RepoFileDescriptor> {
    if !gateway.config().has_repository() {
        return Vec::new();
    }

    let probes = candidates.iter().map(|name| async move {
        let path = format!("{MIRROR_DIR}/{name}");
        let url = gateway.raw_url(&path);
        match gateway.transport().send(HttpRequest::head(url.clone())).await {
            Ok(response) if response.is_success() => Some(RepoFileDescriptor {
                name: (*name).to_string(),
                path,
                sha: String::new(),
                size: 0,
                entry_type: EntryType::File,
                download_url: Some(url),
                html_url: None,
            }),
            Ok(_) | Err(_) => None,
        }
    });

    let found: Vec<RepoFileDescriptor> = join_all(probes).await.into_iter().flatten().collect();
    tracing::debug!(found = found.len(), candidates = candidates.len(), "Probed mirror files");
    found
}
