//! The visitor read path and cache reconciliation.
//!
//! Subscription files come from the directory listing when it is reachable,
//! then from probing guessed filenames on the raw mirror, then from the last
//! good listing in the local cache.

use crate::cache::{
    FILES_KEY, KeyValueStore, LINKS_KEY, SOURCES_KEY, is_local_only, load_json, store_json,
};
use crate::documents::{DEFAULT_PROBE_CANDIDATES, fetch_custom_links, fetch_sources, probe_known_files};
use crate::github::RepoGateway;
use crate::model::{CustomLinkEntry, Lookup, MIRROR_DIR, RepoFileDescriptor, SourceEntry};

/// Where the subscription list of a [`PublicView`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewOrigin {
    Listing,
    Probe,
    Cache,
    /// Nothing could be found anywhere.
    Unavailable,
}

impl ViewOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Probe => "probe",
            Self::Cache => "cache",
            Self::Unavailable => "unavailable",
        }
    }
}

/// A subscription file with the URL visitors copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedFile {
    pub file: RepoFileDescriptor,
    pub public_url: String,
}

/// Everything the public page shows.
#[derive(Debug, Clone)]
pub struct PublicView {
    pub files: Vec<PublishedFile>,
    pub links: Vec<CustomLinkEntry>,
    pub origin: ViewOrigin,
}

/// Both documents after reconciling the cache with the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Documents {
    pub sources: Vec<SourceEntry>,
    pub links: Vec<CustomLinkEntry>,
}

/// Hydrate both documents from the cache, then let the repository win.
///
/// A found document replaces the cached one, an absent document replaces it
/// with an empty list, and an indeterminate read keeps the cache. A document
/// marked local-only is not read from the repository at all: the cached copy
/// holds an edit that still has to be published.
pub async fn reconcile_documents(gateway: &RepoGateway, store: &dyn KeyValueStore) -> Documents {
    let cached_sources: Vec<SourceEntry> = load_json(store, SOURCES_KEY).unwrap_or_default();
    let cached_links: Vec<CustomLinkEntry> = load_json(store, LINKS_KEY).unwrap_or_default();
    let sources_local = is_local_only(store, SOURCES_KEY);
    let links_local = is_local_only(store, LINKS_KEY);

    let (remote_sources, remote_links) = futures::join!(
        async {
            if sources_local {
                None
            } else {
                Some(fetch_sources(gateway).await)
            }
        },
        async {
            if links_local {
                None
            } else {
                Some(fetch_custom_links(gateway).await)
            }
        }
    );

    Documents {
        sources: prefer_remote(store, SOURCES_KEY, remote_sources, cached_sources),
        links: prefer_remote(store, LINKS_KEY, remote_links, cached_links),
    }
}

fn prefer_remote<T: serde::Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    remote: Option<Lookup<Vec<T>>>,
    cached: Vec<T>,
) -> Vec<T> {
    let Some(remote) = remote else {
        tracing::debug!(key, "Cached document has unpublished edits, not reading repository");
        return cached;
    };
    let value = match remote {
        Lookup::Found(value) => value,
        Lookup::Absent => Vec::new(),
        Lookup::Indeterminate => {
            tracing::debug!(key, "Repository unreachable, keeping cached document");
            return cached;
        }
    };
    if let Err(e) = store_json(store, key, &value) {
        tracing::warn!(key, error = %e, "Failed to update cache");
    }
    value
}

/// List the published subscription files, falling back to probing and then
/// to the cached listing.
pub async fn load_subscription_files(
    gateway: &RepoGateway,
    store: &dyn KeyValueStore,
) -> (Vec<RepoFileDescriptor>, ViewOrigin) {
    let listed = match gateway.get_directory(MIRROR_DIR).await {
        Lookup::Found(entries) => entries
            .into_iter()
            .filter(RepoFileDescriptor::is_subscription)
            .collect(),
        Lookup::Absent | Lookup::Indeterminate => Vec::new(),
    };
    if !listed.is_empty() {
        return (remember(store, listed), ViewOrigin::Listing);
    }

    let probed = probe_known_files(gateway, &DEFAULT_PROBE_CANDIDATES).await;
    if !probed.is_empty() {
        tracing::info!(found = probed.len(), "Directory listing unavailable, using probed files");
        return (remember(store, probed), ViewOrigin::Probe);
    }

    match load_json::<Vec<RepoFileDescriptor>>(store, FILES_KEY) {
        Some(cached) if !cached.is_empty() => {
            tracing::info!(count = cached.len(), "Showing cached subscription list");
            (sorted(cached), ViewOrigin::Cache)
        }
        _ => (Vec::new(), ViewOrigin::Unavailable),
    }
}

fn remember(store: &dyn KeyValueStore, files: Vec<RepoFileDescriptor>) -> Vec<RepoFileDescriptor> {
    let files = sorted(files);
    if let Err(e) = store_json(store, FILES_KEY, &files) {
        tracing::warn!(error = %e, "Failed to cache subscription list");
    }
    files
}

// Numeric order, so Neat_config10 follows Neat_config9.
fn sorted(mut files: Vec<RepoFileDescriptor>) -> Vec<RepoFileDescriptor> {
    files.sort_by(|a, b| {
        let key = |f: &RepoFileDescriptor| f.mirror_suffix().unwrap_or(usize::MAX);
        key(a).cmp(&key(b)).then_with(|| a.name.cmp(&b.name))
    });
    files
}

/// Assemble the public page.
pub async fn load_public_view(gateway: &RepoGateway, store: &dyn KeyValueStore) -> PublicView {
    let ((files, origin), documents) = futures::join!(
        load_subscription_files(gateway, store),
        reconcile_documents(gateway, store)
    );

    let config = gateway.config();
    PublicView {
        files: files
            .into_iter()
            .map(|file| PublishedFile {
                public_url: config.public_url(&file.path),
                file,
            })
            .collect(),
        links: documents.links,
        origin,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::cache::MemoryStore;
    use crate::config::RepositoryConfig;
    use crate::github::encode_content;
    use crate::http::{HttpMethod, HttpResponse, MockTransport};

    const DIR_URL: &str = "https://api.github.com/repos/me/mirror/contents/clash";
    const RAW: &str = "https://raw.githubusercontent.com/me/mirror/main/clash";

    fn gateway(transport: &MockTransport) -> RepoGateway {
        RepoGateway::new(
            RepositoryConfig::new("me", "mirror").with_display_domain("https://subs.example/"),
            Arc::new(transport.clone()),
        )
    }

    fn entry(name: &str) -> serde_json::Value {
        json!({"name": name, "path": format!("clash/{name}"), "sha": format!("sha-{name}"), "size": 1, "type": "file"})
    }

    #[tokio::test]
    async fn listing_is_filtered_sorted_and_cached() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            DIR_URL,
            200,
            &json!([entry("Neat_config10.yml"), entry("link.json"), entry("Neat_config2.yml")]),
        );
        let store = MemoryStore::new();

        let (files, origin) = load_subscription_files(&gateway(&transport), &store).await;

        assert_eq!(origin, ViewOrigin::Listing);
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Neat_config2.yml", "Neat_config10.yml"]);
        let cached: Vec<RepoFileDescriptor> = load_json(&store, FILES_KEY).expect("cached");
        assert_eq!(cached, files);
    }

    #[tokio::test]
    async fn probing_runs_when_listing_is_unavailable() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Head,
            format!("{RAW}/Neat_config1.yml"),
            HttpResponse::with_status(200, Vec::new()),
        );
        let store = MemoryStore::new();

        let (files, origin) = load_subscription_files(&gateway(&transport), &store).await;

        assert_eq!(origin, ViewOrigin::Probe);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "clash/Neat_config1.yml");
    }

    #[tokio::test]
    async fn cached_listing_is_last_resort() {
        let transport = MockTransport::new();
        let store = MemoryStore::new();
        let cached: Vec<RepoFileDescriptor> =
            serde_json::from_value(json!([entry("Neat_config1.yml")])).unwrap();
        store_json(&store, FILES_KEY, &cached).unwrap();

        let (files, origin) = load_subscription_files(&gateway(&transport), &store).await;
        assert_eq!(origin, ViewOrigin::Cache);
        assert_eq!(files, cached);

        let (files, origin) = load_subscription_files(&gateway(&transport), &MemoryStore::new()).await;
        assert_eq!(origin, ViewOrigin::Unavailable);
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn remote_documents_replace_cache_and_unreachable_keeps_it() {
        let transport = MockTransport::new();
        let store = MemoryStore::new();
        store_json(&store, SOURCES_KEY, &vec![SourceEntry::new("https://old/x")]).unwrap();
        store_json(&store, LINKS_KEY, &vec![CustomLinkEntry::draft()]).unwrap();

        transport.push_response(
            HttpMethod::Get,
            format!("{RAW}/sources.json"),
            HttpResponse::with_status(200, b"[\"https://new/x\"]".to_vec()),
        );
        // link.json: raw mirror and API both unreachable.

        let documents = reconcile_documents(&gateway(&transport), &store).await;

        assert_eq!(documents.sources, vec![SourceEntry::new("https://new/x")]);
        assert_eq!(documents.links.len(), 1, "cache kept for unreachable links");
        let cached: Vec<SourceEntry> = load_json(&store, SOURCES_KEY).unwrap();
        assert_eq!(cached, documents.sources);
    }

    #[tokio::test]
    async fn absent_remote_document_clears_cache() {
        let transport = MockTransport::new();
        let store = MemoryStore::new();
        store_json(&store, LINKS_KEY, &vec![CustomLinkEntry::draft()]).unwrap();
        transport.push_json(
            HttpMethod::Get,
            format!("{DIR_URL}/link.json"),
            404,
            &json!({"message": "Not Found"}),
        );
        transport.push_json(
            HttpMethod::Get,
            format!("{DIR_URL}/sources.json"),
            200,
            &json!({"sha": "s", "content": encode_content("[]"), "encoding": "base64"}),
        );

        let documents = reconcile_documents(&gateway(&transport), &store).await;

        assert!(documents.links.is_empty());
        assert!(documents.sources.is_empty());
        assert_eq!(load_json::<Vec<CustomLinkEntry>>(&store, LINKS_KEY), Some(Vec::new()));
    }

    #[tokio::test]
    async fn local_only_document_is_not_overwritten_by_remote() {
        let transport = MockTransport::new();
        let store = MemoryStore::new();
        let edited = vec![SourceEntry::new("https://a/x.yaml"), SourceEntry::new("https://b/y.yaml")];
        store_json(&store, SOURCES_KEY, &edited).unwrap();
        crate::cache::set_local_only(&store, SOURCES_KEY, true).unwrap();
        transport.push_response(
            HttpMethod::Get,
            format!("{RAW}/sources.json"),
            HttpResponse::with_status(200, b"[]".to_vec()),
        );
        transport.push_response(
            HttpMethod::Get,
            format!("{RAW}/link.json"),
            HttpResponse::with_status(200, b"[]".to_vec()),
        );

        let documents = reconcile_documents(&gateway(&transport), &store).await;

        assert_eq!(documents.sources, edited);
        assert_eq!(load_json::<Vec<SourceEntry>>(&store, SOURCES_KEY), Some(edited));
        let fetched: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
        assert!(fetched.iter().all(|url| !url.contains("sources.json")), "{fetched:?}");
        assert!(fetched.iter().any(|url| url.contains("link.json")));
    }

    #[tokio::test]
    async fn public_view_renders_urls_under_display_domain() {
        let transport = MockTransport::new();
        transport.push_json(HttpMethod::Get, DIR_URL, 200, &json!([entry("Neat_config1.yml")]));

        let view = load_public_view(&gateway(&transport), &MemoryStore::new()).await;

        assert_eq!(view.origin, ViewOrigin::Listing);
        assert_eq!(view.files[0].public_url, "https://subs.example/clash/Neat_config1.yml");
        assert!(view.links.is_empty());
    }
}
