//! Save & Sync: publish the documents, mirror every source, remove orphans.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::cache::{KeyValueStore, LINKS_KEY, SOURCES_KEY, set_local_only, store_json};
use crate::documents::{save_custom_links, save_sources};
use crate::error::{GatewayError, SyncError};
use crate::fetcher::RemoteFetcher;
use crate::github::RepoGateway;
use crate::model::{
    LINKS_PATH, Lookup, MIRROR_DIR, RepoFileDescriptor, SOURCES_PATH, SourceEntry, mirror_filename,
    mirror_path, publishable_sources,
};
use crate::session::AdminSession;

use super::progress::{ProgressCallback, SyncPhase, SyncProgress, emit};
use super::types::{SourceFailure, SyncReport, SyncRequest};

/// Runs admin-triggered syncs against one repository.
///
/// At most one sync runs at a time per engine; a second call while one is
/// in flight fails with [`SyncError::AlreadyRunning`].
pub struct SyncEngine {
    gateway: RepoGateway,
    fetcher: RemoteFetcher,
    store: Arc<dyn KeyValueStore>,
    running: AtomicBool,
}

/// Clears the running flag when the sync ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum Published {
    Created,
    Updated,
}

impl SyncEngine {
    pub fn new(gateway: RepoGateway, fetcher: RemoteFetcher, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            gateway,
            fetcher,
            store,
            running: AtomicBool::new(false),
        }
    }

    pub fn gateway(&self) -> &RepoGateway {
        &self.gateway
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Save both documents, mirror each publishable source as
    /// `clash/Neat_config{n}.yml`, then delete mirrors numbered above the
    /// source count.
    ///
    /// Failures of individual sources or deletions are logged in the report
    /// and do not stop the run. Failing to save either document is fatal.
    pub async fn save_and_sync(
        &self,
        session: &AdminSession,
        request: SyncRequest,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<SyncReport, SyncError> {
        emit(on_progress, SyncProgress::Phase { phase: SyncPhase::Validating });
        if let Err(e) = self.gateway.config().require_writable() {
            emit(on_progress, SyncProgress::Phase { phase: SyncPhase::Failed });
            return Err(match e {
                GatewayError::ConfigIncomplete { missing } => SyncError::ConfigIncomplete { missing },
                other => SyncError::Fatal {
                    message: other.to_string(),
                },
            });
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SyncError::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);

        let mut report = SyncReport::default();
        report.log(format!("Starting sync to {}", self.gateway.config().full_name()));

        let result = self.run(session, &request, &mut report, on_progress).await;
        match result {
            Ok(()) => {
                report.log(format!(
                    "Sync complete: {} published, {} failed, {} removed",
                    report.published.len(),
                    report.failures.len(),
                    report.deleted.len()
                ));
                emit(
                    on_progress,
                    SyncProgress::Completed {
                        published: report.published.len(),
                        failed: report.failures.len(),
                        deleted: report.deleted.len(),
                    },
                );
                emit(on_progress, SyncProgress::Phase { phase: SyncPhase::Done });
                Ok(report)
            }
            Err(e) => {
                report.log(format!("Fatal: {e}"));
                tracing::error!(error = %e, "Sync failed");
                emit(on_progress, SyncProgress::Phase { phase: SyncPhase::Failed });
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        session: &AdminSession,
        request: &SyncRequest,
        report: &mut SyncReport,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<(), SyncError> {
        emit(on_progress, SyncProgress::Phase { phase: SyncPhase::SavingDocuments });
        self.cache_documents(request)?;

        report.log("Saving link.json");
        let saved = save_custom_links(&self.gateway, session, &request.links).await;
        self.settle_document(LINKS_KEY, LINKS_PATH, saved)?;
        emit(on_progress, SyncProgress::DocumentSaved { path: LINKS_PATH.to_string() });

        report.log("Saving sources.json");
        let saved = save_sources(&self.gateway, session, &request.sources).await;
        self.settle_document(SOURCES_KEY, SOURCES_PATH, saved)?;
        emit(on_progress, SyncProgress::DocumentSaved { path: SOURCES_PATH.to_string() });

        emit(on_progress, SyncProgress::Phase { phase: SyncPhase::Publishing });
        let publishable = publishable_sources(&request.sources);
        self.publish_all(&publishable, report, on_progress).await;

        emit(on_progress, SyncProgress::Phase { phase: SyncPhase::CleaningOrphans });
        self.clean_orphans(publishable.len(), report, on_progress).await;

        Ok(())
    }

    // The cache is written before the remote, and both documents stay
    // local-only until saved, so edits survive a failed sync.
    fn cache_documents(&self, request: &SyncRequest) -> Result<(), SyncError> {
        let fatal = |e: crate::cache::CacheError| SyncError::Fatal {
            message: e.to_string(),
        };
        let store = self.store.as_ref();
        store_json(store, SOURCES_KEY, &request.sources).map_err(fatal)?;
        store_json(store, LINKS_KEY, &request.links).map_err(fatal)?;
        set_local_only(store, SOURCES_KEY, true).map_err(fatal)?;
        set_local_only(store, LINKS_KEY, true).map_err(fatal)?;
        Ok(())
    }

    // Clears the local-only marker once the repository has the document.
    fn settle_document<T>(
        &self,
        key: &str,
        path: &str,
        saved: Result<T, GatewayError>,
    ) -> Result<(), SyncError> {
        saved.map_err(|source| SyncError::Document {
            path: path.to_string(),
            source,
        })?;
        if let Err(e) = set_local_only(self.store.as_ref(), key, false) {
            tracing::warn!(key, error = %e, "Failed to clear local-only marker");
        }
        Ok(())
    }

    async fn publish_all(
        &self,
        sources: &[SourceEntry],
        report: &mut SyncReport,
        on_progress: Option<&ProgressCallback>,
    ) {
        let listing = self.gateway.get_directory(MIRROR_DIR).await;
        let shas: Option<HashMap<String, String>> = match listing {
            Lookup::Found(entries) => Some(
                entries
                    .into_iter()
                    .filter(RepoFileDescriptor::is_file)
                    .map(|entry| (entry.name, entry.sha))
                    .collect(),
            ),
            // No clash/ directory yet: every mirror is new.
            Lookup::Absent => Some(HashMap::new()),
            Lookup::Indeterminate => {
                let message = "Could not list existing mirrors, reading each file before writing";
                report.log(message);
                emit(on_progress, SyncProgress::Warning { message: message.to_string() });
                None
            }
        };

        let total = sources.len();
        report.log(format!("Publishing {total} sources"));
        for (index, source) in sources.iter().enumerate() {
            let url = source.as_str().trim();
            let path = mirror_path(index);
            report.log(format!("Fetching {}/{}: {}", index + 1, total, url));
            emit(
                on_progress,
                SyncProgress::FetchingSource {
                    number: index + 1,
                    total,
                    url: url.to_string(),
                },
            );

            match self.publish_one(index, url, shas.as_ref()).await {
                Ok(published) => {
                    let created = matches!(published, Published::Created);
                    report.log(format!(
                        "{} {path}",
                        if created { "Created" } else { "Updated" }
                    ));
                    report.published.push(path.clone());
                    emit(on_progress, SyncProgress::Published { path, created });
                }
                Err(error) => {
                    report.log(format!("Failed {path}: {error}"));
                    emit(
                        on_progress,
                        SyncProgress::SourceFailed {
                            url: url.to_string(),
                            error: error.clone(),
                        },
                    );
                    report.failures.push(SourceFailure {
                        path,
                        url: url.to_string(),
                        error,
                    });
                }
            }
        }
    }

    async fn publish_one(
        &self,
        index: usize,
        url: &str,
        shas: Option<&HashMap<String, String>>,
    ) -> Result<Published, String> {
        let content = self
            .fetcher
            .fetch_raw_content(url)
            .await
            .map_err(|e| e.to_string())?;

        let path = mirror_path(index);
        let sha = match shas {
            Some(shas) => shas.get(&mirror_filename(index)).cloned(),
            None => match self.gateway.get_file(&path).await {
                Lookup::Found(file) => Some(file.sha),
                Lookup::Absent => None,
                Lookup::Indeterminate => {
                    return Err(GatewayError::Indeterminate { path }.to_string());
                }
            },
        };

        let message = format!("Update {}", mirror_filename(index));
        let created = sha.is_none();
        self.gateway
            .put_file(&path, &content, &message, sha.as_deref())
            .await
            .map_err(|e| e.to_string())?;
        Ok(if created {
            Published::Created
        } else {
            Published::Updated
        })
    }

    async fn clean_orphans(
        &self,
        keep: usize,
        report: &mut SyncReport,
        on_progress: Option<&ProgressCallback>,
    ) {
        let entries = match self.gateway.get_directory(MIRROR_DIR).await {
            Lookup::Found(entries) => entries,
            Lookup::Absent | Lookup::Indeterminate => {
                let message = "Could not list mirrors, skipping cleanup".to_string();
                report.log(message.clone());
                emit(on_progress, SyncProgress::Warning { message });
                return;
            }
        };

        let mut orphans: Vec<(usize, RepoFileDescriptor)> = entries
            .into_iter()
            .filter(RepoFileDescriptor::is_file)
            .filter_map(|entry| entry.mirror_suffix().map(|n| (n, entry)))
            .filter(|(n, _)| *n > keep)
            .collect();
        orphans.sort_by_key(|(n, _)| *n);

        if orphans.is_empty() {
            tracing::debug!(keep, "No orphaned mirrors");
            return;
        }
        report.log(format!("Removing {} orphaned mirrors", orphans.len()));

        for (_, orphan) in orphans {
            match self.gateway.delete_file(&orphan.path, &orphan.sha).await {
                Ok(_) => {
                    report.log(format!("Deleted {}", orphan.path));
                    emit(on_progress, SyncProgress::Deleted { path: orphan.path.clone() });
                    report.deleted.push(orphan.path);
                }
                Err(e) => {
                    report.log(format!("Failed to delete {}: {e}", orphan.path));
                    emit(
                        on_progress,
                        SyncProgress::DeleteFailed {
                            path: orphan.path.clone(),
                            error: e.to_string(),
                        },
                    );
                    report.delete_failures.push(orphan.path);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cache::{MemoryStore, is_local_only, load_json};
    use crate::config::RepositoryConfig;
    use crate::http::{HttpMethod, MockTransport};
    use crate::model::CustomLinkEntry;

    const API: &str = "https://api.github.com/repos/me/mirror/contents";

    fn engine(config: RepositoryConfig, transport: &MockTransport) -> SyncEngine {
        engine_with_store(config, transport, Arc::new(MemoryStore::new()))
    }

    fn engine_with_store(
        config: RepositoryConfig,
        transport: &MockTransport,
        store: Arc<MemoryStore>,
    ) -> SyncEngine {
        let transport = Arc::new(transport.clone());
        SyncEngine::new(
            RepoGateway::new(config, transport.clone()),
            RemoteFetcher::new(transport),
            store,
        )
    }

    fn request() -> SyncRequest {
        SyncRequest {
            sources: vec![SourceEntry::new("https://a.test/x.yaml")],
            links: vec![CustomLinkEntry {
                name: "Docs".to_string(),
                url: "https://docs.test".to_string(),
                ..CustomLinkEntry::draft()
            }],
        }
    }

    #[tokio::test]
    async fn documents_are_cached_even_when_saving_fails() {
        let transport = MockTransport::new();
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with_store(
            RepositoryConfig::new("me", "mirror").with_token("t"),
            &transport,
            Arc::clone(&store),
        );
        let request = request();

        let err = engine
            .save_and_sync(&AdminSession::for_tests(), request.clone(), None)
            .await
            .expect_err("nothing routed, link.json cannot be saved");

        assert!(matches!(err, SyncError::Document { .. }));
        assert_eq!(load_json::<Vec<SourceEntry>>(store.as_ref(), SOURCES_KEY), Some(request.sources));
        assert_eq!(load_json::<Vec<CustomLinkEntry>>(store.as_ref(), LINKS_KEY), Some(request.links));
        assert!(is_local_only(store.as_ref(), LINKS_KEY));
        assert!(is_local_only(store.as_ref(), SOURCES_KEY), "never attempted, still unpublished");
    }

    #[tokio::test]
    async fn saved_document_is_no_longer_local_only() {
        let transport = MockTransport::new();
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with_store(
            RepositoryConfig::new("me", "mirror").with_token("t"),
            &transport,
            Arc::clone(&store),
        );
        let commit = json!({"content": null, "commit": {"sha": "c"}});
        transport.push_json(HttpMethod::Get, format!("{API}/clash/link.json"), 404, &json!({}));
        transport.push_json(HttpMethod::Put, format!("{API}/clash/link.json"), 201, &commit);
        transport.push_json(HttpMethod::Get, format!("{API}/clash/sources.json"), 404, &json!({}));
        transport.push_json(HttpMethod::Put, format!("{API}/clash/sources.json"), 401, &json!({"message": "Bad credentials"}));

        let err = engine
            .save_and_sync(&AdminSession::for_tests(), request(), None)
            .await
            .expect_err("sources.json rejected");

        assert!(matches!(err, SyncError::Document { ref path, .. } if path == SOURCES_PATH));
        assert!(!is_local_only(store.as_ref(), LINKS_KEY));
        assert!(is_local_only(store.as_ref(), SOURCES_KEY));
    }

    #[tokio::test]
    async fn second_sync_while_running_is_rejected() {
        let transport = MockTransport::new();
        let engine = engine(RepositoryConfig::new("me", "mirror").with_token("t"), &transport);
        engine.running.store(true, Ordering::Release);

        let err = engine
            .save_and_sync(&AdminSession::for_tests(), SyncRequest::default(), None)
            .await
            .expect_err("already running");

        assert!(matches!(err, SyncError::AlreadyRunning));
        assert!(transport.requests().is_empty());
        assert!(engine.is_running(), "rejected call must not clear the flag");
    }

    #[tokio::test]
    async fn running_flag_is_cleared_after_failure() {
        let transport = MockTransport::new();
        let engine = engine(RepositoryConfig::new("me", "mirror").with_token("t"), &transport);

        // Nothing registered: reading link.json is indeterminate, so saving fails.
        let err = engine
            .save_and_sync(&AdminSession::for_tests(), SyncRequest::default(), None)
            .await
            .expect_err("document save fails");

        assert!(matches!(err, SyncError::Document { ref path, .. } if path == LINKS_PATH));
        assert!(!engine.is_running());
    }
}
