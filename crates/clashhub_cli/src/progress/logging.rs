use clashhub::sync::SyncProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: SyncProgress) {
        match event {
            // The engine logs the fatal error itself, with its cause.
            SyncProgress::Phase { phase } => {
                tracing::debug!(phase = phase.as_str(), "Sync phase");
            }

            SyncProgress::DocumentSaved { path } => {
                tracing::info!(path = %path, "Saved document");
            }

            SyncProgress::FetchingSource { number, total, url } => {
                tracing::info!(number, total, url = %url, "Fetching source");
            }

            SyncProgress::Published { path, created } => {
                tracing::info!(path = %path, created, "Published mirror");
            }

            SyncProgress::SourceFailed { url, error } => {
                tracing::warn!(url = %url, error = %error, "Failed to mirror source");
            }

            SyncProgress::Deleted { path } => {
                tracing::info!(path = %path, "Removed orphaned mirror");
            }

            SyncProgress::DeleteFailed { path, error } => {
                tracing::warn!(path = %path, error = %error, "Failed to remove orphaned mirror");
            }

            SyncProgress::Warning { message } => {
                tracing::warn!(message = %message, "Warning");
            }

            SyncProgress::Completed {
                published,
                failed,
                deleted,
            } => {
                tracing::info!(published, failed, deleted, "Sync complete");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
