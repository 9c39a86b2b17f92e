//! Progress events emitted while a sync runs.

/// Stage of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Validating,
    SavingDocuments,
    Publishing,
    CleaningOrphans,
    Done,
    Failed,
}

impl SyncPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::SavingDocuments => "saving documents",
            Self::Publishing => "publishing",
            Self::CleaningOrphans => "cleaning orphans",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// Progress events emitted during a sync.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// Entered a new phase.
    Phase { phase: SyncPhase },

    /// A document was written to the repository.
    DocumentSaved { path: String },

    /// Starting to fetch one source.
    FetchingSource {
        /// 1-based position among publishable sources.
        number: usize,
        total: usize,
        url: String,
    },

    /// A mirror file was written.
    Published { path: String, created: bool },

    /// One source could not be fetched or written.
    SourceFailed { url: String, error: String },

    /// An orphaned mirror file was deleted.
    Deleted { path: String },

    /// An orphaned mirror file could not be deleted.
    DeleteFailed { path: String, error: String },

    /// Something degraded but the run goes on.
    Warning { message: String },

    /// The run finished; per-item failures are counted, not fatal.
    Completed {
        published: usize,
        failed: usize,
        deleted: usize,
    },
}

/// Callback for progress updates during a sync.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Forward `event` to `on_progress`, if any.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
