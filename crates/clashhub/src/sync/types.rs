//! Inputs and results of a sync run.

use std::fmt;

use chrono::{DateTime, Local};

use crate::model::{CustomLinkEntry, SourceEntry};

/// The edited documents a sync publishes.
#[derive(Debug, Clone, Default)]
pub struct SyncRequest {
    pub sources: Vec<SourceEntry>,
    pub links: Vec<CustomLinkEntry>,
}

/// One timestamped line of the sync log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub at: DateTime<Local>,
    pub message: String,
}

impl LogLine {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            at: Local::now(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.message)
    }
}

/// A source that could not be mirrored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub path: String,
    pub url: String,
    pub error: String,
}

/// Result of a completed sync.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub log: Vec<LogLine>,
    /// Mirror paths written, in source order.
    pub published: Vec<String>,
    pub failures: Vec<SourceFailure>,
    /// Orphaned mirror paths removed.
    pub deleted: Vec<String>,
    /// Orphaned mirror paths that could not be removed.
    pub delete_failures: Vec<String>,
}

impl SyncReport {
    /// Record a timestamped line. Tracing output comes from progress events.
    pub(crate) fn log(&mut self, message: impl Into<String>) {
        self.log.push(LogLine::now(message));
    }

    /// Whether every source was published and every orphan removed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.delete_failures.is_empty()
    }
}
