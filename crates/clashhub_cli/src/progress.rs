//! Progress reporting for sync runs.
//!
//! On a terminal the run is drawn with indicatif; anywhere else each event
//! becomes a tracing record.

mod interactive;
mod logging;

use std::sync::Arc;

use clashhub::sync::{ProgressCallback, SyncProgress};
use console::Term;

pub use interactive::InteractiveReporter;
pub use logging::LoggingReporter;

/// Renders [`SyncProgress`] events for whichever output we are attached to.
pub enum ProgressReporter {
    Interactive(InteractiveReporter),
    /// CI, pipes and redirected output.
    Logging(LoggingReporter),
}

impl ProgressReporter {
    /// Pick the mode from whether stdout is a terminal.
    pub fn new() -> Self {
        if Term::stdout().is_term() {
            Self::Interactive(InteractiveReporter::new())
        } else {
            Self::Logging(LoggingReporter::new())
        }
    }

    pub fn handle(&self, event: SyncProgress) {
        match self {
            Self::Interactive(bars) => bars.handle(event),
            Self::Logging(log) => log.handle(event),
        }
    }

    /// Callback to hand to [`clashhub::SyncEngine::save_and_sync`].
    pub fn as_callback(self: &Arc<Self>) -> ProgressCallback {
        let reporter = Arc::clone(self);
        Box::new(move |event| {
            reporter.handle(event);
        })
    }

    /// Clear any bars still on screen. No-op when logging.
    pub fn finish(&self) {
        if let Self::Interactive(bars) = self {
            bars.finish();
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
