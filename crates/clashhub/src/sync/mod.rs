//! Save & Sync orchestration.
//!
//! # Module Structure
//!
//! - [`types`] - `SyncRequest`, `SyncReport`, timestamped `LogLine`
//! - [`progress`] - Progress reporting: `SyncPhase`, `SyncProgress`, `ProgressCallback`, `emit()`
//! - [`engine`] - `SyncEngine::save_and_sync()`
//!
//! # Example
//!
//! ```ignore
//! use clashhub::sync::{SyncEngine, SyncRequest};
//!
//! let session = gate.unlock(&password)?;
//! let report = engine.save_and_sync(&session, SyncRequest { sources, links }, None).await?;
//! for line in &report.log {
//!     println!("{line}");
//! }
//! ```

mod engine;
mod progress;
mod types;

pub use engine::SyncEngine;
pub use progress::{ProgressCallback, SyncPhase, SyncProgress, emit};
pub use types::{LogLine, SourceFailure, SyncReport, SyncRequest};
