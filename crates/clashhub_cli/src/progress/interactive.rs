use std::sync::Mutex;
use std::time::Duration;

use clashhub::sync::{SyncPhase, SyncProgress};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

#[derive(Default)]
struct ProgressState {
    /// Spinner showing the current phase.
    status: Option<ProgressBar>,
    /// Bar counting sources handled.
    publish_bar: Option<ProgressBar>,
}

/// Spinner for the current phase plus a bar counting published mirrors.
pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(ProgressState::default()),
        }
    }

    /// A reporter that draws nothing.
    #[cfg(test)]
    pub fn hidden() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()),
            state: Mutex::new(ProgressState::default()),
        }
    }

    pub fn handle(&self, event: SyncProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            SyncProgress::Phase { phase } => {
                let status = state.status.get_or_insert_with(|| {
                    let bar = self.multi.add(ProgressBar::new_spinner());
                    bar.set_style(Self::spinner_style());
                    bar.set_prefix(format!("{:10}", "sync"));
                    bar.enable_steady_tick(Duration::from_millis(100));
                    bar
                });
                match phase {
                    SyncPhase::Done => status.finish_with_message(style("done").green().to_string()),
                    SyncPhase::Failed => {
                        status.abandon_with_message(style("failed").red().to_string());
                    }
                    other => status.set_message(format!("{}...", other.as_str())),
                }
            }

            SyncProgress::DocumentSaved { path } => {
                self.println(format!("{} saved {}", style("✓").green(), path));
            }

            SyncProgress::FetchingSource { number, total, url } => {
                let bar = state.publish_bar.get_or_insert_with(|| {
                    let bar = self.multi.add(ProgressBar::new(total as u64));
                    bar.set_style(Self::bar_style());
                    bar.set_prefix(format!("{:10}", "publish"));
                    bar
                });
                bar.set_message(format!("{number}/{total} {url}"));
            }

            SyncProgress::Published { path, created } => {
                if let Some(ref bar) = state.publish_bar {
                    bar.inc(1);
                }
                let verb = if created { "created" } else { "updated" };
                self.println(format!("{} {verb} {path}", style("✓").green()));
            }

            SyncProgress::SourceFailed { url, error } => {
                if let Some(ref bar) = state.publish_bar {
                    bar.inc(1);
                }
                self.println(format!("{} {url}: {error}", style("✗").red()));
            }

            SyncProgress::Deleted { path } => {
                self.println(format!("{} removed {path}", style("-").yellow()));
            }

            SyncProgress::DeleteFailed { path, error } => {
                self.println(format!("{} could not remove {path}: {error}", style("✗").red()));
            }

            SyncProgress::Warning { message } => {
                self.println(format!("{} {message}", style("!").yellow()));
            }

            SyncProgress::Completed {
                published,
                failed,
                deleted,
            } => {
                if let Some(ref bar) = state.publish_bar {
                    bar.finish_with_message(format!(
                        "{published} published, {failed} failed, {deleted} removed"
                    ));
                }
            }

            _ => {}
        }
    }

    pub fn finish(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for bar in [&state.status, &state.publish_bar].into_iter().flatten() {
            if !bar.is_finished() {
                bar.finish();
            }
        }
    }

    fn println(&self, line: String) {
        self.multi.println(line).ok();
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}/{len:3} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
