use std::error::Error;
use std::sync::Arc;

use clashhub::{SyncEngine, SyncRequest};
use console::{Term, style};

use crate::commands::shared::{AppContext, notify};
use crate::progress::ProgressReporter;

pub(crate) async fn handle_sync(
    ctx: AppContext,
    password: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let session = crate::commands::shared::unlock(&ctx.config, password)?;
    let is_tty = Term::stdout().is_term();

    let documents = ctx.documents().await;
    let request = SyncRequest {
        sources: documents.sources,
        links: documents.links,
    };
    if is_tty {
        println!(
            "Syncing {} sources and {} links to {}\n",
            request.sources.len(),
            request.links.len(),
            ctx.gateway.config().full_name()
        );
    }

    let engine = SyncEngine::new(ctx.gateway.clone(), ctx.fetcher.clone(), Arc::clone(&ctx.store));
    let reporter = Arc::new(ProgressReporter::new());
    let callback = reporter.as_callback();

    let result = engine.save_and_sync(&session, request, Some(&callback)).await;
    reporter.finish();
    let report = result?;

    if is_tty {
        println!();
        for line in &report.log {
            println!("{}", style(line).dim());
        }
        println!();
    }

    let summary = format!(
        "{} published, {} failed, {} removed",
        report.published.len(),
        report.failures.len(),
        report.deleted.len()
    );
    if report.is_clean() {
        notify(&format!("Sync complete: {summary}"));
    } else {
        notify(&format!("Sync completed with errors: {summary}"));
        for failure in &report.failures {
            notify(&format!("  - {} ({}): {}", failure.path, failure.url, failure.error));
        }
        for path in &report.delete_failures {
            notify(&format!("  - could not remove {path}"));
        }
    }

    Ok(())
}
