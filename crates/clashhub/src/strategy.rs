//! Ordered fallback chains.
//!
//! Every resilient read in the crate (remote content, directory listing,
//! document loading) is expressed as a list of attempts tried one after the
//! other until the first success. Attempts are lazy: later strategies are
//! never started once an earlier one succeeds.

use futures::future::BoxFuture;
use thiserror::Error;

/// Future produced by a single attempt.
pub type AttemptFuture<'a, T> = BoxFuture<'a, Result<T, String>>;

/// A named, lazily started attempt.
pub struct Strategy<'a, T> {
    label: String,
    run: Box<dyn FnOnce() -> AttemptFuture<'a, T> + Send + 'a>,
}

impl<'a, T> Strategy<'a, T> {
    pub fn new<F>(label: impl Into<String>, run: F) -> Self
    where
        F: FnOnce() -> AttemptFuture<'a, T> + Send + 'a,
    {
        Self {
            label: label.into(),
            run: Box::new(run),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Why a single strategy failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub label: String,
    pub reason: String,
}

/// Every strategy in the chain failed.
#[derive(Debug, Error)]
#[error("all {} strategies failed", .failures.len())]
pub struct Exhausted {
    pub failures: Vec<AttemptFailure>,
}

/// Run `strategies` in order and return the first success.
pub async fn try_in_order<T>(strategies: Vec<Strategy<'_, T>>) -> Result<T, Exhausted> {
    let mut failures = Vec::with_capacity(strategies.len());

    for strategy in strategies {
        let Strategy { label, run } = strategy;
        match run().await {
            Ok(value) => {
                if !failures.is_empty() {
                    tracing::debug!(strategy = %label, "Fallback strategy succeeded");
                }
                return Ok(value);
            }
            Err(reason) => {
                tracing::debug!(strategy = %label, reason = %reason, "Strategy failed");
                failures.push(AttemptFailure { label, reason });
            }
        }
    }

    Err(Exhausted { failures })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::FutureExt;

    use super::*;

    fn counted(
        calls: &Arc<AtomicUsize>,
        label: &str,
        outcome: Result<u32, &'static str>,
    ) -> Strategy<'static, u32> {
        let calls = Arc::clone(calls);
        Strategy::new(label, move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                outcome.map_err(str::to_string)
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn returns_first_success_without_running_later_strategies() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = try_in_order(vec![
            counted(&calls, "direct", Err("blocked")),
            counted(&calls, "relay", Ok(7)),
            counted(&calls, "never", Ok(9)),
        ])
        .await
        .expect("relay should succeed");

        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn collects_every_failure_when_exhausted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let err = try_in_order(vec![
            counted(&calls, "direct", Err("403")),
            counted(&calls, "relay", Err("timeout")),
        ])
        .await
        .expect_err("all strategies fail");

        assert_eq!(err.to_string(), "all 2 strategies failed");
        assert_eq!(
            err.failures,
            vec![
                AttemptFailure {
                    label: "direct".to_string(),
                    reason: "403".to_string()
                },
                AttemptFailure {
                    label: "relay".to_string(),
                    reason: "timeout".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn empty_chain_is_exhausted() {
        let err = try_in_order::<u32>(Vec::new())
            .await
            .expect_err("nothing to try");
        assert!(err.failures.is_empty());
    }
}
