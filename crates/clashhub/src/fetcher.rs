//! Fetching third-party subscription documents.

use std::sync::Arc;

use futures::FutureExt;

use crate::error::{FetchError, short_error_message};
use crate::http::{HttpRequest, HttpTransport, cache_busted, encode_component};
use crate::strategy::{Strategy, try_in_order};

/// Relays tried, in order, after the direct request fails.
pub const DEFAULT_RELAYS: [&str; 2] = [
    "https://api.allorigins.win/raw?url=",
    "https://corsproxy.io/?",
];

/// Rewrite `github.com/<owner>/<repo>/blob/<ref>/<path>` into its raw form.
///
/// Any other URL is returned unchanged.
#[must_use]
pub fn normalize_blob_url(url: &str) -> String {
    if url.contains("github.com") && url.contains("/blob/") {
        url.replacen("github.com", "raw.githubusercontent.com", 1)
            .replacen("/blob/", "/", 1)
    } else {
        url.to_string()
    }
}

/// Downloads subscription text: direct first, then each relay once.
#[derive(Clone)]
pub struct RemoteFetcher {
    transport: Arc<dyn HttpTransport>,
    relays: Arc<Vec<String>>,
}

impl RemoteFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self::with_relays(transport, DEFAULT_RELAYS.iter().map(|r| r.to_string()).collect())
    }

    /// Use a custom relay list; each relay prefix is followed by the encoded URL.
    pub fn with_relays(transport: Arc<dyn HttpTransport>, relays: Vec<String>) -> Self {
        Self {
            transport,
            relays: Arc::new(relays),
        }
    }

    /// Fetch `url` as text.
    ///
    /// Relays are tried sequentially so the cheapest path wins; there is no
    /// retry beyond the relay list.
    pub async fn fetch_raw_content(&self, url: &str) -> Result<String, FetchError> {
        let target = normalize_blob_url(url);

        let mut strategies = Vec::with_capacity(self.relays.len() + 1);
        let direct = cache_busted(&target);
        strategies.push(Strategy::new("direct", move || self.get_text(direct).boxed()));
        for relay in self.relays.iter() {
            let relayed = format!("{relay}{}", encode_component(&target));
            strategies.push(Strategy::new(relay.clone(), move || {
                self.get_text(relayed).boxed()
            }));
        }

        let attempts = strategies.len();
        try_in_order(strategies).await.map_err(|exhausted| {
            tracing::warn!(
                url,
                attempts = exhausted.failures.len(),
                "Every fetch strategy failed"
            );
            FetchError::Unreachable {
                url: url.to_string(),
                attempts,
            }
        })
    }

    async fn get_text(&self, url: String) -> Result<String, String> {
        let response = self
            .transport
            .send(HttpRequest::get(url))
            .await
            .map_err(|e| short_error_message(&e))?;
        if response.is_success() {
            Ok(response.text())
        } else {
            Err(format!("HTTP {}", response.status))
        }
    }
}
