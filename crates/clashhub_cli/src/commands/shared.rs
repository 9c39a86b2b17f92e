use std::error::Error;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use clashhub::cache::{LINKS_KEY, SOURCES_KEY, set_local_only, store_json};
use clashhub::http::{HttpTransport, ReqwestTransport};
use clashhub::{
    AdminGate, AdminSession, CustomLinkEntry, Documents, GatewayError, JsonFileStore, KeyValueStore,
    MemoryStore, RemoteFetcher, RepoGateway, SourceEntry, reconcile_documents, save_custom_links,
    save_sources,
};
use console::Term;

use crate::config::Config;

/// Everything a command needs to talk to the repository and the cache.
pub(crate) struct AppContext {
    pub(crate) config: Config,
    pub(crate) gateway: RepoGateway,
    pub(crate) fetcher: RemoteFetcher,
    pub(crate) store: Arc<dyn KeyValueStore>,
}

impl AppContext {
    pub(crate) fn new(config: Config) -> Result<Self, Box<dyn Error>> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::with_timeout(
            Duration::from_secs(config.http.timeout),
        )?);

        let store: Arc<dyn KeyValueStore> = match config.cache_path() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Using cache file");
                Arc::new(JsonFileStore::open(path))
            }
            None => {
                tracing::warn!("Could not determine a cache location, cache will not persist");
                Arc::new(MemoryStore::new())
            }
        };

        Ok(Self::with_parts(config, transport, store))
    }

    pub(crate) fn with_parts(
        config: Config,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            gateway: RepoGateway::new(config.repository_config(), Arc::clone(&transport)),
            fetcher: RemoteFetcher::new(transport),
            store,
            config,
        }
    }

    /// Current documents: cached copy reconciled against the repository.
    pub(crate) async fn documents(&self) -> Documents {
        reconcile_documents(&self.gateway, self.store.as_ref()).await
    }

    /// Cache the sources, then try to write them to the repository.
    ///
    /// Until a repository write succeeds the cached copy is marked local-only,
    /// so later commands and `sync` keep building on it.
    pub(crate) async fn persist_sources(
        &self,
        session: &AdminSession,
        sources: &[SourceEntry],
    ) -> Result<(), Box<dyn Error>> {
        store_json(self.store.as_ref(), SOURCES_KEY, sources)?;
        let saved = save_sources(&self.gateway, session, sources).await;
        self.settle(SOURCES_KEY, "clash/sources.json", saved.map(|_| ()))
    }

    /// Cache the links, then try to write them to the repository.
    pub(crate) async fn persist_links(
        &self,
        session: &AdminSession,
        links: &[CustomLinkEntry],
    ) -> Result<(), Box<dyn Error>> {
        store_json(self.store.as_ref(), LINKS_KEY, links)?;
        let saved = save_custom_links(&self.gateway, session, links).await;
        self.settle(LINKS_KEY, "clash/link.json", saved.map(|_| ()))
    }

    fn settle(
        &self,
        key: &str,
        path: &str,
        saved: Result<(), GatewayError>,
    ) -> Result<(), Box<dyn Error>> {
        set_local_only(self.store.as_ref(), key, saved.is_err())?;
        match saved {
            Ok(()) => notify(&format!("Saved {path}")),
            Err(e) => warn(&format!(
                "Saved locally only, repository write failed: {e}. Run `clashhub sync` to publish it."
            )),
        }
        Ok(())
    }
}

/// Pass the admin gate with `--password`/`CLASHHUB_PASSWORD`, or prompt.
pub(crate) fn unlock(config: &Config, password: Option<&str>) -> Result<AdminSession, Box<dyn Error>> {
    let gate = AdminGate::new(config.admin.password.clone());
    let attempt = match password {
        Some(password) => password.to_string(),
        None => prompt_password()?,
    };
    Ok(gate.unlock(&attempt)?)
}

fn prompt_password() -> io::Result<String> {
    let term = Term::stderr();
    if !term.is_term() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "admin password required: pass --password or set CLASHHUB_PASSWORD",
        ));
    }
    term.write_str("Admin password: ")?;
    term.read_secure_line()
}

/// Print to the terminal, or log when not attached to one.
pub(crate) fn notify(message: &str) {
    if Term::stdout().is_term() {
        println!("{message}");
    } else {
        tracing::info!("{message}");
    }
}

pub(crate) fn warn(message: &str) {
    if Term::stdout().is_term() {
        eprintln!("Warning: {message}");
    } else {
        tracing::warn!("{message}");
    }
}

/// Convert a 1-based position from the command line into an index.
pub(crate) fn index_from_position(position: usize, len: usize) -> Result<usize, io::Error> {
    if position == 0 || position > len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("position {position} is out of range (1..={len})"),
        ));
    }
    Ok(position - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_one_based() {
        assert_eq!(index_from_position(1, 3).unwrap(), 0);
        assert_eq!(index_from_position(3, 3).unwrap(), 2);
        assert!(index_from_position(0, 3).is_err());
        assert!(index_from_position(4, 3).is_err());
        assert!(index_from_position(1, 0).is_err());
    }

    #[test]
    fn explicit_password_is_checked_against_config() {
        let config = Config::default();
        assert!(unlock(&config, Some("admin")).is_ok());
        let err = unlock(&config, Some("nope")).unwrap_err();
        assert_eq!(err.to_string(), "wrong admin password");
    }
}
