use std::error::Error;
use std::io;

use clashhub::{RepositoryConfig, parse_repo_path};
use console::style;

use crate::RepoAction;
use crate::commands::shared::{AppContext, notify, unlock};
use crate::config::{Config, RepositoryUpdate};

pub(crate) fn handle_repo(
    action: RepoAction,
    ctx: &AppContext,
    password: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    match action {
        RepoAction::Show => {
            print_repository(ctx.gateway.config(), ctx);
            Ok(())
        }
        RepoAction::Set {
            repo,
            token,
            domain,
            branch,
        } => {
            let _session = unlock(&ctx.config, password)?;
            let update = build_update(repo.as_deref(), token, domain, branch)?;
            if update.is_empty() {
                return Err(io::Error::new(io::ErrorKind::InvalidInput, "nothing to set").into());
            }
            let path = Config::save_repository(&update)?;
            notify(&format!("Saved repository settings to {}", path.display()));
            Ok(())
        }
    }
}

fn build_update(
    repo: Option<&str>,
    token: Option<String>,
    domain: Option<String>,
    branch: Option<String>,
) -> io::Result<RepositoryUpdate> {
    let (owner, name) = match repo {
        Some(path) => {
            let (owner, name) = parse_repo_path(path).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("expected owner/name, got {path:?}"),
                )
            })?;
            (Some(owner), Some(name))
        }
        None => (None, None),
    };
    Ok(RepositoryUpdate {
        owner,
        name,
        token,
        domain,
        branch,
    })
}

fn print_repository(config: &RepositoryConfig, ctx: &AppContext) {
    let token = if config.token().is_some() {
        style("set").green()
    } else {
        style("not set (read-only)").yellow()
    };
    println!("repository  {}", config.full_name());
    println!("branch      {}", config.branch);
    println!("domain      {}", config.display_domain);
    println!("token       {token}");
    match ctx.config.cache_path() {
        Some(path) => println!("cache       {}", path.display()),
        None => println!("cache       (memory only)"),
    }
    if let Some(path) = Config::default_config_path() {
        println!("config      {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_path_is_split_into_owner_and_name() {
        let update = build_update(Some("alice/subs"), None, None, None).unwrap();
        assert_eq!(update.owner.as_deref(), Some("alice"));
        assert_eq!(update.name.as_deref(), Some("subs"));
        assert!(update.token.is_none());
    }

    #[test]
    fn repo_path_without_slash_is_rejected() {
        let err = build_update(Some("alice"), None, None, None).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn no_fields_means_empty_update() {
        assert!(build_update(None, None, None, None).unwrap().is_empty());
        assert!(!build_update(None, None, Some("https://d".to_string()), None).unwrap().is_empty());
    }
}
