//! ClashHub CLI - publish Clash subscription mirrors and browse them.

mod commands;
mod config;
mod progress;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

use crate::commands::shared::AppContext;

#[derive(Parser)]
#[command(name = "clashhub")]
#[command(version)]
#[command(about = "Mirror Clash subscription sources into a GitHub repository")]
#[command(
    long_about = "ClashHub fetches a curated list of Clash subscription sources and republishes \
each one as clash/Neat_config<n>.yml in a GitHub repository used as static storage. \
Visitors copy the published URLs; the operator edits sources and links and runs sync."
)]
#[command(after_long_help = r#"EXAMPLES
    Show published subscriptions and links:
        $ clashhub show

    Add sources from a file, one URL per line:
        $ clashhub sources batch-add --file sources.txt

    Point at your own repository and save a token:
        $ clashhub repo set --repo alice/subs --token ghp_...

    Fetch every source and republish:
        $ clashhub sync

CONFIGURATION
    ClashHub reads configuration from:
      1. ~/.config/clashhub/config.toml (or $XDG_CONFIG_HOME/clashhub/config.toml)
      2. ./clashhub.toml
      3. Environment variables (CLASHHUB_* prefix, e.g., CLASHHUB_REPOSITORY_TOKEN)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    CLASHHUB_REPOSITORY_OWNER   Repository owner (default: zhaifu)
    CLASHHUB_REPOSITORY_NAME    Repository name (default: clash10)
    CLASHHUB_REPOSITORY_TOKEN   GitHub token with contents write access
    CLASHHUB_REPOSITORY_DOMAIN  Base URL subscription links are shown under
    CLASHHUB_ADMIN_PASSWORD     Configured admin password (default: admin)
    CLASHHUB_PASSWORD           Password attempt for admin commands
    CLASHHUB_CACHE_PATH         Cache file (default: ~/.local/state/clashhub/cache.json)
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Admin password for commands that change anything (prompted if omitted)
    #[arg(long, global = true, env = "CLASHHUB_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the published subscriptions and links
    Show {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Save the documents, republish every source and remove stale mirrors
    Sync,
    /// Inspect or edit the subscription sources
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },
    /// Inspect or edit the navigation links
    Links {
        #[command(subcommand)]
        action: LinksAction,
    },
    /// Inspect or change the backing repository
    Repo {
        #[command(subcommand)]
        action: RepoAction,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum SourcesAction {
    /// List sources with the mirror file each one publishes to
    List,
    /// Append sources (blank placeholders allowed)
    Add {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Replace the source at a position (1-based)
    Set { position: usize, url: String },
    /// Remove the source at a position (1-based)
    Remove { position: usize },
    /// Append every line starting with http from a file or stdin
    BatchAdd {
        /// Read from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum LinksAction {
    /// List links with their ids
    List,
    /// Add a link
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        /// Emoji or image URL
        #[arg(long)]
        icon: Option<String>,
        /// CSS colour (default #3b82f6)
        #[arg(long)]
        color: Option<String>,
    },
    /// Change fields of an existing link
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        url: Option<String>,
        /// Emoji or image URL; an empty value clears it
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Remove a link
    Remove { id: String },
}

#[derive(Subcommand)]
enum RepoAction {
    /// Show the effective repository settings
    Show,
    /// Save repository settings to the user config file
    Set {
        /// Repository as owner/name
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        token: Option<String>,
        /// Base URL subscription links are shown under
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        branch: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Structured logging only when not attached to a terminal
    if !Term::stdout().is_term() {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::new("clashhub=info,clashhub_cli=info"),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    match &cli.command {
        Commands::Completions { shell } => {
            commands::meta::handle_completions(*shell)?;
            return Ok(());
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output.clone())?;
            return Ok(());
        }
        _ => {}
    }

    let ctx = AppContext::new(config::Config::load())?;
    let password = cli.password.as_deref();

    match cli.command {
        Commands::Show { json } => commands::show::handle_show(&ctx, json).await?,
        Commands::Sync => commands::sync::handle_sync(ctx, password).await?,
        Commands::Sources { action } => {
            commands::sources::handle_sources(action, &ctx, password).await?;
        }
        Commands::Links { action } => {
            commands::links::handle_links(action, &ctx, password).await?;
        }
        Commands::Repo { action } => commands::repo::handle_repo(action, &ctx, password)?,
        Commands::Completions { .. } | Commands::Man { .. } => {}
    }

    Ok(())
}
