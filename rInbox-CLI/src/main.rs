//! Inbox reconciliation CLI.

mod commands;
mod config;
mod handlers;
mod output;
mod storage;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{message, thread};
use rinbox::{Role, ScopeKey};

/// Replay and inspect booking inbox state
#[derive(Parser)]
#[command(name = "rinbox")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "plain")]
    format: output::OutputFormat,

    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize raw message payloads from a file or stdin (-)
    #[command(alias = "n")]
    Normalize {
        /// Input file, or - for stdin
        #[arg(default_value = "-")]
        input: String,
    },

    /// Replay an NDJSON event stream and print the reconciled threads
    #[command(alias = "r")]
    Replay {
        /// Input file, or - for stdin
        #[arg(default_value = "-")]
        input: String,
        /// Only print this thread
        #[arg(short, long)]
        thread: Option<i64>,
        /// Load and save the thread cache in the storage file
        #[arg(long)]
        persist: bool,
    },

    /// Thread list operations
    #[command(alias = "t")]
    Threads {
        #[command(subcommand)]
        action: thread::ThreadAction,
    },

    /// Manage the signed-in viewer
    Viewer {
        #[command(subcommand)]
        action: ViewerAction,
    },

    /// Show current configuration
    Config,
}

#[derive(Subcommand)]
enum ViewerAction {
    /// Sign in as a viewer
    Set {
        /// Role: client or service_provider
        #[arg(short, long, env = "RINBOX_ROLE")]
        role: String,
        /// User ID
        #[arg(short, long, env = "RINBOX_VIEWER_ID")]
        id: i64,
    },
    /// Sign out
    Clear,
    /// Show the current viewer
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Normalize { input } => message::normalize(&input, cli.format).await,
        Commands::Replay {
            input,
            thread,
            persist,
        } => message::replay(&input, thread, persist, cli.format, cli.verbose).await,
        Commands::Threads { action } => thread::handle(action, cli.format, cli.verbose).await,
        Commands::Viewer { action } => handle_viewer(action),
        Commands::Config => {
            let cfg = config::load_config()?;
            println!("Config file: {}", config::config_path()?.display());
            println!("Storage file: {}", config::storage_path(&cfg)?.display());
            match &cfg.viewer {
                Some(viewer) => println!("Viewer: {} {}", viewer.role, viewer.viewer_id),
                None => println!("Viewer: {}", "none".dimmed()),
            }
            println!("Max cached threads: {}", cfg.session.max_cached_threads);
            println!("Stub capacity: {}", cfg.session.stub_capacity);
            println!("Group window: {}s", cfg.session.group_window_secs);
            Ok(())
        }
    }
}

fn handle_viewer(action: ViewerAction) -> Result<()> {
    match action {
        ViewerAction::Set { role, id } => {
            let parsed = Role::from_label(&role)
                .ok_or_else(|| anyhow::anyhow!("Unknown role '{}'", role))?;
            if id <= 0 {
                anyhow::bail!("Invalid viewer id {}", id);
            }
            let mut cfg = config::load_config()?;
            cfg.viewer = Some(config::ViewerConfig {
                role: parsed.as_str().to_string(),
                viewer_id: id,
            });
            config::save_config(&cfg)?;
            println!("Signed in as {}", ScopeKey::new(parsed, id).to_string().green());
            Ok(())
        }
        ViewerAction::Clear => {
            let mut cfg = config::load_config()?;
            cfg.viewer = None;
            config::save_config(&cfg)?;
            println!("Signed out");
            Ok(())
        }
        ViewerAction::Status => {
            let cfg = config::load_config()?;
            match &cfg.viewer {
                Some(viewer) => {
                    let role = viewer.role()?;
                    let scope = ScopeKey::new(role, viewer.viewer_id);
                    println!("Signed in as {}", scope.to_string().green());
                    println!("Cache key: {}", scope.storage_key().dimmed());
                }
                None => println!("Not signed in"),
            }
            Ok(())
        }
    }
}
