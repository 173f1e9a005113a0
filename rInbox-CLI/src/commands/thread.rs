//! Thread list commands.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use colored::Colorize;

use crate::config::build_session;
use crate::handlers::thread::{self as handlers, SummaryUpdate};
use crate::output::{print_table, print_value, OutputFormat};

#[derive(Subcommand)]
pub enum ThreadAction {
    /// List cached threads
    #[command(alias = "ls")]
    List,

    /// Insert or update a thread summary
    Upsert {
        /// Thread ID
        thread_id: i64,
        /// Booking status label
        #[arg(short, long)]
        status: Option<String>,
        /// Last message preview
        #[arg(short, long)]
        preview: Option<String>,
        /// Unread count
        #[arg(short, long)]
        unread: Option<u32>,
        /// Time of the last message (RFC 3339)
        #[arg(short, long)]
        at: Option<String>,
    },

    /// Remove a thread summary
    #[command(alias = "rm")]
    Remove {
        /// Thread ID
        thread_id: i64,
    },

    /// Drop the cached thread list
    Clear,
}

pub async fn handle(action: ThreadAction, format: OutputFormat, verbose: bool) -> Result<()> {
    let mut session = build_session()?;
    if verbose {
        eprintln!("{}", format!("scope {}", session.scope().storage_key()).dimmed());
    }

    match action {
        ThreadAction::List => {
            if matches!(format, OutputFormat::Plain) {
                println!("{}\n", format!("Threads for {}", session.scope()).bold());
            }
            print_table(handlers::list_threads(&session), format);
            Ok(())
        }
        ThreadAction::Upsert {
            thread_id,
            status,
            preview,
            unread,
            at,
        } => {
            let last_message_at = at
                .map(|s| {
                    DateTime::parse_from_rfc3339(&s)
                        .map(|dt| dt.with_timezone(&Utc))
                        .with_context(|| format!("Invalid time '{}'", s))
                })
                .transpose()?;
            let update = SummaryUpdate {
                status,
                preview,
                unread,
                last_message_at,
            };
            let result = handlers::upsert_thread(&mut session, thread_id, update)?;
            print_value(&result, format, |r| {
                println!("Thread {} saved", r.thread_id.to_string().cyan())
            });
            Ok(())
        }
        ThreadAction::Remove { thread_id } => {
            let result = handlers::remove_thread(&mut session, thread_id)?;
            print_value(&result, format, |r| {
                if r.success {
                    println!("Thread {} removed", r.thread_id.to_string().cyan());
                } else {
                    println!("Thread {} was not cached", r.thread_id);
                }
            });
            Ok(())
        }
        ThreadAction::Clear => {
            handlers::clear_threads(&mut session);
            println!("Thread cache cleared");
            Ok(())
        }
    }
}
