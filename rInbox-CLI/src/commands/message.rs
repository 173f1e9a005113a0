//! Message commands.

use anyhow::{Context, Result};
use colored::Colorize;
use rinbox::ThreadId;
use std::collections::BTreeSet;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::config::{build_memory_session, build_session};
use crate::handlers::message::{self as handlers, ReplayResult, ReplayStats};
use crate::handlers::read_input;
use crate::output::{print_table, print_value, OutputFormat};

/// Normalize raw payloads and print the canonical messages.
pub async fn normalize(input: &str, format: OutputFormat) -> Result<()> {
    let text = read_input(input).await?;
    let messages = handlers::normalize_text(&text)?;
    print_table(messages, format);
    Ok(())
}

/// Replay an NDJSON event stream through a session.
pub async fn replay(
    input: &str,
    thread: Option<i64>,
    persist: bool,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let mut session = if persist {
        build_session()?
    } else {
        build_memory_session()?
    };

    let reader: Box<dyn AsyncBufRead + Unpin> = if input == "-" {
        Box::new(BufReader::new(tokio::io::stdin()))
    } else {
        let file = tokio::fs::File::open(input)
            .await
            .with_context(|| format!("Failed to open {}", input))?;
        Box::new(BufReader::new(file))
    };

    let mut stats = ReplayStats::default();
    let mut touched = BTreeSet::new();
    let mut lines = reader.lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        line_no += 1;
        if let Some(id) = serde_json::from_str::<serde_json::Value>(&line)
            .ok()
            .as_ref()
            .and_then(thread_of)
        {
            touched.insert(id);
        }
        handlers::apply_line(&mut session, &line, &mut stats)
            .with_context(|| format!("Line {}", line_no))?;
    }
    tracing::debug!("replayed {} lines", line_no);

    if persist {
        session.persist().context("Failed to persist thread cache")?;
    }

    let threads: Vec<i64> = match thread {
        Some(id) => vec![id],
        None => touched.into_iter().collect(),
    };
    let mut messages = Vec::new();
    for id in threads {
        messages.extend(handlers::thread_messages(&mut session, ThreadId(id)));
    }

    if matches!(format, OutputFormat::Json) {
        print_value(&ReplayResult { stats, messages }, format, |_| {});
        return Ok(());
    }

    if verbose || matches!(format, OutputFormat::Plain) {
        println!(
            "{}\n",
            format!(
                "{} inserted, {} updated, {} unchanged, {} dropped, {} sent, {} failed",
                stats.inserted,
                stats.updated,
                stats.unchanged,
                stats.dropped,
                stats.sent,
                stats.failed
            )
            .dimmed()
        );
    }
    print_table(messages, format);
    Ok(())
}

fn thread_of(value: &serde_json::Value) -> Option<i64> {
    ["booking_request_id", "thread_id"]
        .iter()
        .find_map(|k| value.get(*k))
        .and_then(rinbox::parser::coerce_int)
        .filter(|id| *id > 0)
}
