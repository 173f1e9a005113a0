//! Shared handlers for CLI commands.

pub mod message;
pub mod thread;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;

/// Read a whole input, where `-` means stdin.
pub async fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut content = String::new();
        tokio::io::stdin()
            .read_to_string(&mut content)
            .await
            .context("Failed to read stdin")?;
        return Ok(content);
    }

    tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read {}", input))
}
