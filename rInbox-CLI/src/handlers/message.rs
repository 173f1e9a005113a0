//! Message handlers.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use rinbox::parser::normalize_batch;
use rinbox::{DeliveryStatus, GroupKey, InboxSession, Message, MergeOutcome, ThreadId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::output::{format_time, PlainPrint, TableRow};

/// Message display info.
#[derive(Debug, Clone, Serialize)]
pub struct MessageInfo {
    pub id: i64,
    pub client_id: Option<String>,
    pub thread_id: i64,
    pub sender_id: i64,
    pub sender_role: String,
    pub kind: String,
    pub content: String,
    pub status: DeliveryStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Render key of the group this message belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl From<&Message> for MessageInfo {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id.get(),
            client_id: m.client_id.clone(),
            thread_id: m.thread_id.get(),
            sender_id: m.sender_id.get(),
            sender_role: m.sender_role.to_string(),
            kind: format!("{:?}", m.kind),
            content: m.content.clone(),
            status: m.delivery_status,
            created_at: m.created_at,
            group: None,
        }
    }
}

impl MessageInfo {
    fn label(&self) -> String {
        match (&self.client_id, self.id) {
            (_, id) if id > 0 => format!("#{}", id),
            (Some(cid), _) => format!("~{}", cid),
            (None, _) => "-".to_string(),
        }
    }

    fn status_label(&self) -> String {
        format!("{:?}", self.status).to_lowercase()
    }
}

impl TableRow for MessageInfo {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "Thread", "Sender", "Content", "Status", "Time", "Group"]
    }
    fn row(&self) -> Vec<String> {
        vec![
            self.label(),
            self.thread_id.to_string(),
            format!("{} ({})", self.sender_id, self.sender_role),
            self.content.clone(),
            self.status_label(),
            format_time(Some(self.created_at)),
            self.group.clone().unwrap_or_default(),
        ]
    }
}

impl PlainPrint for MessageInfo {
    fn plain_print(&self) {
        let status = match self.status {
            DeliveryStatus::Sent => String::new(),
            DeliveryStatus::Failed => format!(" [{}]", self.status_label()).red().to_string(),
            _ => format!(" [{}]", self.status_label()).yellow().to_string(),
        };
        let group = self
            .group
            .as_ref()
            .map(|g| format!(" {}", g).dimmed().to_string())
            .unwrap_or_default();
        println!(
            "{} {} {}{}{}",
            self.label().cyan(),
            format!("{} ({})", self.sender_id, self.sender_role).green(),
            format_time(Some(self.created_at)).dimmed(),
            status,
            group
        );
        for line in self.content.lines() {
            if !line.trim().is_empty() {
                println!("   {}", line);
            }
        }
    }
}

/// Normalize raw JSON text holding one record or a page of records.
pub fn normalize_text(text: &str) -> Result<Vec<MessageInfo>> {
    let value: Value = serde_json::from_str(text).context("Input is not valid JSON")?;
    let messages = match &value {
        Value::Object(map)
            if !["messages", "items", "data"].iter().any(|k| map.contains_key(*k)) =>
        {
            vec![rinbox::normalize(&value)]
        }
        _ => normalize_batch(&value),
    };
    Ok(messages.iter().map(MessageInfo::from).collect())
}

/// One line of a replay stream.
///
/// Lines without an `op` field are raw server payloads.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReplayEvent {
    /// Local optimistic send.
    Send {
        thread_id: i64,
        client_id: String,
        content: String,
    },
    /// The pending send failed.
    Fail { thread_id: i64, client_id: String },
}

/// Counters for a replay run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub dropped: usize,
    pub sent: usize,
    pub failed: usize,
}

impl ReplayStats {
    fn record(&mut self, outcome: Option<MergeOutcome>) {
        match outcome {
            Some(MergeOutcome::Inserted) => self.inserted += 1,
            Some(MergeOutcome::Updated) => self.updated += 1,
            Some(MergeOutcome::Unchanged) => self.unchanged += 1,
            None => self.dropped += 1,
        }
    }
}

/// Replay result.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayResult {
    pub stats: ReplayStats,
    pub messages: Vec<MessageInfo>,
}

/// Apply one replay line to the session. Blank lines are skipped.
pub fn apply_line(session: &mut InboxSession, line: &str, stats: &mut ReplayStats) -> Result<()> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }

    let value: Value = serde_json::from_str(line).context("Replay line is not valid JSON")?;
    if value.get("op").is_none() {
        stats.record(session.ingest(&value));
        return Ok(());
    }

    match serde_json::from_value::<ReplayEvent>(value).context("Unknown replay event")? {
        ReplayEvent::Send {
            thread_id,
            client_id,
            content,
        } => {
            if session
                .send_optimistic(ThreadId(thread_id), client_id, content)
                .is_none()
            {
                bail!("Invalid thread id {}", thread_id);
            }
            stats.sent += 1;
        }
        ReplayEvent::Fail {
            thread_id,
            client_id,
        } => {
            if session.mark_failed(ThreadId(thread_id), &client_id) {
                stats.failed += 1;
            }
        }
    }
    Ok(())
}

/// Collect the messages of a thread with their group keys.
pub fn thread_messages(session: &mut InboxSession, thread_id: ThreadId) -> Vec<MessageInfo> {
    let keys = session.group_keys(thread_id);
    let groups = rinbox::grouping::group_messages(
        session.messages(thread_id),
        session.config().group_window(),
    );

    let mut infos = Vec::new();
    for (group, key) in groups.iter().zip(keys.iter()) {
        infos.extend(group.messages.iter().map(|m| with_group(m, key)));
    }
    infos
}

fn with_group(message: &Message, key: &GroupKey) -> MessageInfo {
    MessageInfo {
        group: Some(key.to_string()),
        ..MessageInfo::from(message)
    }
}
