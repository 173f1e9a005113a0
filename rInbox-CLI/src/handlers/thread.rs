//! Thread list handlers.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use rinbox::{InboxSession, ThreadId, ThreadSummary};
use serde::Serialize;

use crate::output::{format_relative_time, PlainPrint, TableRow};

/// Thread summary info.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadInfo {
    pub thread_id: i64,
    pub status: String,
    pub preview: String,
    pub unread: u32,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl From<&ThreadSummary> for ThreadInfo {
    fn from(s: &ThreadSummary) -> Self {
        Self {
            thread_id: s.thread_id.get(),
            status: s.status.clone(),
            preview: s.last_message_preview.clone(),
            unread: s.unread_count,
            last_message_at: s.activity_at(),
        }
    }
}

impl TableRow for ThreadInfo {
    fn headers() -> Vec<&'static str> {
        vec!["Thread", "Status", "Last Message", "Last", "Unread"]
    }
    fn row(&self) -> Vec<String> {
        vec![
            self.thread_id.to_string(),
            self.status.clone(),
            self.preview.clone(),
            format_relative_time(self.last_message_at),
            if self.unread > 0 {
                self.unread.to_string()
            } else {
                String::new()
            },
        ]
    }
}

impl PlainPrint for ThreadInfo {
    fn plain_print(&self) {
        let unread_marker = if self.unread > 0 {
            format!("({}) ", self.unread).red().to_string()
        } else {
            String::new()
        };
        let status = if self.status.is_empty() {
            String::new()
        } else {
            format!(" [{}]", self.status)
        };
        println!(
            "{}[{}]{} {}",
            unread_marker,
            self.thread_id.to_string().cyan(),
            status.yellow(),
            format_relative_time(self.last_message_at).dimmed()
        );
        if !self.preview.is_empty() {
            println!("   {}", self.preview);
        }
    }
}

/// Fields for a summary upsert.
#[derive(Debug, Clone, Default)]
pub struct SummaryUpdate {
    pub status: Option<String>,
    pub preview: Option<String>,
    pub unread: Option<u32>,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Thread change result.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadChangeResult {
    pub thread_id: i64,
    pub success: bool,
}

/// List cached threads, most recent first.
pub fn list_threads(session: &InboxSession) -> Vec<ThreadInfo> {
    session.threads().iter().map(ThreadInfo::from).collect()
}

/// Insert or update a summary and persist the list.
pub fn upsert_thread(
    session: &mut InboxSession,
    thread_id: i64,
    update: SummaryUpdate,
) -> Result<ThreadChangeResult> {
    let thread_id = ThreadId(thread_id);
    if !thread_id.is_assigned() {
        bail!("Invalid thread id {}", thread_id);
    }

    let mut summary = session
        .threads()
        .into_iter()
        .find(|s| s.thread_id == thread_id)
        .unwrap_or_else(|| ThreadSummary::new(thread_id));

    if let Some(status) = update.status {
        summary.status = status;
    }
    if let Some(preview) = update.preview {
        summary.last_message_preview = preview;
    }
    if let Some(unread) = update.unread {
        summary.unread_count = unread;
    }
    summary.last_message_at = update.last_message_at.or(summary.last_message_at);
    summary.updated_at = Some(Utc::now());

    let success = session.upsert_summary(summary);
    session.persist()?;
    Ok(ThreadChangeResult {
        thread_id: thread_id.get(),
        success,
    })
}

/// Remove a summary and persist the list.
pub fn remove_thread(session: &mut InboxSession, thread_id: i64) -> Result<ThreadChangeResult> {
    let success = session.remove_summary(ThreadId(thread_id)).is_some();
    session.persist()?;
    Ok(ThreadChangeResult { thread_id, success })
}

/// Drop the viewer's thread list from memory and storage.
pub fn clear_threads(session: &mut InboxSession) {
    session.forget_threads();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rinbox::{MemoryStorage, Role, SessionStorage};
    use std::sync::Arc;

    fn session(storage: Arc<dyn SessionStorage>) -> InboxSession {
        InboxSession::builder()
            .viewer(Role::ServiceProvider, 5)
            .storage(storage)
            .build()
            .unwrap()
    }

    #[test]
    fn test_upsert_persists() {
        let storage: Arc<dyn SessionStorage> = Arc::new(MemoryStorage::new());
        let mut first = session(storage.clone());
        let result = upsert_thread(
            &mut first,
            12,
            SummaryUpdate {
                status: Some("pending_quote".into()),
                unread: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(result.success);

        let mut second = session(storage);
        assert!(second.hydrate());
        let threads = list_threads(&second);
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].status, "pending_quote");
        assert_eq!(threads[0].unread, 2);
    }

    #[test]
    fn test_upsert_keeps_existing_fields() {
        let mut session = session(Arc::new(MemoryStorage::new()));
        upsert_thread(
            &mut session,
            3,
            SummaryUpdate {
                preview: Some("See you then".into()),
                ..Default::default()
            },
        )
        .unwrap();
        upsert_thread(
            &mut session,
            3,
            SummaryUpdate {
                unread: Some(1),
                ..Default::default()
            },
        )
        .unwrap();

        let threads = list_threads(&session);
        assert_eq!(threads[0].preview, "See you then");
        assert_eq!(threads[0].unread, 1);
    }

    #[test]
    fn test_invalid_thread_rejected() {
        let mut session = session(Arc::new(MemoryStorage::new()));
        assert!(upsert_thread(&mut session, 0, SummaryUpdate::default()).is_err());
    }

    #[test]
    fn test_remove_and_clear() {
        let storage: Arc<dyn SessionStorage> = Arc::new(MemoryStorage::new());
        let mut session = session(storage.clone());
        upsert_thread(&mut session, 1, SummaryUpdate::default()).unwrap();
        upsert_thread(&mut session, 2, SummaryUpdate::default()).unwrap();

        assert!(remove_thread(&mut session, 1).unwrap().success);
        assert!(!remove_thread(&mut session, 1).unwrap().success);
        assert_eq!(list_threads(&session).len(), 1);

        clear_threads(&mut session);
        assert!(list_threads(&session).is_empty());
        assert!(storage.get(&session.scope().storage_key()).is_none());
    }
}
