//! Conversation summary models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Message, ThreadId, UserId};

/// Maximum characters kept in a summary preview.
pub const PREVIEW_CHARS: usize = 80;

/// A conversation list entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    /// Thread ID.
    pub thread_id: ThreadId,
    /// Participant user IDs.
    #[serde(default)]
    pub participants: Vec<UserId>,
    /// Booking status label.
    #[serde(default)]
    pub status: String,
    /// Snippet of the latest message.
    #[serde(default)]
    pub last_message_preview: String,
    /// Time of the latest message.
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    /// Unread messages for the viewer.
    #[serde(default)]
    pub unread_count: u32,
    /// Last time the summary changed on the server.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ThreadSummary {
    /// Create an empty summary for a thread.
    pub fn new(thread_id: ThreadId) -> Self {
        Self {
            thread_id,
            ..Default::default()
        }
    }

    /// Whether the summary can be stored.
    pub fn is_valid(&self) -> bool {
        self.thread_id.is_assigned()
    }

    /// Instant used to order conversation lists.
    pub fn activity_at(&self) -> Option<DateTime<Utc>> {
        match (self.last_message_at, self.updated_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fold a newer message into the preview fields.
    ///
    /// Older messages are ignored. Unread messages from other users bump
    /// `unread_count`.
    pub fn apply_message(&mut self, message: &Message, viewer: UserId) {
        if let Some(last) = self.last_message_at {
            if message.created_at < last {
                return;
            }
        }

        self.show_latest(message);

        if message.sender_id != viewer && !message.is_read && !message.is_system() {
            self.unread_count = self.unread_count.saturating_add(1);
        }
    }

    /// Take the preview fields from the thread's latest message, whatever
    /// its timestamp. Used when that message was edited or confirmed.
    pub fn show_latest(&mut self, message: &Message) {
        self.last_message_preview = message.preview(PREVIEW_CHARS);
        self.last_message_at = Some(message.created_at);
    }

    /// Mark everything as read.
    pub fn mark_read(&mut self) {
        self.unread_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_apply_message() {
        let mut summary = ThreadSummary::new(ThreadId(5));
        let msg = Message {
            sender_id: UserId(2),
            content: "Is the 14th still free?".into(),
            created_at: at(1_700_000_000),
            ..Default::default()
        };

        summary.apply_message(&msg, UserId(1));
        assert_eq!(summary.last_message_preview, "Is the 14th still free?");
        assert_eq!(summary.unread_count, 1);

        let older = Message {
            content: "old".into(),
            created_at: at(1_600_000_000),
            ..Default::default()
        };
        summary.apply_message(&older, UserId(1));
        assert_eq!(summary.last_message_preview, "Is the 14th still free?");

        summary.mark_read();
        assert_eq!(summary.unread_count, 0);
    }

    #[test]
    fn test_show_latest_moves_backwards() {
        let mut summary = ThreadSummary::new(ThreadId(5));
        summary.last_message_at = Some(at(100));
        let msg = Message {
            content: "confirmed".into(),
            created_at: at(90),
            ..Default::default()
        };
        summary.show_latest(&msg);
        assert_eq!(summary.last_message_at, Some(at(90)));
        assert_eq!(summary.last_message_preview, "confirmed");
        assert_eq!(summary.unread_count, 0);
    }

    #[test]
    fn test_own_message_not_unread() {
        let mut summary = ThreadSummary::new(ThreadId(5));
        let msg = Message {
            sender_id: UserId(1),
            content: "hi".into(),
            ..Default::default()
        };
        summary.apply_message(&msg, UserId(1));
        assert_eq!(summary.unread_count, 0);
    }

    #[test]
    fn test_missing_thread_id_rejected() {
        let parsed = serde_json::from_str::<ThreadSummary>(r#"{"status":"pending"}"#);
        assert!(parsed.is_err());
        assert!(!ThreadSummary::new(ThreadId(0)).is_valid());
    }

    #[test]
    fn test_activity_at() {
        let mut summary = ThreadSummary::new(ThreadId(1));
        assert_eq!(summary.activity_at(), None);
        summary.updated_at = Some(at(20));
        summary.last_message_at = Some(at(10));
        assert_eq!(summary.activity_at(), Some(at(20)));
    }
}
