//! Canonical message model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{MessageId, ThreadId, UserId};

/// Participant role of a sender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The booking client.
    #[default]
    Client,
    /// The service provider. Legacy payloads call this `artist`.
    ServiceProvider,
}

impl Role {
    /// Parse a role label, remapping deprecated aliases.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "client" => Some(Role::Client),
            "service_provider" | "artist" | "provider" => Some(Role::ServiceProvider),
            _ => None,
        }
    }

    /// Current wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::ServiceProvider => "service_provider",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    /// Written by a participant.
    #[default]
    User,
    /// Generated by the platform (booking updates, tombstones).
    System,
}

impl MessageKind {
    /// Parse a kind label. `text` is a legacy alias for [`MessageKind::User`].
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "USER" | "TEXT" => Some(MessageKind::User),
            "SYSTEM" => Some(MessageKind::System),
            _ => None,
        }
    }
}

/// Delivery state of a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Waiting for the outbox.
    Queued,
    /// Request in flight.
    Sending,
    /// Acknowledged by the server.
    #[default]
    Sent,
    /// The send failed.
    Failed,
}

impl DeliveryStatus {
    /// Parse a status label; anything unknown is `Sent`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "queued" => DeliveryStatus::Queued,
            "sending" => DeliveryStatus::Sending,
            "failed" => DeliveryStatus::Failed,
            _ => DeliveryStatus::Sent,
        }
    }

    /// Whether this status still awaits a server outcome.
    pub fn is_pending(&self) -> bool {
        matches!(self, DeliveryStatus::Queued | DeliveryStatus::Sending)
    }
}

/// Who can see a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Only the client.
    Client,
    /// Only the service provider.
    ServiceProvider,
    /// Both participants.
    #[default]
    Both,
}

impl Visibility {
    /// Parse a visibility label, remapping the same aliases as [`Role`].
    pub fn from_label(label: &str) -> Option<Self> {
        if label.trim().eq_ignore_ascii_case("both") {
            return Some(Visibility::Both);
        }
        Role::from_label(label).map(|role| match role {
            Role::Client => Visibility::Client,
            Role::ServiceProvider => Visibility::ServiceProvider,
        })
    }
}

/// File attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Download URL.
    pub url: String,
    /// MIME type, if known.
    pub content_type: Option<String>,
    /// Original filename, if known.
    pub filename: Option<String>,
    /// Size in bytes, if known.
    pub size: Option<u64>,
}

/// Optional fields an inbound record explicitly set to `null`.
///
/// A cleared field removes the existing value during a merge, while an
/// omitted field leaves it untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearedFields {
    pub client_id: bool,
    pub quote_id: bool,
    pub attachment: bool,
    pub reply_to_id: bool,
    pub reply_to_preview: bool,
    pub reactions: bool,
    pub my_reactions: bool,
}

impl ClearedFields {
    /// Whether any field is marked cleared.
    pub fn any(&self) -> bool {
        *self != ClearedFields::default()
    }
}

/// A message in a booking conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Server id; unassigned until confirmed.
    pub id: MessageId,
    /// Owning thread.
    pub thread_id: ThreadId,
    /// Caller-generated correlation key for optimistic sends.
    pub client_id: Option<String>,
    /// Sender user ID.
    pub sender_id: UserId,
    /// Sender role.
    pub sender_role: Role,
    /// Message body.
    pub content: String,
    /// Message kind.
    pub kind: MessageKind,
    /// Related quote.
    pub quote_id: Option<i64>,
    /// Attached file.
    pub attachment: Option<Attachment>,
    /// Who may see this message.
    pub visibility: Visibility,
    /// Whether the viewer has read it.
    pub is_read: bool,
    /// Message this one replies to.
    pub reply_to_id: Option<MessageId>,
    /// Snippet of the replied-to message.
    pub reply_to_preview: Option<String>,
    /// Reaction symbol to count.
    pub reactions: BTreeMap<String, u32>,
    /// Reactions applied by the viewer.
    pub my_reactions: BTreeSet<String>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Delivery state.
    pub delivery_status: DeliveryStatus,
    /// Fields the source explicitly set to null; merge clears them.
    #[serde(skip)]
    pub cleared: ClearedFields,
}

impl Message {
    /// Create an optimistic local message awaiting confirmation.
    pub fn local(
        thread_id: ThreadId,
        client_id: impl Into<String>,
        sender_id: UserId,
        sender_role: Role,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            thread_id,
            client_id: Some(client_id.into()),
            sender_id,
            sender_role,
            content: content.into(),
            created_at,
            delivery_status: DeliveryStatus::Sending,
            is_read: true,
            ..Default::default()
        }
    }

    /// Whether the server has assigned an id.
    pub fn is_confirmed(&self) -> bool {
        self.id.is_assigned()
    }

    /// Whether this message still awaits a server outcome.
    pub fn is_pending(&self) -> bool {
        self.delivery_status.is_pending()
    }

    /// Whether this is a platform-generated message.
    pub fn is_system(&self) -> bool {
        self.kind == MessageKind::System
    }

    /// Set the delivery status.
    pub fn with_status(mut self, status: DeliveryStatus) -> Self {
        self.delivery_status = status;
        self
    }

    /// Set the reply pointer.
    pub fn replying_to(mut self, id: MessageId, preview: Option<String>) -> Self {
        self.reply_to_id = Some(id);
        self.reply_to_preview = preview;
        self
    }

    /// Short single-line preview for conversation lists.
    pub fn preview(&self, max_chars: usize) -> String {
        let text = if self.content.trim().is_empty() {
            self.attachment
                .as_ref()
                .and_then(|a| a.filename.clone())
                .unwrap_or_default()
        } else {
            self.content.split_whitespace().collect::<Vec<_>>().join(" ")
        };

        if text.chars().count() <= max_chars {
            text
        } else {
            let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
            cut.push('…');
            cut
        }
    }
}
