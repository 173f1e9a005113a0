//! Data models for inbox entities.

mod ids;
mod message;
mod thread;

pub(crate) use ids::parse_id;
pub use ids::{MessageId, ThreadId, UserId};
pub use message::{
    Attachment, ClearedFields, DeliveryStatus, Message, MessageKind, Role, Visibility,
};
pub use thread::{ThreadSummary, PREVIEW_CHARS};
