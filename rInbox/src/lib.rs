//! Client-side message reconciliation and thread cache for a booking inbox.

pub mod cache;
pub mod error;
pub mod grouping;
pub mod models;
pub mod parser;
pub mod reconcile;
pub mod session;
pub mod stubs;
pub mod telemetry;

// Re-export main types
pub use error::{Error, Result};
pub use session::{InboxSession, InboxSessionBuilder, SessionConfig};

// Re-export commonly used models
pub use models::{
    Attachment, DeliveryStatus, Message, MessageId, MessageKind, Role, ThreadId, ThreadSummary,
    UserId, Visibility,
};

pub use cache::{MemoryStorage, ScopeKey, SessionStorage, ThreadCache};
pub use grouping::{GroupKey, GroupKeyAssigner};
pub use parser::{normalize, normalize_batch};
pub use reconcile::{merge, MergeOutcome};
pub use stubs::{EphemeralStub, StubStore};
pub use telemetry::{CacheOutcome, SwitchPhase, SwitchTracker, TelemetrySink};
