//! Reconciliation of optimistic and server-confirmed messages.

mod identity;
mod merge;

pub use identity::{compare, same_message, sort_messages, Identity};
pub use merge::{mark_failed, merge, merge_all, merge_into, union, MergeOutcome};
