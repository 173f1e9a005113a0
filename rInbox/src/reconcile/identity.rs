//! Message identity and total ordering.

use std::cmp::Ordering;

use crate::models::{Message, MessageId};

/// Resolved identity of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Confirmed by the server.
    Server(MessageId),
    /// Optimistic, keyed by the caller's correlation id.
    Client(String),
}

impl Identity {
    /// Resolve the identity of a message: the server id if assigned,
    /// otherwise the client id.
    pub fn of(message: &Message) -> Option<Self> {
        if message.id.is_assigned() {
            Some(Identity::Server(message.id))
        } else {
            message.client_id.clone().map(Identity::Client)
        }
    }

    /// String form used as the ordering tie-break.
    pub fn sort_key(&self) -> String {
        match self {
            Identity::Server(id) => id.to_string(),
            Identity::Client(cid) => cid.clone(),
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identity::Server(id) => write!(f, "#{}", id),
            Identity::Client(cid) => write!(f, "~{}", cid),
        }
    }
}

/// Whether `incoming` is the same logical message as `existing`.
pub fn same_message(existing: &Message, incoming: &Message) -> bool {
    if incoming.id.is_assigned() && incoming.id == existing.id {
        return true;
    }
    match (&incoming.client_id, &existing.client_id) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Total order: `created_at` ascending, then identity compared as text.
pub fn compare(a: &Message, b: &Message) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| tie_key(a).cmp(&tie_key(b)))
}

/// Sort messages into display order. Stable for full ties.
pub fn sort_messages(messages: &mut [Message]) {
    messages.sort_by(compare);
}

fn tie_key(message: &Message) -> String {
    Identity::of(message)
        .map(|id| id.sort_key())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn msg(id: i64, client_id: Option<&str>) -> Message {
        Message {
            id: MessageId(id),
            client_id: client_id.map(str::to_owned),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn test_identity_resolution() {
        assert_eq!(Identity::of(&msg(4, Some("c"))), Some(Identity::Server(MessageId(4))));
        assert_eq!(
            Identity::of(&msg(0, Some("c"))),
            Some(Identity::Client("c".into()))
        );
        assert_eq!(Identity::of(&msg(0, None)), None);
    }

    #[test]
    fn test_same_message() {
        assert!(same_message(&msg(4, None), &msg(4, Some("x"))));
        assert!(same_message(&msg(0, Some("x")), &msg(9, Some("x"))));
        assert!(!same_message(&msg(0, None), &msg(0, None)));
        assert!(!same_message(&msg(3, Some("a")), &msg(4, Some("b"))));
    }

    #[test]
    fn test_tie_break_is_deterministic() {
        let mut forward = vec![msg(2, None), msg(1, None), msg(0, Some("zz"))];
        let mut backward = forward.clone();
        backward.reverse();

        sort_messages(&mut forward);
        sort_messages(&mut backward);
        assert_eq!(forward, backward);

        let keys: Vec<_> = forward.iter().map(tie_key).collect();
        assert_eq!(keys, vec!["1", "2", "zz"]);
    }
}
