//! Stable keys for rendered message groups.
//!
//! List-diffing presentation layers match rows by key. A group keeps its key
//! across render passes as long as its signature is unchanged, and a group
//! led by a confirmed message keeps the same key even while it grows, since
//! the key is taken from the first message's server id.

use chrono::Duration;
use serde::{Serialize, Serializer};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::models::{Message, MessageId};
use crate::reconcile::Identity;

/// A maximal run of adjacent messages rendered together.
#[derive(Debug, Clone, Copy)]
pub struct MessageGroup<'a> {
    pub messages: &'a [Message],
    /// Whether a day divider is rendered above this group.
    pub day_divider: bool,
}

impl<'a> MessageGroup<'a> {
    pub fn new(messages: &'a [Message], day_divider: bool) -> Self {
        Self {
            messages,
            day_divider,
        }
    }

    /// Signature used to recognise this group across passes.
    pub fn signature(&self) -> GroupSignature {
        let label = |m: Option<&Message>| {
            m.and_then(Identity::of)
                .map(|id| id.to_string())
                .unwrap_or_default()
        };
        GroupSignature {
            first: label(self.messages.first()),
            last: label(self.messages.last()),
            size: self.messages.len(),
            day_divider: self.day_divider,
        }
    }
}

/// `(first message, last message, size, day divider)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupSignature {
    pub first: String,
    pub last: String,
    pub size: usize,
    pub day_divider: bool,
}

/// Render key of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    /// Server id of the group's first message.
    Message(MessageId),
    /// Drawn from the fallback counter for unconfirmed groups.
    Local(u64),
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Message(id) => write!(f, "m{}", id),
            GroupKey::Local(n) => write!(f, "l{}", n),
        }
    }
}

impl Serialize for GroupKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Caller-owned signature to key map, kept across render passes.
pub type SignatureMap = HashMap<GroupSignature, GroupKey>;

/// Assign a key to each group.
///
/// Known signatures reuse their key. New signatures take the first
/// message's id when it is confirmed, otherwise the next counter value.
/// Keys are unique within one call.
pub fn assign_keys(
    groups: &[MessageGroup<'_>],
    signatures: &mut SignatureMap,
    counter: &mut u64,
) -> Vec<GroupKey> {
    let mut used = HashSet::with_capacity(groups.len());
    let mut keys = Vec::with_capacity(groups.len());

    for group in groups {
        let signature = group.signature();
        let key = match signatures.get(&signature) {
            Some(key) if !used.contains(key) => *key,
            _ => {
                let key = match group.messages.first().map(|m| m.id) {
                    Some(id) if id.is_assigned() && !used.contains(&GroupKey::Message(id)) => {
                        GroupKey::Message(id)
                    }
                    _ => {
                        *counter += 1;
                        GroupKey::Local(*counter)
                    }
                };
                signatures.insert(signature, key);
                key
            }
        };
        used.insert(key);
        keys.push(key);
    }
    keys
}

/// Owns the signature map and counter for one conversation view.
#[derive(Debug, Default, Clone)]
pub struct GroupKeyAssigner {
    signatures: SignatureMap,
    counter: u64,
    last_pass: HashSet<GroupSignature>,
}

impl GroupKeyAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign keys for one render pass.
    pub fn assign(&mut self, groups: &[MessageGroup<'_>]) -> Vec<GroupKey> {
        self.last_pass = groups.iter().map(MessageGroup::signature).collect();
        assign_keys(groups, &mut self.signatures, &mut self.counter)
    }

    /// Forget signatures not seen in the last pass.
    pub fn retain_seen(&mut self) {
        let seen = &self.last_pass;
        self.signatures.retain(|sig, _| seen.contains(sig));
    }

    /// Number of remembered signatures.
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

/// Default adjacency rule: consecutive messages from the same sender within
/// `window` of each other on the same UTC day. System messages stand alone.
pub fn group_messages(messages: &[Message], window: Duration) -> Vec<MessageGroup<'_>> {
    let mut groups = Vec::new();
    let mut start = 0;

    for i in 1..=messages.len() {
        let split = match messages.get(i) {
            None => true,
            Some(cur) => {
                let prev = &messages[i - 1];
                cur.is_system()
                    || prev.is_system()
                    || cur.sender_id != prev.sender_id
                    || cur.created_at.date_naive() != prev.created_at.date_naive()
                    || cur.created_at - prev.created_at > window
            }
        };
        if split {
            let day_divider = start == 0
                || messages[start].created_at.date_naive()
                    != messages[start - 1].created_at.date_naive();
            groups.push(MessageGroup::new(&messages[start..i], day_divider));
            start = i;
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageKind, UserId};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn msg(id: i64, sender: i64, secs: i64) -> Message {
        Message {
            id: MessageId(id),
            sender_id: UserId(sender),
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            ..Default::default()
        }
    }

    fn pending(client_id: &str, sender: i64, secs: i64) -> Message {
        Message {
            client_id: Some(client_id.into()),
            ..msg(0, sender, secs)
        }
    }

    #[test]
    fn test_keys_stable_across_passes() {
        let messages = vec![msg(1, 1, 0), msg(2, 2, 10), pending("a", 1, 20)];
        let groups = group_messages(&messages, Duration::minutes(5));
        let mut map = SignatureMap::new();
        let mut counter = 0;

        let first = assign_keys(&groups, &mut map, &mut counter);
        let second = assign_keys(&groups, &mut map, &mut counter);
        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![
                GroupKey::Message(MessageId(1)),
                GroupKey::Message(MessageId(2)),
                GroupKey::Local(1)
            ]
        );
    }

    #[test]
    fn test_appending_group_preserves_prior_keys() {
        let mut messages = vec![msg(1, 1, 0), pending("a", 2, 10)];
        let mut assigner = GroupKeyAssigner::new();
        let before = assigner.assign(&group_messages(&messages, Duration::minutes(5)));

        messages.push(msg(7, 1, 20));
        let after = assigner.assign(&group_messages(&messages, Duration::minutes(5)));

        assert_eq!(&after[..before.len()], &before[..]);
        assert_eq!(after[2], GroupKey::Message(MessageId(7)));
    }

    #[test]
    fn test_growing_confirmed_group_keeps_key() {
        let mut messages = vec![msg(1, 1, 0)];
        let mut assigner = GroupKeyAssigner::new();
        let before = assigner.assign(&group_messages(&messages, Duration::minutes(5)));
        messages.push(msg(2, 1, 30));
        let after = assigner.assign(&group_messages(&messages, Duration::minutes(5)));
        assert_eq!(after, before);
    }

    #[test]
    fn test_keys_unique_within_pass() {
        let a = [pending("a", 1, 0)];
        let b = [pending("b", 2, 0)];
        let groups = [MessageGroup::new(&a, true), MessageGroup::new(&b, false)];
        let mut map = SignatureMap::new();
        // Poison the map so both signatures point at the same key.
        map.insert(groups[0].signature(), GroupKey::Local(9));
        map.insert(groups[1].signature(), GroupKey::Local(9));
        let mut counter = 9;

        let keys = assign_keys(&groups, &mut map, &mut counter);
        assert_eq!(keys, vec![GroupKey::Local(9), GroupKey::Local(10)]);
    }

    #[test]
    fn test_group_messages_rules() {
        let mut system = msg(5, 1, 40);
        system.kind = MessageKind::System;
        let messages = vec![
            msg(1, 1, 0),
            msg(2, 1, 60),
            msg(3, 1, 60 * 20),
            system,
            msg(6, 1, 86_400),
        ];
        let groups = group_messages(&messages, Duration::minutes(5));
        let sizes: Vec<usize> = groups.iter().map(|g| g.messages.len()).collect();
        let dividers: Vec<bool> = groups.iter().map(|g| g.day_divider).collect();
        assert_eq!(sizes, vec![2, 1, 1, 1]);
        assert_eq!(dividers, vec![true, false, false, true]);
    }

    #[test]
    fn test_retain_seen() {
        let mut assigner = GroupKeyAssigner::new();
        let old = [msg(1, 1, 0)];
        let new = [msg(2, 1, 0)];
        assigner.assign(&[MessageGroup::new(&old, true)]);
        assigner.assign(&[MessageGroup::new(&new, true)]);
        assert_eq!(assigner.len(), 2);
        assigner.retain_seen();
        assert_eq!(assigner.len(), 1);
    }

    #[test]
    fn test_key_display() {
        assert_eq!(GroupKey::Message(MessageId(4)).to_string(), "m4");
        assert_eq!(serde_json::to_string(&GroupKey::Local(2)).unwrap(), "\"l2\"");
    }
}
