//! Merge engine.

use log::debug;

use super::identity::{same_message, sort_messages, Identity};
use crate::models::{ClearedFields, DeliveryStatus, Message};

/// What a merge did to the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The message was new and appended.
    Inserted,
    /// An existing entry was replaced by the union.
    Updated,
    /// The list already held this exact message.
    Unchanged,
}

/// Merge `incoming` into a copy of `list`.
pub fn merge(list: &[Message], incoming: Message) -> Vec<Message> {
    let mut merged = list.to_vec();
    merge_into(&mut merged, incoming);
    merged
}

/// Merge a batch in order.
pub fn merge_all(list: &[Message], incoming: impl IntoIterator<Item = Message>) -> Vec<Message> {
    let mut merged = list.to_vec();
    for message in incoming {
        merge_into(&mut merged, message);
    }
    merged
}

/// Merge `incoming` into `list` in place and re-sort.
///
/// Applying the same message twice leaves the list as after the first
/// application.
pub fn merge_into(list: &mut Vec<Message>, mut incoming: Message) -> MergeOutcome {
    if Identity::of(&incoming).is_none() {
        incoming.cleared = ClearedFields::default();
        if list.iter().any(|m| *m == incoming) {
            return MergeOutcome::Unchanged;
        }
        list.push(incoming);
        sort_messages(list);
        return MergeOutcome::Inserted;
    }

    let matches: Vec<usize> = list
        .iter()
        .enumerate()
        .filter(|(_, m)| same_message(m, &incoming))
        .map(|(i, _)| i)
        .collect();

    let Some((&first, rest)) = matches.split_first() else {
        incoming.cleared = ClearedFields::default();
        list.push(incoming);
        sort_messages(list);
        return MergeOutcome::Inserted;
    };

    if !incoming.is_confirmed() && list[first].is_confirmed() {
        debug!(
            "ignoring unconfirmed echo of message {} in thread {}",
            list[first].id, list[first].thread_id
        );
        return MergeOutcome::Unchanged;
    }

    let merged = union(&list[first], incoming);
    let outcome = if rest.is_empty() && list[first] == merged {
        MergeOutcome::Unchanged
    } else {
        MergeOutcome::Updated
    };
    list[first] = merged;

    // An id match and a client id match can point at two entries when the
    // confirmation for one arrived before its optimistic copy was merged.
    for &index in rest.iter().rev() {
        debug!(
            "collapsing duplicate entry for message {} in thread {}",
            list[first].id, list[first].thread_id
        );
        list.remove(index);
    }

    if outcome == MergeOutcome::Updated {
        sort_messages(list);
    }
    outcome
}

/// Shallow union of `existing` overridden by `incoming`.
///
/// Scalar fields take the incoming value. Optional fields keep the existing
/// value when the incoming record omitted them and are emptied when it set
/// them to `null`.
pub fn union(existing: &Message, incoming: Message) -> Message {
    let cleared = incoming.cleared;
    let delivery_status = resolve_status(existing, &incoming);

    Message {
        id: if incoming.id.is_assigned() {
            incoming.id
        } else {
            existing.id
        },
        thread_id: if incoming.thread_id.is_assigned() {
            incoming.thread_id
        } else {
            existing.thread_id
        },
        client_id: pick(incoming.client_id, &existing.client_id, cleared.client_id),
        sender_id: if incoming.sender_id.is_assigned() {
            incoming.sender_id
        } else {
            existing.sender_id
        },
        sender_role: incoming.sender_role,
        content: incoming.content,
        kind: incoming.kind,
        quote_id: pick(incoming.quote_id, &existing.quote_id, cleared.quote_id),
        attachment: pick(incoming.attachment, &existing.attachment, cleared.attachment),
        visibility: incoming.visibility,
        is_read: incoming.is_read,
        reply_to_id: pick(incoming.reply_to_id, &existing.reply_to_id, cleared.reply_to_id),
        reply_to_preview: pick(
            incoming.reply_to_preview,
            &existing.reply_to_preview,
            cleared.reply_to_preview,
        ),
        reactions: if !incoming.reactions.is_empty() || cleared.reactions {
            incoming.reactions
        } else {
            existing.reactions.clone()
        },
        my_reactions: if !incoming.my_reactions.is_empty() || cleared.my_reactions {
            incoming.my_reactions
        } else {
            existing.my_reactions.clone()
        },
        created_at: incoming.created_at,
        delivery_status,
        cleared: ClearedFields::default(),
    }
}

/// Mark the optimistic entry with `client_id` as failed.
///
/// Confirmed entries are left alone. Returns whether an entry changed.
pub fn mark_failed(list: &mut [Message], client_id: &str) -> bool {
    let Some(entry) = list
        .iter_mut()
        .find(|m| m.client_id.as_deref() == Some(client_id) && !m.is_confirmed())
    else {
        return false;
    };
    if entry.delivery_status == DeliveryStatus::Failed {
        return false;
    }
    entry.delivery_status = DeliveryStatus::Failed;
    true
}

fn pick<T: Clone>(incoming: Option<T>, existing: &Option<T>, cleared: bool) -> Option<T> {
    match incoming {
        Some(value) => Some(value),
        None if cleared => None,
        None => existing.clone(),
    }
}

/// A server-confirmed record clears pending states. An unconfirmed echo
/// never changes the status of an entry the server already confirmed.
fn resolve_status(existing: &Message, incoming: &Message) -> DeliveryStatus {
    if incoming.is_confirmed() {
        if incoming.delivery_status.is_pending() {
            DeliveryStatus::Sent
        } else {
            incoming.delivery_status
        }
    } else if existing.is_confirmed() {
        existing.delivery_status
    } else {
        incoming.delivery_status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attachment, MessageId, Role, ThreadId, UserId};
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn confirmed(id: i64, secs: i64) -> Message {
        Message {
            id: MessageId(id),
            thread_id: ThreadId(1),
            sender_id: UserId(2),
            content: format!("message {}", id),
            created_at: at(secs),
            ..Default::default()
        }
    }

    fn local(client_id: &str, secs: i64) -> Message {
        Message::local(ThreadId(1), client_id, UserId(2), Role::Client, "hello", at(secs))
    }

    #[test]
    fn test_merge_is_idempotent() {
        let list = vec![confirmed(1, 0), local("abc", 5), confirmed(3, 10)];
        let incoming = Message {
            client_id: Some("abc".into()),
            ..confirmed(2, 6)
        };

        let once = merge(&list, incoming.clone());
        let twice = merge(&once, incoming);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_idempotent_for_new_and_anonymous_messages() {
        let list = vec![confirmed(1, 0)];
        for incoming in [confirmed(9, 3), Message { content: "anon".into(), ..Default::default() }] {
            let once = merge(&list, incoming.clone());
            assert_eq!(merge(&once, incoming), once);
        }
    }

    #[test]
    fn test_optimistic_collapses_into_confirmed() {
        let list = merge(&[], local("abc", 0));
        assert_eq!(list[0].delivery_status, DeliveryStatus::Sending);

        let server = Message {
            client_id: Some("abc".into()),
            ..confirmed(42, 1)
        };
        let list = merge(&list, server);

        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, MessageId(42));
        assert_eq!(list[0].delivery_status, DeliveryStatus::Sent);
    }

    #[test]
    fn test_confirmed_with_pending_flag_is_sent() {
        let list = vec![local("abc", 0)];
        let server = Message {
            client_id: Some("abc".into()),
            delivery_status: DeliveryStatus::Sending,
            ..confirmed(42, 0)
        };
        let list = merge(&list, server);
        assert_eq!(list[0].delivery_status, DeliveryStatus::Sent);
    }

    #[test]
    fn test_late_optimistic_echo_does_not_downgrade() {
        let server = Message {
            client_id: Some("abc".into()),
            ..confirmed(42, 1)
        };
        let list = merge(&[], server);
        let before = list.clone();
        let list = merge(&list, local("abc", 0));

        assert_eq!(list, before);
        assert_eq!(list[0].delivery_status, DeliveryStatus::Sent);
    }

    #[test]
    fn test_duplicate_entries_collapse() {
        // Confirmation without client id arrived first, then the optimistic
        // copy, then a confirmation carrying both.
        let list = vec![confirmed(42, 1), local("abc", 0)];
        let both = Message {
            client_id: Some("abc".into()),
            ..confirmed(42, 1)
        };
        let list = merge(&list, both);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].client_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_tie_order_independent_of_insertion() {
        let a = confirmed(10, 0);
        let b = confirmed(11, 0);
        let ab = merge(&merge(&[], a.clone()), b.clone());
        let ba = merge(&merge(&[], b), a);
        assert_eq!(ab, ba);
        assert_eq!(ab[0].id, MessageId(10));
    }

    #[test]
    fn test_late_earlier_message_resorts() {
        let list = merge_all(&[], vec![confirmed(1, 0), confirmed(3, 20)]);
        let list = merge(&list, confirmed(2, 10));
        let ids: Vec<_> = list.iter().map(|m| m.id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_omitted_fields_kept_and_nulls_clear() {
        let mut existing = confirmed(5, 0);
        existing.reply_to_id = Some(MessageId(4));
        existing.reply_to_preview = Some("earlier".into());
        existing.attachment = Some(Attachment {
            url: "https://cdn.example/a.png".into(),
            ..Default::default()
        });
        existing.reactions.insert("👍".into(), 1);

        let omitted = confirmed(5, 0);
        let kept = merge(&[existing.clone()], omitted);
        assert_eq!(kept[0].reply_to_id, Some(MessageId(4)));
        assert!(kept[0].attachment.is_some());
        assert_eq!(kept[0].reactions.get("👍"), Some(&1));

        let mut nulled = confirmed(5, 0);
        nulled.cleared.reply_to_id = true;
        nulled.cleared.reply_to_preview = true;
        nulled.cleared.reactions = true;
        let cleared = merge(&[existing], nulled.clone());
        assert_eq!(cleared[0].reply_to_id, None);
        assert_eq!(cleared[0].reply_to_preview, None);
        assert!(cleared[0].reactions.is_empty());
        assert!(cleared[0].attachment.is_some());
        assert!(!cleared[0].cleared.any());
        assert_eq!(merge(&cleared, nulled), cleared);
    }

    #[test]
    fn test_merge_outcomes() {
        let mut list = Vec::new();
        assert_eq!(merge_into(&mut list, confirmed(1, 0)), MergeOutcome::Inserted);
        assert_eq!(merge_into(&mut list, confirmed(1, 0)), MergeOutcome::Unchanged);
        let mut edited = confirmed(1, 0);
        edited.content = "edited".into();
        assert_eq!(merge_into(&mut list, edited), MergeOutcome::Updated);
    }

    #[test]
    fn test_mark_failed() {
        let mut list = vec![local("abc", 0), confirmed(7, 1)];
        assert!(mark_failed(&mut list, "abc"));
        assert_eq!(list[0].delivery_status, DeliveryStatus::Failed);
        assert!(!mark_failed(&mut list, "abc"));
        assert!(!mark_failed(&mut list, "missing"));
    }
}
