//! Normalization of inbound message payloads.
//!
//! Payloads come from push events, poll responses and older API versions,
//! each with its own field names. Everything is read through [`RawRecord`],
//! which never fails: a missing or malformed field falls back to the
//! documented default.

use chrono::{DateTime, Utc};
use log::trace;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use super::timestamp::parse_timestamp;
use crate::{
    error::Result,
    models::{
        parse_id, Attachment, ClearedFields, DeliveryStatus, Message, MessageId, MessageKind,
        Role, ThreadId, UserId, Visibility,
    },
};

/// State of a field in an untrusted record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<'a> {
    /// Not present at all.
    Absent,
    /// Present as JSON `null`.
    Null,
    /// Present with a value.
    Present(&'a Value),
}

impl<'a> Field<'a> {
    fn value(self) -> Option<&'a Value> {
        match self {
            Field::Present(v) => Some(v),
            _ => None,
        }
    }

    fn is_null(self) -> bool {
        self == Field::Null
    }
}

/// Read-only view over an untrusted inbound record.
#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a> {
    map: Option<&'a Map<String, Value>>,
}

impl<'a> RawRecord<'a> {
    /// Wrap a JSON value. Non-objects behave as an empty record.
    pub fn new(value: &'a Value) -> Self {
        Self {
            map: value.as_object(),
        }
    }

    /// Look up the first of `names` that is present.
    pub fn field(&self, names: &[&str]) -> Field<'a> {
        let Some(map) = self.map else {
            return Field::Absent;
        };
        for name in names {
            match map.get(*name) {
                Some(Value::Null) => return Field::Null,
                Some(v) => return Field::Present(v),
                None => continue,
            }
        }
        Field::Absent
    }

    /// Get a field as an integer, coercing numeric strings.
    pub fn int(&self, names: &[&str]) -> Option<i64> {
        self.field(names).value().and_then(coerce_int)
    }

    /// Get a field as a string, stringifying scalars.
    pub fn string(&self, names: &[&str]) -> Option<String> {
        match self.field(names).value()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Get a field as a boolean; accepts `true`, `1`, `"1"` and `"true"`.
    pub fn bool(&self, names: &[&str]) -> Option<bool> {
        match self.field(names).value()? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" => Some(true),
                "0" | "false" | "" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Coerce a JSON value into an integer.
pub fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => parse_id(s),
        _ => None,
    }
}

/// Normalize an inbound record, defaulting `created_at` to now.
pub fn normalize(raw: &Value) -> Message {
    normalize_at(raw, Utc::now())
}

/// Normalize an inbound record with an explicit fallback instant.
pub fn normalize_at(raw: &Value, now: DateTime<Utc>) -> Message {
    let rec = RawRecord::new(raw);
    let mut cleared = ClearedFields::default();

    let id = rec
        .int(&["id", "message_id"])
        .filter(|n| *n > 0)
        .map(MessageId)
        .unwrap_or_default();

    let thread_id = ThreadId(
        rec.int(&["booking_request_id", "thread_id"])
            .unwrap_or_default(),
    );

    let client_field = rec.field(&["client_id", "client_request_id"]);
    cleared.client_id = client_field.is_null();
    let client_id = rec
        .string(&["client_id", "client_request_id"])
        .filter(|s| !s.trim().is_empty());

    let sender_role = match rec.string(&["sender_type", "sender_role"]) {
        Some(label) => Role::from_label(&label).unwrap_or_else(|| {
            trace!("unknown sender role {:?}, using client", label);
            Role::Client
        }),
        None => Role::Client,
    };

    let kind = match rec.string(&["message_type", "kind"]) {
        Some(label) => MessageKind::from_label(&label).unwrap_or_else(|| {
            trace!("unknown message kind {:?}, using USER", label);
            MessageKind::User
        }),
        None => MessageKind::User,
    };

    let visibility = rec
        .string(&["visible_to", "visibility"])
        .and_then(|label| Visibility::from_label(&label))
        .unwrap_or_default();

    let created_at = rec
        .field(&["timestamp", "created_at", "sent_at"])
        .value()
        .and_then(parse_timestamp)
        .unwrap_or_else(|| {
            trace!("unparsable timestamp on message {}, using now", id);
            now
        });

    cleared.quote_id = rec.field(&["quote_id"]).is_null();
    cleared.attachment = rec.field(&["attachment_url"]).is_null();
    cleared.reply_to_id = rec.field(&["reply_to_message_id", "reply_to_id"]).is_null();
    cleared.reply_to_preview = rec.field(&["reply_to_preview"]).is_null();

    let (reactions, reactions_cleared) = parse_reactions(rec.field(&["reactions"]));
    cleared.reactions = reactions_cleared;
    let (my_reactions, mine_cleared) = parse_my_reactions(rec.field(&["my_reactions"]));
    cleared.my_reactions = mine_cleared;

    Message {
        id,
        thread_id,
        client_id,
        sender_id: UserId(rec.int(&["sender_id"]).unwrap_or_default()),
        sender_role,
        content: rec.string(&["content", "text"]).unwrap_or_default(),
        kind,
        quote_id: rec.int(&["quote_id"]),
        attachment: parse_attachment(&rec),
        visibility,
        is_read: rec.bool(&["is_read"]).unwrap_or(false),
        reply_to_id: rec
            .int(&["reply_to_message_id", "reply_to_id"])
            .filter(|n| *n > 0)
            .map(MessageId),
        reply_to_preview: rec.string(&["reply_to_preview"]),
        reactions,
        my_reactions,
        created_at,
        delivery_status: rec
            .string(&["delivery_status", "local_status"])
            .map(|s| DeliveryStatus::from_label(&s))
            .unwrap_or_default(),
        cleared,
    }
}

/// Normalize raw JSON text. Fails only when the text is not JSON.
pub fn normalize_str(text: &str) -> Result<Message> {
    let value: Value = serde_json::from_str(text)?;
    Ok(normalize(&value))
}

/// Normalize an API page: a bare array, or an object wrapping one under
/// `messages`, `items` or `data`. Non-object entries are skipped.
pub fn normalize_batch(raw: &Value) -> Vec<Message> {
    let items = match raw {
        Value::Array(items) => Some(items),
        Value::Object(map) => ["messages", "items", "data"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array)),
        _ => None,
    };

    let now = Utc::now();
    items
        .map(|items| {
            items
                .iter()
                .filter(|v| v.is_object())
                .map(|v| normalize_at(v, now))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_attachment(rec: &RawRecord<'_>) -> Option<Attachment> {
    let nested = rec.field(&["attachment"]).value().map(RawRecord::new);
    let url = rec
        .string(&["attachment_url"])
        .or_else(|| nested.and_then(|n| n.string(&["url"])))
        .filter(|u| !u.trim().is_empty())?;

    let meta = rec
        .field(&["attachment_meta"])
        .value()
        .map(RawRecord::new)
        .or(nested);

    let mut attachment = Attachment {
        url,
        ..Default::default()
    };
    if let Some(meta) = meta {
        attachment.content_type = meta.string(&["content_type", "contentType", "mime_type"]);
        attachment.filename = meta.string(&["original_filename", "filename", "name"]);
        attachment.size = meta
            .int(&["size", "size_bytes"])
            .and_then(|n| u64::try_from(n).ok());
    }
    Some(attachment)
}

fn parse_reactions(field: Field<'_>) -> (BTreeMap<String, u32>, bool) {
    match field {
        Field::Absent => (BTreeMap::new(), false),
        Field::Null => (BTreeMap::new(), true),
        Field::Present(value) => {
            let map: BTreeMap<String, u32> = value
                .as_object()
                .map(|obj| {
                    obj.iter()
                        .filter_map(|(symbol, count)| {
                            let count = coerce_int(count)?;
                            u32::try_from(count).ok().map(|c| (symbol.clone(), c))
                        })
                        .collect()
                })
                .unwrap_or_default();
            let explicit_empty = map.is_empty() && value.is_object();
            (map, explicit_empty)
        }
    }
}

fn parse_my_reactions(field: Field<'_>) -> (BTreeSet<String>, bool) {
    match field {
        Field::Absent => (BTreeSet::new(), false),
        Field::Null => (BTreeSet::new(), true),
        Field::Present(value) => {
            let set: BTreeSet<String> = value
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_owned))
                        .collect()
                })
                .unwrap_or_default();
            let explicit_empty = set.is_empty() && value.is_array();
            (set, explicit_empty)
        }
    }
}
