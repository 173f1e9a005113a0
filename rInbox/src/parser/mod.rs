//! Parsers for inbound payloads.

pub mod normalize;
pub mod timestamp;

pub use normalize::{
    coerce_int, normalize, normalize_at, normalize_batch, normalize_str, Field, RawRecord,
};
pub use timestamp::{parse_timestamp, parse_timestamp_str};
