//! Type-safe ID wrappers.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Create a new ID.
            pub fn new(id: i64) -> Self {
                $name(id)
            }

            /// Check if this ID has been assigned (positive).
            pub fn is_assigned(&self) -> bool {
                self.0 > 0
            }

            /// Get the inner integer.
            pub fn get(&self) -> i64 {
                self.0
            }

            /// Parse from a numeric-looking string, accepting float forms like `"12.0"`.
            pub fn parse(s: &str) -> Option<Self> {
                parse_id(s).map($name)
            }
        }

        impl From<i64> for $name {
            fn from(n: i64) -> Self {
                $name(n)
            }
        }

        impl From<i32> for $name {
            fn from(n: i32) -> Self {
                $name(n as i64)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(MessageId, "A server-assigned message identifier; `0` means unconfirmed.");
define_id!(ThreadId, "A conversation (booking request) identifier.");
define_id!(UserId, "A user identifier.");

/// Parse an integer id from text. Finite whole floats are accepted.
pub(crate) fn parse_id(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<i64>() {
        return Some(n);
    }
    let f: f64 = s.parse().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_creation() {
        let id = ThreadId::new(12345);
        assert_eq!(id.get(), 12345);
        assert_eq!(format!("{}", id), "12345");
    }

    #[test]
    fn test_id_is_assigned() {
        assert!(!MessageId::default().is_assigned());
        assert!(!MessageId::new(-3).is_assigned());
        assert!(MessageId::new(42).is_assigned());
    }

    #[test]
    fn test_id_parse() {
        assert_eq!(MessageId::parse(" 42 "), Some(MessageId(42)));
        assert_eq!(MessageId::parse("42.0"), Some(MessageId(42)));
        assert_eq!(MessageId::parse("42.5"), None);
        assert_eq!(MessageId::parse("abc"), None);
        assert_eq!(MessageId::parse("NaN"), None);
        assert_eq!(MessageId::parse(""), None);
    }

    #[test]
    fn test_id_serde_transparent() {
        let json = serde_json::to_string(&UserId::new(7)).unwrap();
        assert_eq!(json, "7");
        let id: UserId = serde_json::from_str("9").unwrap();
        assert_eq!(id, UserId(9));
    }
}
