//! Session configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_MAX_THREADS;
use crate::stubs::DEFAULT_STUB_CAPACITY;

/// Tunables for an [`InboxSession`](super::InboxSession).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Thread summaries kept in the cache.
    pub max_cached_threads: usize,
    /// Ephemeral stubs kept per thread.
    pub stub_capacity: usize,
    /// Gap that splits two messages from the same sender into separate groups.
    pub group_window_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_cached_threads: DEFAULT_MAX_THREADS,
            stub_capacity: DEFAULT_STUB_CAPACITY,
            group_window_secs: 300,
        }
    }
}

impl SessionConfig {
    /// Grouping window as a duration.
    pub fn group_window(&self) -> Duration {
        Duration::try_seconds(self.group_window_secs.max(0)).unwrap_or(Duration::MAX)
    }
}
