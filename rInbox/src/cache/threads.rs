//! Per-viewer thread summary cache.
//!
//! The cache only shortens perceived latency when the conversation list is
//! opened. It is never authoritative: summaries fetched from the server
//! always replace cached ones, and hydrated data never replaces summaries
//! already in memory.

use log::{debug, warn};
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::traits::{SessionStorage, SessionStorageExt};
use crate::error::Result;
use crate::models::{Role, ThreadId, ThreadSummary, UserId};

/// Threads kept per scope by default.
pub const DEFAULT_MAX_THREADS: usize = 50;

const STORAGE_PREFIX: &str = "inbox:threadsCache:v2";

/// Isolates cached state per viewer identity and role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    /// Role the viewer signed in as.
    pub role: Role,
    /// Signed-in user.
    pub viewer_id: UserId,
}

impl ScopeKey {
    /// Create a scope key.
    pub fn new(role: Role, viewer_id: impl Into<UserId>) -> Self {
        Self {
            role,
            viewer_id: viewer_id.into(),
        }
    }

    /// Key under which this scope is persisted.
    pub fn storage_key(&self) -> String {
        format!("{}:{}:{}", STORAGE_PREFIX, self.role, self.viewer_id)
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.viewer_id)
    }
}

#[derive(Debug, Clone)]
struct CachedEntry {
    summary: ThreadSummary,
    touched: u64,
}

/// Bounded cache of thread summaries keyed by [`ScopeKey`].
pub struct ThreadCache {
    storage: Arc<dyn SessionStorage>,
    scopes: HashMap<ScopeKey, HashMap<ThreadId, CachedEntry>>,
    max_threads: usize,
    clock: u64,
}

impl fmt::Debug for ThreadCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadCache")
            .field("storage", &self.storage)
            .field("scopes", &self.scopes.len())
            .field("max_threads", &self.max_threads)
            .finish()
    }
}

impl ThreadCache {
    /// Create a cache backed by `storage`.
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self::with_max_threads(storage, DEFAULT_MAX_THREADS)
    }

    /// Create a cache keeping at most `max_threads` summaries per scope.
    pub fn with_max_threads(storage: Arc<dyn SessionStorage>, max_threads: usize) -> Self {
        Self {
            storage,
            scopes: HashMap::new(),
            max_threads: max_threads.max(1),
            clock: 0,
        }
    }

    /// Summaries for a scope, most recent activity first.
    pub fn get_summaries(&self, scope: &ScopeKey) -> Vec<ThreadSummary> {
        let mut summaries: Vec<ThreadSummary> = self
            .scopes
            .get(scope)
            .map(|entries| entries.values().map(|e| e.summary.clone()).collect())
            .unwrap_or_default();

        summaries.sort_by(|a, b| {
            b.activity_at()
                .cmp(&a.activity_at())
                .then_with(|| b.thread_id.cmp(&a.thread_id))
        });
        summaries
    }

    /// Get one summary.
    pub fn get(&self, scope: &ScopeKey, thread_id: ThreadId) -> Option<&ThreadSummary> {
        self.scopes
            .get(scope)
            .and_then(|entries| entries.get(&thread_id))
            .map(|e| &e.summary)
    }

    /// Whether a summary for the thread is cached.
    pub fn contains(&self, scope: &ScopeKey, thread_id: ThreadId) -> bool {
        self.get(scope, thread_id).is_some()
    }

    /// Number of cached summaries in a scope.
    pub fn len(&self, scope: &ScopeKey) -> usize {
        self.scopes.get(scope).map_or(0, HashMap::len)
    }

    /// Whether a scope has no cached summaries.
    pub fn is_empty(&self, scope: &ScopeKey) -> bool {
        self.len(scope) == 0
    }

    /// Insert or replace the summary for its thread.
    ///
    /// Returns `false` for a summary without a valid thread id.
    pub fn upsert(&mut self, scope: &ScopeKey, summary: ThreadSummary) -> bool {
        if !summary.is_valid() {
            debug!("ignoring summary without thread id in scope {}", scope);
            return false;
        }

        let touched = self.tick();
        self.scopes.entry(*scope).or_default().insert(
            summary.thread_id,
            CachedEntry { summary, touched },
        );
        self.evict(scope);
        true
    }

    /// Apply `f` to a cached summary if present.
    pub fn update<F>(&mut self, scope: &ScopeKey, thread_id: ThreadId, f: F) -> bool
    where
        F: FnOnce(&mut ThreadSummary),
    {
        let touched = self.tick();
        match self
            .scopes
            .get_mut(scope)
            .and_then(|entries| entries.get_mut(&thread_id))
        {
            Some(entry) => {
                f(&mut entry.summary);
                entry.summary.thread_id = thread_id;
                entry.touched = touched;
                true
            }
            None => false,
        }
    }

    /// Remove one summary.
    pub fn remove(&mut self, scope: &ScopeKey, thread_id: ThreadId) -> Option<ThreadSummary> {
        self.scopes
            .get_mut(scope)
            .and_then(|entries| entries.remove(&thread_id))
            .map(|e| e.summary)
    }

    /// Load a scope from durable storage.
    ///
    /// Returns whether any stored summary was added to memory. A missing,
    /// non-JSON or non-array payload leaves the cache untouched; malformed
    /// entries are skipped. Summaries already in memory are kept over stored
    /// ones.
    pub fn hydrate(&mut self, scope: &ScopeKey) -> bool {
        let key = scope.storage_key();
        let Some(raw) = self.storage.get(&key) else {
            return false;
        };

        let items = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                warn!("discarding thread cache {}: not an array", key);
                return false;
            }
            Err(e) => {
                warn!("discarding thread cache {}: {}", key, e);
                return false;
            }
        };

        let total = items.len();
        let mut loaded: Vec<ThreadSummary> = Vec::with_capacity(total);
        for item in items {
            match serde_json::from_value::<ThreadSummary>(item) {
                Ok(summary)
                    if summary.is_valid()
                        && !loaded.iter().any(|s| s.thread_id == summary.thread_id) =>
                {
                    loaded.push(summary)
                }
                _ => continue,
            }
        }

        if loaded.len() < total {
            debug!(
                "skipped {} malformed cached summaries in {}",
                total - loaded.len(),
                key
            );
        }
        if loaded.is_empty() {
            return false;
        }

        // Stored order is most recent first; older entries get older ticks.
        let mut inserted = 0;
        for summary in loaded.into_iter().rev() {
            let touched = self.tick();
            let entries = self.scopes.entry(*scope).or_default();
            if let Entry::Vacant(slot) = entries.entry(summary.thread_id) {
                slot.insert(CachedEntry { summary, touched });
                inserted += 1;
            }
        }
        self.evict(scope);
        inserted > 0
    }

    /// Write a scope to durable storage.
    pub fn persist(&self, scope: &ScopeKey) -> Result<()> {
        self.storage
            .set_json(&scope.storage_key(), &self.get_summaries(scope))
    }

    /// Drop a scope from memory.
    pub fn clear_scope(&mut self, scope: &ScopeKey) {
        self.scopes.remove(scope);
    }

    /// Drop a scope from memory and durable storage.
    pub fn forget(&mut self, scope: &ScopeKey) {
        self.scopes.remove(scope);
        self.storage.remove(&scope.storage_key());
    }

    /// Drop every scope from memory.
    pub fn clear(&mut self) {
        self.scopes.clear();
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict(&mut self, scope: &ScopeKey) {
        let Some(entries) = self.scopes.get_mut(scope) else {
            return;
        };
        while entries.len() > self.max_threads {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.touched)
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    debug!("evicting thread {} from cache scope {}", id, scope);
                    entries.remove(&id);
                }
                None => break,
            }
        }
    }
}
