//! Inbox session: the stores of one signed-in viewer.

mod config;

pub use config::SessionConfig;

use chrono::Utc;
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::{MemoryStorage, ScopeKey, SessionStorage, ThreadCache};
use crate::error::{Error, Result};
use crate::grouping::{group_messages, GroupKey, GroupKeyAssigner};
use crate::models::{Message, Role, ThreadId, ThreadSummary, UserId};
use crate::parser::{normalize, normalize_batch};
use crate::reconcile::{self, MergeOutcome};
use crate::stubs::{EphemeralStub, StubStore};
use crate::telemetry::{
    emission_payload, CacheOutcome, LogSink, SwitchMeta, SwitchPhase, SwitchSnapshot,
    SwitchTracker, TelemetrySink,
};

/// Builder for creating an InboxSession.
pub struct InboxSessionBuilder {
    viewer: Option<ScopeKey>,
    storage: Option<Arc<dyn SessionStorage>>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    config: SessionConfig,
}

impl std::fmt::Debug for InboxSessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboxSessionBuilder")
            .field("viewer", &self.viewer)
            .field("storage", &self.storage.as_ref().map(|_| "..."))
            .field("config", &self.config)
            .finish()
    }
}

impl Default for InboxSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InboxSessionBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            viewer: None,
            storage: None,
            telemetry: None,
            config: SessionConfig::default(),
        }
    }

    /// Set the signed-in viewer.
    pub fn viewer(mut self, role: Role, viewer_id: impl Into<UserId>) -> Self {
        self.viewer = Some(ScopeKey::new(role, viewer_id));
        self
    }

    /// Set durable storage for the thread cache.
    pub fn storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the telemetry sink.
    pub fn telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the thread cache bound.
    pub fn max_cached_threads(mut self, max: usize) -> Self {
        self.config.max_cached_threads = max;
        self
    }

    /// Set the per-thread stub bound.
    pub fn stub_capacity(mut self, capacity: usize) -> Self {
        self.config.stub_capacity = capacity;
        self
    }

    /// Build the session.
    pub fn build(self) -> Result<InboxSession> {
        let scope = self
            .viewer
            .ok_or_else(|| Error::invalid("viewer is required"))?;
        if !scope.viewer_id.is_assigned() {
            return Err(Error::invalid(format!("invalid viewer id {}", scope.viewer_id)));
        }

        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));

        Ok(InboxSession {
            scope,
            threads: HashMap::new(),
            stubs: StubStore::with_capacity(self.config.stub_capacity),
            cache: ThreadCache::with_max_threads(storage, self.config.max_cached_threads),
            switches: SwitchTracker::new(),
            telemetry: self.telemetry.unwrap_or_else(|| Arc::new(LogSink)),
            config: self.config,
        })
    }
}

#[derive(Debug, Default)]
struct ThreadState {
    messages: Vec<Message>,
    keys: GroupKeyAssigner,
}

/// All client-held inbox state for one viewer.
///
/// Create one at sign-in and call [`reset`](Self::reset) on sign-out or
/// account switch.
#[derive(Debug)]
pub struct InboxSession {
    scope: ScopeKey,
    config: SessionConfig,
    threads: HashMap<ThreadId, ThreadState>,
    stubs: StubStore<Message>,
    cache: ThreadCache,
    switches: SwitchTracker,
    telemetry: Arc<dyn TelemetrySink>,
}

impl InboxSession {
    /// Create a new session builder.
    pub fn builder() -> InboxSessionBuilder {
        InboxSessionBuilder::new()
    }

    /// The viewer scope of this session.
    pub fn scope(&self) -> &ScopeKey {
        &self.scope
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Normalize and merge one raw payload.
    ///
    /// Returns `None` when the payload names no valid thread.
    pub fn ingest(&mut self, raw: &Value) -> Option<MergeOutcome> {
        self.ingest_message(normalize(raw))
    }

    /// Normalize and merge an API page. Returns how many messages changed
    /// the thread state.
    pub fn ingest_batch(&mut self, raw: &Value) -> usize {
        normalize_batch(raw)
            .into_iter()
            .filter_map(|m| self.ingest_message(m))
            .filter(|outcome| *outcome != MergeOutcome::Unchanged)
            .count()
    }

    /// Merge an already normalized message.
    pub fn ingest_message(&mut self, message: Message) -> Option<MergeOutcome> {
        let thread_id = message.thread_id;
        if !thread_id.is_assigned() {
            debug!("dropping message {} without thread", message.id);
            return None;
        }

        let confirmed_client_id = message
            .client_id
            .clone()
            .filter(|_| message.is_confirmed());
        let message_id = message.id;
        let probe = message.clone();

        let state = self.threads.entry(thread_id).or_default();
        let outcome = reconcile::merge_into(&mut state.messages, message);

        if let Some(client_id) = confirmed_client_id {
            self.stubs.remove_where(thread_id, |stub| {
                stub.client_id.as_deref() == Some(client_id.as_str())
            });
        }

        let merged = self.threads.get(&thread_id).and_then(|state| {
            let last = state.messages.len().checked_sub(1)?;
            state
                .messages
                .iter()
                .enumerate()
                .find(|(_, m)| reconcile::same_message(m, &probe))
                .map(|(i, m)| (m.clone(), i == last))
        });

        match (outcome, merged) {
            (MergeOutcome::Inserted, Some((merged, _))) => self.record_summary_message(&merged),
            (MergeOutcome::Inserted, None) => self.record_summary_message(&probe),
            // Edits and confirmations of the latest message refresh the
            // preview without counting as unread.
            (MergeOutcome::Updated, Some((merged, true))) => self.refresh_summary(&merged),
            _ => {}
        }

        debug!("thread {}: message {} {:?}", thread_id, message_id, outcome);
        Some(outcome)
    }

    /// Show a local message immediately while the send is in flight.
    ///
    /// Returns `None` for an invalid thread id.
    pub fn send_optimistic(
        &mut self,
        thread_id: ThreadId,
        client_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Option<Message> {
        let message = Message::local(
            thread_id,
            client_id,
            self.scope.viewer_id,
            self.scope.role,
            content,
            Utc::now(),
        );
        if !self.stubs.add_stub(thread_id, message.clone()) {
            return None;
        }

        let state = self.threads.entry(thread_id).or_default();
        reconcile::merge_into(&mut state.messages, message.clone());
        self.record_summary_message(&message);
        Some(message)
    }

    /// Mark a pending send as failed.
    pub fn mark_failed(&mut self, thread_id: ThreadId, client_id: &str) -> bool {
        self.threads
            .get_mut(&thread_id)
            .map_or(false, |state| reconcile::mark_failed(&mut state.messages, client_id))
    }

    /// Ordered messages of a thread.
    pub fn messages(&self, thread_id: ThreadId) -> &[Message] {
        self.threads
            .get(&thread_id)
            .map(|state| state.messages.as_slice())
            .unwrap_or(&[])
    }

    /// Ephemeral stubs of a thread.
    pub fn stubs(&self, thread_id: ThreadId) -> Vec<EphemeralStub<Message>> {
        self.stubs.get_stubs(thread_id)
    }

    /// Stub store, for subscribing to changes.
    pub fn stub_store(&mut self) -> &mut StubStore<Message> {
        &mut self.stubs
    }

    /// Group keys for the thread's current message groups.
    pub fn group_keys(&mut self, thread_id: ThreadId) -> Vec<GroupKey> {
        let window = self.config.group_window();
        match self.threads.get_mut(&thread_id) {
            Some(state) => {
                let groups = group_messages(&state.messages, window);
                let keys = state.keys.assign(&groups);
                state.keys.retain_seen();
                keys
            }
            None => Vec::new(),
        }
    }

    /// Start timing a switch to `thread_id`. Reports whether the thread
    /// could render from memory or the summary cache.
    pub fn open_thread(&mut self, thread_id: ThreadId, source: impl Into<String>) -> CacheOutcome {
        let message_count = self.messages(thread_id).len();
        let cache = if message_count > 0 || self.cache.contains(&self.scope, thread_id) {
            CacheOutcome::Hit
        } else {
            CacheOutcome::Miss
        };

        self.switches.record_switch_start(
            thread_id,
            SwitchMeta {
                source: source.into(),
                cache: Some(cache),
                message_count,
            },
        );
        cache
    }

    /// Record a switch milestone and report it.
    pub fn mark_phase(&mut self, thread_id: ThreadId, phase: SwitchPhase) -> Option<u64> {
        let elapsed = self.switches.mark(thread_id, phase)?;
        if let Some(snapshot) = self.switches.snapshot(thread_id) {
            self.telemetry
                .emit(&emission_payload(phase, &snapshot, Instant::now()));
        }
        if phase == SwitchPhase::Ready {
            self.cache.update(&self.scope, thread_id, ThreadSummary::mark_read);
        }
        Some(elapsed)
    }

    /// The in-flight switch for `thread_id`.
    pub fn switch_snapshot(&self, thread_id: ThreadId) -> Option<SwitchSnapshot> {
        self.switches.snapshot(thread_id)
    }

    /// Drop the in-memory messages of a thread.
    pub fn close_thread(&mut self, thread_id: ThreadId) {
        self.threads.remove(&thread_id);
        if self.switches.snapshot(thread_id).is_some() {
            self.switches.clear();
        }
    }

    /// Conversation list, most recent first.
    pub fn threads(&self) -> Vec<ThreadSummary> {
        self.cache.get_summaries(&self.scope)
    }

    /// Store a summary fetched from the server.
    pub fn upsert_summary(&mut self, summary: ThreadSummary) -> bool {
        self.cache.upsert(&self.scope, summary)
    }

    /// Remove a summary from the conversation list.
    pub fn remove_summary(&mut self, thread_id: ThreadId) -> Option<ThreadSummary> {
        self.cache.remove(&self.scope, thread_id)
    }

    /// Drop the conversation list from memory and durable storage.
    pub fn forget_threads(&mut self) {
        self.cache.forget(&self.scope);
    }

    /// Load the conversation list from durable storage.
    pub fn hydrate(&mut self) -> bool {
        self.cache.hydrate(&self.scope)
    }

    /// Write the conversation list to durable storage.
    pub fn persist(&self) -> Result<()> {
        self.cache.persist(&self.scope)
    }

    /// Drop all in-memory state. Durable storage is left alone.
    pub fn reset(&mut self) {
        self.threads.clear();
        self.stubs.clear_all();
        self.cache.clear();
        self.switches.clear();
    }

    fn refresh_summary(&mut self, message: &Message) {
        let updated = self
            .cache
            .update(&self.scope, message.thread_id, |s| s.show_latest(message));
        if !updated {
            let mut summary = ThreadSummary::new(message.thread_id);
            summary.show_latest(message);
            self.cache.upsert(&self.scope, summary);
        }
    }

    fn record_summary_message(&mut self, message: &Message) {
        let viewer = self.scope.viewer_id;
        let updated = self
            .cache
            .update(&self.scope, message.thread_id, |s| s.apply_message(message, viewer));
        if !updated {
            let mut summary = ThreadSummary::new(message.thread_id);
            summary.apply_message(message, viewer);
            self.cache.upsert(&self.scope, summary);
        }
    }
}
