//! Ephemeral stub store for optimistic rendering.
//!
//! Stubs bridge the gap between a local send and its confirmation. They
//! live only in memory: after a reload the real outcome of a pending send is
//! unknown, and showing a stale stub would render a ghost message.

use log::debug;
use std::collections::{HashMap, VecDeque};

use crate::models::{Message, ThreadId};

/// Stubs kept per thread by default.
pub const DEFAULT_STUB_CAPACITY: usize = 10;

/// A not-yet-acknowledged entry shown for instant feedback.
#[derive(Debug, Clone, PartialEq)]
pub struct EphemeralStub<P> {
    /// Thread the stub belongs to.
    pub thread_id: ThreadId,
    /// Opaque payload for the presentation layer.
    pub payload: P,
}

/// Notification sent after any mutation of a thread's stubs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubChange {
    /// Thread whose stubs changed.
    pub thread_id: ThreadId,
}

/// Handle returned by [`StubStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(StubChange) + Send>;

struct Subscriber {
    id: SubscriptionId,
    scope: Option<ThreadId>,
    listener: Listener,
}

/// Per-thread bounded store of ephemeral stubs.
pub struct StubStore<P = Message> {
    stubs: HashMap<ThreadId, VecDeque<EphemeralStub<P>>>,
    capacity: usize,
    subscribers: Vec<Subscriber>,
    next_subscription: u64,
}

impl<P> std::fmt::Debug for StubStore<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubStore")
            .field("threads", &self.stubs.len())
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl<P> Default for StubStore<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> StubStore<P> {
    /// Create an empty store with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_STUB_CAPACITY)
    }

    /// Create an empty store keeping at most `capacity` stubs per thread.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stubs: HashMap::new(),
            capacity: capacity.max(1),
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Append a stub, dropping the oldest beyond capacity.
    ///
    /// Returns `false` and does nothing for an unassigned thread id.
    pub fn add_stub(&mut self, thread_id: ThreadId, payload: P) -> bool {
        if !thread_id.is_assigned() {
            debug!("ignoring stub for invalid thread {}", thread_id);
            return false;
        }

        let queue = self.stubs.entry(thread_id).or_default();
        queue.push_back(EphemeralStub { thread_id, payload });
        while queue.len() > self.capacity {
            queue.pop_front();
        }

        self.notify(thread_id);
        true
    }

    /// Stubs for a thread, oldest first.
    pub fn get_stubs(&self, thread_id: ThreadId) -> Vec<EphemeralStub<P>>
    where
        P: Clone,
    {
        self.stubs
            .get(&thread_id)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of stubs held for a thread.
    pub fn len(&self, thread_id: ThreadId) -> usize {
        self.stubs.get(&thread_id).map_or(0, VecDeque::len)
    }

    /// Whether the thread has no stubs.
    pub fn is_empty(&self, thread_id: ThreadId) -> bool {
        self.len(thread_id) == 0
    }

    /// Drop all stubs of a thread.
    pub fn clear_stubs(&mut self, thread_id: ThreadId) {
        if !thread_id.is_assigned() {
            debug!("ignoring clear for invalid thread {}", thread_id);
            return;
        }
        self.stubs.remove(&thread_id);
        self.notify(thread_id);
    }

    /// Drop the stubs of a thread matching `predicate`. Returns how many
    /// were removed; observers are notified only when something changed.
    pub fn remove_where<F>(&mut self, thread_id: ThreadId, mut predicate: F) -> usize
    where
        F: FnMut(&P) -> bool,
    {
        let Some(queue) = self.stubs.get_mut(&thread_id) else {
            return 0;
        };
        let before = queue.len();
        queue.retain(|stub| !predicate(&stub.payload));
        let removed = before - queue.len();
        if queue.is_empty() {
            self.stubs.remove(&thread_id);
        }
        if removed > 0 {
            self.notify(thread_id);
        }
        removed
    }

    /// Drop every stub, notifying each affected thread.
    pub fn clear_all(&mut self) {
        let threads: Vec<ThreadId> = self.stubs.keys().copied().collect();
        self.stubs.clear();
        for thread_id in threads {
            self.notify(thread_id);
        }
    }

    /// Observe changes on every thread.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(StubChange) + Send + 'static,
    {
        self.add_subscriber(None, Box::new(listener))
    }

    /// Observe changes on one thread.
    pub fn subscribe_thread<F>(&mut self, thread_id: ThreadId, listener: F) -> SubscriptionId
    where
        F: FnMut(StubChange) + Send + 'static,
    {
        self.add_subscriber(Some(thread_id), Box::new(listener))
    }

    /// Revoke a subscription. Returns whether it existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    fn add_subscriber(&mut self, scope: Option<ThreadId>, listener: Listener) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.subscribers.push(Subscriber {
            id,
            scope,
            listener,
        });
        id
    }

    fn notify(&mut self, thread_id: ThreadId) {
        let change = StubChange { thread_id };
        for sub in &mut self.subscribers {
            if sub.scope.map_or(true, |scope| scope == thread_id) {
                (sub.listener)(change);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<ThreadId>>>, impl FnMut(StubChange) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |change: StubChange| {
            sink.lock().unwrap().push(change.thread_id)
        })
    }

    #[test]
    fn test_stub_bound() {
        let mut store: StubStore<u32> = StubStore::new();
        for i in 0..15 {
            store.add_stub(ThreadId(1), i);
        }
        let payloads: Vec<u32> = store.get_stubs(ThreadId(1)).iter().map(|s| s.payload).collect();
        assert_eq!(payloads, (5..15).collect::<Vec<_>>());
    }

    #[test]
    fn test_invalid_thread_is_noop() {
        let (seen, listener) = recorder();
        let mut store: StubStore<&str> = StubStore::new();
        store.subscribe(listener);

        assert!(!store.add_stub(ThreadId(0), "x"));
        assert!(!store.add_stub(ThreadId(-4), "x"));
        store.clear_stubs(ThreadId(0));

        assert!(store.get_stubs(ThreadId(0)).is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_notifications_scoped() {
        let (all, all_listener) = recorder();
        let (one, one_listener) = recorder();
        let mut store: StubStore<&str> = StubStore::new();
        store.subscribe(all_listener);
        store.subscribe_thread(ThreadId(2), one_listener);

        store.add_stub(ThreadId(1), "a");
        store.add_stub(ThreadId(2), "b");
        store.clear_stubs(ThreadId(1));

        assert_eq!(*all.lock().unwrap(), vec![ThreadId(1), ThreadId(2), ThreadId(1)]);
        assert_eq!(*one.lock().unwrap(), vec![ThreadId(2)]);
    }

    #[test]
    fn test_unsubscribe() {
        let (seen, listener) = recorder();
        let mut store: StubStore<&str> = StubStore::new();
        let id = store.subscribe(listener);

        store.add_stub(ThreadId(1), "a");
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.add_stub(ThreadId(1), "b");

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_remove_where() {
        let (seen, listener) = recorder();
        let mut store: StubStore<&str> = StubStore::with_capacity(3);
        store.add_stub(ThreadId(1), "keep");
        store.add_stub(ThreadId(1), "drop");
        store.subscribe(listener);

        assert_eq!(store.remove_where(ThreadId(1), |p| *p == "drop"), 1);
        assert_eq!(store.remove_where(ThreadId(1), |p| *p == "drop"), 0);
        assert_eq!(store.len(ThreadId(1)), 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_clear_all() {
        let mut store: StubStore<&str> = StubStore::new();
        store.add_stub(ThreadId(1), "a");
        store.add_stub(ThreadId(2), "b");
        store.clear_all();
        assert!(store.is_empty(ThreadId(1)));
        assert!(store.is_empty(ThreadId(2)));
    }
}
