//! Thread-switch timing and cache hit/miss reporting.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;
use std::time::Instant;

use crate::models::ThreadId;

/// Whether a thread switch could render from cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOutcome {
    Hit,
    Miss,
}

/// Caller-supplied context for a thread switch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SwitchMeta {
    /// What triggered the switch, e.g. `list_click` or `deep_link`.
    pub source: String,
    pub cache: Option<CacheOutcome>,
    /// Messages available at switch start.
    pub message_count: usize,
}

/// Milestones of a thread switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchPhase {
    FirstPaint,
    Ready,
    ScrollRestored,
}

impl fmt::Display for SwitchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SwitchPhase::FirstPaint => "first_paint",
            SwitchPhase::Ready => "ready",
            SwitchPhase::ScrollRestored => "scroll_restored",
        })
    }
}

/// The in-flight thread switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchSnapshot {
    pub thread_id: ThreadId,
    pub meta: SwitchMeta,
    pub started_at: DateTime<Utc>,
    pub first_paint_ms: Option<u64>,
    pub ready_ms: Option<u64>,
    pub scroll_restored_ms: Option<u64>,
    started: Instant,
}

impl SwitchSnapshot {
    /// Milliseconds since the switch started, at `now`.
    pub fn elapsed_ms(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.started).as_millis() as u64
    }

    fn phase_slot(&mut self, phase: SwitchPhase) -> &mut Option<u64> {
        match phase {
            SwitchPhase::FirstPaint => &mut self.first_paint_ms,
            SwitchPhase::Ready => &mut self.ready_ms,
            SwitchPhase::ScrollRestored => &mut self.scroll_restored_ms,
        }
    }
}

/// Tracks the single current thread switch.
#[derive(Debug, Default)]
pub struct SwitchTracker {
    current: Option<SwitchSnapshot>,
}

impl SwitchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing a switch to `thread_id`, replacing any previous one.
    pub fn record_switch_start(&mut self, thread_id: ThreadId, meta: SwitchMeta) {
        self.record_switch_start_at(thread_id, meta, Instant::now());
    }

    /// Like [`record_switch_start`](Self::record_switch_start) with an explicit clock.
    pub fn record_switch_start_at(&mut self, thread_id: ThreadId, meta: SwitchMeta, now: Instant) {
        self.current = Some(SwitchSnapshot {
            thread_id,
            meta,
            started_at: Utc::now(),
            first_paint_ms: None,
            ready_ms: None,
            scroll_restored_ms: None,
            started: now,
        });
    }

    /// Record a milestone of the current switch.
    ///
    /// Returns the elapsed milliseconds, or `None` when `thread_id` is not
    /// the current switch or the phase was already recorded.
    pub fn mark(&mut self, thread_id: ThreadId, phase: SwitchPhase) -> Option<u64> {
        self.mark_at(thread_id, phase, Instant::now())
    }

    /// Like [`mark`](Self::mark) with an explicit clock.
    pub fn mark_at(&mut self, thread_id: ThreadId, phase: SwitchPhase, now: Instant) -> Option<u64> {
        let snapshot = self.current.as_mut().filter(|s| s.thread_id == thread_id)?;
        let elapsed = snapshot.elapsed_ms(now);
        let slot = snapshot.phase_slot(phase);
        if slot.is_some() {
            return None;
        }
        *slot = Some(elapsed);
        Some(elapsed)
    }

    /// The current switch, if it targets `thread_id`.
    pub fn snapshot(&self, thread_id: ThreadId) -> Option<SwitchSnapshot> {
        self.current
            .as_ref()
            .filter(|s| s.thread_id == thread_id)
            .cloned()
    }

    /// Forget the current switch.
    pub fn clear(&mut self) {
        self.current = None;
    }
}

/// Event reported to an analytics sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmissionPayload {
    pub event: String,
    pub thread_id: ThreadId,
    pub source: String,
    pub cache: Option<CacheOutcome>,
    pub message_count: usize,
    pub first_paint_ms: Option<u64>,
    pub ready_ms: Option<u64>,
    pub scroll_restored_ms: Option<u64>,
    pub elapsed_ms: u64,
    pub started_at: DateTime<Utc>,
}

/// Build the analytics payload for a switch milestone.
pub fn emission_payload(phase: SwitchPhase, snapshot: &SwitchSnapshot, now: Instant) -> EmissionPayload {
    EmissionPayload {
        event: format!("inbox.thread_switch.{}", phase),
        thread_id: snapshot.thread_id,
        source: snapshot.meta.source.clone(),
        cache: snapshot.meta.cache,
        message_count: snapshot.meta.message_count,
        first_paint_ms: snapshot.first_paint_ms,
        ready_ms: snapshot.ready_ms,
        scroll_restored_ms: snapshot.scroll_restored_ms,
        elapsed_ms: snapshot.elapsed_ms(now),
        started_at: snapshot.started_at,
    }
}

/// Destination for telemetry payloads.
pub trait TelemetrySink: Send + Sync + fmt::Debug {
    fn emit(&self, payload: &EmissionPayload);
}

/// Writes payloads to the `log` facade at info level.
#[derive(Debug, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn emit(&self, payload: &EmissionPayload) {
        match serde_json::to_string(payload) {
            Ok(json) => info!(target: "rinbox::telemetry", "{}", json),
            Err(e) => debug!("failed to serialize telemetry payload: {}", e),
        }
    }
}

/// Keeps payloads in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<EmissionPayload>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads emitted so far.
    pub fn events(&self) -> Vec<EmissionPayload> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl TelemetrySink for MemorySink {
    fn emit(&self, payload: &EmissionPayload) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(payload.clone());
    }
}
