//! Audit sinks.
//!
//! Every cycle decision is recorded as an `Event`. The live daemon logs
//! them as structured tracing records; tests and the backtest collect
//! them in memory.

use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

use vpskew_domain::Event;

/// Audit target used by `TracingAuditSink`
pub const AUDIT_TARGET: &str = "vpskew::audit";

/// Receives every event a cycle emits.
pub trait AuditSink: Send + Sync {
    /// Record one event
    fn record(&self, event: &Event);
}

/// Writes events as structured log records under `AUDIT_TARGET`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &Event) {
        let payload = serde_json::to_string(event).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"));
        info!(
            target: AUDIT_TARGET,
            event = event.name(),
            cycle_id = %event.cycle_id(),
            %payload,
            "Audit"
        );
    }
}

/// Collects events in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<Event>>>,
}

impl MemoryAuditSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Drain recorded events
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
