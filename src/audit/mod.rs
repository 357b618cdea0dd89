//! Best-effort guardrail audit side-channel.
//!
//! Guardrail decisions are worth recording, but a slow sink must never stall
//! request handling or realtime forwarding. The dispatcher therefore puts a
//! bounded channel between producers and the sink: [`AuditHandle::record`]
//! is synchronous and non-blocking, and drops events when the channel is
//! full. Delivery is best-effort by design.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`AuditEvent`] | Typed guardrail decision events |
//! | [`AuditSink`] | Trait for audit destinations |
//! | [`NoopAuditSink`] | Default sink (no collection) |
//! | [`InMemoryAuditSink`] | Bounded in-memory sink for testing |
//! | [`AuditDispatcher`] | Bounded-channel worker feeding a sink |

use crate::pipeline::TerminalAction;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// A recordable guardrail decision.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    GuardrailBlocked {
        call_id: String,
        guardrail: String,
        message: String,
    },
    GuardrailErrored {
        call_id: String,
        guardrail: String,
        message: String,
    },
    PipelineCompleted {
        call_id: String,
        policy: String,
        terminal_action: TerminalAction,
        steps: usize,
        total_duration: Duration,
    },
    SessionClosed {
        session_id: String,
        violations: u32,
        reason: String,
    },
}

impl AuditEvent {
    /// The call or session this event belongs to.
    pub fn subject_id(&self) -> &str {
        match self {
            AuditEvent::GuardrailBlocked { call_id, .. }
            | AuditEvent::GuardrailErrored { call_id, .. }
            | AuditEvent::PipelineCompleted { call_id, .. } => call_id,
            AuditEvent::SessionClosed { session_id, .. } => session_id,
        }
    }
}

/// Destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Default sink: discards everything.
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn record(&self, _event: AuditEvent) {}
}

/// Bounded in-memory sink for testing.
pub struct InMemoryAuditSink {
    events: Arc<RwLock<Vec<AuditEvent>>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            max_events,
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().unwrap().clone()
    }

    pub fn events_for(&self, subject_id: &str) -> Vec<AuditEvent> {
        self.events
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.subject_id() == subject_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, event: AuditEvent) {
        let mut events = self.events.write().unwrap();
        events.push(event);
        if events.len() > self.max_events {
            events.remove(0);
        }
    }
}

/// Cloneable, non-blocking producer handle.
#[derive(Clone)]
pub struct AuditHandle {
    tx: mpsc::Sender<AuditEvent>,
}

impl AuditHandle {
    /// Record an event without waiting. Dropped silently when the channel is
    /// full or the dispatcher has shut down.
    pub fn record(&self, event: AuditEvent) {
        if let Err(e) = self.tx.try_send(event) {
            debug!("audit event dropped: {e}");
        }
    }
}

/// Owns the worker task draining events into a sink.
pub struct AuditDispatcher {
    tx: mpsc::Sender<AuditEvent>,
    worker: tokio::task::JoinHandle<()>,
}

impl AuditDispatcher {
    /// Spawn a dispatcher with the given channel capacity.
    pub fn spawn(sink: Arc<dyn AuditSink>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<AuditEvent>(capacity);
        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                sink.record(event).await;
            }
        });
        Self { tx, worker }
    }

    pub fn handle(&self) -> AuditHandle {
        AuditHandle {
            tx: self.tx.clone(),
        }
    }

    /// Stop accepting events and wait for the worker to drain.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.worker.await;
    }
}
