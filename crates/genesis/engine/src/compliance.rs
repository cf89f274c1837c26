//! Compliance events and sinks
//!
//! Every pulse cycle and every decree leaves one append-only record.
//! Emitting never blocks the scheduler.

use crate::resonance::ResonanceResult;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceKind {
    /// A proposal cleared the gate and its actions ran
    Manifested,
    /// The best proposal fell short of the gate
    Deferred,
    /// A critical covenant vetoed a candidate
    Vetoed,
    /// A decree was evaluated
    Decree,
    /// The cycle failed
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComplianceEvent {
    pub id: Uuid,
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub domain: String,
    pub kind: ComplianceKind,
    pub proposal: Option<String>,
    pub resonance: Option<f64>,
    pub vetoed: bool,
    pub covenant_refs: Vec<String>,
    pub breakdown: Option<ResonanceResult>,
    pub action: Option<String>,
    pub error: Option<String>,
}

impl ComplianceEvent {
    pub fn new(run_id: Uuid, domain: impl Into<String>, kind: ComplianceKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            timestamp: Utc::now(),
            domain: domain.into(),
            kind,
            proposal: None,
            resonance: None,
            vetoed: false,
            covenant_refs: Vec::new(),
            breakdown: None,
            action: None,
            error: None,
        }
    }

    /// Attach a scored proposal
    pub fn with_result(mut self, proposal: impl Into<String>, result: &ResonanceResult) -> Self {
        self.proposal = Some(proposal.into());
        self.resonance = Some(result.score);
        self.vetoed = result.vetoed;
        self.covenant_refs = result.covenants.iter().map(|c| c.covenant.clone()).collect();
        self.breakdown = Some(result.clone());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Append-only destination for compliance events
pub trait ComplianceSink: Send + Sync {
    /// Record an event without blocking
    fn emit(&self, event: ComplianceEvent);
}

/// Forwards events over a bounded channel to a single consumer
#[derive(Clone, Debug)]
pub struct ChannelComplianceSink {
    tx: mpsc::Sender<ComplianceEvent>,
}

impl ChannelComplianceSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ComplianceEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl ComplianceSink for ChannelComplianceSink {
    fn emit(&self, event: ComplianceEvent) {
        if let Err(e) = self.tx.try_send(event) {
            let (reason, event) = match e {
                mpsc::error::TrySendError::Full(event) => ("channel full", event),
                mpsc::error::TrySendError::Closed(event) => ("channel closed", event),
            };
            tracing::warn!(
                domain = %event.domain,
                kind = ?event.kind,
                reason,
                "Compliance event dropped"
            );
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct MemoryComplianceSink {
    events: Mutex<Vec<ComplianceEvent>>,
}

impl MemoryComplianceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ComplianceEvent> {
        self.events.lock().clone()
    }

    pub fn events_for(&self, domain: &str) -> Vec<ComplianceEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.domain == domain)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl ComplianceSink for MemoryComplianceSink {
    fn emit(&self, event: ComplianceEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(domain: &str, kind: ComplianceKind) -> ComplianceEvent {
        ComplianceEvent::new(Uuid::nil(), domain, kind)
    }

    #[test]
    fn test_memory_sink_appends_in_order() {
        let sink = MemoryComplianceSink::new();
        sink.emit(event("Grid", ComplianceKind::Deferred));
        sink.emit(event("Clinic", ComplianceKind::Manifested));
        sink.emit(event("Grid", ComplianceKind::Error).with_error("timed out"));

        assert_eq!(sink.len(), 3);
        let grid = sink.events_for("Grid");
        assert_eq!(grid.len(), 2);
        assert_eq!(grid[1].error.as_deref(), Some("timed out"));
        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_channel_sink_drops_when_full() {
        let (sink, mut rx) = ChannelComplianceSink::new(1);
        sink.emit(event("Grid", ComplianceKind::Deferred));
        sink.emit(event("Grid", ComplianceKind::Manifested));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, ComplianceKind::Deferred);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_serializes_kind_in_snake_case() {
        let json = serde_json::to_value(event("Grid", ComplianceKind::Manifested)).unwrap();
        assert_eq!(json["kind"], "manifested");
        assert_eq!(json["domain"], "Grid");
    }
}
