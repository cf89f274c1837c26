//! Session metrics folded from cycle reports

use crate::scheduler::{CycleOutcome, CycleReport};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Metrics snapshot for one runtime session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeMetrics {
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_seconds: u64,
    /// Domains whose scheduler task is still running
    pub active_domains: usize,
    /// Avatars consulted by the active domains
    pub active_avatars: usize,
    /// Completed cycles across every domain
    pub total_pulses: u64,
    pub total_manifestations: u64,
    pub total_deferrals: u64,
    pub total_vetoes: u64,
    pub total_errors: u64,
    /// Mean resonance of the cycles that scored a proposal
    pub average_resonance: Option<f64>,
}

#[derive(Debug, Default)]
struct Counters {
    pulses: u64,
    manifestations: u64,
    deferrals: u64,
    vetoes: u64,
    errors: u64,
    resonance_sum: f64,
    scored: u64,
}

/// Shared accumulator fed by every scheduler of a session
#[derive(Clone, Debug, Default)]
pub struct MetricsRecorder {
    counters: Arc<Mutex<Counters>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, report: &CycleReport) {
        let mut counters = self.counters.lock();
        counters.pulses += 1;
        match report.outcome {
            CycleOutcome::Manifested { .. } => counters.manifestations += 1,
            CycleOutcome::Deferred { .. } => counters.deferrals += 1,
            CycleOutcome::Vetoed { .. } => counters.vetoes += 1,
            CycleOutcome::Error { .. } => counters.errors += 1,
        }
        if let Some(score) = report.score() {
            counters.resonance_sum += score;
            counters.scored += 1;
        }
    }

    /// Counters so far, combined with the caller's view of the session
    pub fn snapshot(
        &self,
        started_at: Option<DateTime<Utc>>,
        active_domains: usize,
        active_avatars: usize,
    ) -> RuntimeMetrics {
        let counters = self.counters.lock();
        let uptime_seconds = started_at
            .map(|t| (Utc::now() - t).num_seconds().max(0) as u64)
            .unwrap_or(0);
        let average_resonance =
            (counters.scored > 0).then(|| counters.resonance_sum / counters.scored as f64);

        RuntimeMetrics {
            started_at,
            uptime_seconds,
            active_domains,
            active_avatars,
            total_pulses: counters.pulses,
            total_manifestations: counters.manifestations,
            total_deferrals: counters.deferrals,
            total_vetoes: counters.vetoes,
            total_errors: counters.errors,
            average_resonance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resonance::ResonanceResult;
    use genesis_dsl::DriveState;
    use uuid::Uuid;

    fn report(outcome: CycleOutcome, score: Option<f64>) -> CycleReport {
        CycleReport {
            run_id: Uuid::nil(),
            domain: "Grid".into(),
            cycle: 1,
            outcome,
            proposal: None,
            resonance: score.map(|score| ResonanceResult {
                score,
                consensus: score,
                vetoed: false,
                veto_covenant: None,
                avatars: Vec::new(),
                covenants: Vec::new(),
                metrics: Vec::new(),
            }),
            coherence: None,
            drive_state: DriveState::Dormant,
            aspiration: 0.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_counts_and_average() {
        let recorder = MetricsRecorder::new();
        let empty = recorder.snapshot(None, 0, 0);
        assert_eq!(empty.total_pulses, 0);
        assert_eq!(empty.average_resonance, None);
        assert_eq!(empty.uptime_seconds, 0);

        let manifested = CycleOutcome::Manifested {
            actions: Vec::new(),
            failures: Vec::new(),
        };
        recorder.record(&report(manifested, Some(0.9)));
        recorder.record(&report(CycleOutcome::Deferred { threshold: None }, Some(0.5)));
        recorder.record(&report(
            CycleOutcome::Error {
                message: "down".into(),
            },
            None,
        ));

        let started = Utc::now() - chrono::Duration::seconds(5);
        let metrics = recorder.clone().snapshot(Some(started), 1, 3);
        assert_eq!(metrics.total_pulses, 3);
        assert_eq!(metrics.total_manifestations, 1);
        assert_eq!(metrics.total_deferrals, 1);
        assert_eq!(metrics.total_errors, 1);
        assert_eq!(metrics.total_vetoes, 0);
        assert!((metrics.average_resonance.unwrap() - 0.7).abs() < 1e-9);
        assert!(metrics.uptime_seconds >= 5);
        assert_eq!((metrics.active_domains, metrics.active_avatars), (1, 3));
    }
}
