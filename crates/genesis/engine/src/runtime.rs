//! Runtime session: one loaded program and its running domains
//!
//! A session owns the bound registry, the shared collaborators and the
//! per-domain scheduler tasks. Nothing is global; two sessions in one
//! process do not interact.

use crate::compliance::{ComplianceEvent, ComplianceKind, ComplianceSink};
use crate::config::RuntimeConfig;
use crate::decree::{self, DecreeOutcome};
use crate::error::{FatalCovenantViolation, GenesisError, GenesisResult};
use crate::metrics::{MetricsRecorder, RuntimeMetrics};
use crate::oracle::AlignmentOracle;
use crate::registry::{bind, Registry};
use crate::resonance::ResonanceEngine;
use crate::scheduler::{
    CycleReport, DomainExit, DomainHandle, DomainStatus, ProposalSource, PulseScheduler,
    SchedulerContext,
};
use crate::vessel::VesselHub;
use chrono::{DateTime, Utc};
use genesis_dsl::{parse_source, Diagnostic};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Lex, parse and bind a program without running it.
///
/// Warnings come back to the caller rather than being logged.
pub fn compile(source: &str) -> GenesisResult<(Registry, Vec<Diagnostic>)> {
    let output = parse_source(source)?;
    let registry = bind(&output.program)?;
    Ok((registry, output.diagnostics))
}

/// Lifecycle of a session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuntimeState {
    #[default]
    Ready,
    Running,
    Paused,
    Stopping,
    Stopped,
}

impl std::fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ready => "Ready",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}

/// A declared domain and, once started, its live status
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainInfo {
    pub name: String,
    pub intent: String,
    pub objective: Option<String>,
    /// Possibility names from `Context`, innermost first
    pub context: Vec<String>,
    pub status: Option<DomainStatus>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeInfo {
    pub run_id: Uuid,
    pub state: RuntimeState,
    pub domains: Vec<DomainInfo>,
    pub metrics: RuntimeMetrics,
}

/// An interpreter session
pub struct Runtime {
    run_id: Uuid,
    registry: Arc<Registry>,
    config: RuntimeConfig,
    engine: ResonanceEngine,
    hub: Arc<VesselHub>,
    sink: Arc<dyn ComplianceSink>,
    proposal_source: Option<Arc<dyn ProposalSource>>,
    reports: broadcast::Sender<CycleReport>,
    handles: HashMap<String, DomainHandle>,
    tasks: Vec<(String, JoinHandle<Result<DomainExit, FatalCovenantViolation>>)>,
    state: RwLock<RuntimeState>,
    metrics: MetricsRecorder,
    started_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("run_id", &self.run_id)
            .field("domains", &self.registry.domains().len())
            .field("running", &self.tasks.len())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(
        registry: Registry,
        config: RuntimeConfig,
        oracle: Arc<dyn AlignmentOracle>,
        sink: Arc<dyn ComplianceSink>,
    ) -> Self {
        let (reports, _) = broadcast::channel(config.reports.channel_capacity.max(1));
        let hub = VesselHub::with_fallbacks(config.vessel.tick_interval());
        Self {
            run_id: Uuid::new_v4(),
            registry: Arc::new(registry),
            config,
            engine: ResonanceEngine::new(oracle),
            hub: Arc::new(hub),
            sink,
            proposal_source: None,
            reports,
            handles: HashMap::new(),
            tasks: Vec::new(),
            state: RwLock::new(RuntimeState::Ready),
            metrics: MetricsRecorder::new(),
            started_at: None,
        }
    }

    /// Compile `source` and open a session over it
    pub fn load(
        source: &str,
        config: RuntimeConfig,
        oracle: Arc<dyn AlignmentOracle>,
        sink: Arc<dyn ComplianceSink>,
    ) -> GenesisResult<(Self, Vec<Diagnostic>)> {
        let (registry, diagnostics) = compile(source)?;
        Ok((Self::new(registry, config, oracle, sink), diagnostics))
    }

    /// Replace the vessel bindings; takes effect for domains started later
    pub fn with_hub(mut self, hub: VesselHub) -> Self {
        self.hub = Arc::new(hub);
        self
    }

    pub fn with_proposal_source(mut self, source: Arc<dyn ProposalSource>) -> Self {
        self.proposal_source = Some(source);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn state(&self) -> RuntimeState {
        *self.state.read()
    }

    /// Spawn a scheduler for every domain with a Pulse.
    ///
    /// Domains already running are left alone. Returns how many started.
    pub fn start(&mut self, max_cycles: Option<u64>) -> usize {
        let ctx = SchedulerContext {
            run_id: self.run_id,
            engine: self.engine.clone(),
            hub: self.hub.clone(),
            sink: self.sink.clone(),
            proposal_source: self.proposal_source.clone(),
            reports: self.reports.clone(),
            vessel_timeout: self.config.vessel.timeout(),
            watch_backoff: self.config.vessel.retry_backoff(),
            potentiality: self.config.potentiality,
            metrics: self.metrics.clone(),
        };
        let paused = self.state() == RuntimeState::Paused;

        let mut started = 0;
        for domain in self.registry.domains() {
            if self.handles.contains_key(&domain.name) {
                continue;
            }
            let Some((scheduler, handle)) =
                PulseScheduler::new(domain.clone(), ctx.clone(), max_cycles)
            else {
                tracing::debug!(domain = %domain.name, "Domain has no pulse, not started");
                continue;
            };

            if paused {
                handle.pause();
            }
            let task = tokio::spawn(scheduler.run());
            self.tasks.push((domain.name.clone(), task));
            self.handles.insert(domain.name.clone(), handle);
            started += 1;
        }

        if !paused {
            *self.state.write() = RuntimeState::Running;
        }
        self.started_at.get_or_insert_with(Utc::now);
        tracing::info!(run_id = %self.run_id, started, "Domains started");
        started
    }

    /// Hold every running domain at its next boundary
    pub fn pause(&self) -> GenesisResult<()> {
        self.transition("pause", RuntimeState::Running, RuntimeState::Paused)?;
        for handle in self.handles.values() {
            handle.pause();
        }
        tracing::info!(run_id = %self.run_id, "Runtime paused");
        Ok(())
    }

    pub fn resume(&self) -> GenesisResult<()> {
        self.transition("resume", RuntimeState::Paused, RuntimeState::Running)?;
        for handle in self.handles.values() {
            handle.resume();
        }
        tracing::info!(run_id = %self.run_id, "Runtime resumed");
        Ok(())
    }

    fn transition(
        &self,
        operation: &str,
        from: RuntimeState,
        to: RuntimeState,
    ) -> GenesisResult<()> {
        let mut state = self.state.write();
        if *state != from {
            return Err(GenesisError::InvalidState {
                operation: operation.to_string(),
                state: state.to_string(),
            });
        }
        *state = to;
        Ok(())
    }

    /// Counters across every domain started by this session
    pub fn metrics(&self) -> RuntimeMetrics {
        let active: Vec<&str> = self
            .tasks
            .iter()
            .filter(|(_, task)| !task.is_finished())
            .map(|(name, _)| name.as_str())
            .collect();
        let avatars = active
            .iter()
            .filter_map(|name| self.registry.domain(name))
            .map(|domain| domain.pantheon.avatars.len())
            .sum();
        self.metrics.snapshot(self.started_at, active.len(), avatars)
    }

    /// Session state, declared domains and metrics in one view
    pub fn info(&self) -> RuntimeInfo {
        let domains = self
            .registry
            .domains()
            .iter()
            .map(|domain| DomainInfo {
                name: domain.name.clone(),
                intent: domain.intent.clone(),
                objective: domain.objective().map(str::to_string),
                context: domain.context.iter().map(|p| p.name.clone()).collect(),
                status: self.handles.get(&domain.name).map(DomainHandle::status),
            })
            .collect();
        RuntimeInfo {
            run_id: self.run_id,
            state: self.state(),
            domains,
            metrics: self.metrics(),
        }
    }

    /// Receive a report for every cycle completed from now on
    pub fn subscribe(&self) -> broadcast::Receiver<CycleReport> {
        self.reports.subscribe()
    }

    /// Handles of every started domain
    pub fn handles(&self) -> impl Iterator<Item = &DomainHandle> {
        self.handles.values()
    }

    pub fn handle(&self, domain: &str) -> GenesisResult<&DomainHandle> {
        if self.registry.domain(domain).is_none() {
            return Err(GenesisError::UnknownDomain(domain.to_string()));
        }
        self.handles
            .get(domain)
            .ok_or_else(|| GenesisError::DomainNotRunning(domain.to_string()))
    }

    /// Wake an OnDemand domain
    pub fn trigger(&self, domain: &str) -> GenesisResult<()> {
        let handle = self.handle(domain)?;
        if !handle.trigger() {
            return Err(GenesisError::DomainNotRunning(domain.to_string()));
        }
        tracing::debug!(domain, "Domain triggered");
        Ok(())
    }

    pub fn status(&self, domain: &str) -> GenesisResult<DomainStatus> {
        self.handle(domain).map(DomainHandle::status)
    }

    /// Evaluate a decree against each of its target domains.
    ///
    /// Where the condition holds the decree's updates are queued on that
    /// domain's scheduler. Every evaluation leaves a compliance event.
    pub async fn enact_decree(&self, name: &str) -> GenesisResult<Vec<DecreeOutcome>> {
        let decree = self
            .registry
            .decree(name)
            .cloned()
            .ok_or_else(|| GenesisError::UnknownDecree(name.to_string()))?;

        let mut outcomes = Vec::new();
        for domain in decree::targets(&self.registry, &decree) {
            let mut outcome = decree::evaluate(&self.engine, &self.registry, &decree, &domain)?;

            if outcome.holds && !decree.updates.is_empty() {
                match self.handles.get(&domain.name) {
                    Some(handle) => {
                        let mut delivered = true;
                        for update in &decree.updates {
                            delivered &= handle.update(update.clone()).await;
                        }
                        if !delivered {
                            return Err(GenesisError::DomainNotRunning(domain.name.clone()));
                        }
                        outcome.applied = true;
                    }
                    // An untargeted decree reaches only the domains that run
                    None if decree.target.is_none() => tracing::debug!(
                        decree = %decree.name,
                        domain = %domain.name,
                        "Domain not running, decree skipped"
                    ),
                    None => return Err(GenesisError::DomainNotRunning(domain.name.clone())),
                }
            }

            let mut event =
                ComplianceEvent::new(self.run_id, domain.name.clone(), ComplianceKind::Decree)
                    .with_result(decree.action.clone(), &outcome.resonance)
                    .with_action(format!("Decree \"{}\"", decree.name));
            if let Some(covenant) = &outcome.resonance.veto_covenant {
                event = event.with_error(format!("vetoed by covenant {}", covenant));
            } else if !outcome.holds {
                event = event.with_error(format!(
                    "condition Resonance {} {} not met",
                    decree.condition.op.symbol(),
                    decree.condition.value
                ));
            }
            self.sink.emit(event);
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Ask every running domain to stop at its next boundary
    pub fn shutdown(&self) {
        tracing::info!(run_id = %self.run_id, "Shutting down");
        *self.state.write() = RuntimeState::Stopping;
        for handle in self.handles.values() {
            handle.stop();
        }
    }

    /// Wait for every scheduler task to end; returns the fatal violations
    pub async fn join_all(&mut self) -> Vec<FatalCovenantViolation> {
        let mut violations = Vec::new();
        for (domain, task) in self.tasks.drain(..) {
            match task.await {
                Ok(Ok(exit)) => {
                    tracing::debug!(domain = %exit.domain, cycles = exit.cycles, "Domain joined")
                }
                Ok(Err(violation)) => violations.push(violation),
                Err(e) => tracing::error!(domain = %domain, error = %e, "Domain task failed"),
            }
        }
        *self.state.write() = RuntimeState::Stopped;
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::MemoryComplianceSink;
    use crate::oracle::FixedOracle;

    const SOURCE: &str = r#"
Covenant "Safety" { Invariant: "Do no harm" Threshold: 0.3 }
Pantheon "Council" { Avatar "Athena" { Lineage: "Greek" Essence: "Wisdom" } }
Domain "Clinic" {
    Intent: "Schedule care"
    Pantheon: "Council"
    Pulse (Interval: OnDemand) {
        Deliberate {
            Synthesize { Metric: Alignment(Covenant.Safety) }
        }
    }
}
Domain "Archive" {
    Intent: "Keep records"
    Pantheon: "Council"
}
Decree "Calm" {
    Condition: Resonance > 0.5
    Action: "Stay calm"
    Target: Domain.Archive
}
"#;

    fn session() -> (Runtime, Arc<MemoryComplianceSink>) {
        let sink = Arc::new(MemoryComplianceSink::new());
        let (runtime, diagnostics) = Runtime::load(
            SOURCE,
            RuntimeConfig::default(),
            Arc::new(FixedOracle(0.8)),
            sink.clone(),
        )
        .unwrap();
        // Archive has no Pulse
        assert_eq!(diagnostics.len(), 1);
        (runtime, sink)
    }

    #[test]
    fn test_compile_reports_bind_errors() {
        let err = compile(r#"Domain "X" { Intent: "y" Pantheon: "Missing" }"#).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_start_skips_domains_without_pulse() {
        let (mut runtime, _) = session();
        assert_eq!(runtime.start(Some(1)), 1);
        assert_eq!(runtime.start(Some(1)), 0);

        assert!(matches!(
            runtime.trigger("Archive"),
            Err(GenesisError::DomainNotRunning(_))
        ));
        assert!(matches!(
            runtime.trigger("Nowhere"),
            Err(GenesisError::UnknownDomain(_))
        ));

        runtime.shutdown();
        assert!(runtime.join_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_pause_and_resume_follow_state() {
        let (mut runtime, _) = session();
        assert_eq!(runtime.state(), RuntimeState::Ready);
        let err = runtime.pause().unwrap_err();
        assert!(matches!(err, GenesisError::InvalidState { ref state, .. } if state == "Ready"));

        runtime.start(None);
        assert_eq!(runtime.state(), RuntimeState::Running);
        assert!(runtime.resume().is_err());

        runtime.pause().unwrap();
        assert_eq!(runtime.state(), RuntimeState::Paused);
        assert!(runtime.status("Clinic").unwrap().paused);
        assert!(runtime.pause().is_err());

        runtime.resume().unwrap();
        assert!(!runtime.status("Clinic").unwrap().paused);

        runtime.shutdown();
        assert_eq!(runtime.state(), RuntimeState::Stopping);
        assert!(runtime.join_all().await.is_empty());
        assert_eq!(runtime.state(), RuntimeState::Stopped);
    }

    #[tokio::test]
    async fn test_info_lists_every_domain() {
        let (mut runtime, _) = session();
        runtime.start(None);

        let info = runtime.info();
        assert_eq!(info.state, RuntimeState::Running);
        let names: Vec<_> = info.domains.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["Clinic", "Archive"]);
        assert!(info.domains[0].status.is_some());
        assert!(info.domains[1].status.is_none());
        assert_eq!(info.metrics.active_domains, 1);
        assert_eq!(info.metrics.active_avatars, 1);
        assert!(info.metrics.started_at.is_some());

        runtime.shutdown();
        runtime.join_all().await;
        assert_eq!(runtime.metrics().active_domains, 0);
    }

    #[tokio::test]
    async fn test_decree_without_updates_is_recorded() {
        let (runtime, sink) = session();
        let outcomes = runtime.enact_decree("Calm").await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].holds);
        assert!(!outcomes[0].applied);

        let events = sink.events_for("Archive");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ComplianceKind::Decree);
        assert!(events[0].error.is_none());

        assert!(matches!(
            runtime.enact_decree("Unknown").await,
            Err(GenesisError::UnknownDecree(_))
        ));
    }
}
