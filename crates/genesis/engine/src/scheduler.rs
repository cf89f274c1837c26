//! Pulse scheduler: one perpetual decision loop per domain
//!
//! Each domain cycles Watching → Deliberating → Synthesizing → Manifesting
//! and back until stopped, until it reaches its cycle budget, or until a
//! critical covenant halts it. Stop requests are honoured between Watching
//! and Deliberating and between Synthesizing and Manifesting; an action
//! that has started manifesting always completes. A paused domain holds
//! before Watching and before Deliberating until resumed or stopped.

use crate::compliance::{ComplianceEvent, ComplianceKind, ComplianceSink};
use crate::error::{EngineError, FatalCovenantViolation, VesselError};
use crate::metrics::MetricsRecorder;
use crate::potentiality::{DriveEvent, Potentiality, PotentialitySettings};
use crate::registry::{Domain, Pulse};
use crate::resonance::{AspirationInput, ResonanceEngine, ResonanceResult};
use crate::vessel::{Ack, ActionDescriptor, Observation, VesselHub, CONSOLE_WRITE};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use genesis_dsl::{DriveState, Expr, IntervalKind, ProposalDecl, UpdateDirective};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Notify};
use uuid::Uuid;

/// Phase of a domain's pulse
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PulsePhase {
    #[default]
    Watching,
    Deliberating,
    Synthesizing,
    Manifesting,
}

impl std::fmt::Display for PulsePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Watching => "Watching",
            Self::Deliberating => "Deliberating",
            Self::Synthesizing => "Synthesizing",
            Self::Manifesting => "Manifesting",
        };
        f.write_str(name)
    }
}

/// Cooperative cancellation flag shared between a scheduler and its handle
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once `stop` has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

/// Hold flag shared between a scheduler and its handle
#[derive(Clone, Debug, Default)]
pub struct PauseSignal {
    paused: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl PauseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Resolves once the signal is not paused
    pub async fn resumed(&self) {
        loop {
            let notified = self.notify.notified();
            if !self.is_paused() {
                return;
            }
            notified.await;
        }
    }
}

/// Messages accepted by a running scheduler
#[derive(Clone, Debug, PartialEq)]
pub enum Control {
    /// Wake an OnDemand pulse
    Trigger,
    /// Apply a state update at the next cycle boundary
    Update(UpdateDirective),
}

/// Supplies candidate proposals beyond those declared in source
#[async_trait]
pub trait ProposalSource: Send + Sync {
    async fn propose(&self, domain: &str, observation: &Observation) -> Vec<String>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    Manifested {
        actions: Vec<String>,
        failures: Vec<String>,
    },
    Deferred {
        threshold: Option<f64>,
    },
    Vetoed {
        covenant: String,
    },
    Error {
        message: String,
    },
}

/// Published on the report channel after every cycle
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub run_id: Uuid,
    pub domain: String,
    pub cycle: u64,
    pub outcome: CycleOutcome,
    pub proposal: Option<String>,
    pub resonance: Option<ResonanceResult>,
    /// Fit of the proposal with the domain's Context chain
    pub coherence: Option<f64>,
    pub drive_state: DriveState,
    pub aspiration: f64,
    pub timestamp: DateTime<Utc>,
}

impl CycleReport {
    pub fn score(&self) -> Option<f64> {
        self.resonance.as_ref().map(|r| r.score)
    }
}

/// Point-in-time view of a running domain
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainStatus {
    pub phase: PulsePhase,
    pub drive_state: DriveState,
    pub aspiration: f64,
    pub cycles: u64,
    pub manifest_threshold: Option<f64>,
    pub paused: bool,
}

/// How a scheduler ended without a fatal violation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainExit {
    pub domain: String,
    pub cycles: u64,
}

/// Collaborators shared by every scheduler in a session
#[derive(Clone)]
pub struct SchedulerContext {
    pub run_id: Uuid,
    pub engine: ResonanceEngine,
    pub hub: Arc<VesselHub>,
    pub sink: Arc<dyn ComplianceSink>,
    pub proposal_source: Option<Arc<dyn ProposalSource>>,
    pub reports: broadcast::Sender<CycleReport>,
    pub vessel_timeout: Duration,
    /// Wait after a failed watch before polling again
    pub watch_backoff: Duration,
    pub potentiality: PotentialitySettings,
    pub metrics: MetricsRecorder,
}

/// Caller-side handle to a running scheduler
#[derive(Clone, Debug)]
pub struct DomainHandle {
    name: String,
    control: mpsc::Sender<Control>,
    stop: StopSignal,
    pause: PauseSignal,
    status: Arc<RwLock<DomainStatus>>,
}

impl DomainHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wake an OnDemand pulse; false if the scheduler is gone or backlogged
    pub fn trigger(&self) -> bool {
        self.control.try_send(Control::Trigger).is_ok()
    }

    /// Queue a state update for the next cycle boundary
    pub async fn update(&self, directive: UpdateDirective) -> bool {
        self.control.send(Control::Update(directive)).await.is_ok()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Hold the pulse at its next Watching or Deliberating boundary
    pub fn pause(&self) {
        self.pause.pause();
        self.status.write().paused = true;
    }

    pub fn resume(&self) {
        self.status.write().paused = false;
        self.pause.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    pub fn status(&self) -> DomainStatus {
        self.status.read().clone()
    }
}

enum WatchOutcome {
    Observed(Observation),
    Failed(VesselError),
    Stopped,
}

struct Scored {
    proposal: String,
    aspiration: f64,
    result: ResonanceResult,
    coherence: Option<f64>,
}

/// Drives one domain's pulse
pub struct PulseScheduler {
    domain: Arc<Domain>,
    pulse: Pulse,
    ctx: SchedulerContext,
    potentiality: Potentiality,
    manifest_threshold: Option<f64>,
    control: mpsc::Receiver<Control>,
    stop: StopSignal,
    pause: PauseSignal,
    status: Arc<RwLock<DomainStatus>>,
    max_cycles: Option<u64>,
    cycles: u64,
    /// Trigger drained alongside updates, still owed a cycle
    pending_trigger: bool,
}

impl PulseScheduler {
    /// Build a scheduler and its handle; `None` for a domain without a Pulse
    pub fn new(
        domain: Arc<Domain>,
        ctx: SchedulerContext,
        max_cycles: Option<u64>,
    ) -> Option<(Self, DomainHandle)> {
        let pulse = domain.pulse.clone()?;
        let settings = ctx.potentiality.merged_with(&domain.potentiality);
        let potentiality = Potentiality::new(settings, domain.initial_state());
        let manifest_threshold = pulse.gate;

        let (control_tx, control_rx) = mpsc::channel(32);
        let stop = StopSignal::new();
        let pause = PauseSignal::new();
        let status = Arc::new(RwLock::new(DomainStatus {
            phase: PulsePhase::Watching,
            drive_state: potentiality.state(),
            aspiration: potentiality.aspiration(),
            cycles: 0,
            manifest_threshold,
            paused: false,
        }));

        let handle = DomainHandle {
            name: domain.name.clone(),
            control: control_tx,
            stop: stop.clone(),
            pause: pause.clone(),
            status: status.clone(),
        };

        let scheduler = Self {
            domain,
            pulse,
            ctx,
            potentiality,
            manifest_threshold,
            control: control_rx,
            stop,
            pause,
            status,
            max_cycles,
            cycles: 0,
            pending_trigger: false,
        };
        Some((scheduler, handle))
    }

    /// Run until stopped, out of cycles, or halted by a critical covenant
    pub async fn run(mut self) -> Result<DomainExit, FatalCovenantViolation> {
        tracing::info!(
            domain = %self.domain.name,
            interval = self.pulse.interval.as_str(),
            objective = self.domain.objective().unwrap_or(&self.domain.intent),
            gate = ?self.manifest_threshold,
            "Pulse started"
        );

        let result = self.pulse_loop().await;
        match &result {
            Ok(exit) => {
                tracing::info!(domain = %exit.domain, cycles = exit.cycles, "Pulse stopped")
            }
            Err(violation) => tracing::error!(
                domain = %violation.domain,
                covenant = %violation.covenant,
                alignment = violation.alignment,
                "Pulse halted by critical covenant"
            ),
        }
        result
    }

    async fn pulse_loop(&mut self) -> Result<DomainExit, FatalCovenantViolation> {
        loop {
            if self.stop.is_stopped() || self.out_of_cycles() || !self.hold().await {
                break;
            }

            self.set_phase(PulsePhase::Watching);
            let observation = match self.watch().await {
                WatchOutcome::Observed(observation) => observation,
                WatchOutcome::Failed(e) => {
                    let backoff = self.ctx.watch_backoff;
                    tracing::warn!(
                        domain = %self.domain.name,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Watch failed"
                    );
                    self.fail_cycle(None, e.to_string());
                    if self.out_of_cycles() {
                        break;
                    }
                    tokio::select! {
                        _ = self.stop.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => continue,
                    }
                }
                WatchOutcome::Stopped => break,
            };

            if self.stop.is_stopped() || !self.hold().await {
                break;
            }
            self.cycle(observation).await?;
            tokio::task::yield_now().await;
        }

        self.set_phase(PulsePhase::Watching);
        Ok(DomainExit {
            domain: self.domain.name.clone(),
            cycles: self.cycles,
        })
    }

    fn out_of_cycles(&self) -> bool {
        self.max_cycles.is_some_and(|max| self.cycles >= max)
    }

    /// Wait out a pause; false when stopped while paused
    async fn hold(&self) -> bool {
        if !self.pause.is_paused() {
            return true;
        }
        tracing::info!(domain = %self.domain.name, "Pulse paused");
        let resumed = tokio::select! {
            _ = self.stop.cancelled() => false,
            _ = self.pause.resumed() => true,
        };
        if resumed {
            tracing::info!(domain = %self.domain.name, "Pulse resumed");
        }
        resumed
    }

    // ── Watching ─────────────────────────────────────────────────────

    async fn watch(&mut self) -> WatchOutcome {
        self.drain_controls();

        let woken = std::mem::take(&mut self.pending_trigger);
        if self.pulse.interval == IntervalKind::OnDemand && !woken {
            loop {
                let message = tokio::select! {
                    _ = self.stop.cancelled() => return WatchOutcome::Stopped,
                    message = self.control.recv() => message,
                };
                match message {
                    Some(Control::Trigger) => break,
                    Some(Control::Update(update)) => self.apply_update(&update),
                    None => {
                        self.stop.cancelled().await;
                        return WatchOutcome::Stopped;
                    }
                }
            }
        }

        let Some(target) = self.pulse.watch.as_ref().map(vessel_name) else {
            return WatchOutcome::Observed(Observation::new(
                self.domain.name.clone(),
                serde_json::json!({ "cycle": self.cycles + 1 }),
            ));
        };

        let vessel = match self.ctx.hub.watch_vessel(&target) {
            Ok(vessel) => vessel,
            Err(e) => return WatchOutcome::Failed(e),
        };
        let timeout = self.ctx.vessel_timeout;
        tokio::select! {
            _ = self.stop.cancelled() => WatchOutcome::Stopped,
            polled = tokio::time::timeout(timeout, vessel.poll()) => match polled {
                Ok(Ok(observation)) => WatchOutcome::Observed(observation),
                Ok(Err(e)) => WatchOutcome::Failed(e),
                Err(_) => WatchOutcome::Failed(VesselError::Timeout {
                    vessel: target,
                    timeout_ms: timeout.as_millis() as u64,
                }),
            },
        }
    }

    fn drain_controls(&mut self) {
        while let Ok(message) = self.control.try_recv() {
            match message {
                Control::Update(update) => self.apply_update(&update),
                // A RealTime pulse is always awake
                Control::Trigger if self.pulse.interval == IntervalKind::RealTime => {}
                Control::Trigger => {
                    self.pending_trigger = true;
                    break;
                }
            }
        }
    }

    // ── Deliberating / Synthesizing ──────────────────────────────────

    async fn cycle(&mut self, observation: Observation) -> Result<(), FatalCovenantViolation> {
        self.set_phase(PulsePhase::Deliberating);
        self.potentiality.apply(DriveEvent::Awaken);
        let candidates = self.candidates(&observation).await;

        self.set_phase(PulsePhase::Synthesizing);
        let Some(best) = self.synthesize(&candidates)? else {
            return Ok(());
        };

        self.potentiality.commit(&best.proposal, best.aspiration);
        if self.potentiality.state() == DriveState::Active && self.potentiality.is_stagnant() {
            self.potentiality.apply(DriveEvent::Stagnated);
        }

        if self.stop.is_stopped() {
            return Ok(());
        }

        self.set_phase(PulsePhase::Manifesting);
        self.manifest(best).await;
        Ok(())
    }

    async fn candidates(&self, observation: &Observation) -> Vec<String> {
        let mut candidates: Vec<String> = self
            .pulse
            .proposals
            .iter()
            .map(ProposalDecl::text)
            .filter(|text| !text.trim().is_empty())
            .collect();

        if let Some(source) = &self.ctx.proposal_source {
            candidates.extend(source.propose(&self.domain.name, observation).await);
        }
        if candidates.is_empty() {
            candidates.push(self.domain.intent.clone());
        }
        if let Some(dream) = self.dream() {
            if !candidates.contains(&dream) {
                candidates.push(dream);
            }
        }
        candidates
    }

    /// Extra candidate of an exploring domain with Dream_Cycle on:
    /// its Drive, else its Purpose trajectory
    fn dream(&self) -> Option<String> {
        if !self.domain.dreams() || self.potentiality.state() != DriveState::Exploring {
            return None;
        }
        self.domain
            .potentiality
            .drive
            .clone()
            .or_else(|| self.domain.purpose.as_ref()?.trajectory.clone())
            .filter(|text| !text.trim().is_empty())
    }

    fn coherence(&self, proposal: &str) -> Option<f64> {
        let scored = self
            .ctx
            .engine
            .coherence(proposal, &self.domain.pantheon, &self.domain.context);
        match scored {
            Ok(coherence) => coherence,
            Err(e) => {
                tracing::warn!(
                    domain = %self.domain.name,
                    proposal = %proposal,
                    error = %e,
                    "Coherence unavailable"
                );
                None
            }
        }
    }

    /// Score every candidate and keep the best; ties go to the first
    fn synthesize(
        &mut self,
        candidates: &[String],
    ) -> Result<Option<Scored>, FatalCovenantViolation> {
        let weight = self.potentiality.settings().aspiration_weight;
        let mut best: Option<Scored> = None;

        for proposal in candidates {
            let aspiration = self.potentiality.evaluate(proposal);
            let input = AspirationInput {
                score: aspiration,
                weight,
            };

            let result = match self.ctx.engine.score(
                proposal,
                &self.domain.pantheon,
                &self.pulse.metrics,
                Some(input),
            ) {
                Ok(result) => result,
                Err(EngineError::CriticalCovenant { covenant, source }) => {
                    let message =
                        format!("critical covenant \"{}\" unavailable: {}", covenant, source);
                    self.fail_cycle(Some(proposal.clone()), message.clone());
                    return Err(FatalCovenantViolation {
                        domain: self.domain.name.clone(),
                        covenant,
                        alignment: 0.0,
                        reason: message,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        domain = %self.domain.name,
                        proposal = %proposal,
                        error = %e,
                        "Synthesis failed"
                    );
                    self.fail_cycle(Some(proposal.clone()), e.to_string());
                    return Ok(None);
                }
            };

            if let Some(violation) = result.critical_violation().cloned() {
                let fatal = FatalCovenantViolation {
                    domain: self.domain.name.clone(),
                    covenant: violation.covenant.clone(),
                    alignment: violation.alignment,
                    reason: format!("proposal \"{}\" was vetoed", proposal),
                };
                self.ctx.sink.emit(
                    self.event(ComplianceKind::Vetoed)
                        .with_result(proposal.clone(), &result)
                        .with_error(&fatal),
                );
                self.publish(
                    CycleOutcome::Vetoed {
                        covenant: fatal.covenant.clone(),
                    },
                    Some(proposal.clone()),
                    Some(result),
                    None,
                );
                return Err(fatal);
            }

            tracing::debug!(
                domain = %self.domain.name,
                proposal = %proposal,
                resonance = result.score,
                aspiration = aspiration,
                "Candidate scored"
            );

            if best.as_ref().map_or(true, |b| result.score > b.result.score) {
                best = Some(Scored {
                    proposal: proposal.clone(),
                    aspiration,
                    result,
                    coherence: None,
                });
            }
        }

        if let Some(best) = best.as_mut() {
            best.coherence = self.coherence(&best.proposal);
        }
        Ok(best)
    }

    // ── Manifesting ──────────────────────────────────────────────────

    async fn manifest(&mut self, best: Scored) {
        let score = best.result.score;
        let threshold = self.manifest_threshold;

        if !threshold.is_some_and(|t| score > t) {
            tracing::info!(
                domain = %self.domain.name,
                proposal = %best.proposal,
                resonance = score,
                threshold = ?threshold,
                "Proposal deferred"
            );
            self.ctx.sink.emit(
                self.event(ComplianceKind::Deferred)
                    .with_result(best.proposal.clone(), &best.result),
            );
            self.publish(
                CycleOutcome::Deferred { threshold },
                Some(best.proposal),
                Some(best.result),
                best.coherence,
            );
            return;
        }

        let executes: Vec<Expr> = self
            .pulse
            .manifest
            .as_ref()
            .map(|m| m.executes().cloned().collect())
            .unwrap_or_default();
        let updates: Vec<UpdateDirective> = self
            .pulse
            .manifest
            .as_ref()
            .map(|m| m.updates().cloned().collect())
            .unwrap_or_default();

        let mut actions = Vec::new();
        let mut failures = Vec::new();
        for expr in &executes {
            let descriptor = match self.describe(expr, &best) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    failures.push(e.to_string());
                    continue;
                }
            };
            let label = format!("{}({})", descriptor.target, descriptor.arguments.join(", "));
            match self.execute(descriptor).await {
                Ok(ack) => {
                    tracing::debug!(
                        domain = %self.domain.name,
                        target = %ack.target,
                        "Action acknowledged"
                    );
                    actions.push(label);
                }
                Err(e) => {
                    tracing::warn!(
                        domain = %self.domain.name,
                        action = %label,
                        error = %e,
                        "Action failed"
                    );
                    self.ctx.sink.emit(
                        self.event(ComplianceKind::Error)
                            .with_result(best.proposal.clone(), &best.result)
                            .with_action(label.clone())
                            .with_error(&e),
                    );
                    failures.push(format!("{}: {}", label, e));
                }
            }
        }

        self.potentiality.apply(DriveEvent::Manifested);
        for update in &updates {
            self.apply_update(update);
        }

        tracing::info!(
            domain = %self.domain.name,
            proposal = %best.proposal,
            resonance = score,
            actions = actions.len(),
            "Proposal manifested"
        );
        let mut event = self
            .event(ComplianceKind::Manifested)
            .with_result(best.proposal.clone(), &best.result);
        if !actions.is_empty() {
            event = event.with_action(actions.join("; "));
        }
        self.ctx.sink.emit(event);
        self.publish(
            CycleOutcome::Manifested { actions, failures },
            Some(best.proposal),
            Some(best.result),
            best.coherence,
        );
    }

    fn describe(&self, expr: &Expr, best: &Scored) -> Result<ActionDescriptor, VesselError> {
        let (target, arguments) = match expr {
            Expr::Call { callee, args } => (
                callee.vessel_name(),
                args.iter().map(Expr::as_text).collect(),
            ),
            Expr::Path(path) => (path.vessel_name(), Vec::new()),
            Expr::Str(text) => (CONSOLE_WRITE.to_string(), vec![text.clone()]),
            Expr::Number(n) => {
                return Err(VesselError::Unbound(n.to_string()));
            }
        };
        Ok(ActionDescriptor {
            domain: self.domain.name.clone(),
            target,
            arguments,
            proposal: best.proposal.clone(),
            resonance: best.result.score,
        })
    }

    async fn execute(&self, descriptor: ActionDescriptor) -> Result<Ack, VesselError> {
        let vessel = self.ctx.hub.manifest_vessel(&descriptor.target)?;
        let target = descriptor.target.clone();
        let timeout = self.ctx.vessel_timeout;
        match tokio::time::timeout(timeout, vessel.execute(descriptor)).await {
            Ok(result) => result,
            Err(_) => Err(VesselError::Timeout {
                vessel: target,
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    // ── State ────────────────────────────────────────────────────────

    fn apply_update(&mut self, update: &UpdateDirective) {
        match self.try_apply_update(update) {
            Ok(()) => tracing::info!(
                domain = %self.domain.name,
                target = %update.target,
                value = %update.value,
                "Update applied"
            ),
            Err(reason) => tracing::warn!(
                domain = %self.domain.name,
                target = %update.target,
                reason = %reason,
                "Update ignored"
            ),
        }
        self.sync_status();
    }

    fn try_apply_update(&mut self, update: &UpdateDirective) -> Result<(), String> {
        if update.target.is(&["Potentiality", "State"]) {
            let name = match &update.value {
                Expr::Path(path) => path.to_string(),
                Expr::Str(text) => text.clone(),
                other => return Err(format!("'{}' is not a drive state", other)),
            };
            let state = DriveState::from_name(&name)
                .ok_or_else(|| format!("unknown drive state '{}'", name))?;
            self.potentiality.set_state(state);
            Ok(())
        } else if update.target.is(&["Manifest", "Threshold"]) {
            match update.value {
                Expr::Number(n) if (0.0..=1.0).contains(&n) => {
                    self.manifest_threshold = Some(n);
                    Ok(())
                }
                ref other => Err(format!("'{}' is not a threshold in [0, 1]", other)),
            }
        } else {
            Err(format!("unsupported update target '{}'", update.target))
        }
    }

    fn set_phase(&self, phase: PulsePhase) {
        self.status.write().phase = phase;
    }

    fn sync_status(&self) {
        let mut status = self.status.write();
        status.drive_state = self.potentiality.state();
        status.aspiration = self.potentiality.aspiration();
        status.cycles = self.cycles;
        status.manifest_threshold = self.manifest_threshold;
    }

    fn event(&self, kind: ComplianceKind) -> ComplianceEvent {
        ComplianceEvent::new(self.ctx.run_id, self.domain.name.clone(), kind)
    }

    fn fail_cycle(&mut self, proposal: Option<String>, message: String) {
        let mut event = self.event(ComplianceKind::Error).with_error(&message);
        event.proposal = proposal.clone();
        self.ctx.sink.emit(event);
        self.publish(CycleOutcome::Error { message }, proposal, None, None);
    }

    fn publish(
        &mut self,
        outcome: CycleOutcome,
        proposal: Option<String>,
        resonance: Option<ResonanceResult>,
        coherence: Option<f64>,
    ) {
        self.cycles += 1;
        self.sync_status();
        let report = CycleReport {
            run_id: self.ctx.run_id,
            domain: self.domain.name.clone(),
            cycle: self.cycles,
            outcome,
            proposal,
            resonance,
            coherence,
            drive_state: self.potentiality.state(),
            aspiration: self.potentiality.aspiration(),
            timestamp: Utc::now(),
        };
        self.ctx.metrics.record(&report);
        // No subscribers is fine
        let _ = self.ctx.reports.send(report);
    }
}

/// Vessel name named by a Watch or Execute expression
fn vessel_name(expr: &Expr) -> String {
    match expr {
        Expr::Call { callee, .. } => callee.vessel_name(),
        Expr::Path(path) => path.vessel_name(),
        other => other.as_text(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesis_dsl::Path;

    #[tokio::test]
    async fn test_stop_signal_wakes_waiters() {
        let signal = StopSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };
        tokio::task::yield_now().await;
        signal.stop();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(signal.is_stopped());
        // Already stopped resolves at once
        signal.cancelled().await;
    }

    #[tokio::test]
    async fn test_pause_signal_holds_until_resumed() {
        let signal = PauseSignal::new();
        // Not paused resolves at once
        signal.resumed().await;

        signal.pause();
        assert!(signal.is_paused());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.resumed().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        signal.resume();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(!signal.is_paused());
    }

    #[test]
    fn test_vessel_name() {
        let call = Expr::Call {
            callee: Path::new(["Vessel", "Grid", "control"]),
            args: vec![Expr::Str("now".into())],
        };
        assert_eq!(vessel_name(&call), "Grid.control");
        assert_eq!(vessel_name(&Expr::Path(Path::new(["tick"]))), "tick");
    }

    #[test]
    fn test_outcome_is_tagged() {
        let json = serde_json::to_value(CycleOutcome::Deferred {
            threshold: Some(0.5),
        })
        .unwrap();
        assert_eq!(json["outcome"], "deferred");
        assert_eq!(json["threshold"], 0.5);
    }
}
