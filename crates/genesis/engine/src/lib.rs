//! Genesis interpreter core
//!
//! Binds a parsed [`genesis_dsl::Program`] into a [`Registry`] and drives
//! every domain's pulse as an independent tokio task. Proposals are scored
//! by the [`ResonanceEngine`]: a weighted consensus of the pantheon's
//! avatars, vetoed by any covenant whose alignment falls below its
//! threshold, optionally blended with the domain's novelty-seeking
//! aspiration.
//!
//! # Usage
//!
//! ```rust,no_run
//! use genesis_engine::{LexicalOracle, MemoryComplianceSink, Runtime, RuntimeConfig};
//! use std::sync::Arc;
//!
//! # async fn demo(source: &str) -> genesis_engine::GenesisResult<()> {
//! let sink = Arc::new(MemoryComplianceSink::new());
//! let (mut runtime, _warnings) = Runtime::load(
//!     source,
//!     RuntimeConfig::default(),
//!     Arc::new(LexicalOracle),
//!     sink.clone(),
//! )?;
//!
//! // RealTime domains run three cycles each, then return
//! runtime.start(Some(3));
//! let violations = runtime.join_all().await;
//! assert!(violations.is_empty());
//!
//! for event in sink.events() {
//!     println!("{} {:?} {:?}", event.domain, event.kind, event.resonance);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod compliance;
pub mod config;
pub mod decree;
pub mod error;
pub mod metrics;
pub mod oracle;
pub mod potentiality;
pub mod registry;
pub mod resonance;
pub mod runtime;
pub mod scheduler;
pub mod vessel;

pub use compliance::{
    ChannelComplianceSink, ComplianceEvent, ComplianceKind, ComplianceSink, MemoryComplianceSink,
};
pub use config::RuntimeConfig;
pub use decree::DecreeOutcome;
pub use error::{
    BindError, EngineError, EngineResult, FatalCovenantViolation, GenesisError, GenesisResult,
    OracleError, VesselError,
};
pub use metrics::{MetricsRecorder, RuntimeMetrics};
pub use oracle::{AlignmentOracle, FixedOracle, LexicalOracle};
pub use potentiality::{DriveEvent, Potentiality, PotentialitySettings};
pub use registry::{
    bind, Avatar, Covenant, Decree, Domain, Metric, Pantheon, Possibility, Pulse, Registry,
};
pub use resonance::{AspirationInput, ResonanceEngine, ResonanceResult};
pub use runtime::{compile, DomainInfo, Runtime, RuntimeInfo, RuntimeState};
pub use scheduler::{
    Control, CycleOutcome, CycleReport, DomainExit, DomainHandle, DomainStatus, ProposalSource,
    PauseSignal, PulsePhase, PulseScheduler, SchedulerContext, StopSignal,
};
pub use vessel::{
    Ack, ActionDescriptor, ConsoleVessel, ManifestVessel, Observation, TickVessel, VesselHub,
    WatchVessel, CONSOLE_WRITE,
};
