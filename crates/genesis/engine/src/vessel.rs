//! Vessels: bindings between domains and the outside world
//!
//! A watch vessel produces observations that wake a pulse. A manifest
//! vessel carries out actions once a proposal clears the resonance gate.
//! The scheduler applies timeouts; vessels themselves need not.

use crate::error::VesselError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Name under which the console vessel is always registered
pub const CONSOLE_WRITE: &str = "console.write";

/// Something a domain noticed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub source: String,
    pub payload: serde_json::Value,
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(source: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            source: source.into(),
            payload,
            observed_at: Utc::now(),
        }
    }
}

/// An action handed to a manifest vessel
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub domain: String,
    /// Vessel name with any leading `Vessel.` stripped
    pub target: String,
    pub arguments: Vec<String>,
    /// Text of the proposal that earned the action
    pub proposal: String,
    pub resonance: f64,
}

/// Acknowledgement returned by a manifest vessel
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub target: String,
    pub detail: String,
}

#[async_trait]
pub trait WatchVessel: Send + Sync {
    async fn poll(&self) -> Result<Observation, VesselError>;
}

#[async_trait]
pub trait ManifestVessel: Send + Sync {
    async fn execute(&self, action: ActionDescriptor) -> Result<Ack, VesselError>;
}

/// Emits a numbered observation every `interval`
#[derive(Debug)]
pub struct TickVessel {
    name: String,
    interval: Duration,
    ticks: AtomicU64,
}

impl TickVessel {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            ticks: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl WatchVessel for TickVessel {
    async fn poll(&self) -> Result<Observation, VesselError> {
        if !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(Observation::new(
            self.name.clone(),
            serde_json::json!({ "tick": tick }),
        ))
    }
}

/// Writes actions to stdout and the log
#[derive(Debug, Default)]
pub struct ConsoleVessel {
    quiet: bool,
}

impl ConsoleVessel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log actions without printing them
    pub fn quiet() -> Self {
        Self { quiet: true }
    }
}

#[async_trait]
impl ManifestVessel for ConsoleVessel {
    async fn execute(&self, action: ActionDescriptor) -> Result<Ack, VesselError> {
        let detail = if action.arguments.is_empty() {
            action.proposal.clone()
        } else {
            action.arguments.join(" ")
        };
        tracing::info!(
            domain = %action.domain,
            target = %action.target,
            resonance = action.resonance,
            "{}",
            detail
        );
        if !self.quiet {
            println!("[{}] {}", action.domain, detail);
        }
        Ok(Ack {
            target: action.target,
            detail,
        })
    }
}

/// Name → vessel bindings with optional fallbacks
#[derive(Clone)]
pub struct VesselHub {
    watch: HashMap<String, Arc<dyn WatchVessel>>,
    manifest: HashMap<String, Arc<dyn ManifestVessel>>,
    watch_fallback: Option<Arc<dyn WatchVessel>>,
    manifest_fallback: Option<Arc<dyn ManifestVessel>>,
}

impl std::fmt::Debug for VesselHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut watch: Vec<_> = self.watch.keys().collect();
        let mut manifest: Vec<_> = self.manifest.keys().collect();
        watch.sort();
        manifest.sort();
        f.debug_struct("VesselHub")
            .field("watch", &watch)
            .field("manifest", &manifest)
            .field("watch_fallback", &self.watch_fallback.is_some())
            .field("manifest_fallback", &self.manifest_fallback.is_some())
            .finish()
    }
}

impl Default for VesselHub {
    fn default() -> Self {
        Self::new()
    }
}

impl VesselHub {
    /// A hub with only `console.write` bound
    pub fn new() -> Self {
        let mut hub = Self {
            watch: HashMap::new(),
            manifest: HashMap::new(),
            watch_fallback: None,
            manifest_fallback: None,
        };
        hub.bind_manifest(CONSOLE_WRITE, Arc::new(ConsoleVessel::new()));
        hub
    }

    /// Unbound watch names tick every `tick`; unbound actions go to the console
    pub fn with_fallbacks(tick: Duration) -> Self {
        let mut hub = Self::new();
        hub.watch_fallback = Some(Arc::new(TickVessel::new("tick", tick)));
        hub.manifest_fallback = Some(Arc::new(ConsoleVessel::new()));
        hub
    }

    pub fn bind_watch(&mut self, name: impl Into<String>, vessel: Arc<dyn WatchVessel>) {
        self.watch.insert(name.into(), vessel);
    }

    pub fn bind_manifest(&mut self, name: impl Into<String>, vessel: Arc<dyn ManifestVessel>) {
        self.manifest.insert(name.into(), vessel);
    }

    pub fn set_watch_fallback(&mut self, vessel: Option<Arc<dyn WatchVessel>>) {
        self.watch_fallback = vessel;
    }

    pub fn set_manifest_fallback(&mut self, vessel: Option<Arc<dyn ManifestVessel>>) {
        self.manifest_fallback = vessel;
    }

    pub fn watch_vessel(&self, name: &str) -> Result<Arc<dyn WatchVessel>, VesselError> {
        self.watch
            .get(name)
            .or(self.watch_fallback.as_ref())
            .cloned()
            .ok_or_else(|| VesselError::Unbound(name.to_string()))
    }

    pub fn manifest_vessel(&self, name: &str) -> Result<Arc<dyn ManifestVessel>, VesselError> {
        self.manifest
            .get(name)
            .or(self.manifest_fallback.as_ref())
            .cloned()
            .ok_or_else(|| VesselError::Unbound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(target: &str, args: &[&str]) -> ActionDescriptor {
        ActionDescriptor {
            domain: "Grid".into(),
            target: target.into(),
            arguments: args.iter().map(|s| s.to_string()).collect(),
            proposal: "Shift load".into(),
            resonance: 0.9,
        }
    }

    #[test]
    fn test_console_is_preregistered() {
        let hub = VesselHub::new();
        assert!(hub.manifest_vessel(CONSOLE_WRITE).is_ok());
        assert!(matches!(
            hub.manifest_vessel("Grid.control"),
            Err(VesselError::Unbound(name)) if name == "Grid.control"
        ));
        assert!(hub.watch_vessel("tick").is_err());
    }

    #[test]
    fn test_fallbacks_resolve_any_name() {
        let hub = VesselHub::with_fallbacks(Duration::ZERO);
        assert!(hub.watch_vessel("Grid.load").is_ok());
        assert!(hub.manifest_vessel("Grid.control").is_ok());
    }

    #[test]
    fn test_console_ack_uses_arguments() {
        let ack = tokio_test::block_on(
            ConsoleVessel::quiet().execute(action(CONSOLE_WRITE, &["hello", "grid"])),
        )
        .unwrap();
        assert_eq!(ack.detail, "hello grid");

        let ack = tokio_test::block_on(ConsoleVessel::quiet().execute(action(CONSOLE_WRITE, &[])))
            .unwrap();
        assert_eq!(ack.detail, "Shift load");
    }

    #[tokio::test]
    async fn test_tick_vessel_counts() {
        let vessel = TickVessel::new("tick", Duration::ZERO);
        let first = vessel.poll().await.unwrap();
        let second = vessel.poll().await.unwrap();
        assert_eq!(first.payload["tick"], 1);
        assert_eq!(second.payload["tick"], 2);
        assert_eq!(second.source, "tick");
    }
}
