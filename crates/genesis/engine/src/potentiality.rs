//! Potentiality: novelty-seeking aspiration and drive state
//!
//! A domain's aspiration rewards proposals unlike its recent choices.
//! Novelty is one minus the highest Jaccard similarity between the
//! proposal's word set and each remembered proposal. A novel proposal lifts
//! aspiration straight to its target; a familiar one lets it decay
//! geometrically toward the floor.

use genesis_dsl::{DriveState, PotentialityBlock};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Tunables for one domain's potentiality
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PotentialitySettings {
    /// Lowest aspiration a domain can hold
    #[serde(default = "default_floor")]
    pub floor: f64,
    /// Share of the gap to target retained per cycle while decaying
    #[serde(default = "default_decay")]
    pub decay: f64,
    /// Number of past proposals compared against
    #[serde(default = "default_window")]
    pub window: usize,
    /// Weight of aspiration when a Synthesize block lists it
    #[serde(default = "default_aspiration_weight")]
    pub aspiration_weight: f64,
}

impl Default for PotentialitySettings {
    fn default() -> Self {
        Self {
            floor: default_floor(),
            decay: default_decay(),
            window: default_window(),
            aspiration_weight: default_aspiration_weight(),
        }
    }
}

fn default_floor() -> f64 {
    0.1
}

fn default_decay() -> f64 {
    0.5
}

fn default_window() -> usize {
    16
}

fn default_aspiration_weight() -> f64 {
    0.25
}

impl PotentialitySettings {
    /// Settings from a domain's block, falling back to `self` per field
    pub fn merged_with(&self, block: &PotentialityBlock) -> Self {
        Self {
            floor: block.floor.unwrap_or(self.floor),
            decay: block.decay.unwrap_or(self.decay),
            window: block.window.unwrap_or(self.window).max(1),
            aspiration_weight: block.aspiration_weight.unwrap_or(self.aspiration_weight),
        }
    }
}

/// Events that move a domain between drive states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriveEvent {
    /// Deliberation began
    Awaken,
    /// A proposal crossed the manifest threshold
    Manifested,
    /// Aspiration sank to the floor
    Stagnated,
    /// Explicit request to rest
    Rest,
}

/// Apply a drive event; events with no transition leave the state unchanged
pub fn transition(state: DriveState, event: DriveEvent) -> DriveState {
    match (state, event) {
        (_, DriveEvent::Rest) => DriveState::Dormant,
        (DriveState::Dormant, DriveEvent::Awaken) => DriveState::Exploring,
        (DriveState::Exploring, DriveEvent::Manifested) => DriveState::Active,
        (DriveState::Active, DriveEvent::Stagnated) => DriveState::Exploring,
        (state, _) => state,
    }
}

fn word_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// |A ∩ B| / |A ∪ B| over lower-cased word sets; two empty texts are identical
pub fn jaccard(a: &str, b: &str) -> f64 {
    let a = word_set(a);
    let b = word_set(b);
    let union = a.union(&b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// 1 − max similarity to any remembered proposal; 1 with no history
pub fn novelty<'a>(proposal: &str, history: impl IntoIterator<Item = &'a String>) -> f64 {
    let max = history
        .into_iter()
        .map(|past| jaccard(proposal, past))
        .fold(0.0_f64, f64::max);
    (1.0 - max).clamp(0.0, 1.0)
}

/// Per-domain potentiality state
#[derive(Clone, Debug, PartialEq)]
pub struct Potentiality {
    settings: PotentialitySettings,
    state: DriveState,
    aspiration: f64,
    history: VecDeque<String>,
}

impl Potentiality {
    pub fn new(settings: PotentialitySettings, state: DriveState) -> Self {
        Self {
            settings,
            state,
            aspiration: settings.floor,
            history: VecDeque::with_capacity(settings.window),
        }
    }

    pub fn settings(&self) -> &PotentialitySettings {
        &self.settings
    }

    pub fn state(&self) -> DriveState {
        self.state
    }

    /// Aspiration committed by the last selected proposal
    pub fn aspiration(&self) -> f64 {
        self.aspiration
    }

    pub fn history(&self) -> impl Iterator<Item = &String> {
        self.history.iter()
    }

    /// Aspiration a proposal would earn, without changing state
    pub fn evaluate(&self, proposal: &str) -> f64 {
        let floor = self.settings.floor;
        if self.state == DriveState::Dormant {
            return floor;
        }

        let target = floor + (1.0 - floor) * novelty(proposal, &self.history);
        let previous = self.aspiration;
        let score = if target >= previous {
            target
        } else {
            previous - (previous - target) * (1.0 - self.settings.decay)
        };
        score.clamp(floor, 1.0)
    }

    /// Commit the selected proposal's aspiration and remember it
    pub fn commit(&mut self, proposal: &str, aspiration: f64) {
        self.aspiration = aspiration.clamp(self.settings.floor, 1.0);
        self.record(proposal);
    }

    /// Append a proposal to the bounded history
    pub fn record(&mut self, proposal: &str) {
        while self.history.len() >= self.settings.window {
            self.history.pop_front();
        }
        self.history.push_back(proposal.to_string());
    }

    /// True when aspiration has sunk to the floor
    pub fn is_stagnant(&self) -> bool {
        self.aspiration <= self.settings.floor + 1e-9
    }

    pub fn apply(&mut self, event: DriveEvent) -> DriveState {
        let next = transition(self.state, event);
        if next != self.state {
            tracing::debug!(from = %self.state, to = %next, ?event, "Drive state changed");
        }
        if event == DriveEvent::Rest {
            self.aspiration = self.settings.floor;
        }
        self.state = next;
        next
    }

    /// Force a drive state, as done by `Update: Potentiality.State -> X`
    pub fn set_state(&mut self, state: DriveState) {
        if state == DriveState::Dormant {
            self.apply(DriveEvent::Rest);
        } else {
            self.state = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exploring() -> Potentiality {
        Potentiality::new(PotentialitySettings::default(), DriveState::Exploring)
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard("Shift Load", "shift load"), 1.0);
        assert_eq!(jaccard("a b", "c d"), 0.0);
        assert!((jaccard("a b c", "a b d") - 0.5).abs() < 1e-12);
        assert_eq!(jaccard("", ""), 1.0);
    }

    #[test]
    fn test_novelty_without_history_is_one() {
        assert_eq!(novelty("anything", &Vec::<String>::new()), 1.0);
        let history = vec!["shift load".to_string(), "cut power".to_string()];
        assert_eq!(novelty("shift load", &history), 0.0);
    }

    #[test]
    fn test_novel_proposal_rises_to_target() {
        let p = exploring();
        assert!((p.evaluate("brand new idea") - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_repeats_decay_toward_floor() {
        let mut p = exploring();
        let mut last = p.evaluate("shift load");
        p.commit("shift load", last);
        assert!((last - 1.0).abs() < 1e-12);

        for _ in 0..20 {
            let next = p.evaluate("shift load");
            assert!(next <= last);
            p.commit("shift load", next);
            last = next;
        }
        assert!((last - 0.1).abs() < 1e-4);
    }

    #[test]
    fn test_geometric_decay_step() {
        let mut p = exploring();
        p.commit("shift load", 1.0);
        // target = floor, retention 0.5: 1 - (1 - 0.1) * 0.5
        assert!((p.evaluate("shift load") - 0.55).abs() < 1e-12);
    }

    #[test]
    fn test_dormant_scores_floor() {
        let p = Potentiality::new(PotentialitySettings::default(), DriveState::Dormant);
        assert_eq!(p.evaluate("brand new idea"), 0.1);
    }

    #[test]
    fn test_history_is_bounded() {
        let settings = PotentialitySettings {
            window: 2,
            ..Default::default()
        };
        let mut p = Potentiality::new(settings, DriveState::Exploring);
        p.record("a");
        p.record("b");
        p.record("c");
        let kept: Vec<_> = p.history().cloned().collect();
        assert_eq!(kept, ["b", "c"]);
    }

    #[test]
    fn test_transitions() {
        use DriveState::*;
        assert_eq!(transition(Dormant, DriveEvent::Awaken), Exploring);
        assert_eq!(transition(Exploring, DriveEvent::Manifested), Active);
        assert_eq!(transition(Active, DriveEvent::Stagnated), Exploring);
        assert_eq!(transition(Active, DriveEvent::Rest), Dormant);
        assert_eq!(transition(Dormant, DriveEvent::Manifested), Dormant);
        assert_eq!(transition(Active, DriveEvent::Awaken), Active);
    }

    #[test]
    fn test_block_overrides_defaults() {
        let block = PotentialityBlock {
            floor: Some(0.2),
            window: Some(4),
            ..Default::default()
        };
        let merged = PotentialitySettings::default().merged_with(&block);
        assert_eq!(merged.floor, 0.2);
        assert_eq!(merged.window, 4);
        assert_eq!(merged.decay, 0.5);
    }
}
