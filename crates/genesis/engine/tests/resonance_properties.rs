//! Property tests: resonance scores stay in the unit interval and vetoes are absolute.

use genesis_engine::{
    AlignmentOracle, AspirationInput, Avatar, Covenant, Metric, OracleError, Pantheon,
    ResonanceEngine,
};
use proptest::prelude::*;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Oracle that answers from a fixed table keyed by avatar essence.
struct Table(Vec<f64>);

impl AlignmentOracle for Table {
    fn align(
        &self,
        _proposal: &str,
        essence: &str,
        _covenants: &[&str],
    ) -> Result<f64, OracleError> {
        let index: usize = essence.parse().unwrap_or(0);
        Ok(self.0.get(index).copied().unwrap_or(0.0))
    }
}

/// Generate an avatar weight, sometimes left to the default.
fn arb_weight() -> impl Strategy<Value = Option<f64>> {
    prop_oneof![Just(None), (0.0f64..5.0).prop_map(Some)]
}

/// Generate a raw oracle answer, including values outside [0, 1].
fn arb_alignment() -> impl Strategy<Value = f64> {
    prop_oneof![0.0f64..=1.0, -2.0f64..3.0]
}

fn pantheon(weights: &[Option<f64>]) -> Pantheon {
    let avatars = weights
        .iter()
        .enumerate()
        .map(|(i, w)| Avatar::new(format!("a{}", i), i.to_string(), *w))
        .collect();
    Pantheon::new("Council", avatars)
}

fn metrics(thresholds: &[f64], aspiration: bool) -> Vec<Metric> {
    let mut metrics: Vec<Metric> = thresholds
        .iter()
        .enumerate()
        .map(|(i, t)| Covenant::new(format!("c{}", i), "Do no harm", *t))
        .map(|c| Metric::Alignment(Arc::new(c)))
        .collect();
    if aspiration {
        metrics.push(Metric::Aspiration);
    }
    metrics
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Any pantheon, covenant set and aspiration yields a score in [0, 1].
    #[test]
    fn score_is_always_in_unit_interval(
        weights in prop::collection::vec(arb_weight(), 1..6),
        answers in prop::collection::vec(arb_alignment(), 6),
        thresholds in prop::collection::vec(0.0f64..1.0, 1..4),
        aspiration in (0.0f64..=1.0, 0.0f64..2.0),
        with_aspiration in any::<bool>(),
    ) {
        let engine = ResonanceEngine::new(Arc::new(Table(answers)));
        let result = engine
            .score(
                "Shift demand off peak",
                &pantheon(&weights),
                &metrics(&thresholds, with_aspiration),
                Some(AspirationInput { score: aspiration.0, weight: aspiration.1 }),
            )
            .unwrap();

        prop_assert!((0.0..=1.0).contains(&result.score));
        prop_assert!((0.0..=1.0).contains(&result.consensus));
        for covenant in &result.covenants {
            prop_assert!((0.0..=1.0).contains(&covenant.alignment));
        }
    }

    /// A vetoed result always scores exactly zero, and an unvetoed one never
    /// exceeds the larger of its consensus and aspiration.
    #[test]
    fn veto_forces_zero(
        weights in prop::collection::vec(arb_weight(), 1..6),
        answers in prop::collection::vec(0.0f64..=1.0, 6),
        thresholds in prop::collection::vec(0.0f64..1.0, 1..4),
        aspiration in 0.0f64..=1.0,
    ) {
        let engine = ResonanceEngine::new(Arc::new(Table(answers)));
        let result = engine
            .score(
                "Shift demand off peak",
                &pantheon(&weights),
                &metrics(&thresholds, true),
                Some(AspirationInput { score: aspiration, weight: 0.25 }),
            )
            .unwrap();

        if result.vetoed {
            prop_assert_eq!(result.score, 0.0);
            prop_assert!(result.veto_covenant.is_some());
        } else {
            prop_assert!(result.score <= result.consensus.max(aspiration) + 1e-12);
        }
    }
}
