//! Decrees: resonance-gated cross-domain updates
//!
//! A decree's action text is scored like a proposal against each target
//! domain's pantheon and covenants. Its updates reach the domain only when
//! the condition holds for that score. A vetoed action never holds, whatever
//! the comparison. Each `Constraint` is judged as one more covenant, so an
//! action that breaks a constraint is vetoed.

use crate::error::EngineResult;
use crate::registry::{Decree, Domain, Metric, Registry};
use crate::resonance::{ResonanceEngine, ResonanceResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of evaluating one decree against one domain
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecreeOutcome {
    pub decree: String,
    pub domain: String,
    pub resonance: ResonanceResult,
    /// Whether the condition held
    pub holds: bool,
    /// Whether the updates were delivered to a running scheduler
    pub applied: bool,
}

/// Domains a decree addresses: its target, or every domain
pub fn targets(registry: &Registry, decree: &Decree) -> Vec<Arc<Domain>> {
    match &decree.target {
        Some(name) => registry.domain(name).cloned().into_iter().collect(),
        None => registry.domains().to_vec(),
    }
}

/// Covenant metrics a decree is judged by in `domain`.
///
/// These are the Alignment metrics of the domain's Synthesize block; a
/// domain without a pulse is judged by every declared covenant.
pub fn metrics_for(registry: &Registry, domain: &Domain) -> Vec<Metric> {
    let declared: Vec<Metric> = domain
        .pulse
        .iter()
        .flat_map(|pulse| pulse.covenants())
        .map(|c| Metric::Alignment(c.clone()))
        .collect();
    if !declared.is_empty() {
        return declared;
    }
    registry
        .covenants()
        .iter()
        .map(|c| Metric::Alignment(c.clone()))
        .collect()
}

/// Score a decree against one domain and test its condition
pub fn evaluate(
    engine: &ResonanceEngine,
    registry: &Registry,
    decree: &Decree,
    domain: &Domain,
) -> EngineResult<DecreeOutcome> {
    let mut metrics = metrics_for(registry, domain);
    metrics.extend(decree.constraints.iter().cloned().map(Metric::Alignment));
    let resonance = engine.score(&decree.action, &domain.pantheon, &metrics, None)?;
    let holds = !resonance.vetoed && decree.condition.holds(resonance.score);

    tracing::info!(
        decree = %decree.name,
        domain = %domain.name,
        resonance = resonance.score,
        holds,
        "Decree evaluated"
    );

    Ok(DecreeOutcome {
        decree: decree.name.clone(),
        domain: domain.name.clone(),
        resonance,
        holds,
        applied: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OracleError;
    use crate::oracle::FixedOracle;
    use crate::registry::bind;
    use genesis_dsl::parse_source;

    const SOURCE: &str = r#"
Covenant "Safety" { Invariant: "Do no harm" Threshold: 0.3 }
Covenant "Speed" { Invariant: "Act quickly" Threshold: 0.2 }
Pantheon "Council" { Avatar "Athena" { Lineage: "Greek" Essence: "Wisdom" } }
Domain "Grid" {
    Intent: "Balance load"
    Pantheon: "Council"
    Pulse {
        Deliberate {
            Synthesize { Metric: Alignment(Covenant.Safety) }
        }
    }
}
Domain "Archive" {
    Intent: "Keep records"
    Pantheon: "Council"
}
Decree "Storm" {
    Condition: Resonance > 0.5
    Action: "Raise the gate"
    Target: Domain.Grid
}
Decree "Quiet" {
    Condition: Resonance < 0.5
    Action: "Stand down"
}
Decree "Guarded" {
    Condition: Resonance > 0.5
    Action: "Raise the gate"
    Target: Domain.Grid
    Constraint: "Keep the lights on"
}
"#;

    fn registry() -> Registry {
        bind(&parse_source(SOURCE).unwrap().program).unwrap()
    }

    #[test]
    fn test_targets() {
        let registry = registry();
        let storm = registry.decree("Storm").unwrap();
        let names: Vec<_> = targets(&registry, storm).iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, ["Grid"]);

        let quiet = registry.decree("Quiet").unwrap();
        assert_eq!(targets(&registry, quiet).len(), 2);
    }

    #[test]
    fn test_metrics_follow_synthesize_block() {
        let registry = registry();
        let grid = registry.domain("Grid").unwrap();
        let labels: Vec<_> = metrics_for(&registry, grid).iter().map(Metric::label).collect();
        assert_eq!(labels, ["Alignment(Covenant.Safety)"]);

        let archive = registry.domain("Archive").unwrap();
        assert_eq!(metrics_for(&registry, archive).len(), 2);
    }

    #[test]
    fn test_condition_gates_on_resonance() {
        let registry = registry();
        let grid = registry.domain("Grid").unwrap();
        let storm = registry.decree("Storm").unwrap();

        let engine = ResonanceEngine::new(Arc::new(FixedOracle(0.8)));
        let outcome = evaluate(&engine, &registry, storm, grid).unwrap();
        assert!(outcome.holds);
        assert!(!outcome.applied);

        let engine = ResonanceEngine::new(Arc::new(FixedOracle(0.4)));
        let outcome = evaluate(&engine, &registry, storm, grid).unwrap();
        assert!(!outcome.holds);
    }

    #[test]
    fn test_broken_constraint_vetoes() {
        let registry = registry();
        let grid = registry.domain("Grid").unwrap();
        let guarded = registry.decree("Guarded").unwrap();

        let dark = |_: &str, _: &str, texts: &[&str]| -> Result<f64, OracleError> {
            Ok(if texts == ["Keep the lights on"] { 0.2 } else { 0.9 })
        };
        let engine = ResonanceEngine::new(Arc::new(dark));
        let outcome = evaluate(&engine, &registry, guarded, grid).unwrap();
        assert_eq!(outcome.resonance.covenants.len(), 2);
        assert_eq!(
            outcome.resonance.veto_covenant.as_deref(),
            Some("Guarded constraint 1")
        );
        assert!(!outcome.holds);

        let engine = ResonanceEngine::new(Arc::new(FixedOracle(0.9)));
        assert!(evaluate(&engine, &registry, guarded, grid).unwrap().holds);
    }

    #[test]
    fn test_vetoed_action_never_holds() {
        let registry = registry();
        let grid = registry.domain("Grid").unwrap();
        let quiet = registry.decree("Quiet").unwrap();

        // 0.1 falls below Safety's 0.3, so the score is forced to zero
        let engine = ResonanceEngine::new(Arc::new(FixedOracle(0.1)));
        let outcome = evaluate(&engine, &registry, quiet, grid).unwrap();
        assert!(outcome.resonance.vetoed);
        assert_eq!(outcome.resonance.score, 0.0);
        assert!(quiet.condition.holds(outcome.resonance.score));
        assert!(!outcome.holds);

        let engine = ResonanceEngine::new(Arc::new(FixedOracle(0.4)));
        let outcome = evaluate(&engine, &registry, quiet, grid).unwrap();
        assert!(!outcome.resonance.vetoed);
        assert!(outcome.holds);
    }
}
