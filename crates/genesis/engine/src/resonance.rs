//! Resonance engine: weighted consensus with covenant veto
//!
//! Scoring is a pure function of the proposal, the consulted pantheon, the
//! synthesize metrics and the oracle. It never triggers side effects.

use crate::error::{EngineError, EngineResult, OracleError};
use crate::oracle::AlignmentOracle;
use crate::registry::{Covenant, Metric, Pantheon, Possibility};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Aspiration score and the weight it carries in synthesis
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AspirationInput {
    pub score: f64,
    pub weight: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AvatarScore {
    pub avatar: String,
    pub weight: f64,
    pub score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CovenantScore {
    pub covenant: String,
    pub threshold: f64,
    pub alignment: f64,
    pub passed: bool,
}

impl CovenantScore {
    pub fn is_critical(&self) -> bool {
        self.threshold >= 1.0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricScore {
    pub metric: String,
    pub value: f64,
}

/// Outcome of scoring one proposal
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResonanceResult {
    /// Final resonance in [0, 1]
    pub score: f64,
    /// Weighted consensus before aspiration and veto
    pub consensus: f64,
    pub vetoed: bool,
    /// First covenant, in metric order, whose alignment fell below its threshold
    pub veto_covenant: Option<String>,
    pub avatars: Vec<AvatarScore>,
    pub covenants: Vec<CovenantScore>,
    pub metrics: Vec<MetricScore>,
}

impl ResonanceResult {
    /// A failed covenant with threshold 1.0, if any
    pub fn critical_violation(&self) -> Option<&CovenantScore> {
        self.covenants
            .iter()
            .find(|c| !c.passed && c.is_critical())
    }
}

/// Scores proposals against a pantheon and its covenants
#[derive(Clone)]
pub struct ResonanceEngine {
    oracle: Arc<dyn AlignmentOracle>,
}

impl std::fmt::Debug for ResonanceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResonanceEngine").finish_non_exhaustive()
    }
}

impl ResonanceEngine {
    pub fn new(oracle: Arc<dyn AlignmentOracle>) -> Self {
        Self { oracle }
    }

    /// Score a proposal.
    ///
    /// Each avatar's alignment is taken under the texts of every covenant
    /// the metrics reference; the weighted mean of those is the consensus.
    /// Each referenced covenant is then checked on its own: if its weighted
    /// alignment falls below the threshold the result is vetoed and the
    /// score forced to zero. With an `Aspiration` metric the consensus is
    /// blended as `(C + w * a) / (1 + w)` before the veto applies.
    ///
    /// An oracle failure while judging a critical covenant, alone or as part
    /// of the consensus, is [`EngineError::CriticalCovenant`]; any other is
    /// [`EngineError::Oracle`].
    pub fn score(
        &self,
        proposal: &str,
        pantheon: &Pantheon,
        metrics: &[Metric],
        aspiration: Option<AspirationInput>,
    ) -> EngineResult<ResonanceResult> {
        if metrics.is_empty() {
            return Err(EngineError::MalformedProposal(
                "no synthesize metrics to score against".into(),
            ));
        }
        if proposal.trim().is_empty() {
            return Err(EngineError::MalformedProposal("empty proposal text".into()));
        }

        let covenants: Vec<&Covenant> = metrics
            .iter()
            .filter_map(|m| match m {
                Metric::Alignment(c) => Some(c.as_ref()),
                Metric::Aspiration => None,
            })
            .collect();
        let texts: Vec<&str> = covenants.iter().map(|c| c.invariant.as_str()).collect();
        let weights = pantheon.effective_weights();
        // The consensus pass judges under every covenant at once, so a failure
        // there is charged to the first critical one in metric order
        let critical = covenants.iter().find(|c| c.is_critical());

        let mut avatars = Vec::with_capacity(pantheon.avatars.len());
        for (avatar, &weight) in pantheon.avatars.iter().zip(&weights) {
            let score = self
                .ask(proposal, &avatar.essence, &texts)
                .map_err(|source| match critical {
                    Some(covenant) => EngineError::CriticalCovenant {
                        covenant: covenant.name.clone(),
                        source,
                    },
                    None => EngineError::Oracle {
                        avatar: avatar.name.clone(),
                        source,
                    },
                })?;
            avatars.push(AvatarScore {
                avatar: avatar.name.clone(),
                weight,
                score,
            });
        }
        let consensus = weighted_mean(avatars.iter().map(|a| (a.weight, a.score)));

        let mut covenant_scores = Vec::with_capacity(covenants.len());
        for covenant in &covenants {
            let mut pairs = Vec::with_capacity(pantheon.avatars.len());
            for (avatar, &weight) in pantheon.avatars.iter().zip(&weights) {
                let score = self
                    .ask(proposal, &avatar.essence, &[covenant.invariant.as_str()])
                    .map_err(|source| {
                        if covenant.is_critical() {
                            EngineError::CriticalCovenant {
                                covenant: covenant.name.clone(),
                                source,
                            }
                        } else {
                            EngineError::Oracle {
                                avatar: avatar.name.clone(),
                                source,
                            }
                        }
                    })?;
                pairs.push((weight, score));
            }
            let alignment = weighted_mean(pairs.into_iter());
            covenant_scores.push(CovenantScore {
                covenant: covenant.name.clone(),
                threshold: covenant.threshold(),
                alignment,
                passed: alignment >= covenant.threshold(),
            });
        }

        let veto_covenant = covenant_scores
            .iter()
            .find(|c| !c.passed)
            .map(|c| c.covenant.clone());
        let vetoed = veto_covenant.is_some();

        let mut metric_scores = Vec::with_capacity(metrics.len());
        let mut synthesized = consensus;
        let mut alignment_iter = covenant_scores.iter();
        for metric in metrics {
            match metric {
                Metric::Alignment(_) => {
                    if let Some(c) = alignment_iter.next() {
                        metric_scores.push(MetricScore {
                            metric: metric.label(),
                            value: c.alignment,
                        });
                    }
                }
                Metric::Aspiration => {
                    let input = aspiration.unwrap_or_default();
                    let weight = if input.weight.is_finite() {
                        input.weight.max(0.0)
                    } else {
                        0.0
                    };
                    let value = input.score.clamp(0.0, 1.0);
                    synthesized = (consensus + weight * value) / (1.0 + weight);
                    metric_scores.push(MetricScore {
                        metric: metric.label(),
                        value,
                    });
                }
            }
        }

        let veto_factor = if vetoed { 0.0 } else { 1.0 };
        let score = (synthesized * veto_factor).clamp(0.0, 1.0);

        tracing::debug!(
            pantheon = %pantheon.name,
            consensus = consensus,
            resonance = score,
            vetoed = vetoed,
            "Proposal scored"
        );

        Ok(ResonanceResult {
            score,
            consensus,
            vetoed,
            veto_covenant,
            avatars,
            covenants: covenant_scores,
            metrics: metric_scores,
        })
    }

    /// How well a proposal fits the possibilities its domain acts within.
    ///
    /// Each avatar judges the proposal under the Declaration and Occurring
    /// texts of the whole chain; the weighted mean is returned. `None` when
    /// the domain declares no context. Coherence never gates a manifest.
    pub fn coherence(
        &self,
        proposal: &str,
        pantheon: &Pantheon,
        context: &[Arc<Possibility>],
    ) -> EngineResult<Option<f64>> {
        if context.is_empty() {
            return Ok(None);
        }
        let texts: Vec<&str> = context.iter().flat_map(|p| p.texts()).collect();
        let weights = pantheon.effective_weights();

        let mut pairs = Vec::with_capacity(pantheon.avatars.len());
        for (avatar, &weight) in pantheon.avatars.iter().zip(&weights) {
            let score = self
                .ask(proposal, &avatar.essence, &texts)
                .map_err(|source| EngineError::Oracle {
                    avatar: avatar.name.clone(),
                    source,
                })?;
            pairs.push((weight, score));
        }
        Ok(Some(weighted_mean(pairs.into_iter())))
    }

    fn ask(&self, proposal: &str, essence: &str, covenants: &[&str]) -> Result<f64, OracleError> {
        let raw = self.oracle.align(proposal, essence, covenants)?;
        if !raw.is_finite() {
            return Err(OracleError::NonFinite(raw));
        }
        Ok(raw.clamp(0.0, 1.0))
    }
}

/// Σ w·s / Σ w, or 0 when the weights sum to zero
fn weighted_mean(pairs: impl Iterator<Item = (f64, f64)>) -> f64 {
    let (num, den) = pairs.fold((0.0, 0.0), |(num, den), (w, s)| (num + w * s, den + w));
    if den > 0.0 && den.is_finite() {
        (num / den).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::FixedOracle;
    use crate::registry::Avatar;

    fn engine(oracle: impl AlignmentOracle + 'static) -> ResonanceEngine {
        ResonanceEngine::new(Arc::new(oracle))
    }

    fn by_essence(_: &str, essence: &str, _: &[&str]) -> Result<f64, OracleError> {
        match essence {
            "wisdom" => Ok(0.9),
            "memory" => Ok(0.8),
            _ => Ok(0.5),
        }
    }

    fn council(weights: [Option<f64>; 2]) -> Pantheon {
        Pantheon::new(
            "Council",
            vec![
                Avatar::new("Athena", "wisdom", weights[0]),
                Avatar::new("Thoth", "memory", weights[1]),
            ],
        )
    }

    fn alignment(name: &str, threshold: f64) -> Metric {
        Metric::Alignment(Arc::new(Covenant::new(name, "protect life", threshold)))
    }

    #[test]
    fn test_weighted_consensus() {
        let result = engine(by_essence)
            .score(
                "shift load",
                &council([Some(0.6), Some(0.4)]),
                &[alignment("Safety", 0.5)],
                None,
            )
            .unwrap();
        assert!((result.score - 0.86).abs() < 1e-9);
        assert!(!result.vetoed);
        assert_eq!(result.avatars.len(), 2);
    }

    #[test]
    fn test_default_weights_give_unweighted_mean() {
        let result = engine(by_essence)
            .score("shift load", &council([None, None]), &[alignment("Safety", 0.0)], None)
            .unwrap();
        assert!((result.score - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_unnormalized_weights_are_normalized() {
        let result = engine(by_essence)
            .score(
                "shift load",
                &council([Some(6.0), Some(4.0)]),
                &[alignment("Safety", 0.5)],
                None,
            )
            .unwrap();
        assert!((result.score - 0.86).abs() < 1e-9);
    }

    #[test]
    fn test_veto_forces_zero() {
        let result = engine(FixedOracle(0.5))
            .score("anything", &council([None, None]), &[alignment("Strict", 0.99)], None)
            .unwrap();
        assert_eq!(result.score, 0.0);
        assert!(result.vetoed);
        assert_eq!(result.veto_covenant.as_deref(), Some("Strict"));
        assert_eq!(result.consensus, 0.5);
        assert!(result.critical_violation().is_none());
    }

    #[test]
    fn test_critical_violation_is_reported() {
        let result = engine(FixedOracle(0.5))
            .score("anything", &council([None, None]), &[alignment("Life", 1.0)], None)
            .unwrap();
        assert_eq!(result.critical_violation().unwrap().covenant, "Life");
    }

    #[test]
    fn test_zero_total_weight_scores_zero() {
        let result = engine(FixedOracle(0.9))
            .score(
                "anything",
                &council([Some(0.0), Some(0.0)]),
                &[alignment("Safety", 0.0)],
                None,
            )
            .unwrap();
        assert_eq!(result.consensus, 0.0);
        assert_eq!(result.score, 0.0);

        let empty = Pantheon::new("Empty", vec![]);
        let result = engine(FixedOracle(0.9))
            .score("anything", &empty, &[alignment("Safety", 0.0)], None)
            .unwrap();
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_aspiration_blend() {
        let result = engine(FixedOracle(0.6))
            .score(
                "explore",
                &council([None, None]),
                &[alignment("Safety", 0.1), Metric::Aspiration],
                Some(AspirationInput {
                    score: 1.0,
                    weight: 1.0,
                }),
            )
            .unwrap();
        assert!((result.score - 0.8).abs() < 1e-9);
        assert_eq!(result.metrics.len(), 2);
        assert_eq!(result.metrics[1].metric, "Aspiration(Potentiality)");
    }

    #[test]
    fn test_veto_applies_after_aspiration() {
        let result = engine(FixedOracle(0.2))
            .score(
                "explore",
                &council([None, None]),
                &[alignment("Safety", 0.5), Metric::Aspiration],
                Some(AspirationInput {
                    score: 1.0,
                    weight: 10.0,
                }),
            )
            .unwrap();
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_oracle_output_is_clamped() {
        let result = engine(FixedOracle(7.0))
            .score("x", &council([None, None]), &[alignment("Safety", 0.5)], None)
            .unwrap();
        assert_eq!(result.score, 1.0);
    }

    #[test]
    fn test_empty_metrics_is_malformed() {
        let err = engine(FixedOracle(0.5))
            .score("x", &council([None, None]), &[], None)
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedProposal(_)));
    }

    #[test]
    fn test_coherence_over_context_chain() {
        let possibility = |name: &str, declaration: &str, occurring: Option<&str>| {
            Arc::new(Possibility {
                name: name.into(),
                declaration: declaration.into(),
                foundation: Default::default(),
                opening: None,
                occurring: occurring.map(str::to_string),
                risk: None,
                power: None,
                within: None,
            })
        };
        let context = [
            possibility("Inner", "calm", Some("steady")),
            possibility("Outer", "stable", None),
        ];
        let seen = |_: &str, essence: &str, texts: &[&str]| -> Result<f64, OracleError> {
            assert_eq!(texts, ["calm", "steady", "stable"]);
            Ok(if essence == "wisdom" { 1.0 } else { 0.0 })
        };

        let pantheon = council([Some(3.0), Some(1.0)]);
        let coherence = engine(seen).coherence("x", &pantheon, &context).unwrap();
        assert_eq!(coherence, Some(0.75));
        assert_eq!(engine(seen).coherence("x", &pantheon, &[]).unwrap(), None);

        let err = engine(FixedOracle(f64::INFINITY))
            .coherence("x", &pantheon, &context)
            .unwrap_err();
        assert!(matches!(err, EngineError::Oracle { ref avatar, .. } if avatar == "Athena"));
    }

    #[test]
    fn test_oracle_errors() {
        let failing = |_: &str, _: &str, covenants: &[&str]| -> Result<f64, OracleError> {
            if covenants.len() == 1 {
                Err(OracleError::Unavailable("down".into()))
            } else {
                Ok(0.5)
            }
        };

        let metrics = [alignment("Life", 1.0), alignment("Care", 0.2)];
        let err = engine(failing)
            .score("x", &council([None, None]), &metrics, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::CriticalCovenant { ref covenant, .. } if covenant == "Life"));

        let err = engine(failing)
            .score("x", &council([None, None]), &[alignment("Care", 0.2)], None)
            .unwrap_err();
        assert!(matches!(err, EngineError::Oracle { .. }));

        let down = |_: &str, _: &str, _: &[&str]| -> Result<f64, OracleError> {
            Err(OracleError::Unavailable("down".into()))
        };
        let metrics = [alignment("Care", 0.2), alignment("Life", 1.0)];
        let err = engine(down)
            .score("x", &council([None, None]), &metrics, None)
            .unwrap_err();
        assert!(matches!(err, EngineError::CriticalCovenant { ref covenant, .. } if covenant == "Life"));

        let err = engine(FixedOracle(f64::NAN))
            .score("x", &council([None, None]), &[alignment("Care", 0.2)], None)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Oracle {
                source: OracleError::NonFinite(_),
                ..
            }
        ));
    }
}
