//! Alignment oracles
//!
//! An oracle answers one question: how well does a proposal align with an
//! avatar's essence under a set of covenant texts? The engine treats the
//! answer as opaque. The oracles shipped here are deterministic
//! placeholders, not a model of real judgment.

use crate::error::OracleError;
use std::collections::HashSet;

/// Scores a proposal from one avatar's perspective
pub trait AlignmentOracle: Send + Sync {
    /// Alignment of `proposal` with `essence` under `covenants`, nominally in [0, 1]
    fn align(&self, proposal: &str, essence: &str, covenants: &[&str]) -> Result<f64, OracleError>;
}

impl<F> AlignmentOracle for F
where
    F: Fn(&str, &str, &[&str]) -> Result<f64, OracleError> + Send + Sync,
{
    fn align(&self, proposal: &str, essence: &str, covenants: &[&str]) -> Result<f64, OracleError> {
        self(proposal, essence, covenants)
    }
}

/// Returns the same score for every question
#[derive(Clone, Copy, Debug)]
pub struct FixedOracle(pub f64);

impl AlignmentOracle for FixedOracle {
    fn align(&self, _: &str, _: &str, _: &[&str]) -> Result<f64, OracleError> {
        Ok(self.0)
    }
}

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "onto", "are", "was", "its",
    "any", "all", "every", "each",
];

const NEGATIONS: &[&str] = &["never", "not", "no", "nor", "without", "avoid", "don't"];

/// Word-overlap oracle.
///
/// Content words shared between the proposal and the essence or covenant
/// texts count in favour. A proposal word that a covenant forbids (the
/// first word after "never", "not", "or" inside a negated clause and so
/// on) counts twice against.
#[derive(Clone, Copy, Debug, Default)]
pub struct LexicalOracle;

impl LexicalOracle {
    fn content_words(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric() && c != '\'')
            .map(|w| w.trim_matches('\'').to_lowercase())
            .filter(|w| w.len() >= 3 && !STOP_WORDS.contains(&w.as_str()))
            .collect()
    }

    fn forbidden_words(text: &str) -> HashSet<String> {
        let mut forbidden = HashSet::new();
        let mut negated = false;
        let mut expect_verb = false;

        for raw in text.split_whitespace() {
            let word = raw
                .trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase();
            if word.is_empty() {
                continue;
            }
            if NEGATIONS.contains(&word.as_str()) {
                negated = true;
                expect_verb = true;
                continue;
            }
            if negated && word == "or" {
                expect_verb = true;
                continue;
            }
            if expect_verb && word.len() >= 3 && !STOP_WORDS.contains(&word.as_str()) {
                forbidden.insert(word);
                expect_verb = false;
            }
            if raw.ends_with(|c: char| matches!(c, '.' | ';' | '!')) {
                negated = false;
                expect_verb = false;
            }
        }
        forbidden
    }
}

impl AlignmentOracle for LexicalOracle {
    fn align(&self, proposal: &str, essence: &str, covenants: &[&str]) -> Result<f64, OracleError> {
        let words: HashSet<String> = Self::content_words(proposal).into_iter().collect();
        if words.is_empty() {
            return Ok(0.0);
        }

        let forbidden: HashSet<String> = covenants
            .iter()
            .flat_map(|text| Self::forbidden_words(text))
            .collect();
        let reference: HashSet<String> = std::iter::once(essence)
            .chain(covenants.iter().copied())
            .flat_map(Self::content_words)
            .filter(|w| !forbidden.contains(w))
            .collect();

        let hits = words.iter().filter(|w| reference.contains(*w)).count() as f64;
        let violations = words.iter().filter(|w| forbidden.contains(*w)).count() as f64;
        let score = (hits - 2.0 * violations) / words.len() as f64;
        Ok(score.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexical_oracle_is_deterministic_and_bounded() {
        let oracle = LexicalOracle;
        let a = oracle
            .align("protect human life", "care for people", &["protect life"])
            .unwrap();
        let b = oracle
            .align("protect human life", "care for people", &["protect life"])
            .unwrap();
        assert_eq!(a, b);
        assert!((0.0..=1.0).contains(&a));
        assert!(a > 0.0);
    }

    #[test]
    fn test_forbidden_words_lower_the_score() {
        let oracle = LexicalOracle;
        let covenant = ["Never endanger human life or cut power to medical equipment"];
        let safe = oracle
            .align("Protect medical power", "careful measurement", &covenant)
            .unwrap();
        let harmful = oracle
            .align("Cut power to the hospital", "careful measurement", &covenant)
            .unwrap();
        assert!(safe > harmful, "safe={safe} harmful={harmful}");
        assert_eq!(harmful, 0.0);
    }

    #[test]
    fn test_forbidden_words_extraction() {
        let words = LexicalOracle::forbidden_words("Never endanger life or cut power. Share load.");
        assert!(words.contains("endanger"));
        assert!(words.contains("cut"));
        assert!(!words.contains("share"));
    }

    #[test]
    fn test_empty_proposal_scores_zero() {
        assert_eq!(LexicalOracle.align("", "wisdom", &[]).unwrap(), 0.0);
    }

    #[test]
    fn test_closure_oracle() {
        let oracle = |_: &str, essence: &str, _: &[&str]| -> Result<f64, OracleError> {
            Ok(if essence == "a" { 0.9 } else { 0.1 })
        };
        assert_eq!(oracle.align("p", "a", &[]).unwrap(), 0.9);
        assert_eq!(FixedOracle(0.4).align("p", "b", &[]).unwrap(), 0.4);
    }
}
