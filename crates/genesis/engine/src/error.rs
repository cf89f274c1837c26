//! Engine error types

use genesis_dsl::DslError;
use serde::{Deserialize, Serialize};

/// Errors raised while resolving a parsed program into a registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    #[error("{from} references undeclared {target}")]
    UnresolvedReference { from: String, target: String },

    #[error("duplicate {kind} declaration \"{name}\"")]
    DuplicateDeclaration { kind: String, name: String },

    #[error("Possibility \"{name}\" is nested within itself")]
    CyclicPossibility { name: String },

    #[error("{from} has a Pulse without a Synthesize block")]
    MissingSynthesize { from: String },
}

/// Failures reported by an alignment oracle
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    #[error("oracle returned a non-finite score ({0})")]
    NonFinite(f64),
}

/// Errors raised while scoring a proposal
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("malformed proposal: {0}")]
    MalformedProposal(String),

    #[error("alignment oracle failed for avatar \"{avatar}\": {source}")]
    Oracle {
        avatar: String,
        #[source]
        source: OracleError,
    },

    #[error("critical covenant \"{covenant}\" could not be evaluated: {source}")]
    CriticalCovenant {
        covenant: String,
        #[source]
        source: OracleError,
    },
}

/// Errors raised by vessel bindings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum VesselError {
    #[error("vessel \"{vessel}\" timed out after {timeout_ms}ms")]
    Timeout { vessel: String, timeout_ms: u64 },

    #[error("vessel \"{vessel}\" failed: {reason}")]
    Failed { vessel: String, reason: String },

    #[error("no vessel bound to \"{0}\"")]
    Unbound(String),
}

/// A critical covenant vetoed a candidate or could not be evaluated.
/// Halts the affected domain permanently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("fatal covenant violation in domain \"{domain}\": covenant \"{covenant}\" at alignment {alignment:.3} ({reason})")]
pub struct FatalCovenantViolation {
    pub domain: String,
    pub covenant: String,
    pub alignment: f64,
    pub reason: String,
}

/// Top-level error for loading and running a Genesis program
#[derive(Debug, thiserror::Error)]
pub enum GenesisError {
    #[error(transparent)]
    Dsl(#[from] DslError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Fatal(#[from] FatalCovenantViolation),

    #[error("unknown domain \"{0}\"")]
    UnknownDomain(String),

    #[error("unknown decree \"{0}\"")]
    UnknownDecree(String),

    #[error("domain \"{0}\" is not running")]
    DomainNotRunning(String),

    #[error("cannot {operation} a runtime that is {state}")]
    InvalidState { operation: String, state: String },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl GenesisError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Dsl(_) | Self::Config(_) => 1,
            Self::Bind(_)
            | Self::UnknownDomain(_)
            | Self::UnknownDecree(_)
            | Self::DomainNotRunning(_)
            | Self::InvalidState { .. }
            | Self::Engine(_) => 2,
            Self::Fatal(_) => 3,
        }
    }
}

/// Result type alias for scoring operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type alias for session operations
pub type GenesisResult<T> = Result<T, GenesisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        let lex: GenesisError = DslError::Lex {
            line: 1,
            col: 1,
            reason: "x".into(),
        }
        .into();
        assert_eq!(lex.exit_code(), 1);

        let bind: GenesisError = BindError::UnresolvedReference {
            from: "Domain \"Grid\"".into(),
            target: "Covenant \"Ghost\"".into(),
        }
        .into();
        assert_eq!(bind.exit_code(), 2);

        let state = GenesisError::InvalidState {
            operation: "resume".into(),
            state: "Running".into(),
        };
        assert_eq!(state.exit_code(), 2);
        assert_eq!(state.to_string(), "cannot resume a runtime that is Running");

        let fatal: GenesisError = FatalCovenantViolation {
            domain: "Grid".into(),
            covenant: "Life".into(),
            alignment: 0.2,
            reason: "vetoed".into(),
        }
        .into();
        assert_eq!(fatal.exit_code(), 3);
    }

    #[test]
    fn unresolved_reference_message() {
        let err = BindError::UnresolvedReference {
            from: "Domain \"Grid\"".into(),
            target: "Covenant \"Ghost\"".into(),
        };
        assert_eq!(
            err.to_string(),
            "Domain \"Grid\" references undeclared Covenant \"Ghost\""
        );
    }
}
