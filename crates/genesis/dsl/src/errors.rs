//! DSL error types

/// Errors that can occur while lexing or parsing Genesis source
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DslError {
    #[error("Lex error at line {line}, column {col}: {reason}")]
    Lex {
        line: usize,
        col: usize,
        reason: String,
    },

    #[error("Parse error at line {line}, column {col}: {message}")]
    Parse {
        line: usize,
        col: usize,
        message: String,
    },

    #[error("Parse error at line {line}, column {col}: threshold out of range ({value})")]
    ThresholdRange { line: usize, col: usize, value: f64 },

    #[error("Unexpected end of input at line {line}, column {col}: expected {expected}")]
    UnexpectedEof {
        line: usize,
        col: usize,
        expected: String,
    },
}

impl DslError {
    /// Source position (line, column) the error was raised at
    pub fn position(&self) -> (usize, usize) {
        match self {
            Self::Lex { line, col, .. }
            | Self::Parse { line, col, .. }
            | Self::ThresholdRange { line, col, .. }
            | Self::UnexpectedEof { line, col, .. } => (*line, *col),
        }
    }

    /// True for errors produced by the lexer rather than the parser
    pub fn is_lex_error(&self) -> bool {
        matches!(self, Self::Lex { .. })
    }
}

/// Result type alias for DSL operations
pub type DslResult<T> = Result<T, DslError>;
