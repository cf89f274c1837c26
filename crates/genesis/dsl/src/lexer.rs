//! Lexer: tokenizes Genesis source text
//!
//! Produces a stream of tokens that the parser consumes.
//! Handles the declaration/action keyword vocabulary, identifiers,
//! quoted string literals, numbers, punctuation, comparison operators,
//! `#` line comments and `###...###` block comments.

use crate::errors::{DslError, DslResult};
use serde::{Deserialize, Serialize};

/// A token produced by the lexer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The kind of token
    pub kind: TokenKind,
    /// The raw text of the token (unescaped for string literals)
    pub text: String,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub col: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize, col: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            col,
        }
    }
}

/// Token types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    // Declaration keywords
    Covenant,
    Pantheon,
    Avatar,
    Domain,
    Decree,
    Possibility,
    Soul,
    Potentiality,
    Purpose,
    Pulse,

    // Phase keywords
    Watch,
    Observe,
    Resonate,
    Deliberate,
    Synthesize,
    Manifest,

    // Property keywords
    Vessel,
    Lineage,
    Aura,
    Essence,
    Weight,
    Intent,
    Threshold,
    Invariant,
    Condition,
    Action,
    Target,
    Execute,
    Update,
    Proposal,
    Metric,
    Alignment,
    Aspiration,
    On,
    Interval,
    State,
    Drive,
    Resonance,
    Constraint,
    Context,

    // Identifiers and literals
    Identifier,
    StringLiteral,
    NumberLiteral,

    // Structural
    OpenBrace,
    CloseBrace,
    OpenParen,
    CloseParen,
    Colon,
    Comma,
    Dot,
    Arrow, // ->

    // Comparison
    Gt,
    Gte,
    Lt,
    Lte,
    EqEq,
    NotEq,

    // End of input
    Eof,
}

impl TokenKind {
    /// Resolve a word to its keyword kind, if it is one
    pub fn keyword(word: &str) -> Option<Self> {
        let kind = match word {
            "Covenant" => Self::Covenant,
            "Pantheon" => Self::Pantheon,
            "Avatar" => Self::Avatar,
            "Domain" => Self::Domain,
            "Decree" => Self::Decree,
            "Possibility" => Self::Possibility,
            "Soul" => Self::Soul,
            "Potentiality" => Self::Potentiality,
            "Purpose" => Self::Purpose,
            "Pulse" => Self::Pulse,
            "Watch" => Self::Watch,
            "Observe" => Self::Observe,
            "Resonate" => Self::Resonate,
            "Deliberate" => Self::Deliberate,
            "Synthesize" => Self::Synthesize,
            "Manifest" => Self::Manifest,
            "Vessel" => Self::Vessel,
            "Lineage" => Self::Lineage,
            "Aura" => Self::Aura,
            "Essence" => Self::Essence,
            "Weight" => Self::Weight,
            "Intent" => Self::Intent,
            "Threshold" => Self::Threshold,
            "Invariant" => Self::Invariant,
            "Condition" => Self::Condition,
            "Action" => Self::Action,
            "Target" => Self::Target,
            "Execute" => Self::Execute,
            "Update" => Self::Update,
            "Proposal" => Self::Proposal,
            "Metric" => Self::Metric,
            "Alignment" => Self::Alignment,
            "Aspiration" => Self::Aspiration,
            "on" => Self::On,
            "Interval" => Self::Interval,
            "State" => Self::State,
            "Drive" => Self::Drive,
            "Resonance" => Self::Resonance,
            "Constraint" => Self::Constraint,
            "Context" => Self::Context,
            _ => return None,
        };
        Some(kind)
    }

    /// Whether this kind is a reserved word
    pub fn is_keyword(self) -> bool {
        !matches!(
            self,
            Self::Identifier
                | Self::StringLiteral
                | Self::NumberLiteral
                | Self::OpenBrace
                | Self::CloseBrace
                | Self::OpenParen
                | Self::CloseParen
                | Self::Colon
                | Self::Comma
                | Self::Dot
                | Self::Arrow
                | Self::Gt
                | Self::Gte
                | Self::Lt
                | Self::Lte
                | Self::EqEq
                | Self::NotEq
                | Self::Eof
        )
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identifier => write!(f, "identifier"),
            Self::StringLiteral => write!(f, "string literal"),
            Self::NumberLiteral => write!(f, "number"),
            Self::OpenBrace => write!(f, "{{"),
            Self::CloseBrace => write!(f, "}}"),
            Self::OpenParen => write!(f, "("),
            Self::CloseParen => write!(f, ")"),
            Self::Colon => write!(f, ":"),
            Self::Comma => write!(f, ","),
            Self::Dot => write!(f, "."),
            Self::Arrow => write!(f, "->"),
            Self::Gt => write!(f, ">"),
            Self::Gte => write!(f, ">="),
            Self::Lt => write!(f, "<"),
            Self::Lte => write!(f, "<="),
            Self::EqEq => write!(f, "=="),
            Self::NotEq => write!(f, "!="),
            Self::Eof => write!(f, "end of input"),
            Self::On => write!(f, "on"),
            keyword => write!(f, "{:?}", keyword),
        }
    }
}

/// Tokenize Genesis source text in one call
pub fn tokenize(input: &str) -> DslResult<Vec<Token>> {
    Lexer::new(input).tokenize()
}

/// Lexer for Genesis source
pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    /// Create a new lexer from input text
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> DslResult<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments()?;

            if self.pos >= self.input.len() {
                tokens.push(Token::new(TokenKind::Eof, "", self.line, self.col));
                break;
            }

            let token = self.next_token()?;
            tokens.push(token);
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> DslResult<Token> {
        let ch = self.input[self.pos];
        let line = self.line;
        let col = self.col;

        let single = |kind: TokenKind| Token::new(kind, ch.to_string(), line, col);

        match ch {
            '{' => {
                self.advance();
                Ok(single(TokenKind::OpenBrace))
            }
            '}' => {
                self.advance();
                Ok(single(TokenKind::CloseBrace))
            }
            '(' => {
                self.advance();
                Ok(single(TokenKind::OpenParen))
            }
            ')' => {
                self.advance();
                Ok(single(TokenKind::CloseParen))
            }
            ':' => {
                self.advance();
                Ok(single(TokenKind::Colon))
            }
            ',' => {
                self.advance();
                Ok(single(TokenKind::Comma))
            }
            '.' => {
                self.advance();
                Ok(single(TokenKind::Dot))
            }
            '-' if self.peek_at(1) == Some('>') => self.read_pair(TokenKind::Arrow, "->"),
            '-' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.read_number(),
            '>' if self.peek_at(1) == Some('=') => self.read_pair(TokenKind::Gte, ">="),
            '>' => {
                self.advance();
                Ok(single(TokenKind::Gt))
            }
            '<' if self.peek_at(1) == Some('=') => self.read_pair(TokenKind::Lte, "<="),
            '<' => {
                self.advance();
                Ok(single(TokenKind::Lt))
            }
            '=' if self.peek_at(1) == Some('=') => self.read_pair(TokenKind::EqEq, "=="),
            '!' if self.peek_at(1) == Some('=') => self.read_pair(TokenKind::NotEq, "!="),
            '"' | '\'' => self.read_string_literal(ch),
            c if c.is_ascii_digit() => self.read_number(),
            c if c.is_alphabetic() || c == '_' => self.read_identifier_or_keyword(),
            _ => Err(DslError::Lex {
                line,
                col,
                reason: format!("Unexpected character: '{}'", ch),
            }),
        }
    }

    fn read_pair(&mut self, kind: TokenKind, text: &str) -> DslResult<Token> {
        let token = Token::new(kind, text, self.line, self.col);
        self.advance();
        self.advance();
        Ok(token)
    }

    fn read_string_literal(&mut self, quote: char) -> DslResult<Token> {
        let line = self.line;
        let col = self.col;
        self.advance(); // opening quote

        let mut text = String::new();
        loop {
            match self.current() {
                None => {
                    return Err(DslError::Lex {
                        line,
                        col,
                        reason: "Unterminated string literal".into(),
                    });
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    let escaped = match self.current() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some(other) => other,
                        None => continue,
                    };
                    text.push(escaped);
                    self.advance();
                }
                Some(c) => {
                    text.push(c);
                    self.advance();
                }
            }
        }

        Ok(Token::new(TokenKind::StringLiteral, text, line, col))
    }

    fn read_number(&mut self) -> DslResult<Token> {
        let line = self.line;
        let col = self.col;
        let mut text = String::new();

        if self.current() == Some('-') {
            text.push('-');
            self.advance();
        }

        let mut seen_dot = false;
        while let Some(c) = self.current() {
            if c.is_ascii_digit() {
                text.push(c);
            } else if c == '.'
                && !seen_dot
                && self.peek_at(1).is_some_and(|next| next.is_ascii_digit())
            {
                seen_dot = true;
                text.push(c);
            } else {
                break;
            }
            self.advance();
        }

        Ok(Token::new(TokenKind::NumberLiteral, text, line, col))
    }

    fn read_identifier_or_keyword(&mut self) -> DslResult<Token> {
        let line = self.line;
        let col = self.col;
        let mut text = String::new();

        while let Some(c) = self.current() {
            if c.is_alphanumeric() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }

        let kind = TokenKind::keyword(&text).unwrap_or(TokenKind::Identifier);
        Ok(Token::new(kind, text, line, col))
    }

    fn skip_whitespace_and_comments(&mut self) -> DslResult<()> {
        while let Some(ch) = self.current() {
            if ch.is_whitespace() {
                self.advance();
            } else if ch == '#' && self.peek_at(1) == Some('#') && self.peek_at(2) == Some('#') {
                self.skip_block_comment()?;
            } else if ch == '#' {
                while self.current().is_some_and(|c| c != '\n') {
                    self.advance();
                }
            } else {
                break;
            }
        }
        Ok(())
    }

    fn skip_block_comment(&mut self) -> DslResult<()> {
        let line = self.line;
        let col = self.col;
        for _ in 0..3 {
            self.advance();
        }

        while self.pos < self.input.len() {
            if self.input[self.pos] == '#'
                && self.peek_at(1) == Some('#')
                && self.peek_at(2) == Some('#')
            {
                for _ in 0..3 {
                    self.advance();
                }
                return Ok(());
            }
            self.advance();
        }

        Err(DslError::Lex {
            line,
            col,
            reason: "Unterminated block comment".into(),
        })
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) {
        if self.pos < self.input.len() {
            if self.input[self.pos] == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
            self.pos += 1;
        }
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }
}
