//! Genesis language front end
//!
//! A declarative language for governing autonomous decisions. Programs
//! declare ethical boundaries (`Covenant`), weighted perspectives
//! (`Avatar`s grouped into a `Pantheon`) and perpetual decision cycles
//! (`Domain`s with a `Pulse`). This crate turns source text into a
//! [`Program`] and prints programs back as canonical source.
//!
//! # Syntax
//!
//! ```text
//! Covenant "Human_Safety" {
//!     Invariant: "Never endanger a human life"
//!     Threshold: 0.99
//! }
//!
//! Pantheon "Council" {
//!     Avatar "Athena" {
//!         Lineage: "Greek"
//!         Essence: "Strategic wisdom"
//!         Weight: 0.6
//!     }
//! }
//!
//! Domain "Grid" {
//!     Intent: "Balance the power grid"
//!     Pantheon: Council
//!     Pulse (Interval: RealTime) {
//!         Watch: Vessel.Grid.load
//!         Deliberate {
//!             Proposal "Shift load" { Action: "Move demand to off-peak hours" }
//!             Synthesize { Metric: Alignment(Covenant.Human_Safety) }
//!         }
//!         Manifest (on Resonance > 0.85) {
//!             Execute: console.write("shifting load")
//!         }
//!     }
//! }
//! ```
//!
//! # Usage
//!
//! ```rust
//! use genesis_dsl::parse_source;
//!
//! let src = r#"
//! Covenant "Care" {
//!     Invariant: "Do no harm"
//!     Threshold: 0.5
//! }
//! "#;
//!
//! let out = parse_source(src).unwrap();
//! assert_eq!(out.program.declarations.len(), 1);
//!
//! let reparsed = parse_source(&out.program.to_string()).unwrap();
//! assert_eq!(reparsed.program, out.program);
//! ```

#![deny(unsafe_code)]

pub mod ast;
mod errors;
mod lexer;
mod parser;
mod printer;

pub use ast::*;
pub use errors::{DslError, DslResult};
pub use lexer::{tokenize, Lexer, Token, TokenKind};
pub use parser::{parse_source, Diagnostic, ParseOutput, Parser};
