//! Parser: recursive descent parser for Genesis programs
//!
//! Consumes tokens from the lexer and produces a [`Program`] together with
//! non-fatal [`Diagnostic`]s. The first structural error aborts parsing.

use crate::ast::*;
use crate::errors::{DslError, DslResult};
use crate::lexer::{tokenize, Token, TokenKind};
use serde::{Deserialize, Serialize};

/// Consensus rule accepted around a Resonate threshold
pub const SIMPLE_CONSENSUS: &str = "Simple_Consensus";

/// A non-fatal warning raised while parsing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub line: usize,
    pub col: usize,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "warning at line {}, column {}: {}", self.line, self.col, self.message)
    }
}

/// Result of a successful parse
#[derive(Clone, Debug, PartialEq)]
pub struct ParseOutput {
    pub program: Program,
    pub diagnostics: Vec<Diagnostic>,
}

/// Lex and parse source text in one call
pub fn parse_source(input: &str) -> DslResult<ParseOutput> {
    let tokens = tokenize(input)?;
    Parser::parse(tokens)
}

/// Parser for Genesis programs
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    /// Parse a token stream into a program
    pub fn parse(mut tokens: Vec<Token>) -> DslResult<ParseOutput> {
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let (line, col) = tokens.last().map(|t| (t.line, t.col)).unwrap_or((1, 1));
            tokens.push(Token::new(TokenKind::Eof, "", line, col));
        }

        let mut parser = Self {
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
        };
        let program = parser.parse_program()?;
        Ok(ParseOutput {
            program,
            diagnostics: parser.diagnostics,
        })
    }

    fn parse_program(&mut self) -> DslResult<Program> {
        let mut declarations = Vec::new();

        while !self.check(TokenKind::Eof) {
            let decl = match self.peek_kind() {
                TokenKind::Covenant => Declaration::Covenant(self.parse_covenant()?),
                TokenKind::Possibility => Declaration::Possibility(self.parse_possibility()?),
                TokenKind::Pantheon => Declaration::Pantheon(self.parse_pantheon()?),
                TokenKind::Domain => Declaration::Domain(self.parse_domain()?),
                TokenKind::Decree => Declaration::Decree(self.parse_decree()?),
                _ => {
                    return Err(self.error_here(format!(
                        "expected a Covenant, Possibility, Pantheon, Domain or Decree, found '{}'",
                        self.peek().text
                    )))
                }
            };
            declarations.push(decl);
        }

        Ok(Program { declarations })
    }

    fn parse_covenant(&mut self) -> DslResult<CovenantDecl> {
        let start = self.expect(TokenKind::Covenant)?.clone();
        let name = self.expect_string()?;
        self.expect(TokenKind::OpenBrace)?;

        let mut invariant = None;
        let mut threshold = None;
        let mut extra = Vec::new();

        while !self.check(TokenKind::CloseBrace) && !self.check(TokenKind::Eof) {
            match self.peek_kind() {
                TokenKind::Invariant => {
                    self.reject_duplicate(invariant.is_some(), "Invariant")?;
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    invariant = Some(self.expect_string()?);
                }
                TokenKind::Threshold => {
                    self.reject_duplicate(threshold.is_some(), "Threshold")?;
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    threshold = Some(self.expect_unit_interval()?);
                }
                _ => {
                    let key_tok = self.peek().clone();
                    let key = self.expect_name()?;
                    self.expect(TokenKind::Colon)?;
                    let value = self.parse_expr()?;
                    self.warn(
                        &key_tok,
                        format!("Covenant \"{}\": property '{}' is retained but unused", name, key),
                    );
                    extra.push(Property { key, value });
                }
            }
        }
        self.expect(TokenKind::CloseBrace)?;

        let invariant = invariant.ok_or_else(|| {
            Self::error_at(&start, format!("Covenant \"{}\" requires an Invariant", name))
        })?;
        let threshold = threshold.ok_or_else(|| {
            Self::error_at(&start, format!("Covenant \"{}\" requires a Threshold", name))
        })?;

        Ok(CovenantDecl {
            name,
            invariant,
            threshold,
            extra,
        })
    }

    fn parse_possibility(&mut self) -> DslResult<PossibilityDecl> {
        let start = self.expect(TokenKind::Possibility)?.clone();
        let name = self.expect_string()?;
        self.expect(TokenKind::OpenBrace)?;

        let mut declaration = None;
        let mut foundation = None;
        let mut opening = None;
        let mut occurring = None;
        let mut risk = None;
        let mut power = None;
        let mut within = None;

        while !self.check(TokenKind::CloseBrace) && !self.check(TokenKind::Eof) {
            let key_tok = self.peek().clone();
            let key = self.expect_name()?;
            self.expect(TokenKind::Colon)?;
            match key.as_str() {
                "Declaration" => Self::set_once(&mut declaration, self.expect_string()?, &key_tok)?,
                "Opening" => Self::set_once(&mut opening, self.expect_string()?, &key_tok)?,
                "Occurring" => Self::set_once(&mut occurring, self.expect_string()?, &key_tok)?,
                "Risk" => Self::set_once(&mut risk, self.expect_string()?, &key_tok)?,
                "Power" => Self::set_once(&mut power, self.expect_string()?, &key_tok)?,
                "Foundation" => {
                    let tok = self.expect(TokenKind::Identifier)?.clone();
                    let value = Foundation::from_name(&tok.text).unwrap_or_else(|| {
                        self.warn(
                            &tok,
                            format!(
                                "Possibility \"{}\": unknown Foundation '{}', using Nothing",
                                name, tok.text
                            ),
                        );
                        Foundation::Nothing
                    });
                    Self::set_once(&mut foundation, value, &key_tok)?;
                }
                "Within" => {
                    self.expect(TokenKind::Possibility)?;
                    self.expect(TokenKind::Dot)?;
                    let parent = self.expect_name()?;
                    Self::set_once(&mut within, parent, &key_tok)?;
                }
                _ => {
                    return Err(Self::error_at(
                        &key_tok,
                        format!("unknown Possibility property '{}'", key),
                    ))
                }
            }
        }
        self.expect(TokenKind::CloseBrace)?;

        let declaration = declaration.ok_or_else(|| {
            Self::error_at(
                &start,
                format!("Possibility \"{}\" requires a Declaration", name),
            )
        })?;

        Ok(PossibilityDecl {
            name,
            declaration,
            foundation: foundation.unwrap_or_default(),
            opening,
            occurring,
            risk,
            power,
            within,
        })
    }

    fn parse_pantheon(&mut self) -> DslResult<PantheonDecl> {
        self.expect(TokenKind::Pantheon)?;
        let name = self.expect_string()?;
        self.expect(TokenKind::OpenBrace)?;

        let mut avatars = Vec::new();
        while !self.check(TokenKind::CloseBrace) && !self.check(TokenKind::Eof) {
            avatars.push(self.parse_avatar()?);
        }
        self.expect(TokenKind::CloseBrace)?;

        Ok(PantheonDecl { name, avatars })
    }

    fn parse_avatar(&mut self) -> DslResult<AvatarDecl> {
        let start = self.expect(TokenKind::Avatar)?.clone();
        let name = self.expect_string()?;
        self.expect(TokenKind::OpenBrace)?;

        let mut avatar = AvatarDecl {
            name,
            lineage: String::new(),
            essence: None,
            aura: None,
            vessel: None,
            weight: None,
        };
        let mut has_lineage = false;

        while !self.check(TokenKind::CloseBrace) && !self.check(TokenKind::Eof) {
            match self.peek_kind() {
                TokenKind::Lineage => {
                    self.reject_duplicate(has_lineage, "Lineage")?;
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    avatar.lineage = self.expect_string()?;
                    has_lineage = true;
                }
                TokenKind::Essence => {
                    self.reject_duplicate(avatar.essence.is_some(), "Essence")?;
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    avatar.essence = Some(self.expect_string()?);
                }
                TokenKind::Aura => {
                    self.reject_duplicate(avatar.aura.is_some(), "Aura")?;
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    avatar.aura = Some(self.expect_string()?);
                }
                TokenKind::Vessel => {
                    self.reject_duplicate(avatar.vessel.is_some(), "Vessel")?;
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    avatar.vessel = Some(self.parse_expr()?);
                }
                TokenKind::Weight => {
                    self.reject_duplicate(avatar.weight.is_some(), "Weight")?;
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    let tok = self.peek().clone();
                    let weight = self.expect_float()?;
                    if weight < 0.0 {
                        return Err(Self::error_at(
                            &tok,
                            format!("Avatar \"{}\": Weight must not be negative", avatar.name),
                        ));
                    }
                    avatar.weight = Some(weight);
                }
                _ => {
                    return Err(self.error_here(format!(
                        "unexpected '{}' in Avatar \"{}\"",
                        self.peek().text,
                        avatar.name
                    )))
                }
            }
        }
        self.expect(TokenKind::CloseBrace)?;

        if !has_lineage {
            return Err(Self::error_at(
                &start,
                format!("Avatar \"{}\" requires a Lineage", avatar.name),
            ));
        }
        match (&avatar.essence, &avatar.aura) {
            (None, None) => {
                return Err(Self::error_at(
                    &start,
                    format!("Avatar \"{}\" requires an Essence or Aura", avatar.name),
                ))
            }
            (Some(_), Some(_)) => self.warn(
                &start,
                format!(
                    "Avatar \"{}\" declares both Essence and Aura; Essence is used for scoring",
                    avatar.name
                ),
            ),
            _ => {}
        }

        Ok(avatar)
    }

    fn parse_domain(&mut self) -> DslResult<DomainDecl> {
        let start = self.expect(TokenKind::Domain)?.clone();
        let name = self.expect_string()?;
        self.expect(TokenKind::OpenBrace)?;

        let mut intent = None;
        let mut purpose = None;
        let mut context = None;
        let mut pantheon = None;
        let mut potentiality = None;
        let mut pulse = None;

        while !self.check(TokenKind::CloseBrace) && !self.check(TokenKind::Eof) {
            match self.peek_kind() {
                TokenKind::Intent => {
                    self.reject_duplicate(intent.is_some(), "Intent")?;
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    intent = Some(self.expect_string()?);
                }
                TokenKind::Purpose => {
                    self.reject_duplicate(purpose.is_some(), "Purpose")?;
                    purpose = Some(self.parse_purpose()?);
                }
                TokenKind::Context => {
                    self.reject_duplicate(context.is_some(), "Context")?;
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    self.expect(TokenKind::Possibility)?;
                    self.expect(TokenKind::Dot)?;
                    context = Some(self.expect_name()?);
                }
                TokenKind::Pantheon => {
                    self.reject_duplicate(pantheon.is_some(), "Pantheon")?;
                    if self.check_next(TokenKind::Colon) {
                        self.advance();
                        self.advance();
                        let tok = self.peek().clone();
                        let reference = match tok.kind {
                            TokenKind::StringLiteral | TokenKind::Identifier => {
                                self.advance();
                                tok.text
                            }
                            _ => return Err(self.unexpected("pantheon name")),
                        };
                        pantheon = Some(PantheonRef::Named(reference));
                    } else {
                        pantheon = Some(PantheonRef::Inline(self.parse_pantheon()?));
                    }
                }
                TokenKind::Soul => {
                    self.reject_duplicate(potentiality.is_some(), "Soul Potentiality")?;
                    potentiality = Some(self.parse_potentiality()?);
                }
                TokenKind::Pulse => {
                    self.reject_duplicate(pulse.is_some(), "Pulse")?;
                    pulse = Some(self.parse_pulse()?);
                }
                _ => {
                    return Err(self.error_here(format!(
                        "unexpected '{}' in Domain \"{}\"",
                        self.peek().text,
                        name
                    )))
                }
            }
        }
        self.expect(TokenKind::CloseBrace)?;

        let intent = intent.ok_or_else(|| {
            Self::error_at(&start, format!("Domain \"{}\" requires an Intent", name))
        })?;
        if pulse.is_none() {
            self.warn(
                &start,
                format!("Domain \"{}\" has no Pulse block and will never run", name),
            );
        }

        Ok(DomainDecl {
            name,
            intent,
            purpose,
            context,
            pantheon,
            potentiality,
            pulse,
        })
    }

    fn parse_purpose(&mut self) -> DslResult<PurposeBlock> {
        self.expect(TokenKind::Purpose)?;
        let mut block = PurposeBlock::default();
        if !self.check(TokenKind::OpenBrace) {
            block.name = Some(match self.peek_kind() {
                TokenKind::StringLiteral => self.expect_string()?,
                _ => self.expect_name()?,
            });
        }
        self.expect(TokenKind::OpenBrace)?;

        while !self.check(TokenKind::CloseBrace) && !self.check(TokenKind::Eof) {
            let key_tok = self.peek().clone();
            let key = self.expect_name()?;
            self.expect(TokenKind::Colon)?;
            match key.as_str() {
                "Objective" => {
                    Self::set_once(&mut block.objective, self.expect_string()?, &key_tok)?
                }
                "Anchor" => Self::set_once(&mut block.anchor, self.expect_string()?, &key_tok)?,
                "Trajectory" => {
                    Self::set_once(&mut block.trajectory, self.expect_string()?, &key_tok)?
                }
                _ => {
                    let value = self.parse_expr()?;
                    block.extra.push(Property { key, value });
                }
            }
        }
        self.expect(TokenKind::CloseBrace)?;

        Ok(block)
    }

    fn parse_potentiality(&mut self) -> DslResult<PotentialityBlock> {
        self.expect(TokenKind::Soul)?;
        self.expect(TokenKind::Potentiality)?;
        self.expect(TokenKind::OpenBrace)?;

        let mut block = PotentialityBlock::default();

        while !self.check(TokenKind::CloseBrace) && !self.check(TokenKind::Eof) {
            match self.peek_kind() {
                TokenKind::State => {
                    self.reject_duplicate(block.state.is_some(), "State")?;
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    let tok = self.expect(TokenKind::Identifier)?.clone();
                    let state = DriveState::from_name(&tok.text).ok_or_else(|| {
                        Self::error_at(
                            &tok,
                            format!(
                                "unknown drive state '{}', expected Dormant, Exploring or Active",
                                tok.text
                            ),
                        )
                    })?;
                    block.state = Some(state);
                }
                TokenKind::Drive => {
                    self.reject_duplicate(block.drive.is_some(), "Drive")?;
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    block.drive = Some(self.expect_string()?);
                }
                _ => {
                    let key_tok = self.peek().clone();
                    let key = self.expect_name()?;
                    self.expect(TokenKind::Colon)?;
                    if key == "Dream_Cycle" {
                        let flag = self.expect_flag()?;
                        Self::set_once(&mut block.dream_cycle, flag, &key_tok)?;
                        continue;
                    }
                    let value_tok = self.peek().clone();
                    let value = self.expect_float()?;
                    match key.as_str() {
                        "Floor" => {
                            self.reject_duplicate(block.floor.is_some(), "Floor")?;
                            Self::check_fraction(&value_tok, "Floor", value)?;
                            block.floor = Some(value);
                        }
                        "Decay" => {
                            self.reject_duplicate(block.decay.is_some(), "Decay")?;
                            Self::check_fraction(&value_tok, "Decay", value)?;
                            block.decay = Some(value);
                        }
                        "Window" => {
                            self.reject_duplicate(block.window.is_some(), "Window")?;
                            if value < 1.0 || value.fract() != 0.0 {
                                return Err(Self::error_at(
                                    &value_tok,
                                    "Window must be a positive integer",
                                ));
                            }
                            block.window = Some(value as usize);
                        }
                        "Aspiration_Weight" => {
                            self.reject_duplicate(
                                block.aspiration_weight.is_some(),
                                "Aspiration_Weight",
                            )?;
                            if value < 0.0 {
                                return Err(Self::error_at(
                                    &value_tok,
                                    "Aspiration_Weight must not be negative",
                                ));
                            }
                            block.aspiration_weight = Some(value);
                        }
                        _ => {
                            return Err(Self::error_at(
                                &key_tok,
                                format!("unknown potentiality property '{}'", key),
                            ))
                        }
                    }
                }
            }
        }
        self.expect(TokenKind::CloseBrace)?;

        Ok(block)
    }

    fn parse_pulse(&mut self) -> DslResult<PulseBlock> {
        let start = self.expect(TokenKind::Pulse)?.clone();

        let mut interval = IntervalKind::default();
        if self.check(TokenKind::OpenParen) {
            self.advance();
            self.expect(TokenKind::Interval)?;
            self.expect(TokenKind::Colon)?;
            let tok = self.expect(TokenKind::Identifier)?.clone();
            interval = IntervalKind::from_name(&tok.text).ok_or_else(|| {
                Self::error_at(
                    &tok,
                    format!("unknown interval '{}', expected RealTime or OnDemand", tok.text),
                )
            })?;
            self.expect(TokenKind::CloseParen)?;
        }
        self.expect(TokenKind::OpenBrace)?;

        let mut watch = None;
        let mut resonate = None;
        let mut deliberate = None;
        let mut manifest = None;
        let mut manifest_tok = None;

        while !self.check(TokenKind::CloseBrace) && !self.check(TokenKind::Eof) {
            match self.peek_kind() {
                TokenKind::Watch | TokenKind::Observe => {
                    self.reject_duplicate(watch.is_some(), "Watch")?;
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    watch = Some(self.parse_expr()?);
                }
                TokenKind::Resonate => {
                    self.reject_duplicate(resonate.is_some(), "Resonate")?;
                    resonate = Some(self.parse_resonate()?);
                }
                TokenKind::Deliberate => {
                    self.reject_duplicate(deliberate.is_some(), "Deliberate")?;
                    deliberate = Some(self.parse_deliberate()?);
                }
                TokenKind::Manifest => {
                    self.reject_duplicate(manifest.is_some(), "Manifest")?;
                    manifest_tok = Some(self.peek().clone());
                    manifest = Some(self.parse_manifest()?);
                }
                _ => {
                    return Err(self.error_here(format!(
                        "unexpected '{}' in Pulse block",
                        self.peek().text
                    )))
                }
            }
        }
        self.expect(TokenKind::CloseBrace)?;

        if deliberate.is_none() && resonate.is_none() {
            return Err(Self::error_at(
                &start,
                "Pulse requires a Deliberate or Resonate block",
            ));
        }
        let block = PulseBlock {
            interval,
            watch,
            resonate,
            deliberate: deliberate.unwrap_or_default(),
            manifest,
        };

        let in_resonate = block
            .resonate
            .as_ref()
            .is_some_and(|r| r.synthesize.is_some());
        match (block.deliberate.synthesize.is_some(), in_resonate) {
            (true, true) => {
                return Err(Self::error_at(
                    &start,
                    "Pulse declares Synthesize in both Deliberate and Resonate",
                ))
            }
            (false, false) => {
                return Err(Self::error_at(
                    &start,
                    "Pulse requires a Synthesize block in Deliberate or Resonate",
                ))
            }
            _ => {}
        }

        if let (Some(manifest), Some(tok)) = (&block.manifest, &manifest_tok) {
            if manifest.threshold.is_none() && block.resonance_threshold().is_none() {
                return Err(Self::error_at(
                    tok,
                    "Manifest (on Resonance) needs a Resonate Threshold in the same Pulse",
                ));
            }
        }

        Ok(block)
    }

    fn parse_resonate(&mut self) -> DslResult<ResonateBlock> {
        self.expect(TokenKind::Resonate)?;
        self.expect(TokenKind::OpenBrace)?;

        let mut block = ResonateBlock::default();

        while !self.check(TokenKind::CloseBrace) && !self.check(TokenKind::Eof) {
            match self.peek_kind() {
                TokenKind::Threshold => {
                    self.reject_duplicate(block.threshold.is_some(), "Threshold")?;
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    if self.check(TokenKind::NumberLiteral) {
                        block.threshold = Some(self.expect_unit_interval()?);
                    } else {
                        let rule_tok = self.peek().clone();
                        let rule = self.expect_name()?;
                        if rule != SIMPLE_CONSENSUS {
                            self.warn(
                                &rule_tok,
                                format!(
                                    "consensus rule '{}' is scored as {}",
                                    rule, SIMPLE_CONSENSUS
                                ),
                            );
                        }
                        self.expect(TokenKind::OpenParen)?;
                        block.threshold = Some(self.expect_unit_interval()?);
                        self.expect(TokenKind::CloseParen)?;
                        block.rule = Some(rule);
                    }
                }
                TokenKind::Alignment => {
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    self.expect(TokenKind::Covenant)?;
                    self.expect(TokenKind::Dot)?;
                    block.alignment.push(self.expect_name()?);
                }
                TokenKind::Synthesize => {
                    self.reject_duplicate(block.synthesize.is_some(), "Synthesize")?;
                    block.synthesize = Some(self.parse_synthesize()?);
                }
                _ => {
                    return Err(self.error_here(format!(
                        "unexpected '{}' in Resonate block",
                        self.peek().text
                    )))
                }
            }
        }
        self.expect(TokenKind::CloseBrace)?;

        Ok(block)
    }

    fn parse_deliberate(&mut self) -> DslResult<DeliberateBlock> {
        self.expect(TokenKind::Deliberate)?;
        self.expect(TokenKind::OpenBrace)?;

        let mut proposals = Vec::new();
        let mut synthesize = None;

        while !self.check(TokenKind::CloseBrace) && !self.check(TokenKind::Eof) {
            match self.peek_kind() {
                TokenKind::Proposal => proposals.push(self.parse_proposal()?),
                TokenKind::Synthesize => {
                    self.reject_duplicate(synthesize.is_some(), "Synthesize")?;
                    synthesize = Some(self.parse_synthesize()?);
                }
                _ => {
                    return Err(self.error_here(format!(
                        "unexpected '{}' in Deliberate block",
                        self.peek().text
                    )))
                }
            }
        }
        self.expect(TokenKind::CloseBrace)?;

        Ok(DeliberateBlock {
            proposals,
            synthesize,
        })
    }

    fn parse_proposal(&mut self) -> DslResult<ProposalDecl> {
        let start = self.expect(TokenKind::Proposal)?.clone();
        let name = if self.check(TokenKind::StringLiteral) {
            Some(self.expect_string()?)
        } else {
            None
        };
        self.expect(TokenKind::OpenBrace)?;

        let mut properties = Vec::new();
        while !self.check(TokenKind::CloseBrace) && !self.check(TokenKind::Eof) {
            let key = self.expect_name()?;
            self.expect(TokenKind::Colon)?;
            let value = self.parse_expr()?;
            properties.push(Property { key, value });
        }
        self.expect(TokenKind::CloseBrace)?;

        let proposal = ProposalDecl { name, properties };
        if proposal.text().trim().is_empty() {
            return Err(Self::error_at(
                &start,
                "Proposal needs a name or at least one string property to deliberate on",
            ));
        }
        Ok(proposal)
    }

    fn parse_synthesize(&mut self) -> DslResult<SynthesizeBlock> {
        let start = self.expect(TokenKind::Synthesize)?.clone();
        self.expect(TokenKind::OpenBrace)?;

        let mut metrics = Vec::new();
        while !self.check(TokenKind::CloseBrace) && !self.check(TokenKind::Eof) {
            self.expect(TokenKind::Metric)?;
            self.expect(TokenKind::Colon)?;
            metrics.push(self.parse_metric()?);
        }
        self.expect(TokenKind::CloseBrace)?;

        if metrics.is_empty() {
            return Err(Self::error_at(
                &start,
                "Synthesize requires at least one Metric",
            ));
        }
        let block = SynthesizeBlock { metrics };
        if block.covenant_refs().next().is_none() {
            return Err(Self::error_at(
                &start,
                "Synthesize requires at least one Alignment(Covenant.<name>) metric",
            ));
        }

        Ok(block)
    }

    fn parse_metric(&mut self) -> DslResult<MetricRef> {
        match self.peek_kind() {
            TokenKind::Alignment => {
                self.advance();
                self.expect(TokenKind::OpenParen)?;
                self.expect(TokenKind::Covenant)?;
                self.expect(TokenKind::Dot)?;
                let covenant = self.expect_name()?;
                self.expect(TokenKind::CloseParen)?;
                Ok(MetricRef::Alignment { covenant })
            }
            TokenKind::Aspiration => {
                self.advance();
                if self.check(TokenKind::OpenParen) {
                    self.advance();
                    self.expect(TokenKind::Potentiality)?;
                    self.expect(TokenKind::CloseParen)?;
                }
                Ok(MetricRef::Aspiration)
            }
            _ => Err(self.unexpected("Alignment or Aspiration")),
        }
    }

    fn parse_manifest(&mut self) -> DslResult<ManifestBlock> {
        self.expect(TokenKind::Manifest)?;
        self.expect(TokenKind::OpenParen)?;
        self.expect(TokenKind::On)?;
        self.expect(TokenKind::Resonance)?;
        let threshold = if self.check(TokenKind::CloseParen) {
            None
        } else {
            let op_tok = self.peek().clone();
            let op = self.parse_compare_op()?;
            if op != CompareOp::Gt {
                return Err(Self::error_at(
                    &op_tok,
                    format!(
                        "Manifest predicate must use strict '>', found '{}'",
                        op.symbol()
                    ),
                ));
            }
            Some(self.expect_unit_interval()?)
        };
        self.expect(TokenKind::CloseParen)?;
        self.expect(TokenKind::OpenBrace)?;

        let mut actions = Vec::new();
        while !self.check(TokenKind::CloseBrace) && !self.check(TokenKind::Eof) {
            match self.peek_kind() {
                TokenKind::Execute => {
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    actions.push(ManifestAction::Execute(self.parse_expr()?));
                }
                TokenKind::Update => {
                    actions.push(ManifestAction::Update(self.parse_update()?));
                }
                _ => {
                    return Err(self.error_here(format!(
                        "unexpected '{}' in Manifest block",
                        self.peek().text
                    )))
                }
            }
        }
        self.expect(TokenKind::CloseBrace)?;

        Ok(ManifestBlock { threshold, actions })
    }

    fn parse_decree(&mut self) -> DslResult<DecreeDecl> {
        let start = self.expect(TokenKind::Decree)?.clone();
        let name = self.expect_string()?;
        self.expect(TokenKind::OpenBrace)?;

        let mut condition = None;
        let mut action = None;
        let mut target = None;
        let mut constraints = Vec::new();
        let mut updates = Vec::new();

        while !self.check(TokenKind::CloseBrace) && !self.check(TokenKind::Eof) {
            match self.peek_kind() {
                TokenKind::Condition => {
                    self.reject_duplicate(condition.is_some(), "Condition")?;
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    self.expect(TokenKind::Resonance)?;
                    let op = self.parse_compare_op()?;
                    let value = self.expect_unit_interval()?;
                    condition = Some(Condition { op, value });
                }
                TokenKind::Action => {
                    self.reject_duplicate(action.is_some(), "Action")?;
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    action = Some(self.expect_string()?);
                }
                TokenKind::Target => {
                    self.reject_duplicate(target.is_some(), "Target")?;
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    self.expect(TokenKind::Domain)?;
                    self.expect(TokenKind::Dot)?;
                    target = Some(self.expect_name()?);
                }
                TokenKind::Constraint => {
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    constraints.push(self.expect_string()?);
                }
                TokenKind::Update => updates.push(self.parse_update()?),
                _ => {
                    return Err(self.error_here(format!(
                        "unexpected '{}' in Decree \"{}\"",
                        self.peek().text,
                        name
                    )))
                }
            }
        }
        self.expect(TokenKind::CloseBrace)?;

        let condition = condition.ok_or_else(|| {
            Self::error_at(&start, format!("Decree \"{}\" requires a Condition", name))
        })?;
        let action = action.ok_or_else(|| {
            Self::error_at(&start, format!("Decree \"{}\" requires an Action", name))
        })?;

        Ok(DecreeDecl {
            name,
            condition,
            action,
            target,
            constraints,
            updates,
        })
    }

    fn parse_update(&mut self) -> DslResult<UpdateDirective> {
        self.expect(TokenKind::Update)?;
        self.expect(TokenKind::Colon)?;
        let target = self.parse_path()?;
        self.expect(TokenKind::Arrow)?;
        let value = self.parse_expr()?;
        Ok(UpdateDirective { target, value })
    }

    fn parse_compare_op(&mut self) -> DslResult<CompareOp> {
        let op = match self.peek_kind() {
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Gte => CompareOp::Gte,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Lte => CompareOp::Lte,
            TokenKind::EqEq => CompareOp::Eq,
            TokenKind::NotEq => CompareOp::NotEq,
            _ => return Err(self.unexpected("comparison operator")),
        };
        self.advance();
        Ok(op)
    }

    fn parse_expr(&mut self) -> DslResult<Expr> {
        match self.peek_kind() {
            TokenKind::StringLiteral => Ok(Expr::Str(self.expect_string()?)),
            TokenKind::NumberLiteral => Ok(Expr::Number(self.expect_float()?)),
            kind if kind == TokenKind::Identifier || kind.is_keyword() => {
                let callee = self.parse_path()?;
                if !self.check(TokenKind::OpenParen) {
                    return Ok(Expr::Path(callee));
                }
                self.advance();
                let mut args = Vec::new();
                if !self.check(TokenKind::CloseParen) {
                    args.push(self.parse_expr()?);
                    while self.check(TokenKind::Comma) {
                        self.advance();
                        args.push(self.parse_expr()?);
                    }
                }
                self.expect(TokenKind::CloseParen)?;
                Ok(Expr::Call { callee, args })
            }
            _ => Err(self.unexpected("value")),
        }
    }

    fn parse_path(&mut self) -> DslResult<Path> {
        let mut segments = vec![self.expect_name()?];
        while self.check(TokenKind::Dot) {
            self.advance();
            segments.push(self.expect_name()?);
        }
        Ok(Path(segments))
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn check_next(&self, kind: TokenKind) -> bool {
        self.tokens
            .get(self.pos + 1)
            .is_some_and(|tok| tok.kind == kind)
    }

    fn advance(&mut self) -> &Token {
        let tok = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind) -> DslResult<&Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    fn expect_string(&mut self) -> DslResult<String> {
        Ok(self.expect(TokenKind::StringLiteral)?.text.clone())
    }

    /// An identifier, or a keyword used in name position
    fn expect_name(&mut self) -> DslResult<String> {
        let kind = self.peek_kind();
        if kind == TokenKind::Identifier || kind.is_keyword() {
            Ok(self.advance().text.clone())
        } else {
            Err(self.unexpected("identifier"))
        }
    }

    fn expect_float(&mut self) -> DslResult<f64> {
        let tok = self.expect(TokenKind::NumberLiteral)?.clone();
        tok.text
            .parse::<f64>()
            .map_err(|_| Self::error_at(&tok, format!("'{}' is not a valid number", tok.text)))
    }

    /// A number within [0.0, 1.0]
    fn expect_unit_interval(&mut self) -> DslResult<f64> {
        let tok = self.peek().clone();
        let value = self.expect_float()?;
        if !(0.0..=1.0).contains(&value) {
            return Err(DslError::ThresholdRange {
                line: tok.line,
                col: tok.col,
                value,
            });
        }
        Ok(value)
    }

    /// `true` or `false`
    fn expect_flag(&mut self) -> DslResult<bool> {
        let tok = self.peek().clone();
        match (tok.kind, tok.text.as_str()) {
            (TokenKind::Identifier, "true") => {
                self.advance();
                Ok(true)
            }
            (TokenKind::Identifier, "false") => {
                self.advance();
                Ok(false)
            }
            _ => Err(self.unexpected("true or false")),
        }
    }

    fn set_once<T>(slot: &mut Option<T>, value: T, key: &Token) -> DslResult<()> {
        if slot.is_some() {
            return Err(Self::error_at(key, format!("duplicate {}", key.text)));
        }
        *slot = Some(value);
        Ok(())
    }

    fn check_fraction(tok: &Token, field: &str, value: f64) -> DslResult<()> {
        if (0.0..=1.0).contains(&value) {
            Ok(())
        } else {
            Err(Self::error_at(
                tok,
                format!("{} must lie in [0.0, 1.0], found {}", field, value),
            ))
        }
    }

    fn reject_duplicate(&self, seen: bool, field: &str) -> DslResult<()> {
        if seen {
            Err(self.error_here(format!("duplicate {}", field)))
        } else {
            Ok(())
        }
    }

    fn unexpected(&self, expected: &str) -> DslError {
        let tok = self.peek();
        if tok.kind == TokenKind::Eof {
            DslError::UnexpectedEof {
                line: tok.line,
                col: tok.col,
                expected: expected.to_string(),
            }
        } else {
            DslError::Parse {
                line: tok.line,
                col: tok.col,
                message: format!("expected {}, found '{}'", expected, tok.text),
            }
        }
    }

    fn error_here(&self, message: impl Into<String>) -> DslError {
        Self::error_at(self.peek(), message)
    }

    fn error_at(tok: &Token, message: impl Into<String>) -> DslError {
        DslError::Parse {
            line: tok.line,
            col: tok.col,
            message: message.into(),
        }
    }

    fn warn(&mut self, tok: &Token, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            line: tok.line,
            col: tok.col,
            message: message.into(),
        });
    }
}
