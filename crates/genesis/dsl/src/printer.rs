//! Canonical source printer
//!
//! `Display` for [`Program`] re-emits Genesis source with 4-space
//! indentation and one property per line. Parsing the printed text yields a
//! structurally identical program.

use crate::ast::*;
use std::fmt::{self, Display, Formatter};

const INDENT: &str = "    ";

struct SourceWriter {
    out: String,
    depth: usize,
}

impl SourceWriter {
    fn new() -> Self {
        Self {
            out: String::new(),
            depth: 0,
        }
    }

    fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn open(&mut self, header: impl AsRef<str>) {
        self.line(format!("{} {{", header.as_ref()));
        self.depth += 1;
    }

    fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    fn program(&mut self, program: &Program) {
        for (i, decl) in program.declarations.iter().enumerate() {
            if i > 0 {
                self.out.push('\n');
            }
            match decl {
                Declaration::Covenant(c) => self.covenant(c),
                Declaration::Possibility(p) => self.possibility(p),
                Declaration::Pantheon(p) => self.pantheon(p),
                Declaration::Domain(d) => self.domain(d),
                Declaration::Decree(d) => self.decree(d),
            }
        }
    }

    fn covenant(&mut self, covenant: &CovenantDecl) {
        self.open(format!("Covenant {}", quote(&covenant.name)));
        self.line(format!("Invariant: {}", quote(&covenant.invariant)));
        self.line(format!("Threshold: {}", covenant.threshold));
        for prop in &covenant.extra {
            self.line(format!("{}: {}", prop.key, prop.value));
        }
        self.close();
    }

    fn possibility(&mut self, possibility: &PossibilityDecl) {
        self.open(format!("Possibility {}", quote(&possibility.name)));
        self.line(format!("Declaration: {}", quote(&possibility.declaration)));
        self.line(format!("Foundation: {}", possibility.foundation.as_str()));
        let texts = [
            ("Opening", &possibility.opening),
            ("Occurring", &possibility.occurring),
            ("Risk", &possibility.risk),
            ("Power", &possibility.power),
        ];
        for (key, value) in texts {
            if let Some(value) = value {
                self.line(format!("{}: {}", key, quote(value)));
            }
        }
        if let Some(parent) = &possibility.within {
            self.line(format!("Within: Possibility.{}", parent));
        }
        self.close();
    }

    fn pantheon(&mut self, pantheon: &PantheonDecl) {
        self.open(format!("Pantheon {}", quote(&pantheon.name)));
        for avatar in &pantheon.avatars {
            self.avatar(avatar);
        }
        self.close();
    }

    fn avatar(&mut self, avatar: &AvatarDecl) {
        self.open(format!("Avatar {}", quote(&avatar.name)));
        self.line(format!("Lineage: {}", quote(&avatar.lineage)));
        if let Some(essence) = &avatar.essence {
            self.line(format!("Essence: {}", quote(essence)));
        }
        if let Some(aura) = &avatar.aura {
            self.line(format!("Aura: {}", quote(aura)));
        }
        if let Some(vessel) = &avatar.vessel {
            self.line(format!("Vessel: {}", vessel));
        }
        if let Some(weight) = avatar.weight {
            self.line(format!("Weight: {}", weight));
        }
        self.close();
    }

    fn domain(&mut self, domain: &DomainDecl) {
        self.open(format!("Domain {}", quote(&domain.name)));
        self.line(format!("Intent: {}", quote(&domain.intent)));
        if let Some(purpose) = &domain.purpose {
            self.purpose(purpose);
        }
        if let Some(context) = &domain.context {
            self.line(format!("Context: Possibility.{}", context));
        }
        match &domain.pantheon {
            Some(PantheonRef::Named(name)) => self.line(format!("Pantheon: {}", quote(name))),
            Some(PantheonRef::Inline(decl)) => self.pantheon(decl),
            None => {}
        }
        if let Some(potentiality) = &domain.potentiality {
            self.potentiality(potentiality);
        }
        if let Some(pulse) = &domain.pulse {
            self.pulse(pulse);
        }
        self.close();
    }

    fn purpose(&mut self, purpose: &PurposeBlock) {
        match &purpose.name {
            Some(name) => self.open(format!("Purpose {}", quote(name))),
            None => self.open("Purpose"),
        }
        if let Some(objective) = &purpose.objective {
            self.line(format!("Objective: {}", quote(objective)));
        }
        if let Some(anchor) = &purpose.anchor {
            self.line(format!("Anchor: {}", quote(anchor)));
        }
        if let Some(trajectory) = &purpose.trajectory {
            self.line(format!("Trajectory: {}", quote(trajectory)));
        }
        for prop in &purpose.extra {
            self.line(format!("{}: {}", prop.key, prop.value));
        }
        self.close();
    }

    fn potentiality(&mut self, block: &PotentialityBlock) {
        self.open("Soul Potentiality");
        if let Some(state) = block.state {
            self.line(format!("State: {}", state));
        }
        if let Some(drive) = &block.drive {
            self.line(format!("Drive: {}", quote(drive)));
        }
        if let Some(floor) = block.floor {
            self.line(format!("Floor: {}", floor));
        }
        if let Some(decay) = block.decay {
            self.line(format!("Decay: {}", decay));
        }
        if let Some(window) = block.window {
            self.line(format!("Window: {}", window));
        }
        if let Some(weight) = block.aspiration_weight {
            self.line(format!("Aspiration_Weight: {}", weight));
        }
        if let Some(dream) = block.dream_cycle {
            self.line(format!("Dream_Cycle: {}", dream));
        }
        self.close();
    }

    fn pulse(&mut self, pulse: &PulseBlock) {
        self.open(format!("Pulse (Interval: {})", pulse.interval.as_str()));
        if let Some(watch) = &pulse.watch {
            self.line(format!("Watch: {}", watch));
        }

        if let Some(resonate) = &pulse.resonate {
            self.open("Resonate");
            match (&resonate.rule, resonate.threshold) {
                (Some(rule), Some(t)) => self.line(format!("Threshold: {}({})", rule, t)),
                (None, Some(t)) => self.line(format!("Threshold: {}", t)),
                _ => {}
            }
            for covenant in &resonate.alignment {
                self.line(format!("Alignment: Covenant.{}", covenant));
            }
            if let Some(synthesize) = &resonate.synthesize {
                self.synthesize(synthesize);
            }
            self.close();
        }

        if !pulse.deliberate.is_empty() {
            self.open("Deliberate");
            for proposal in &pulse.deliberate.proposals {
                match &proposal.name {
                    Some(name) => self.open(format!("Proposal {}", quote(name))),
                    None => self.open("Proposal"),
                }
                for prop in &proposal.properties {
                    self.line(format!("{}: {}", prop.key, prop.value));
                }
                self.close();
            }
            if let Some(synthesize) = &pulse.deliberate.synthesize {
                self.synthesize(synthesize);
            }
            self.close();
        }

        if let Some(manifest) = &pulse.manifest {
            match manifest.threshold {
                Some(t) => self.open(format!("Manifest (on Resonance > {})", t)),
                None => self.open("Manifest (on Resonance)"),
            }
            for action in &manifest.actions {
                match action {
                    ManifestAction::Execute(expr) => self.line(format!("Execute: {}", expr)),
                    ManifestAction::Update(update) => self.update(update),
                }
            }
            self.close();
        }
        self.close();
    }

    fn synthesize(&mut self, synthesize: &SynthesizeBlock) {
        self.open("Synthesize");
        for metric in &synthesize.metrics {
            match metric {
                MetricRef::Alignment { covenant } => {
                    self.line(format!("Metric: Alignment(Covenant.{})", covenant))
                }
                MetricRef::Aspiration => self.line("Metric: Aspiration(Potentiality)"),
            }
        }
        self.close();
    }

    fn decree(&mut self, decree: &DecreeDecl) {
        self.open(format!("Decree {}", quote(&decree.name)));
        self.line(format!(
            "Condition: Resonance {} {}",
            decree.condition.op.symbol(),
            decree.condition.value
        ));
        self.line(format!("Action: {}", quote(&decree.action)));
        if let Some(target) = &decree.target {
            self.line(format!("Target: Domain.{}", target));
        }
        for constraint in &decree.constraints {
            self.line(format!("Constraint: {}", quote(constraint)));
        }
        for update in &decree.updates {
            self.update(update);
        }
        self.close();
    }

    fn update(&mut self, update: &UpdateDirective) {
        self.line(format!("Update: {} -> {}", update.target, update.value));
    }
}

/// Quote and escape a string literal
fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut writer = SourceWriter::new();
        writer.program(self);
        f.write_str(&writer.out)
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(&quote(s)),
            Self::Number(n) => write!(f, "{}", n),
            Self::Path(path) => write!(f, "{}", path),
            Self::Call { callee, args } => {
                write!(f, "{}(", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    #[test]
    fn test_canonical_layout() {
        let program = parse_source(
            r#"Covenant "C" {Invariant: "keep \"calm\"" Threshold: 1}
Decree "D" { Condition: Resonance < 0.3 Action: "rest" }"#,
        )
        .unwrap()
        .program;

        let expected = "Covenant \"C\" {\n    Invariant: \"keep \\\"calm\\\"\"\n    Threshold: 1\n}\n\nDecree \"D\" {\n    Condition: Resonance < 0.3\n    Action: \"rest\"\n}\n";
        assert_eq!(program.to_string(), expected);
    }

    #[test]
    fn test_expr_display() {
        let expr = Expr::Call {
            callee: Path::new(["console", "write"]),
            args: vec![Expr::Str("hi".into()), Expr::Number(0.5)],
        };
        assert_eq!(expr.to_string(), "console.write(\"hi\", 0.5)");
    }

    #[test]
    fn test_resonate_and_bare_manifest_layout() {
        let program = parse_source(
            r#"Domain "D" { Intent: "i" Pulse {
                Resonate {
                    Threshold: Simple_Consensus(0.8)
                    Synthesize { Metric: Alignment(Covenant.C) }
                }
                Manifest (on Resonance) { }
            } }"#,
        )
        .unwrap()
        .program;
        let printed = program.to_string();
        let resonate = "        Resonate {\n            Threshold: Simple_Consensus(0.8)\n";
        assert!(printed.contains(resonate));
        assert!(printed.contains("Manifest (on Resonance) {"));
        assert!(!printed.contains("Deliberate"));
        assert_eq!(parse_source(&printed).unwrap().program, program);
    }

    #[test]
    fn test_default_interval_is_printed() {
        let program = parse_source(
            r#"Domain "D" { Intent: "i" Pulse { Deliberate { Synthesize { Metric: Alignment(Covenant.C) } } } }"#,
        )
        .unwrap()
        .program;
        assert!(program.to_string().contains("Pulse (Interval: RealTime) {"));
    }
}
