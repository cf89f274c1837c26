//! Abstract syntax tree for Genesis programs
//!
//! The AST is a closed set of declaration variants. Consumers match on
//! [`Declaration`] exhaustively so that adding a new declaration kind is a
//! compile error everywhere it is not yet handled.
//!
//! Nodes carry no source positions: two programs that differ only in
//! whitespace, comments or layout compare equal.

use serde::{Deserialize, Serialize};

/// Root of a parsed Genesis program
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Top-level declarations in source order
    pub declarations: Vec<Declaration>,
}

impl Program {
    pub fn covenants(&self) -> impl Iterator<Item = &CovenantDecl> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Covenant(c) => Some(c),
            _ => None,
        })
    }

    pub fn possibilities(&self) -> impl Iterator<Item = &PossibilityDecl> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Possibility(p) => Some(p),
            _ => None,
        })
    }

    pub fn pantheons(&self) -> impl Iterator<Item = &PantheonDecl> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Pantheon(p) => Some(p),
            _ => None,
        })
    }

    pub fn domains(&self) -> impl Iterator<Item = &DomainDecl> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Domain(d) => Some(d),
            _ => None,
        })
    }

    pub fn decrees(&self) -> impl Iterator<Item = &DecreeDecl> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Decree(d) => Some(d),
            _ => None,
        })
    }
}

/// A top-level declaration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Declaration {
    Covenant(CovenantDecl),
    Possibility(PossibilityDecl),
    Pantheon(PantheonDecl),
    Domain(DomainDecl),
    Decree(DecreeDecl),
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Self::Covenant(c) => &c.name,
            Self::Possibility(p) => &p.name,
            Self::Pantheon(p) => &p.name,
            Self::Domain(d) => &d.name,
            Self::Decree(d) => &d.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Covenant(_) => "Covenant",
            Self::Possibility(_) => "Possibility",
            Self::Pantheon(_) => "Pantheon",
            Self::Domain(_) => "Domain",
            Self::Decree(_) => "Decree",
        }
    }
}

/// An immutable invariant with a veto threshold
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CovenantDecl {
    pub name: String,
    pub invariant: String,
    /// Always within [0.0, 1.0]
    pub threshold: f64,
    /// Additional `key: value` properties, retained but not interpreted
    pub extra: Vec<Property>,
}

/// What a Possibility is declared out of
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Foundation {
    #[default]
    Nothing,
    Void,
    Emptiness,
    Freedom,
}

impl Foundation {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Nothing" => Some(Self::Nothing),
            "Void" => Some(Self::Void),
            "Emptiness" => Some(Self::Emptiness),
            "Freedom" => Some(Self::Freedom),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nothing => "Nothing",
            Self::Void => "Void",
            Self::Emptiness => "Emptiness",
            Self::Freedom => "Freedom",
        }
    }
}

/// A declared future that domains can act within.
///
/// Proposals are scored for coherence with the `Declaration` and
/// `Occurring` texts of a domain's Context. Coherence is reported but never
/// gates a manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PossibilityDecl {
    pub name: String,
    pub declaration: String,
    pub foundation: Foundation,
    pub opening: Option<String>,
    pub occurring: Option<String>,
    pub risk: Option<String>,
    pub power: Option<String>,
    /// Enclosing Possibility, from `Within: Possibility.X`
    pub within: Option<String>,
}

/// A named perspective inside a pantheon
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AvatarDecl {
    pub name: String,
    pub lineage: String,
    pub essence: Option<String>,
    pub aura: Option<String>,
    pub vessel: Option<Expr>,
    pub weight: Option<f64>,
}

impl AvatarDecl {
    /// The text used when scoring: Essence wins over Aura
    pub fn scoring_essence(&self) -> &str {
        self.essence
            .as_deref()
            .or(self.aura.as_deref())
            .unwrap_or_default()
    }
}

/// An ordered collection of avatars
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PantheonDecl {
    pub name: String,
    pub avatars: Vec<AvatarDecl>,
}

/// How a domain names the pantheon it consults
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PantheonRef {
    /// `Pantheon: Council`
    Named(String),
    /// A pantheon declared inside the domain body
    Inline(PantheonDecl),
}

impl PantheonRef {
    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Inline(decl) => &decl.name,
        }
    }
}

/// A purpose container running a perpetual pulse
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainDecl {
    pub name: String,
    pub intent: String,
    pub purpose: Option<PurposeBlock>,
    /// Possibility the domain acts within, from `Context: Possibility.X`
    pub context: Option<String>,
    pub pantheon: Option<PantheonRef>,
    pub potentiality: Option<PotentialityBlock>,
    pub pulse: Option<PulseBlock>,
}

/// `Purpose Name { Objective: ... Anchor: ... Trajectory: ... }`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PurposeBlock {
    pub name: Option<String>,
    pub objective: Option<String>,
    pub anchor: Option<String>,
    /// Direction a dreaming domain reaches toward when it has no Drive
    pub trajectory: Option<String>,
    pub extra: Vec<Property>,
}

/// Drive state of a domain's potentiality
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriveState {
    #[default]
    Dormant,
    Exploring,
    Active,
}

impl DriveState {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Dormant" => Some(Self::Dormant),
            "Exploring" => Some(Self::Exploring),
            "Active" => Some(Self::Active),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dormant => "Dormant",
            Self::Exploring => "Exploring",
            Self::Active => "Active",
        }
    }
}

impl std::fmt::Display for DriveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Soul Potentiality { ... }`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PotentialityBlock {
    pub state: Option<DriveState>,
    pub drive: Option<String>,
    pub floor: Option<f64>,
    pub decay: Option<f64>,
    pub window: Option<usize>,
    pub aspiration_weight: Option<f64>,
    pub dream_cycle: Option<bool>,
}

/// Pulse interval kind
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntervalKind {
    /// Re-enter Watching immediately after each cycle
    #[default]
    RealTime,
    /// Block in Watching until an external trigger arrives
    OnDemand,
}

impl IntervalKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "RealTime" => Some(Self::RealTime),
            "OnDemand" => Some(Self::OnDemand),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RealTime => "RealTime",
            Self::OnDemand => "OnDemand",
        }
    }
}

/// `Pulse (Interval: ...) { Watch ... Resonate ... Deliberate ... Manifest ... }`
///
/// The parser guarantees exactly one Synthesize block, held either by
/// Deliberate or by Resonate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PulseBlock {
    pub interval: IntervalKind,
    pub watch: Option<Expr>,
    pub resonate: Option<ResonateBlock>,
    /// Empty when the source omits Deliberate
    pub deliberate: DeliberateBlock,
    pub manifest: Option<ManifestBlock>,
}

impl PulseBlock {
    pub fn synthesize(&self) -> Option<&SynthesizeBlock> {
        self.deliberate
            .synthesize
            .as_ref()
            .or_else(|| self.resonate.as_ref()?.synthesize.as_ref())
    }

    /// Consensus threshold declared by Resonate
    pub fn resonance_threshold(&self) -> Option<f64> {
        self.resonate.as_ref()?.threshold
    }

    /// Threshold resonance must strictly exceed to manifest.
    ///
    /// The larger of the Manifest predicate and the Resonate threshold;
    /// `None` when the pulse has no Manifest block.
    pub fn manifest_gate(&self) -> Option<f64> {
        let manifest = self.manifest.as_ref()?;
        [manifest.threshold, self.resonance_threshold()]
            .into_iter()
            .flatten()
            .reduce(f64::max)
    }
}

/// `Resonate { Threshold: Simple_Consensus(0.9) Alignment: Covenant.X Synthesize { ... } }`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResonateBlock {
    /// Consensus rule named around the threshold, e.g. `Simple_Consensus`
    pub rule: Option<String>,
    pub threshold: Option<f64>,
    /// Covenants added to the pulse's Alignment metrics
    pub alignment: Vec<String>,
    pub synthesize: Option<SynthesizeBlock>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliberateBlock {
    pub proposals: Vec<ProposalDecl>,
    pub synthesize: Option<SynthesizeBlock>,
}

impl DeliberateBlock {
    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty() && self.synthesize.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposalDecl {
    pub name: Option<String>,
    pub properties: Vec<Property>,
}

impl ProposalDecl {
    /// Candidate text handed to the alignment oracle
    pub fn text(&self) -> String {
        let details: Vec<String> = self
            .properties
            .iter()
            .filter_map(|p| match &p.value {
                Expr::Str(s) => Some(s.clone()),
                _ => None,
            })
            .collect();

        match (&self.name, details.is_empty()) {
            (Some(name), true) => name.clone(),
            (Some(name), false) => format!("{}: {}", name, details.join("; ")),
            (None, _) => details.join("; "),
        }
    }
}

/// Metrics synthesized into the resonance score
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizeBlock {
    pub metrics: Vec<MetricRef>,
}

impl SynthesizeBlock {
    /// Names of the covenants referenced by Alignment metrics, in order
    pub fn covenant_refs(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().filter_map(|m| match m {
            MetricRef::Alignment { covenant } => Some(covenant.as_str()),
            MetricRef::Aspiration => None,
        })
    }

    pub fn has_aspiration(&self) -> bool {
        self.metrics.contains(&MetricRef::Aspiration)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricRef {
    /// `Alignment(Covenant.X)`
    Alignment { covenant: String },
    /// `Aspiration(Potentiality)`
    Aspiration,
}

/// `Manifest (on Resonance > N) { ... }` or `Manifest (on Resonance) { ... }`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestBlock {
    /// Resonance must strictly exceed this value; `None` defers to Resonate
    pub threshold: Option<f64>,
    pub actions: Vec<ManifestAction>,
}

impl ManifestBlock {
    pub fn executes(&self) -> impl Iterator<Item = &Expr> {
        self.actions.iter().filter_map(|a| match a {
            ManifestAction::Execute(expr) => Some(expr),
            ManifestAction::Update(_) => None,
        })
    }

    pub fn updates(&self) -> impl Iterator<Item = &UpdateDirective> {
        self.actions.iter().filter_map(|a| match a {
            ManifestAction::Update(u) => Some(u),
            ManifestAction::Execute(_) => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ManifestAction {
    Execute(Expr),
    Update(UpdateDirective),
}

/// `Update: Potentiality.State -> Dormant`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateDirective {
    pub target: Path,
    pub value: Expr,
}

/// A resonance-gated instruction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecreeDecl {
    pub name: String,
    pub condition: Condition,
    /// Instruction text, scored as the decree's proposal
    pub action: String,
    /// Domain the decree mutates; `None` applies to every domain
    pub target: Option<String>,
    /// Extra invariants the action must satisfy
    pub constraints: Vec<String>,
    pub updates: Vec<UpdateDirective>,
}

/// `Resonance <op> N`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub op: CompareOp,
    pub value: f64,
}

impl Condition {
    pub fn holds(&self, resonance: f64) -> bool {
        self.op.apply(resonance, self.value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    NotEq,
}

impl CompareOp {
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            Self::Gt => left > right,
            Self::Gte => left >= right,
            Self::Lt => left < right,
            Self::Lte => left <= right,
            Self::Eq => left == right,
            Self::NotEq => left != right,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Eq => "==",
            Self::NotEq => "!=",
        }
    }
}

/// `key: value`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: Expr,
}

/// Dotted name, e.g. `Vessel.Grid.control`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path(pub Vec<String>);

impl Path {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// True when the path is exactly the given segments
    pub fn is(&self, expected: &[&str]) -> bool {
        self.0.len() == expected.len() && self.0.iter().zip(expected).all(|(a, b)| a == b)
    }

    /// The path with a leading `Vessel` segment removed
    pub fn vessel_name(&self) -> String {
        let segments = match self.0.first().map(String::as_str) {
            Some("Vessel") if self.0.len() > 1 => &self.0[1..],
            _ => &self.0[..],
        };
        segments.join(".")
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Property and argument values
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Str(String),
    Number(f64),
    Path(Path),
    Call { callee: Path, args: Vec<Expr> },
}

impl Expr {
    /// Plain-text rendering used for action arguments and logs
    pub fn as_text(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposal_text_joins_string_properties() {
        let proposal = ProposalDecl {
            name: Some("Shift load".into()),
            properties: vec![
                Property {
                    key: "Action".into(),
                    value: Expr::Str("move demand to night".into()),
                },
                Property {
                    key: "Cost".into(),
                    value: Expr::Number(3.0),
                },
            ],
        };
        assert_eq!(proposal.text(), "Shift load: move demand to night");
    }

    #[test]
    fn vessel_name_strips_prefix() {
        let path = Path::new(["Vessel", "Grid", "control"]);
        assert_eq!(path.vessel_name(), "Grid.control");
        assert_eq!(Path::new(["console", "write"]).vessel_name(), "console.write");
    }

    #[test]
    fn scoring_essence_prefers_essence() {
        let avatar = AvatarDecl {
            name: "Athena".into(),
            lineage: "Greek".into(),
            essence: Some("Wisdom".into()),
            aura: Some("Strategy".into()),
            vessel: None,
            weight: None,
        };
        assert_eq!(avatar.scoring_essence(), "Wisdom");
    }

    #[test]
    fn manifest_gate_takes_the_stricter_threshold() {
        let mut pulse = PulseBlock {
            interval: IntervalKind::RealTime,
            watch: None,
            resonate: Some(ResonateBlock {
                threshold: Some(0.8),
                ..Default::default()
            }),
            deliberate: DeliberateBlock::default(),
            manifest: Some(ManifestBlock {
                threshold: None,
                actions: vec![],
            }),
        };
        assert_eq!(pulse.manifest_gate(), Some(0.8));

        pulse.manifest = Some(ManifestBlock {
            threshold: Some(0.9),
            actions: vec![],
        });
        assert_eq!(pulse.manifest_gate(), Some(0.9));

        pulse.manifest = None;
        assert_eq!(pulse.manifest_gate(), None);
        assert!(pulse.synthesize().is_none());
    }

    #[test]
    fn condition_operators() {
        let cond = Condition {
            op: CompareOp::Gte,
            value: 0.8,
        };
        assert!(cond.holds(0.8));
        assert!(!cond.holds(0.79));
        assert!(CompareOp::NotEq.apply(0.1, 0.2));
    }
}
