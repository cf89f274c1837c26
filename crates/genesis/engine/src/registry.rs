//! Registry: binds a parsed program into resolved entities
//!
//! Binding runs once, before any domain starts. Every cross-reference is
//! resolved here; the first unresolved or duplicate name aborts binding and
//! no partial registry is returned. The registry is read-only afterwards
//! and shared between schedulers behind an `Arc`.

use crate::error::BindError;
use genesis_dsl::{
    Condition, Declaration, DomainDecl, DriveState, Expr, Foundation, IntervalKind, ManifestBlock,
    MetricRef, PantheonDecl, PantheonRef, PossibilityDecl, PotentialityBlock, Program,
    ProposalDecl, Property, PulseBlock, PurposeBlock, UpdateDirective,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Name of the implicit pantheon consulted by domains that name none
pub const ALL_AVATARS: &str = "*";

/// Alignment a decree action needs on each of its constraints
pub const CONSTRAINT_THRESHOLD: f64 = 0.5;

/// A bound covenant. The threshold cannot change after binding.
#[derive(Clone, Debug, PartialEq)]
pub struct Covenant {
    pub name: String,
    pub invariant: String,
    threshold: f64,
    pub extra: Vec<Property>,
}

impl Covenant {
    pub fn new(name: impl Into<String>, invariant: impl Into<String>, threshold: f64) -> Self {
        Self {
            name: name.into(),
            invariant: invariant.into(),
            threshold: threshold.clamp(0.0, 1.0),
            extra: Vec::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// A covenant with threshold 1.0 halts its domain when violated
    pub fn is_critical(&self) -> bool {
        self.threshold >= 1.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Avatar {
    pub name: String,
    pub lineage: String,
    /// Essence, or Aura when no Essence was declared
    pub essence: String,
    pub vessel: Option<Expr>,
    pub weight: Option<f64>,
}

impl Avatar {
    pub fn new(name: impl Into<String>, essence: impl Into<String>, weight: Option<f64>) -> Self {
        Self {
            name: name.into(),
            lineage: String::new(),
            essence: essence.into(),
            vessel: None,
            weight,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pantheon {
    pub name: String,
    pub avatars: Vec<Avatar>,
}

impl Pantheon {
    pub fn new(name: impl Into<String>, avatars: Vec<Avatar>) -> Self {
        Self {
            name: name.into(),
            avatars,
        }
    }

    /// Weight of each avatar, defaulting to 1/n when unspecified
    pub fn effective_weights(&self) -> Vec<f64> {
        let n = self.avatars.len();
        if n == 0 {
            return Vec::new();
        }
        let default = 1.0 / n as f64;
        self.avatars
            .iter()
            .map(|a| a.weight.unwrap_or(default))
            .collect()
    }
}

/// A declared space of outcomes a domain can act within
#[derive(Clone, Debug, PartialEq)]
pub struct Possibility {
    pub name: String,
    pub declaration: String,
    pub foundation: Foundation,
    pub opening: Option<String>,
    pub occurring: Option<String>,
    pub risk: Option<String>,
    pub power: Option<String>,
    pub within: Option<String>,
}

impl Possibility {
    /// Texts a proposal is judged against for coherence
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.declaration.as_str()).chain(self.occurring.as_deref())
    }
}

/// A resolved Synthesize metric
#[derive(Clone, Debug, PartialEq)]
pub enum Metric {
    Alignment(Arc<Covenant>),
    Aspiration,
}

impl Metric {
    pub fn label(&self) -> String {
        match self {
            Self::Alignment(c) => format!("Alignment(Covenant.{})", c.name),
            Self::Aspiration => "Aspiration(Potentiality)".to_string(),
        }
    }
}

/// A resolved pulse block
#[derive(Clone, Debug, PartialEq)]
pub struct Pulse {
    pub interval: IntervalKind,
    pub watch: Option<Expr>,
    pub proposals: Vec<ProposalDecl>,
    pub metrics: Vec<Metric>,
    /// Consensus threshold from the Resonate block
    pub resonance_threshold: Option<f64>,
    /// Score a proposal must strictly exceed to manifest
    pub gate: Option<f64>,
    pub manifest: Option<ManifestBlock>,
}

impl Pulse {
    /// Covenants referenced by Alignment metrics, in metric order
    pub fn covenants(&self) -> impl Iterator<Item = &Arc<Covenant>> {
        self.metrics.iter().filter_map(|m| match m {
            Metric::Alignment(c) => Some(c),
            Metric::Aspiration => None,
        })
    }

    pub fn has_aspiration(&self) -> bool {
        self.metrics.iter().any(|m| matches!(m, Metric::Aspiration))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Domain {
    pub name: String,
    pub intent: String,
    pub purpose: Option<PurposeBlock>,
    /// Possibility chain from `Context`, innermost first
    pub context: Vec<Arc<Possibility>>,
    pub pantheon: Arc<Pantheon>,
    pub potentiality: PotentialityBlock,
    pub pulse: Option<Pulse>,
    /// Position among the program's domains
    pub order: usize,
}

impl Domain {
    pub fn initial_state(&self) -> DriveState {
        self.potentiality.state.unwrap_or_default()
    }

    pub fn objective(&self) -> Option<&str> {
        self.purpose.as_ref()?.objective.as_deref()
    }

    pub fn dreams(&self) -> bool {
        self.potentiality.dream_cycle.unwrap_or(false)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Decree {
    pub name: String,
    pub condition: Condition,
    pub action: String,
    pub target: Option<String>,
    /// One covenant per `Constraint`, thresholded at [`CONSTRAINT_THRESHOLD`]
    pub constraints: Vec<Arc<Covenant>>,
    pub updates: Vec<UpdateDirective>,
}

/// Name-indexed entities of one kind, in declaration order
#[derive(Clone, Debug)]
struct Table<T> {
    items: Vec<Arc<T>>,
    index: HashMap<String, usize>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> Table<T> {
    fn insert(&mut self, kind: &str, name: &str, item: T) -> Result<Arc<T>, BindError> {
        if self.index.contains_key(name) {
            return Err(BindError::DuplicateDeclaration {
                kind: kind.to_string(),
                name: name.to_string(),
            });
        }
        let item = Arc::new(item);
        self.index.insert(name.to_string(), self.items.len());
        self.items.push(item.clone());
        Ok(item)
    }

    fn get(&self, name: &str) -> Option<&Arc<T>> {
        self.index.get(name).map(|&i| &self.items[i])
    }
}

/// Flat, read-only view of every bound declaration
#[derive(Clone, Debug, Default)]
pub struct Registry {
    covenants: Table<Covenant>,
    possibilities: Table<Possibility>,
    pantheons: Table<Pantheon>,
    domains: Table<Domain>,
    decrees: Table<Decree>,
}

impl Registry {
    pub fn covenant(&self, name: &str) -> Option<&Arc<Covenant>> {
        self.covenants.get(name)
    }

    pub fn possibility(&self, name: &str) -> Option<&Arc<Possibility>> {
        self.possibilities.get(name)
    }

    pub fn pantheon(&self, name: &str) -> Option<&Arc<Pantheon>> {
        self.pantheons.get(name)
    }

    pub fn domain(&self, name: &str) -> Option<&Arc<Domain>> {
        self.domains.get(name)
    }

    pub fn decree(&self, name: &str) -> Option<&Arc<Decree>> {
        self.decrees.get(name)
    }

    pub fn covenants(&self) -> &[Arc<Covenant>] {
        &self.covenants.items
    }

    pub fn possibilities(&self) -> &[Arc<Possibility>] {
        &self.possibilities.items
    }

    pub fn pantheons(&self) -> &[Arc<Pantheon>] {
        &self.pantheons.items
    }

    pub fn domains(&self) -> &[Arc<Domain>] {
        &self.domains.items
    }

    pub fn decrees(&self) -> &[Arc<Decree>] {
        &self.decrees.items
    }
}

/// Resolve a parsed program into a registry
pub fn bind(program: &Program) -> Result<Registry, BindError> {
    let mut registry = Registry::default();

    // Covenants, possibilities and pantheons first, so domains and decrees may refer to
    // declarations that appear later in the source.
    for decl in &program.declarations {
        match decl {
            Declaration::Covenant(c) => {
                let covenant = Covenant {
                    name: c.name.clone(),
                    invariant: c.invariant.clone(),
                    threshold: c.threshold,
                    extra: c.extra.clone(),
                };
                registry.covenants.insert("Covenant", &c.name, covenant)?;
            }
            Declaration::Possibility(p) => {
                registry
                    .possibilities
                    .insert("Possibility", &p.name, bind_possibility(p))?;
            }
            Declaration::Pantheon(p) => {
                registry
                    .pantheons
                    .insert("Pantheon", &p.name, bind_pantheon(p)?)?;
            }
            Declaration::Domain(d) => {
                if let Some(PantheonRef::Inline(p)) = &d.pantheon {
                    registry
                        .pantheons
                        .insert("Pantheon", &p.name, bind_pantheon(p)?)?;
                }
            }
            Declaration::Decree(_) => {}
        }
    }

    for possibility in registry.possibilities.items.iter() {
        context_chain(&registry, &possibility.name, || {
            format!("Possibility \"{}\"", possibility.name)
        })?;
    }

    let everyone = Arc::new(Pantheon {
        name: ALL_AVATARS.to_string(),
        avatars: registry
            .pantheons
            .items
            .iter()
            .flat_map(|p| p.avatars.iter().cloned())
            .collect(),
    });

    for (order, decl) in program.domains().enumerate() {
        let domain = bind_domain(&registry, decl, order, &everyone)?;
        registry.domains.insert("Domain", &decl.name, domain)?;
    }

    for decl in program.decrees() {
        if let Some(target) = &decl.target {
            if registry.domains.get(target).is_none() {
                return Err(BindError::UnresolvedReference {
                    from: format!("Decree \"{}\"", decl.name),
                    target: format!("Domain \"{}\"", target),
                });
            }
        }
        let constraints = decl
            .constraints
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let name = format!("{} constraint {}", decl.name, i + 1);
                Arc::new(Covenant::new(name, text.clone(), CONSTRAINT_THRESHOLD))
            })
            .collect();
        let decree = Decree {
            name: decl.name.clone(),
            condition: decl.condition,
            action: decl.action.clone(),
            target: decl.target.clone(),
            constraints,
            updates: decl.updates.clone(),
        };
        registry.decrees.insert("Decree", &decl.name, decree)?;
    }

    tracing::info!(
        covenants = registry.covenants.items.len(),
        possibilities = registry.possibilities.items.len(),
        pantheons = registry.pantheons.items.len(),
        domains = registry.domains.items.len(),
        decrees = registry.decrees.items.len(),
        "Program bound"
    );
    Ok(registry)
}

fn bind_possibility(decl: &PossibilityDecl) -> Possibility {
    Possibility {
        name: decl.name.clone(),
        declaration: decl.declaration.clone(),
        foundation: decl.foundation,
        opening: decl.opening.clone(),
        occurring: decl.occurring.clone(),
        risk: decl.risk.clone(),
        power: decl.power.clone(),
        within: decl.within.clone(),
    }
}

/// Follow `Within` links from `start`, innermost first
fn context_chain(
    registry: &Registry,
    start: &str,
    from: impl Fn() -> String,
) -> Result<Vec<Arc<Possibility>>, BindError> {
    let mut chain: Vec<Arc<Possibility>> = Vec::new();
    let mut seen = HashSet::new();
    let mut next = Some(start.to_string());

    while let Some(name) = next {
        if !seen.insert(name.clone()) {
            return Err(BindError::CyclicPossibility { name });
        }
        let possibility = registry.possibilities.get(&name).cloned().ok_or_else(|| {
            let from = match chain.last() {
                Some(inner) => format!("Possibility \"{}\"", inner.name),
                None => from(),
            };
            BindError::UnresolvedReference {
                from,
                target: format!("Possibility \"{}\"", name),
            }
        })?;
        next = possibility.within.clone();
        chain.push(possibility);
    }
    Ok(chain)
}

fn bind_pantheon(decl: &PantheonDecl) -> Result<Pantheon, BindError> {
    let mut seen = HashMap::new();
    let mut avatars = Vec::with_capacity(decl.avatars.len());

    for avatar in &decl.avatars {
        if seen.insert(avatar.name.as_str(), ()).is_some() {
            return Err(BindError::DuplicateDeclaration {
                kind: format!("Avatar in Pantheon \"{}\"", decl.name),
                name: avatar.name.clone(),
            });
        }
        avatars.push(Avatar {
            name: avatar.name.clone(),
            lineage: avatar.lineage.clone(),
            essence: avatar.scoring_essence().to_string(),
            vessel: avatar.vessel.clone(),
            weight: avatar.weight,
        });
    }

    Ok(Pantheon {
        name: decl.name.clone(),
        avatars,
    })
}

fn bind_domain(
    registry: &Registry,
    decl: &DomainDecl,
    order: usize,
    everyone: &Arc<Pantheon>,
) -> Result<Domain, BindError> {
    let from = || format!("Domain \"{}\"", decl.name);

    let pantheon = match &decl.pantheon {
        Some(reference) => registry
            .pantheons
            .get(reference.name())
            .cloned()
            .ok_or_else(|| BindError::UnresolvedReference {
                from: from(),
                target: format!("Pantheon \"{}\"", reference.name()),
            })?,
        None => everyone.clone(),
    };

    let context = match &decl.context {
        Some(name) => context_chain(registry, name, from)?,
        None => Vec::new(),
    };

    let pulse = match &decl.pulse {
        Some(block) => Some(bind_pulse(registry, block, from)?),
        None => None,
    };

    Ok(Domain {
        name: decl.name.clone(),
        intent: decl.intent.clone(),
        purpose: decl.purpose.clone(),
        context,
        pantheon,
        potentiality: decl.potentiality.clone().unwrap_or_default(),
        pulse,
        order,
    })
}

fn bind_pulse(
    registry: &Registry,
    block: &PulseBlock,
    from: impl Fn() -> String,
) -> Result<Pulse, BindError> {
    let synthesize = block
        .synthesize()
        .ok_or_else(|| BindError::MissingSynthesize { from: from() })?;

    let resolve = |covenant: &str| {
        registry.covenants.get(covenant).cloned().ok_or_else(|| {
            BindError::UnresolvedReference {
                from: from(),
                target: format!("Covenant \"{}\"", covenant),
            }
        })
    };

    let mut metrics = Vec::with_capacity(synthesize.metrics.len());
    for metric in &synthesize.metrics {
        match metric {
            MetricRef::Alignment { covenant } => {
                metrics.push(Metric::Alignment(resolve(covenant)?))
            }
            MetricRef::Aspiration => metrics.push(Metric::Aspiration),
        }
    }
    // Resonate alignments join the metrics once each, after the declared ones
    for covenant in block.resonate.iter().flat_map(|r| r.alignment.iter()) {
        let bound = resolve(covenant)?;
        let present = metrics
            .iter()
            .any(|m| matches!(m, Metric::Alignment(c) if c.name == bound.name));
        if !present {
            metrics.push(Metric::Alignment(bound));
        }
    }

    Ok(Pulse {
        interval: block.interval,
        watch: block.watch.clone(),
        proposals: block.deliberate.proposals.clone(),
        metrics,
        resonance_threshold: block.resonance_threshold(),
        gate: block.manifest_gate(),
        manifest: block.manifest.clone(),
    })
}
