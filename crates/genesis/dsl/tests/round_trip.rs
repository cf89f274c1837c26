//! Parse → print → parse must reproduce the same program.

use genesis_dsl::*;
use proptest::prelude::*;

const GRID: &str = include_str!("../../../../demos/grid.gen");

fn reparse(program: &Program) -> Program {
    let printed = program.to_string();
    parse_source(&printed)
        .unwrap_or_else(|e| panic!("printed source failed to parse: {e}\n{printed}"))
        .program
}

#[test]
fn demo_program_round_trips() {
    let out = parse_source(GRID).unwrap();
    assert!(!out.program.declarations.is_empty());
    assert_eq!(reparse(&out.program), out.program);
}

#[test]
fn printed_source_is_a_fixed_point() {
    let program = parse_source(GRID).unwrap().program;
    let once = program.to_string();
    let twice = reparse(&program).to_string();
    assert_eq!(once, twice);
}

#[test]
fn comments_and_layout_do_not_matter() {
    let compact = parse_source(
        r#"Covenant "C" {Invariant:"i" Threshold:0.5} Domain "D" {Intent:"x" Pulse{Deliberate{Synthesize{Metric:Alignment(Covenant.C)}}}}"#,
    )
    .unwrap()
    .program;
    let spread = parse_source(
        r#"
# a covenant
Covenant "C" {
    Invariant: 'i'
    Threshold: 0.50
}

### a domain
    spread over lines ###
Domain "D" {
    Intent: "x"
    Pulse (Interval: RealTime) {
        Deliberate {
            Synthesize {
                Metric: Alignment(Covenant.C)
            }
        }
    }
}
"#,
    )
    .unwrap()
    .program;
    assert_eq!(compact, spread);
}

#[test]
fn inline_pantheon_and_decree_round_trip() {
    let program = parse_source(
        r#"
Covenant "Care" { Invariant: "do no harm" Threshold: 0.4 Scope: Global.All }
Domain "Clinic" {
    Intent: "triage patients"
    Pantheon "Staff" {
        Avatar "Asclepius" { Lineage: "Greek" Aura: "healing" Weight: 2 }
    }
    Soul Potentiality { State: Dormant Decay: 0.25 Aspiration_Weight: 0.5 }
    Pulse (Interval: OnDemand) {
        Observe: Vessel.Queue.next
        Deliberate {
            Proposal { Detail: "see the next patient" Priority: 1 }
            Synthesize { Metric: Aspiration Metric: Alignment(Covenant.Care) }
        }
    }
}
Decree "Close" { Condition: Resonance != 0 Action: "close the clinic" Update: Potentiality.State -> Dormant }
"#,
    )
    .unwrap()
    .program;
    assert_eq!(reparse(&program), program);
}

#[test]
fn purpose_possibility_and_resonate_round_trip() {
    let program = parse_source(
        r#"
Covenant "Safety" { Invariant: "never overload" Threshold: 0.6 }
Possibility "Calm" { Declaration: "a calm grid" Foundation: Void Risk: "stagnation" }
Possibility "Balanced" {
    Declaration: "supply meets demand"
    Occurring: "load follows the sun"
    Within: Possibility.Calm
}
Domain "Grid" {
    Intent: "balance load"
    Purpose "Steward" { Objective: "keep the lights on" Trajectory: "renewables first" }
    Context: Possibility.Balanced
    Soul Potentiality { State: Exploring Dream_Cycle: true }
    Pulse (Interval: OnDemand) {
        Resonate {
            Threshold: Simple_Consensus(0.7)
            Alignment: Covenant.Safety
            Synthesize { Metric: Alignment(Covenant.Safety) Metric: Aspiration }
        }
        Deliberate { Proposal "Shed" { Detail: "shed load" } }
        Manifest (on Resonance) { Execute: console.write("ok") }
    }
}
Decree "Quiet" {
    Condition: Resonance < 0.5
    Action: "hold still"
    Target: Domain.Grid
    Constraint: "no outages"
    Constraint: "no new load"
}
"#,
    )
    .unwrap()
    .program;
    assert_eq!(program.possibilities().count(), 2);
    assert_eq!(reparse(&program), program);
}

fn arb_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _.,'\"\\\\\n\t#{}]{0,24}"
}

proptest! {
    /// Arbitrary string contents and unit-interval thresholds survive printing.
    #[test]
    fn covenant_literals_round_trip(
        name in "[A-Za-z][A-Za-z0-9_]{0,12}",
        invariant in arb_text(),
        threshold in 0.0f64..=1.0,
    ) {
        let program = Program {
            declarations: vec![Declaration::Covenant(CovenantDecl {
                name,
                invariant,
                threshold,
                extra: Vec::new(),
            })],
        };
        prop_assert_eq!(reparse(&program), program);
    }
}
