//! Command-line behaviour and exit codes.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

fn demo() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../../demos/grid.gen")
}

fn genesis() -> Command {
    let mut cmd = Command::cargo_bin("genesis").unwrap();
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

fn program(dir: &tempfile::TempDir, source: &str) -> PathBuf {
    let path = dir.path().join("program.gen");
    std::fs::write(&path, source).unwrap();
    path
}

const STEADY: &str = r#"
Covenant "Care" {
    Invariant: "Protect patients and share beds fairly"
    Threshold: 0.1
}
Pantheon "Board" {
    Avatar "Asclepius" { Lineage: "Greek" Essence: "Healing that protects patients" }
}
Domain "Ward" {
    Intent: "Share beds fairly and protect patients"
    Pantheon: "Board"
    Pulse (Interval: RealTime) {
        Deliberate {
            Synthesize { Metric: Alignment(Covenant.Care) }
        }
        Manifest (on Resonance > 0.1) {
            Execute: console.write("assigning beds")
        }
    }
}
"#;

#[test]
fn check_summarizes_demo() {
    genesis()
        .arg("check")
        .arg(demo())
        .assert()
        .success()
        .stdout(predicate::str::contains("2 covenants"))
        .stdout(predicate::str::contains("2 domains"))
        .stdout(predicate::str::contains("1 decrees"));
}

#[test]
fn fmt_output_parses_to_the_same_program() {
    let output = genesis().arg("fmt").arg(demo()).output().unwrap();
    assert!(output.status.success());

    let printed = String::from_utf8(output.stdout).unwrap();
    let original = std::fs::read_to_string(demo()).unwrap();
    assert_eq!(
        genesis_dsl::parse_source(&printed).unwrap().program,
        genesis_dsl::parse_source(&original).unwrap().program
    );
}

#[test]
fn syntax_error_exits_with_1() {
    let dir = tempfile::tempdir().unwrap();
    let path = program(&dir, "Covenant \"Care\" { Invariant: \"unterminated }");
    genesis()
        .arg("check")
        .arg(&path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Lex error"));
}

#[test]
fn unreadable_file_exits_with_1() {
    genesis()
        .args(["check", "/no/such/program.gen"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot read"));
}

#[test]
fn unresolved_reference_exits_with_2() {
    let dir = tempfile::tempdir().unwrap();
    let path = program(&dir, &STEADY.replace("Pantheon: \"Board\"", "Pantheon: \"Senate\""));
    genesis()
        .arg("run")
        .arg(&path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("undeclared"));
}

#[test]
fn run_prints_one_json_report_per_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = program(&dir, STEADY);
    let output = genesis()
        .arg("run")
        .arg(&path)
        .args(["--cycles", "2", "--output", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let reports: Vec<serde_json::Value> = stdout
        .lines()
        .filter(|line| line.starts_with('{'))
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["domain"], "Ward");
    assert_eq!(reports[1]["cycle"], 2);
}

#[test]
fn metrics_follow_the_reports() {
    let dir = tempfile::tempdir().unwrap();
    let path = program(&dir, STEADY);
    let output = genesis()
        .arg("run")
        .arg(&path)
        .args(["--cycles", "3", "--output", "json", "--metrics"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let last = stdout
        .lines()
        .filter(|line| line.starts_with('{'))
        .last()
        .unwrap();
    let metrics: serde_json::Value = serde_json::from_str(last).unwrap();
    assert_eq!(metrics["total_pulses"], 3);
    assert_eq!(metrics["active_domains"], 0);
}

#[test]
fn critical_veto_exits_with_3() {
    let dir = tempfile::tempdir().unwrap();
    let source = STEADY
        .replace("Threshold: 0.1", "Threshold: 1.0")
        .replace(
            "Invariant: \"Protect patients and share beds fairly\"",
            "Invariant: \"Never discharge patients early\"",
        )
        .replace(
            "Deliberate {",
            "Deliberate {\n            Proposal \"Discharge\" { Action: \"Discharge patients early\" }",
        );
    let path = program(&dir, &source);
    genesis()
        .arg("run")
        .arg(&path)
        .args(["--cycles", "3"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("fatal"));
}
