//! Output formatting utilities

use colored::*;
use genesis_dsl::Diagnostic;
use genesis_engine::{
    CycleOutcome, CycleReport, DecreeOutcome, FatalCovenantViolation, GenesisError, Registry,
    RuntimeMetrics,
};
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;

/// Output format for run reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One human-readable line per cycle
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::warn!(error = %e, "Report not serializable"),
    }
}

/// Print one cycle report
pub fn print_report(report: &CycleReport, format: OutputFormat) {
    if format == OutputFormat::Json {
        print_json(report);
        return;
    }

    let (label, detail) = match &report.outcome {
        CycleOutcome::Manifested { actions, failures } => {
            let mut detail = actions.join(", ");
            if !failures.is_empty() {
                detail = format!("{} (failed: {})", detail, failures.join("; "));
            }
            ("manifested".green().bold(), detail)
        }
        CycleOutcome::Deferred { threshold } => {
            let detail = match threshold {
                Some(t) => format!("below gate {}", t),
                None => "no manifest gate".to_string(),
            };
            ("deferred".yellow(), detail)
        }
        CycleOutcome::Vetoed { covenant } => (
            "vetoed".red().bold(),
            format!("critical covenant \"{}\"", covenant),
        ),
        CycleOutcome::Error { message } => ("error".red(), message.clone()),
    };

    let resonance = report
        .score()
        .map_or_else(|| "-".to_string(), |s| format!("{:.3}", s));
    println!(
        "{} {} #{} {} resonance={} drive={} aspiration={:.2}",
        report.timestamp.format("%H:%M:%S").to_string().dimmed(),
        report.domain.bold(),
        report.cycle,
        label,
        resonance,
        report.drive_state,
        report.aspiration,
    );
    if let Some(proposal) = &report.proposal {
        match report.coherence {
            Some(c) => println!("    proposal: {} (coherence {:.3})", proposal, c),
            None => println!("    proposal: {}", proposal),
        }
    }
    if !detail.is_empty() {
        println!("    {}", detail.dimmed());
    }
}

pub fn print_metrics(metrics: &RuntimeMetrics, format: OutputFormat) {
    if format == OutputFormat::Json {
        print_json(metrics);
        return;
    }

    let average = metrics
        .average_resonance
        .map_or_else(|| "-".to_string(), |a| format!("{:.3}", a));
    println!(
        "{} pulses={} manifested={} deferred={} vetoed={} errors={} resonance={} uptime={}s",
        "metrics".bold(),
        metrics.total_pulses,
        metrics.total_manifestations,
        metrics.total_deferrals,
        metrics.total_vetoes,
        metrics.total_errors,
        average,
        metrics.uptime_seconds,
    );
}

/// Print the result of enacting a decree on one domain
pub fn print_decree(outcome: &DecreeOutcome, format: OutputFormat) {
    if format == OutputFormat::Json {
        print_json(outcome);
        return;
    }

    let verdict = match (outcome.holds, outcome.applied) {
        (true, true) => "applied".green().bold(),
        (true, false) => "held".green(),
        (false, _) => "not met".yellow(),
    };
    println!(
        "decree \"{}\" on {}: resonance={:.3} {}",
        outcome.decree,
        outcome.domain.bold(),
        outcome.resonance.score,
        verdict
    );
}

pub fn print_diagnostics(file: &Path, diagnostics: &[Diagnostic]) {
    for d in diagnostics {
        eprintln!(
            "{}:{}:{}: {} {}",
            file.display(),
            d.line,
            d.col,
            "warning:".yellow().bold(),
            d.message
        );
    }
}

/// Print what a checked program declares
pub fn print_summary(file: &Path, registry: &Registry) {
    println!(
        "{} {}: {} covenants, {} possibilities, {} pantheons, {} domains, {} decrees",
        "✓".green(),
        file.display(),
        registry.covenants().len(),
        registry.possibilities().len(),
        registry.pantheons().len(),
        registry.domains().len(),
        registry.decrees().len()
    );
}

pub fn print_violation(violation: &FatalCovenantViolation) {
    eprintln!("{} {}", "fatal:".red().bold(), violation);
}

/// Report an error and map it to the process exit code
pub fn fail(error: &anyhow::Error) -> ExitCode {
    eprintln!("{} {:#}", "error:".red().bold(), error);
    let code = error
        .downcast_ref::<GenesisError>()
        .map_or(1, GenesisError::exit_code);
    ExitCode::from(code as u8)
}
