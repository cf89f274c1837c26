//! Subcommand implementations

use crate::output::{self, OutputFormat};
use anyhow::Context;
use genesis_dsl::parse_source;
use genesis_engine::{
    compile, ChannelComplianceSink, DomainHandle, GenesisError, LexicalOracle, Runtime,
    RuntimeConfig,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct RunArgs {
    pub file: PathBuf,
    pub enact: Vec<String>,
    pub trigger: Vec<String>,
    pub cycles: Option<u64>,
    pub output: OutputFormat,
    pub metrics: bool,
}

fn read_source(file: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("cannot read {}", file.display()))
}

/// `genesis run`
pub async fn run(args: RunArgs, config: RuntimeConfig) -> anyhow::Result<ExitCode> {
    let source = read_source(&args.file)?;

    let (sink, mut events) = ChannelComplianceSink::new(config.compliance.channel_capacity);
    let (mut runtime, diagnostics) =
        Runtime::load(&source, config, Arc::new(LexicalOracle), Arc::new(sink))
            .with_context(|| args.file.display().to_string())?;
    output::print_diagnostics(&args.file, &diagnostics);

    let compliance = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => tracing::debug!(target: "genesis::compliance", "{}", json),
                Err(e) => tracing::warn!(error = %e, "Compliance event not serializable"),
            }
        }
    });

    let mut reports = runtime.subscribe();
    let format = args.output;
    let printer = tokio::spawn(async move {
        loop {
            match reports.recv().await {
                Ok(report) => output::print_report(&report, format),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Cycle reports skipped")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let started = runtime.start(args.cycles);
    if started == 0 {
        tracing::warn!("No domain declares a Pulse; nothing to run");
    }

    if let Err(e) = kick_off(&runtime, &args).await {
        runtime.shutdown();
        runtime.join_all().await;
        return Err(e.into());
    }

    let handles: Vec<DomainHandle> = runtime.handles().cloned().collect();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping domains");
            for handle in &handles {
                handle.stop();
            }
        }
    });

    let violations = runtime.join_all().await;
    interrupt.abort();
    let metrics = args.metrics.then(|| runtime.metrics());

    // Closing the session closes the report and compliance channels
    drop(runtime);
    let _ = printer.await;
    let _ = compliance.await;
    if let Some(metrics) = &metrics {
        output::print_metrics(metrics, format);
    }

    let Some(first) = violations.first() else {
        return Ok(ExitCode::SUCCESS);
    };
    for violation in &violations {
        output::print_violation(violation);
    }
    let code = GenesisError::from(first.clone()).exit_code();
    Ok(ExitCode::from(code as u8))
}

/// Triggers and decrees requested on the command line
async fn kick_off(runtime: &Runtime, args: &RunArgs) -> Result<(), GenesisError> {
    for domain in &args.trigger {
        runtime.trigger(domain)?;
    }
    for decree in &args.enact {
        for outcome in runtime.enact_decree(decree).await? {
            output::print_decree(&outcome, args.output);
        }
    }
    Ok(())
}

/// `genesis check`
pub fn check(file: &Path) -> anyhow::Result<ExitCode> {
    let source = read_source(file)?;
    let (registry, diagnostics) =
        compile(&source).with_context(|| file.display().to_string())?;
    output::print_diagnostics(file, &diagnostics);
    output::print_summary(file, &registry);
    Ok(ExitCode::SUCCESS)
}

/// `genesis fmt`
pub fn fmt(file: &Path) -> anyhow::Result<ExitCode> {
    let source = read_source(file)?;
    let parsed = parse_source(&source)
        .map_err(GenesisError::from)
        .with_context(|| file.display().to_string())?;
    print!("{}", parsed.program);
    Ok(ExitCode::SUCCESS)
}
