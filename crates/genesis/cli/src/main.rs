//! Genesis CLI
//!
//! - `run`: bind a program and drive every domain's pulse
//! - `check`: lex, parse and bind only, reporting diagnostics
//! - `fmt`: print the canonical form of a program

use clap::{Parser, Subcommand};
use genesis_engine::{GenesisError, RuntimeConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod output;

use commands::RunArgs;
use output::OutputFormat;

/// Genesis command-line runner
#[derive(Parser)]
#[command(name = "genesis")]
#[command(about = "Genesis - run resonance-gated decision programs", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "GENESIS_CONFIG", global = true)]
    config: Option<String>,

    /// Log level, overriding the configuration file
    #[arg(long, env = "GENESIS_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "GENESIS_LOG_JSON", global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bind a program and drive every domain until Ctrl-C
    Run {
        /// Program source
        file: PathBuf,

        /// Enact a decree once the domains are running (repeatable)
        #[arg(long, value_name = "DECREE")]
        enact: Vec<String>,

        /// Wake an OnDemand domain once it is running (repeatable)
        #[arg(long, value_name = "DOMAIN")]
        trigger: Vec<String>,

        /// Stop each domain after this many cycles
        #[arg(long, value_name = "N")]
        cycles: Option<u64>,

        /// Cycle report format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,

        /// Print session metrics once every domain has stopped
        #[arg(long)]
        metrics: bool,
    },

    /// Lex, parse and bind a program without running it
    Check {
        /// Program source
        file: PathBuf,
    },

    /// Print the canonical form of a program
    Fmt {
        /// Program source
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match RuntimeConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return output::fail(&anyhow::Error::from(GenesisError::from(e))),
    };

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    init_tracing(&level, cli.json || config.logging.json);

    let result = match cli.command {
        Commands::Run {
            file,
            enact,
            trigger,
            cycles,
            output,
            metrics,
        } => {
            let args = RunArgs {
                file,
                enact,
                trigger,
                cycles,
                output,
                metrics,
            };
            commands::run(args, config).await
        }
        Commands::Check { file } => commands::check(&file),
        Commands::Fmt { file } => commands::fmt(&file),
    };

    match result {
        Ok(code) => code,
        Err(e) => output::fail(&e),
    }
}

/// Logs go to stderr; stdout carries reports and formatted source
fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
