//! fprint-verify - Fingerprint verification against fprintd
//!
//! Claims the scanner, asks the user to scan, retries non-matching scans up
//! to the configured bound and exits 0 only on a match.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fprint_cli::{effective_config, init_config, report, verify, ConfigOverrides};
use fprint_core::VerifyConfig;
use fprint_dbus::DbusDevice;

/// Fingerprint verification against the fprintd service
#[derive(Parser)]
#[command(name = "fprint-verify")]
#[command(about = "Verify the local user's fingerprint via fprintd")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the config file (default: $FPRINT_VERIFY_CONFIG or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a verification session (default)
    Verify,

    /// Configuration helpers
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as JSON
    Show,

    /// Write the effective configuration to the config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(cli.verbose).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("An error occurred: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let config_path = cli.config.unwrap_or_else(VerifyConfig::default_path);
    debug!("Using config path {:?}", config_path);

    let config = effective_config(&config_path, &cli.overrides)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    match cli.command.unwrap_or(Commands::Verify) {
        Commands::Verify => {
            let device = DbusDevice::connect(&config)
                .await
                .context("Failed to connect to the fingerprint service")?;

            let shutdown = async {
                if tokio::signal::ctrl_c().await.is_err() {
                    // No signal handler; never cancel
                    std::future::pending::<()>().await;
                }
            };

            let outcome = verify(Arc::new(device), &config, shutdown).await;
            if let Ok(verified) = &outcome {
                info!(
                    "Matched after {} failed attempts in {} cycles",
                    verified.attempts, verified.cycles
                );
            }

            for line in report::outcome_lines(&outcome) {
                println!("{}", line);
            }
            Ok(report::exit_code(&outcome))
        }

        Commands::Config(ConfigCommands::Show) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(0)
        }

        Commands::Config(ConfigCommands::Init { force }) => {
            init_config(&config_path, &config, force)?;
            println!("Wrote {}", config_path.display());
            Ok(0)
        }
    }
}

fn default_filter(verbose: u8) -> String {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    format!(
        "fprint_verify={level},fprint_cli={level},fprint_core={level},fprint_dbus={level}"
    )
}
