//! fleetrun CLI - on-device test orchestration for Android device fleets.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use fleetrun::channel::AdbChannel;
use fleetrun::config::{self, ConfigPlan};
use fleetrun::fleet::Fleet;
use fleetrun::orchestrator::Orchestrator;

#[derive(Parser)]
#[command(name = "fleetrun")]
#[command(about = "On-device test orchestration for Android device fleets", long_about = None)]
#[command(version)]
struct Cli {
    /// Run-plan file path
    #[arg(short, long, default_value = "fleetrun.toml")]
    config: PathBuf,

    /// Verbose output (shows PASS lines and device commands)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured on-device tests
    Run {
        /// Override the minimum SDK version from the run plan
        #[arg(long)]
        min_sdk: Option<u32>,
    },

    /// List discovered devices and their capabilities
    Devices {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Validate the run-plan file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run { min_sdk } => run_tests(&cli.config, min_sdk).await,
        Commands::Devices { format } => list_devices(&format).await,
        Commands::Validate => validate_config(&cli.config),
    }
}

async fn run_tests(config_path: &Path, min_sdk: Option<u32>) -> Result<()> {
    let config = config::load_config(config_path)?;

    let min_sdk_version = min_sdk.unwrap_or(config.project.min_sdk_version);
    let orchestrator = Orchestrator::new(config.project.name.clone(), min_sdk_version)
        .with_base_dir(config.project.base_dir.clone());

    info!(
        project = %config.project.name,
        min_sdk_version,
        "loaded run plan from {}",
        config_path.display()
    );

    let fleet = Fleet::new(Arc::new(AdbChannel::new()));
    let plan = ConfigPlan::new(config);

    let report = orchestrator
        .run(&fleet, &plan)
        .await
        .context("test run failed")?;

    info!(
        tests = report.results.len(),
        warnings = report.warnings.len(),
        "all on-device tests passed"
    );
    Ok(())
}

async fn list_devices(format: &str) -> Result<()> {
    let fleet = Fleet::new(Arc::new(AdbChannel::new()));
    let devices = fleet.devices().await;

    match format {
        "json" => {
            let mut entries = Vec::new();
            for device in devices {
                entries.push(serde_json::json!({
                    "serial": device.serial(),
                    "sdk_version": device.version().await,
                    "abis": device
                        .abis()
                        .await
                        .iter()
                        .map(|abi| abi.abi_name())
                        .collect::<Vec<_>>(),
                }));
            }
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        "text" => {
            if devices.is_empty() {
                println!("No devices attached");
            }
            for device in devices {
                let abis = device
                    .abis()
                    .await
                    .iter()
                    .map(|abi| abi.abi_name())
                    .collect::<Vec<_>>()
                    .join(",");
                println!("{}\tsdk {}\t{}", device.serial(), device.version().await, abis);
            }
        }
        other => bail!("unknown format: {other}"),
    }

    Ok(())
}

fn validate_config(config_path: &Path) -> Result<()> {
    let config = config::load_config(config_path)?;
    println!(
        "Run plan valid: project '{}', {} push(es), {} test(s)",
        config.project.name,
        config.pushes.len(),
        config.tests.len()
    );
    Ok(())
}
