//! `station`: plan, move, align and run bonding cycles on the simulated cell.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use station_bin::tracing_init::{self, TracingConfig};
use station_bin::StationApp;
use station_core::{CancelToken, CommandResult, DeviceId};
use station_hardware::load_station_config;
use std::path::PathBuf;
use tracing::{info, warn};

#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "station", version, about = "Assembly station motion and alignment")]
struct Cli {
    /// Station configuration file
    #[arg(long, short, default_value = "config/station.toml")]
    config: PathBuf,

    /// Log source file and line
    #[arg(long)]
    log_locations: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the path a device would take to a named position
    Plan {
        /// Device id, e.g. hex-left or gantry
        device: DeviceId,
        /// Named target position
        target: String,
    },
    /// Move a device to a named position
    Move {
        /// Device id
        device: DeviceId,
        /// Named target position
        target: String,
    },
    /// Peak search from the device's current pose
    Scan {
        /// Device id
        device: DeviceId,
        /// Move to this named position first
        #[arg(long)]
        from: Option<String>,
        /// Record directory, overriding `[storage] root`
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run the full bonding cycle on the sample station
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_station_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let tracing_config = TracingConfig::from_logging(&config.logging)
        .map_err(|e| anyhow!(e))?
        .with_file_and_line(cli.log_locations);
    tracing_init::init(&tracing_config).map_err(|e| anyhow!(e))?;

    let app = StationApp::from_config(config).await?;

    let token = CancelToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    match cli.command {
        Commands::Plan { device, target } => {
            let analysis = app.plan(device, &target).await;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
            if !analysis.is_valid {
                std::process::exit(1);
            }
        }
        Commands::Move { device, target } => {
            let result = app.move_to(device, &target, &token).await;
            report(&result)?;
        }
        Commands::Scan {
            device,
            from,
            output,
        } => {
            if let Some(start) = from {
                report(&app.move_to(device, &start, &token).await)?;
            }
            let (result, outcome) = app.scan(device, output.as_deref(), &token).await?;
            if let Some(outcome) = outcome {
                info!(record = %outcome.record_path.display(), "Scan record written");
                println!("{}", serde_json::to_string_pretty(&outcome.statistics)?);
            }
            report(&result)?;
        }
        Commands::Demo => {
            let result = app.demo(&token).await?;
            report(&result)?;
        }
    }

    Ok(())
}

fn report(result: &CommandResult) -> Result<()> {
    if result.success {
        println!(
            "{} ({:.3}s)",
            result.message,
            result.execution_time.as_secs_f64()
        );
        Ok(())
    } else {
        Err(anyhow!("{}", result.message))
    }
}
