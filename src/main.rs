//! Command-line driver for the Parley connection core.
//!
//! - `parley settings` prints the effective settings
//! - `parley simulate <script.json>` replays a scripted session against the
//!   in-memory transport and prints a JSON summary

#![deny(unsafe_code)]

mod simulation;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parley_settings::ParleySettings;

#[derive(Debug, Parser)]
#[command(
    name = "parley",
    version,
    about = "Connection-resilience and receive core for the Parley client"
)]
struct Args {
    /// Settings file to load instead of `~/.parley/settings.json`.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log filter; overrides `logging.level` from settings. `RUST_LOG` wins over both.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the effective settings as JSON.
    Settings,
    /// Replay a scripted session and print a JSON summary.
    Simulate {
        /// Script file.
        script: PathBuf,

        /// Write the summary here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = load_settings(&args)?;

    let level = args.log_level.as_deref().unwrap_or(&settings.logging.level);
    if args.json_logs {
        parley_telemetry::init_json_subscriber(level);
    } else {
        parley_telemetry::init_subscriber(level);
    }

    match args.command {
        Command::Settings => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Command::Simulate { script, output } => {
            let script = simulation::load_script(&script)?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .start_paused(true)
                .build()
                .context("failed to build runtime")?;
            let summary = runtime.block_on(simulation::run(script, &settings))?;
            let encoded = serde_json::to_string_pretty(&summary)?;

            if let Some(path) = output {
                std::fs::write(&path, &encoded)
                    .with_context(|| format!("failed to write summary: {}", path.display()))?;
                println!("{}", path.display());
            } else {
                println!("{encoded}");
            }
        }
    }
    Ok(())
}

fn load_settings(args: &Args) -> Result<ParleySettings> {
    let settings = match &args.settings {
        Some(path) => parley_settings::load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => parley_settings::load_settings().context("failed to load settings")?,
    };
    Ok(settings)
}
