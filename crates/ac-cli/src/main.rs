//! autoclipper
//!
//! Records gameplay demos unattended: launches the game with a managed
//! config, loads each demo over RCON, captures it with OBS, and
//! restores the user's setup when the queue is done.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ac_core::config::{self, AppConfig};
use ac_core::discover;
use ac_core::models::DemoFileInfo;
use ac_recorder::obs_ws::ObsWebSocketService;
use ac_recorder::srcon::SourceRconTransport;
use ac_recorder::{DemoRecorder, GameLauncher, ObsController, RconClient};

#[derive(Parser)]
#[command(name = "autoclipper")]
#[command(about = "Unattended TF2 demo recording through RCON and OBS")]
#[command(version)]
struct Args {
    /// Demo files or directories to record, semicolon-separated
    #[arg(short, long, required = true)]
    input: String,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("autoclipper starting...");

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                AppConfig::default()
            })
        } else {
            tracing::info!("Using default configuration");
            AppConfig::default()
        }
    };

    if config.game.exe_path.as_os_str().is_empty() {
        anyhow::bail!("No game executable configured; set [game] exe_path in the config file");
    }

    // The game must come up with the RCON password we will connect with
    config.game.args = format!(
        "{} +rcon_password {}",
        config.game.args, config.rcon.password
    );

    // Build the demo queue
    let demos = collect_demos(&args.input)?;
    if demos.is_empty() {
        anyhow::bail!("No demo files found for input {:?}", args.input);
    }
    tracing::info!("Queued {} demo(s)", demos.len());
    for demo in &demos {
        tracing::debug!("  {}", demo.demo_path.display());
    }

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Setup Ctrl-C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, stopping after cleanup...");
            cancel_clone.cancel();
        }
    });

    // Wire the recorder to the real transports
    let rcon = RconClient::new(
        Box::new(SourceRconTransport::new()),
        config.timeouts.clone(),
    );
    let obs = ObsController::new(Box::new(ObsWebSocketService::new()));
    let launcher = GameLauncher::new();
    let recorder = DemoRecorder::new(config, rcon, obs, launcher);

    recorder.record_demos(demos, &cancel).await?;

    tracing::info!("All demos recorded");
    Ok(())
}

/// Resolve the semicolon-separated input list into work items.
///
/// Each entry is either a demo file or a directory to scan for `.dem`
/// files.
fn collect_demos(input: &str) -> Result<Vec<DemoFileInfo>> {
    let mut demos = Vec::new();
    for entry in input.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let path = Path::new(entry);
        if path.is_dir() {
            let found = discover::discover_demos(path, false)
                .with_context(|| format!("Failed to scan {entry:?} for demos"))?;
            if found.is_empty() {
                tracing::warn!("No demo files in {entry:?}");
            }
            demos.extend(found);
        } else {
            demos.push(
                discover::demo_file_info_from_path(path, None)
                    .with_context(|| format!("Failed to load demo {entry:?}"))?,
            );
        }
    }
    Ok(demos)
}
