//! Engine Adapter - Connects UCI engines to the game and test servers.
//!
//! `run` plays a single game with one engine; `test` registers this device
//! with the test server and runs engine-vs-engine batches until the server
//! disconnects.

use anyhow::Context;
use clap::{Parser, Subcommand};
use engine_adapter::channel::{Observers, ProcessChannel};
use engine_adapter::config::AdapterConfig;
use engine_adapter::device::Device;
use engine_adapter::dispatcher::Dispatcher;
use engine_adapter::driver::Driver;
use engine_adapter::game_pair::BinaryLauncher;
use engine_adapter::resolver::{EngineResolver, Platform};
use engine_adapter::session::EngineSession;
use engine_adapter::test_runner::TestRunner;
use engine_com::play_flow::{Color, PlayFlow};
use engine_com::test_flow::{TestFlow, Version};
use engine_com::Client;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "engine-adapter")]
#[command(about = "Connects UCI engines to the game and test servers")]
struct Cli {
    /// Configuration file (defaults to adapter.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Play one game on the game server
    Run {
        /// Game identifier
        #[arg(long)]
        game: String,

        /// Color to play (white or black)
        #[arg(long)]
        color: Color,

        /// Engine executable to use directly
        #[arg(long, conflicts_with_all = ["engine", "version"])]
        path: Option<PathBuf>,

        /// Engine name in the engine store
        #[arg(long, requires = "version")]
        engine: Option<String>,

        /// Engine version, e.g. 1.2.0
        #[arg(long, requires = "engine")]
        version: Option<Version>,

        /// Known player id; checks in instead of registering
        #[arg(long)]
        player: Option<String>,
    },
    /// Run test batches for the test server
    Test,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = AdapterConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    tracing::debug!("Config: {:?}", config);

    match cli.command {
        Mode::Run {
            game,
            color,
            path,
            engine,
            version,
            player,
        } => {
            let path = match (path, engine, version) {
                (Some(path), _, _) => path,
                (None, Some(engine), Some(version)) => {
                    let platform = Platform::from_hardware(&Device::collect().hardware);
                    EngineResolver::new(&config.engine_store, platform)
                        .resolve(&engine, version)
                        .with_context(|| format!("Cannot find {} {}", engine, version))?
                }
                _ => anyhow::bail!("Either --path or --engine with --version is required"),
            };
            play(&config, path, game, color, player).await
        }
        Mode::Test => test(&config).await,
    }
}

async fn play(
    config: &AdapterConfig,
    path: PathBuf,
    game: String,
    color: Color,
    player: Option<String>,
) -> anyhow::Result<()> {
    tracing::info!("Starting engine {:?}", path);
    let channel = ProcessChannel::spawn(&path, Observers::none())?;
    let session = EngineSession::new(channel).with_timeout(config.engine_timeout());

    let url = config.game.url();
    tracing::info!("Connecting to game server at {}", url);
    let client = Client::connect(&url, PlayFlow::new())
        .await
        .with_context(|| format!("Cannot reach game server at {}", url))?;

    let mut driver = Driver::new(client, session, game, color);
    if let Some(player) = player {
        driver = driver.with_player(player);
    }

    let outcome = driver.run().await?;
    if outcome.finished {
        tracing::info!(
            "Winner: {}, reason: {}",
            outcome.winner.as_deref().unwrap_or("none"),
            outcome.reason.as_deref().unwrap_or("unknown")
        );
    } else {
        tracing::warn!("Game did not finish ({} plies played)", outcome.moves.len());
    }
    Ok(())
}

async fn test(config: &AdapterConfig) -> anyhow::Result<()> {
    let mut device = Device::collect();
    if let Some(name) = &config.device_name {
        device.name = name.clone();
    }
    tracing::info!("Device {} ({})", device.name, device.id);

    let url = config.test.url();
    tracing::info!("Connecting to test server at {}", url);
    let client = Client::connect(&url, TestFlow::new())
        .await
        .with_context(|| format!("Cannot reach test server at {}", url))?;

    let resolver = EngineResolver::new(
        &config.engine_store,
        Platform::from_hardware(&device.hardware),
    );
    let dispatcher =
        Dispatcher::new(Arc::new(BinaryLauncher)).with_timeout(config.engine_timeout());

    if let Err(e) = TestRunner::new(client, resolver, dispatcher, device).run().await {
        tracing::error!("Test run failed: {}", e);
        return Err(e.into());
    }
    tracing::info!("Test server done, shutting down");
    Ok(())
}
