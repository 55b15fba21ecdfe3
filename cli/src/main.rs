mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use netrunner_core::{build_deployments, NetworkOrchestrator, NetworkState};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::RunnerConfig;

#[derive(Parser, Debug)]
#[command(name = "netrunner")]
#[command(about = "Provision and supervise AVAGO test networks", long_about = None)]
struct Args {
    /// Log level
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the deployment descriptors of a network without submitting anything
    Render {
        /// Network config file
        #[arg(long, short, env = "NETRUNNER_CONFIG")]
        config: PathBuf,
    },
    /// Start a network and keep it running until Ctrl-C
    Start {
        /// Network config file
        #[arg(long, short, env = "NETRUNNER_CONFIG")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Render { config } => render(&config),
        Command::Start { config } => start(&config).await,
    }
}

fn load(path: &Path) -> Result<(RunnerConfig, netrunner_core::NetworkConfig)> {
    let cfg = RunnerConfig::load(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let network = cfg.to_network(base_dir)?;
    Ok((cfg, network))
}

fn render(path: &Path) -> Result<()> {
    let (cfg, network) = load(path)?;

    let deployments = build_deployments(&network, cfg.backend.kind())
        .context("Invalid network configuration")?;
    let descriptors: Vec<_> = deployments.iter().collect();

    println!("{}", serde_json::to_string_pretty(&descriptors)?);
    Ok(())
}

async fn start(path: &Path) -> Result<()> {
    let (cfg, network) = load(path)?;

    info!(
        "Starting {} node(s) on the {} backend",
        network.node_configs.len(),
        cfg.backend.kind()
    );

    let backend = cfg.backend.into_backend().context("Failed to initialize backend")?;
    let mut orchestrator = NetworkOrchestrator::new(network, backend, cfg.orchestrator);

    if let Err(e) = orchestrator.start().await {
        if orchestrator.state() == NetworkState::Degraded {
            warn!("Network started degraded: {}", e);
        } else {
            error!("Network failed to start: {}", e);
            if let Err(teardown) = orchestrator.stop().await {
                error!("Cleanup after failed start: {}", teardown);
            }
            return Err(e.into());
        }
    }

    for node in orchestrator.submitted_nodes() {
        info!("  {} api={} staking={}", node.name, node.api_url, node.staking_address);
    }
    info!("Network is running, press Ctrl-C to tear it down");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down network");
    orchestrator.stop().await?;
    info!("Network stopped");
    Ok(())
}
