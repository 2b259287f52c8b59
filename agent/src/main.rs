use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn, LevelFilter};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use agent::common::component::{Component, Options};
use agent::config::Config;
use agent::discover::discover::Discoverer;
use agent::discover::static_discovery::StaticDiscovery;
use agent::logging;
use agent::relabel::component::{Arguments, RelabelScriptComponent, COMPONENT_NAME};

/// Runs discovery and the relabel script on a fixed interval.
#[derive(Debug, Parser)]
#[command(name = "agent", version)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
    /// Stop after this many discovery cycles.
    #[arg(long)]
    cycles: Option<u64>,
    /// Overrides `log_level` from the configuration file.
    #[arg(long)]
    log_level: Option<LevelFilter>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("error loading config {}: {}", path.display(), err);
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };
    let level = match args.log_level.map(Ok).unwrap_or_else(|| config.level()) {
        Ok(level) => level,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = logging::init(level) {
        eprintln!("error initializing logging: {}", err);
        return ExitCode::FAILURE;
    }

    match run(config, args.cycles).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config, max_cycles: Option<u64>) -> anyhow::Result<()> {
    let discovery = StaticDiscovery::new(config.discovery.clone());
    let options = Options::new(COMPONENT_NAME).with_on_state_change(|exports| {
        for target in &exports.output {
            info!("target: {}", target);
        }
    });

    let targets = discovery.refresh().await?;
    let mut component = RelabelScriptComponent::new(
        options,
        Arguments {
            targets,
            ..config.relabel.clone()
        },
    )
    .await?;
    let input = component.input();
    let exports = component.exports_handle();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = tokio::spawn(async move { component.run(shutdown_rx).await });

    info!("agent started, refreshing every {:?}", config.refresh_interval);
    let mut ticker = interval(config.refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately and the initial cycle already ran.
    ticker.tick().await;

    let mut cycles = 1;
    while max_cycles.map_or(true, |max| cycles < max) {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            _ = ticker.tick() => {}
        }
        match discovery.refresh().await {
            Ok(targets) => {
                if input.send(targets).await.is_err() {
                    warn!("relabel component stopped accepting targets");
                    break;
                }
            }
            Err(err) => warn!("discovery failed, skipping cycle: {}", err),
        }
        cycles += 1;
    }

    drop(input);
    // Sending fails only when the component already exited.
    let _ = shutdown_tx.send(true);
    runner.await??;
    info!("agent stopped with {} targets", exports.load().output.len());
    Ok(())
}
