use anyhow::{Context, Result};
use clap::Parser;
use serde::{de::DeserializeOwned, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use wager_guard::alerts::{LogNotifier, Notifier, WebhookNotifier};
use wager_guard::api::{self, AppState, SimulateRequest, StakeRequest};
use wager_guard::config::{Command, Config, ServeArgs};
use wager_guard::db::models::OddsQuote;
use wager_guard::db::SqliteStore;
use wager_guard::drift::DriftMonitor;
use wager_guard::odds::OddsAggregator;
use wager_guard::risk::RiskSimulator;
use wager_guard::staking::StakeOptimizer;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    config.validate()?;

    let optimizer = StakeOptimizer::new(config.stake_config());
    let simulator = RiskSimulator::new(config.simulation_config());

    match &config.command {
        Command::Serve(args) => serve(&config, args, optimizer, simulator).await,
        Command::Stake { input } => {
            let req: StakeRequest = read_json(input)?;
            print_json(&req.evaluate(&optimizer, config.staking.risk_profile)?)
        }
        Command::Simulate { input } => {
            let req: SimulateRequest = read_json(input)?;
            let result = tokio::task::spawn_blocking(move || req.evaluate(&simulator)).await??;
            print_json(&result)
        }
        Command::Aggregate { input } => {
            let quotes: Vec<OddsQuote> = read_json(input)?;
            print_json(&OddsAggregator::default().aggregate(&quotes)?)
        }
    }
}

async fn serve(
    config: &Config,
    args: &ServeArgs,
    optimizer: StakeOptimizer,
    simulator: RiskSimulator,
) -> Result<()> {
    // Open database
    let store = SqliteStore::open(&args.database_path)?;
    info!("Database opened: {}", args.database_path);

    let notifier: Arc<dyn Notifier> = match &args.alert_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url)?),
        None => Arc::new(LogNotifier),
    };
    let monitor = DriftMonitor::restore(args.drift_config(), Arc::new(store))?
        .with_notifier(notifier);

    let state = AppState {
        optimizer,
        simulator,
        aggregator: OddsAggregator::default(),
        monitor: Arc::new(monitor),
        default_profile: config.staking.risk_profile,
    };
    let app = api::router(state);
    let addr: SocketAddr = args.listen_addr.parse()?;
    info!("API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run API server (blocks until shutdown)
    axum::serve(listener, app).await?;

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
