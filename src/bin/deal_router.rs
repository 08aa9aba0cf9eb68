//! Command-line entry point for the deal router.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deal_router::RouterConfig;
use deal_router::application::services::{
    AssignmentEngine, EligibilityFilter, ExpirySweep, FallbackRouter, OperationAssigner,
    PeriodicRunner, PeriodicTask, PriorityRankingUpdater, TrafficClassifier,
};
use deal_router::domain::services::PartnerPerformanceTracker;
use deal_router::infrastructure::notifications::TracingNotifier;
use deal_router::infrastructure::partners::HttpPartnerClient;
use deal_router::infrastructure::persistence::{PostgresIntegrationLog, PostgresStore};
use deal_router::infrastructure::telemetry::init_tracing;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "deal-router", version, about = "Routes deals and payouts to handlers")]
struct Cli {
    /// Configuration file (extension optional).
    #[arg(short, long, env = "ROUTER_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the assignment, expiry and ranking loops until interrupted.
    Run,
    /// Run a single assignment tick and print its report.
    Tick,
    /// Recompute partner priorities once.
    Rank,
    /// Expire overdue operations once.
    Expire,
    /// Validate and print the effective configuration.
    CheckConfig,
}

struct Services {
    engine: AssignmentEngine,
    ranking: PriorityRankingUpdater,
    expiry: ExpirySweep,
}

async fn build(config: &RouterConfig) -> Result<Services> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("failed to connect to database")?;

    let store = Arc::new(PostgresStore::new(pool.clone()));
    let log = Arc::new(PostgresIntegrationLog::new(pool));
    let tracker = PartnerPerformanceTracker::new(log, config.ranking.window_hours);
    let assigner = OperationAssigner::new(store.clone(), store.clone());
    let filter = EligibilityFilter::new(
        store.clone(),
        store.clone(),
        store.clone(),
        TrafficClassifier::new(store.clone()),
    );

    let mut engine = AssignmentEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        filter,
        assigner.clone(),
        Arc::new(TracingNotifier),
    );
    if config.fallback.enabled {
        let client = HttpPartnerClient::new().context("failed to build partner HTTP client")?;
        let router = FallbackRouter::new(
            store.clone(),
            assigner.clone(),
            Arc::new(client),
            tracker.clone(),
        )
        .with_default_timeout(config.fallback.default_timeout());
        engine = engine.with_fallback(router);
    }

    Ok(Services {
        engine,
        ranking: PriorityRankingUpdater::new(store, tracker),
        expiry: ExpirySweep::new(assigner),
    })
}

async fn run(config: &RouterConfig, services: Services) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runners = [
        PeriodicRunner::new(Arc::new(services.engine), config.assignment.tick_interval()),
        PeriodicRunner::new(Arc::new(services.expiry), config.assignment.expiry_interval()),
        PeriodicRunner::new(Arc::new(services.ranking), config.ranking.interval()),
    ];
    let handles: Vec<_> = runners
        .into_iter()
        .map(|r| r.spawn(shutdown_rx.clone()))
        .collect();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    shutdown_tx.send(true).context("all runners already stopped")?;
    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Runner task failed");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = RouterConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    init_tracing(&config.logging);

    match cli.command {
        Command::CheckConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Run => {
            let services = build(&config).await?;
            info!(fallback = services.engine.has_fallback(), "deal-router starting");
            run(&config, services).await?;
            info!("deal-router stopped");
        }
        Command::Tick => {
            let services = build(&config).await?;
            let report = services.engine.tick().await?;
            println!("{report}");
        }
        Command::Rank => {
            let services = build(&config).await?;
            services.ranking.run_once().await?;
        }
        Command::Expire => {
            let services = build(&config).await?;
            services.expiry.run_once().await?;
        }
    }
    Ok(())
}
