//! NetAssist Server
//!
//! Main entry point for the chat fulfillment webhook.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use netassist::{
    refresh::{run_refresh_loop, RefreshPipeline},
    webhook::{create_router, AppState},
    ActionRegistry, ActionServices, AppConfig, HttpManagementApi, InMemoryKvStore, KvMirror,
    ManagementApi, ResolutionOrchestrator, RetryExecutor, RetryPolicy, SnapshotStore,
    UpstreamThrottle, WebhookService,
};

#[derive(Parser, Debug)]
#[command(name = "netassist", about = "Chat assistant fulfillment webhook")]
struct Args {
    /// YAML configuration file; defaults apply when omitted
    #[arg(short, long, env = "NETASSIST_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "netassist=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting NetAssist server");

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    tracing::info!(
        addr = %config.server.addr,
        upstream = %config.upstream.base_url,
        refresh_interval = config.refresh.interval_secs,
        calls_per_second = config.throttle.calls_per_second,
        "Configuration loaded"
    );

    // One throttle shared by refreshes and actions
    let throttle = Arc::new(UpstreamThrottle::from_config(&config.throttle));
    let executor = RetryExecutor::new(RetryPolicy::from(&config.retry), throttle);
    let api: Arc<dyn ManagementApi> =
        Arc::new(HttpManagementApi::new(&config.upstream).context("Failed to build API client")?);

    let kv = Arc::new(InMemoryKvStore::new());
    let store = Arc::new(SnapshotStore::new().with_mirror(KvMirror::new(kv)));
    let pipeline = Arc::new(RefreshPipeline::new(api.clone(), executor.clone(), store.clone()));

    tracing::info!("Performing synchronous initial refresh");
    let stats = pipeline
        .initial_refresh()
        .await
        .context("Initial snapshot refresh failed")?;
    tracing::info!(
        organizations = stats.organizations,
        networks = stats.networks,
        devices = stats.devices,
        admins = stats.admins,
        "Initial refresh complete"
    );

    // Start background refresh loop
    tokio::spawn(run_refresh_loop(pipeline, config.refresh.interval()));

    let registry = ActionRegistry::with_defaults();
    registry
        .validate()
        .map_err(|missing| anyhow!("Actions without a handler: {missing:?}"))?;

    let orchestrator = Arc::new(ResolutionOrchestrator::new(
        store,
        config.resolution.display_limit,
    ));
    let services = ActionServices::new(orchestrator, api, executor);
    let webhook = WebhookService::new(Arc::new(registry), services, config.sources.clone());
    let app = create_router(AppState::new(Arc::new(webhook)));

    let listener = tokio::net::TcpListener::bind(config.server.addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.addr))?;
    tracing::info!(addr = %config.server.addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
