//! hivegate - load-balancing gateway for headless browser workers

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hivegate::{
    config::Args,
    discovery::FleetDiscovery,
    dispatch::Dispatcher,
    fleet::FleetRefresher,
    prober::PressureProber,
    registry::WorkerRegistry,
    schedule::Scheduler,
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("hivegate={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  hivegate - browser worker gateway");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Namespace: {}", args.kube_namespace);
    info!("Worker selector: {}", args.worker_selector);
    info!("Worker port: {} (probe: {})", args.worker_port, args.probe_port());
    info!("Registry: {}", args.redis_url);
    info!(
        "Registry TTL: {}s, refresh every {}s, probe fan-out {}",
        args.registry_ttl_secs, args.refresh_interval_secs, args.probe_concurrency
    );
    info!(
        "Auth: {}",
        if args.token.is_some() { "token required" } else { "DISABLED" }
    );
    info!("======================================");

    // The shared registry is the source of truth for fleet state; without
    // it the gateway can neither dispatch nor report pressure.
    let registry = match WorkerRegistry::connect(
        &args.redis_url,
        &args.registry_prefix,
        &args.kube_namespace,
        args.registry_ttl(),
    )
    .await
    {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("Registry connection failed: {}", e);
            std::process::exit(1);
        }
    };
    info!("Registry connected");

    // Control-plane client. Listing failures later are per-cycle and
    // retried; only missing cluster credentials are fatal here.
    let discovery = match FleetDiscovery::new(&args.kube_namespace, &args.worker_selector).await {
        Ok(discovery) => discovery,
        Err(e) => {
            error!("Fleet discovery init failed: {}", e);
            std::process::exit(1);
        }
    };

    let prober = PressureProber::new(
        Arc::clone(&registry),
        args.probe_port(),
        args.token.clone(),
        args.probe_concurrency,
        args.probe_timeout(),
    )?;

    let refresher = Arc::new(FleetRefresher::new(discovery, prober, Arc::clone(&registry)));

    // Explicit job table - the single source of truth for recurring work.
    let mut scheduler = Scheduler::new();
    {
        let refresher = Arc::clone(&refresher);
        scheduler.register(
            "refresh-worker-records",
            args.refresh_interval(),
            Arc::new(move || {
                let refresher = Arc::clone(&refresher);
                Box::pin(async move { refresher.refresh().await })
            }),
        );
    }
    scheduler.start();

    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry)));
    let scheduler = Arc::new(scheduler);

    let state = Arc::new(AppState::new(args, registry, dispatcher, scheduler));

    server::run(state).await?;

    Ok(())
}
