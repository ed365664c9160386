use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

use portico::admin::AdminContext;
use portico::config::Config;
use portico::{
    monitoring, FallbackCache, GatewayForwarder, GatewayHandler, GatewayServer, HealthRegistry,
    HttpHealthProbe, QueueMetrics, QueueStore, RedisQueueStore, Router, UpstreamClient, Worker,
};

#[derive(Parser)]
#[command(name = "portico")]
#[command(about = "API gateway with health-gated forwarding and store-and-forward queueing")]
struct Args {
    /// Optional TOML configuration file; environment variables otherwise
    #[arg(short, long)]
    config: Option<String>,

    #[arg(short, long)]
    bind: Option<SocketAddr>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("portico={}", level))
        .init();

    info!("Starting portico gateway");

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file_with_env(path).await?,
        None => Config::from_env()?,
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    monitoring::start(&config.monitoring)?;

    // Composition root: one instance of each collaborator, passed down
    let services = Arc::new(config.services.clone());
    let store: Arc<dyn QueueStore> = Arc::new(RedisQueueStore::new(config.queue.redis_urls()));
    if !store.ping().await {
        warn!(
            "Queue backend unreachable at startup; mutating requests will fall back to the cache until it returns"
        );
    }

    let probe = Arc::new(HttpHealthProbe::new(&config.health));
    let registry = Arc::new(HealthRegistry::new(
        Arc::clone(&services),
        probe,
        config.health.ttl_secs,
    ));

    let queue_metrics = Arc::new(QueueMetrics::new());
    let fallback = FallbackCache::new();
    let client = UpstreamClient::new(config.server.forward_timeout_secs());

    let gateway_worker = Arc::new(Worker::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        client.clone(),
        Arc::clone(&queue_metrics),
        fallback.clone(),
        config.queue.clone(),
    ));

    let forwarder = Arc::new(GatewayForwarder::new(
        Arc::clone(&registry),
        Arc::clone(&store),
        fallback,
        client,
        config.queue.clone(),
    ));

    let admin_context = Arc::new(AdminContext {
        store,
        worker: Arc::clone(&gateway_worker),
        metrics: queue_metrics,
        health: registry,
    });

    let handler = GatewayHandler::new(Router::new(services), forwarder, admin_context);

    // Background drain loop, cancellable at cycle boundaries
    let (shutdown_tx, _) = broadcast::channel(1);
    let worker_handle = tokio::spawn(Arc::clone(&gateway_worker).run(shutdown_tx.subscribe()));

    let server = GatewayServer::new(config.server.bind);

    let shutdown_signal = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        warn!("Received CTRL+C, shutting down gracefully...");
    };

    tokio::select! {
        result = server.run(handler) => {
            if let Err(e) = result {
                tracing::error!("Gateway server error: {}", e);
            }
        }
        _ = shutdown_signal => {
            info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(());
    let _ = worker_handle.await;

    info!("Portico shutdown complete");
    Ok(())
}
