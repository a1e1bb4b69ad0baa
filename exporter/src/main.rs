// exporter/src/main.rs

//! Exporter binary.
//!
//! Tails the node's log families and serves the resulting metrics:
//!
//! - `proposals`: replica command logs, counted per proposer,
//! - `blocks`: block-time logs, latest height and apply duration,
//! - `consensus` (validators only): jailed status per validator.
//!
//! Metrics are exposed in Prometheus format on `/metrics`.

use std::sync::Arc;

use tokio::signal;

use monitor::{
    AgentConfig, CancellationToken, HttpValidatorDirectory, MetricsRegistry, MetricsSink,
    PipelineSupervisor, ValidatorRefresher, ValidatorResolver,
    run_prometheus_http_server,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "exporter=info,monitor=info".to_string()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let cfg = AgentConfig::from_env().map_err(|e| format!("invalid configuration: {e}"))?;
    tracing::info!(
        node_home = %cfg.node_home.display(),
        is_validator = cfg.is_validator,
        "starting exporter"
    );

    // ---------------------------
    // Metrics
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new()
            .map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );
    let sink: Arc<dyn MetricsSink> = metrics.clone();

    let shutdown = CancellationToken::new();

    let addr = cfg.metrics.listen_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("failed to bind metrics listener on {addr}: {e}"))?;
    let server_metrics = metrics.clone();
    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = run_prometheus_http_server(server_metrics, listener, server_shutdown).await
        {
            tracing::error!("metrics HTTP server error: {e}");
        }
    });
    tracing::info!("metrics exporter listening on http://{}/metrics", addr);

    // ---------------------------
    // Validator resolver
    // ---------------------------

    let resolver = Arc::new(ValidatorResolver::new());

    // The blocking HTTP client must be built and dropped off the runtime.
    let resolver_cfg = cfg.resolver.clone();
    let (refresh_resolver, refresh_sink, refresh_shutdown) =
        (resolver.clone(), sink.clone(), shutdown.clone());
    tokio::task::spawn_blocking(move || {
        let directory = HttpValidatorDirectory::new(resolver_cfg.url, resolver_cfg.timeout)
            .map_err(|e| format!("failed to create validator directory client: {e}"))?;
        ValidatorRefresher::new(
            directory,
            refresh_resolver,
            refresh_sink,
            resolver_cfg.refresh_interval,
        )
        .spawn(refresh_shutdown)
        .map(drop)
        .map_err(|e| format!("failed to spawn validator refresher: {e}"))
    })
    .await
    .map_err(|e| format!("validator refresher setup panicked: {e}"))??;

    // ---------------------------
    // Log pipelines
    // ---------------------------

    let supervisor =
        PipelineSupervisor::new(sink, shutdown.clone()).with_restart_delay(cfg.restart_delay);
    let pipelines = supervisor.launch_all(cfg.log_families(resolver));
    if pipelines.is_empty() {
        return Err("no log pipeline could be started".to_string());
    }

    shutdown_signal().await;
    shutdown.cancel();

    tokio::task::spawn_blocking(move || {
        for pipeline in pipelines {
            let (family, restarts) = (pipeline.family(), pipeline.restarts());
            pipeline.join();
            tracing::info!(family, restarts, "pipeline joined");
        }
    })
    .await
    .map_err(|e| format!("failed to join log pipelines: {e}"))?;
    let _ = server.await;
    tracing::info!("exporter stopped");

    Ok(())
}

/// Waits for Ctrl-C and returns, used for graceful shutdown.
async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
