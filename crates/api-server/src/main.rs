//! Rightsizing API server
//!
//! Wires the metric store, the inference service and the in-process
//! forecast queue together, keeps the cluster summary warm and serves
//! health and metrics endpoints.

use anyhow::Result;
use rightsizing_lib::{
    aggregation::AggregationEngine,
    cache::SharedCache,
    health::{components, HealthRegistry},
    inference::GrpcInferenceClient,
    jobs::{
        JobDeduplicator, LocalTaskQueue, PodForecastTask, VmForecastTask, FORECAST_POD_TASK,
        FORECAST_VM_TASK,
    },
    observability::{ServerMetrics, StructuredLogger},
    source::TimescaleSource,
    summary::ClusterSummaryCache,
    PodService,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const STORE_PING_INTERVAL: Duration = Duration::from_secs(30);
const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);
/// Consecutive failed pings before the store is reported unhealthy
const STORE_PING_FAILURES: u32 = 3;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting rightsizing-api-server");

    let config = config::ServerConfig::load()?;
    info!(
        inference_endpoint = %config.inference_endpoint,
        worker_slots = config.worker_slots,
        "Server configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = ServerMetrics::new();
    let logger = StructuredLogger::new("rightsizing-api-server");
    logger.log_startup(SERVER_VERSION);

    let store = Arc::new(TimescaleSource::connect(&config.timescale()).await?);
    let gateway = Arc::new(GrpcInferenceClient::new(config.gateway()));
    let engine = Arc::new(AggregationEngine::new(
        store.clone(),
        store.clone(),
        gateway.clone(),
        config.engine(),
    ));

    let queue = Arc::new(
        LocalTaskQueue::new(config.queue())
            .register(
                FORECAST_POD_TASK,
                Arc::new(PodForecastTask::new(engine.clone(), gateway.clone())),
            )
            .register(
                FORECAST_VM_TASK,
                Arc::new(VmForecastTask::new(engine.clone(), gateway.clone())),
            ),
    );
    let workers = queue.start();
    health_registry.set_healthy(components::TASK_QUEUE).await;

    // one cache for forecast job keys and the cluster summary
    let cache = SharedCache::new(Duration::from_secs(config.job_ttl_secs));
    let jobs = Arc::new(JobDeduplicator::new(
        queue.clone(),
        cache.clone(),
        config.dedup(),
    ));
    let summary = Arc::new(ClusterSummaryCache::new(
        engine.clone(),
        cache.clone(),
        config.summary(),
    ));
    let pods = Arc::new(PodService::new(
        engine.clone(),
        summary,
        jobs,
        health_registry.clone(),
    ));

    // Store reachability, a warm summary cache and expiry of old entries
    let maintenance = {
        let health = health_registry.clone();
        let store = store.clone();
        let pods = pods.clone();
        let queue = queue.clone();
        let refresh = Duration::from_secs(config.summary_ttl_secs.max(1));
        tokio::spawn(async move {
            let mut ping = tokio::time::interval(STORE_PING_INTERVAL);
            let mut warm = tokio::time::interval(refresh);
            let mut purge = tokio::time::interval(CACHE_PURGE_INTERVAL);
            let mut failed_pings = 0u32;
            loop {
                tokio::select! {
                    _ = ping.tick() => {
                        let result = store.ping().await;
                        failed_pings = if result.is_ok() { 0 } else { failed_pings + 1 };
                        match result {
                            Err(e) if failed_pings >= STORE_PING_FAILURES => {
                                warn!(error = %e, failed_pings, "Metric store unreachable");
                                health.set_unhealthy(components::METRIC_STORE, e.to_string()).await;
                            }
                            result => health.observe(components::METRIC_STORE, &result).await,
                        }
                    }
                    _ = purge.tick() => {
                        let jobs = queue.purge_expired();
                        let entries = cache.purge_expired();
                        debug!(jobs, entries, "Purged expired cache entries");
                    }
                    _ = warm.tick() => {
                        if let Err(e) = pods.cluster_info().await {
                            warn!(error = %e, "Cluster summary refresh failed");
                        }
                    }
                }
            }
        })
    };

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics));

    health_registry.set_ready(true).await;

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state, async move {
        let _ = stop_rx.await;
    }));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            logger.log_shutdown("SIGINT received");
            let _ = stop_tx.send(());
            match (&mut api_handle).await {
                Ok(Err(e)) => warn!(error = %e, "API server failed during shutdown"),
                Err(e) => warn!(error = %e, "API server task failed"),
                Ok(Ok(())) => {}
            }
        }
        result = &mut api_handle => {
            match result {
                Ok(Err(e)) => warn!(error = %e, "API server stopped"),
                Err(e) => warn!(error = %e, "API server task failed"),
                Ok(Ok(())) => {}
            }
            logger.log_shutdown("API server stopped");
        }
    }

    health_registry.set_ready(false).await;
    maintenance.abort();
    queue.shutdown();
    for worker in workers {
        let _ = worker.await;
    }
    info!(
        inference_connected = gateway.is_connected().await,
        "Shutting down"
    );

    Ok(())
}
