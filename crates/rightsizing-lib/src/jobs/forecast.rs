//! Forecast task handlers
//!
//! Both tasks re-read the usage series for their entity (no quota), ask
//! the gateway for a forecast of every non-empty resource series and
//! return the encoded result set.

use super::{encode_forecast, TaskHandler};
use crate::aggregation::{AggregationEngine, ResourceEntity};
use crate::error::{Result, RightsizingError};
use crate::inference::InferenceGateway;
use crate::models::{ContainerRecord, ForecastUsage, QueryWindow, ResourceUsage, VmRecord};
use crate::observability::ServerMetrics;
use crate::source::Scope;
use async_trait::async_trait;
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

pub const FORECAST_POD_TASK: &str = "forecast:pod";
pub const FORECAST_VM_TASK: &str = "forecast:vm";

fn bad_args(task: &str, args: &[String]) -> RightsizingError {
    RightsizingError::Validation(format!("unexpected arguments for {}: {:?}", task, args))
}

/// Forecast every non-empty resource series of the named entities
async fn forecast_usages(
    gateway: &dyn InferenceGateway,
    entities: Vec<(String, &BTreeMap<String, ResourceUsage>)>,
    deadline: Instant,
) -> Result<Vec<ForecastUsage>> {
    let metrics = ServerMetrics::new();
    let metrics = &metrics;
    let calls = entities.iter().flat_map(|(name, usages)| {
        usages
            .values()
            .filter(|usage| !usage.series().is_empty())
            .map(move |usage| {
                async move {
                    let start = std::time::Instant::now();
                    let result = gateway.forecast(usage.series(), deadline).await;
                    metrics.observe_inference_latency("forecast", start.elapsed().as_secs_f64());
                    if result.is_err() {
                        metrics.inc_inference_errors("forecast");
                    }
                    result.map(|series| (name.as_str(), usage.resource_name.as_str(), series))
                }
            })
    });
    let results = try_join_all(calls).await?;

    let mut forecasts: BTreeMap<&str, ForecastUsage> = entities
        .iter()
        .map(|(name, _)| (name.as_str(), ForecastUsage::new(name)))
        .collect();
    for (name, resource, series) in results {
        if let Some(forecast) = forecasts.get_mut(name) {
            let labels = forecast.usage.entry(resource.to_string()).or_default();
            for named in series {
                labels.insert(named.name, named.points);
            }
        }
    }
    Ok(forecasts.into_values().collect())
}

/// Forecast for the containers of one pod.
///
/// Arguments: namespace, pod name, window start, window end.
pub struct PodForecastTask {
    engine: Arc<AggregationEngine>,
    gateway: Arc<dyn InferenceGateway>,
}

impl PodForecastTask {
    pub fn new(engine: Arc<AggregationEngine>, gateway: Arc<dyn InferenceGateway>) -> Self {
        Self { engine, gateway }
    }

    pub fn args(namespace: &str, name: &str, window: &QueryWindow) -> Vec<String> {
        let (start, end) = window.to_args();
        vec![namespace.to_string(), name.to_string(), start, end]
    }
}

#[async_trait]
impl TaskHandler for PodForecastTask {
    async fn run(&self, args: &[String]) -> Result<String> {
        let [namespace, name, start, end] = args else {
            return Err(bad_args(FORECAST_POD_TASK, args));
        };
        let scope = Scope::pod(namespace, name);
        if scope == Scope::All {
            return Err(bad_args(FORECAST_POD_TASK, args));
        }
        let window = QueryWindow::from_args(start, end)?;
        let containers: Vec<ContainerRecord> = self
            .engine
            .query_container_series(&scope, &window)
            .await?;
        if containers.is_empty() {
            return Err(RightsizingError::not_found(
                "pod",
                format!("{}/{}", namespace, name),
            ));
        }

        let entities = containers
            .iter()
            .map(|c| (c.name.clone(), c.usages()))
            .collect();
        let forecasts = forecast_usages(self.gateway.as_ref(), entities, self.engine.deadline()).await?;
        debug!(
            namespace = %namespace,
            pod = %name,
            containers = forecasts.len(),
            "Pod forecast computed"
        );
        encode_forecast(&forecasts)
    }
}

/// Forecast for one vm.
///
/// Arguments: vm name, window start, window end.
pub struct VmForecastTask {
    engine: Arc<AggregationEngine>,
    gateway: Arc<dyn InferenceGateway>,
}

impl VmForecastTask {
    pub fn new(engine: Arc<AggregationEngine>, gateway: Arc<dyn InferenceGateway>) -> Self {
        Self { engine, gateway }
    }

    pub fn args(name: &str, window: &QueryWindow) -> Vec<String> {
        let (start, end) = window.to_args();
        vec![name.to_string(), start, end]
    }
}

#[async_trait]
impl TaskHandler for VmForecastTask {
    async fn run(&self, args: &[String]) -> Result<String> {
        let [name, start, end] = args else {
            return Err(bad_args(FORECAST_VM_TASK, args));
        };
        let window = QueryWindow::from_args(start, end)?;
        let vm: VmRecord = self.engine.get_vm(&window, name).await?;

        let entities = vec![(vm.name.clone(), vm.usages())];
        let forecasts = forecast_usages(self.gateway.as_ref(), entities, self.engine.deadline()).await?;
        debug!(vm = %name, "Vm forecast computed");
        encode_forecast(&forecasts)
    }
}
