//! Pod and vm services
//!
//! Thin façades over the aggregation engine, the summary cache and the job
//! deduplicator, in the shape the HTTP layer consumes them.

mod pod;
mod vm;

pub use pod::PodService;
pub use vm::VmService;

use crate::error::Result;
use crate::health::{components, HealthRegistry};
use crate::models::{ForecastUsage, ResourceUsage};
use crate::status::{health_status, HEALTH_MIN_SAMPLES};
use std::collections::BTreeMap;

/// Set the coarse health status of every resource
fn annotate_status(usages: &mut BTreeMap<String, ResourceUsage>) {
    for usage in usages.values_mut() {
        usage.status = Some(health_status(usage, HEALTH_MIN_SAMPLES));
    }
}

/// Forecast results keyed by container or vm name
pub type ForecastMap = BTreeMap<String, ForecastUsage>;

fn into_forecast_map(usages: Option<Vec<ForecastUsage>>) -> Option<ForecastMap> {
    usages.map(|usages| {
        usages
            .into_iter()
            .map(|usage| (usage.name.clone(), usage))
            .collect()
    })
}

/// Components a rightsizing view calls into
const RIGHTSIZING: &[&str] = &[components::METRIC_STORE, components::INFERENCE];
const STORE_ONLY: &[&str] = &[components::METRIC_STORE];
const QUEUE_ONLY: &[&str] = &[components::TASK_QUEUE];

/// Report the outcome to the health registry before returning it: upstream
/// failures degrade their component, success restores every component the
/// call went through.
async fn tracked<T>(health: &HealthRegistry, used: &[&str], result: Result<T>) -> Result<T> {
    match &result {
        Ok(_) => {
            for name in used {
                health.set_healthy(name).await;
            }
        }
        Err(e) => health.record_failure(e).await,
    }
    result
}

#[cfg(test)]
mod tests;
