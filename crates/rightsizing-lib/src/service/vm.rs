use super::{annotate_status, into_forecast_map, tracked, ForecastMap, QUEUE_ONLY, RIGHTSIZING};
use crate::aggregation::AggregationEngine;
use crate::error::{Result, RightsizingError};
use crate::health::HealthRegistry;
use crate::jobs::{JobDeduplicator, JobSpec, JobState, VmForecastTask, FORECAST_VM_TASK};
use crate::models::{vm_key, QueryWindow, VmRecord};
use std::sync::Arc;
use tracing::debug;

/// Vm views: current state with recommendations and forecasts
pub struct VmService {
    engine: Arc<AggregationEngine>,
    jobs: Arc<JobDeduplicator>,
    health: HealthRegistry,
}

fn require_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RightsizingError::Validation("vm name is required".to_string()));
    }
    Ok(())
}

impl VmService {
    pub fn new(engine: Arc<AggregationEngine>, jobs: Arc<JobDeduplicator>, health: HealthRegistry) -> Self {
        Self {
            engine,
            jobs,
            health,
        }
    }

    /// Exactly one vm by name, rightsized
    pub async fn get_vm(&self, window: &QueryWindow, name: &str) -> Result<VmRecord> {
        debug!(vm = %name, "Rightsizing vm");
        let result = async {
            let mut vm = self.engine.get_vm(window, name).await?;
            self.engine.rightsize_vm(&vm, self.engine.deadline()).await?;
            annotate_status(&mut vm.usages);
            Ok::<_, RightsizingError>(vm)
        }
        .await;
        tracked(&self.health, RIGHTSIZING, result).await
    }

    pub async fn forecast(&self, window: &QueryWindow, name: &str) -> Result<String> {
        require_name(name)?;
        let spec = JobSpec::new(
            FORECAST_VM_TASK,
            VmForecastTask::args(name, window),
            self.jobs.retry_count(),
        );
        let submitted = self.jobs.submit(&vm_key(name), spec).await;
        tracked(&self.health, QUEUE_ONLY, submitted).await
    }

    pub async fn forecast_status(&self, name: &str) -> Result<JobState> {
        require_name(name)?;
        self.jobs.status_by_key(&vm_key(name)).await
    }

    pub async fn forecast_status_by_id(&self, job_id: &str) -> Result<JobState> {
        self.jobs.status(job_id).await
    }

    pub async fn forecast_result(&self, name: &str) -> Result<Option<ForecastMap>> {
        require_name(name)?;
        Ok(into_forecast_map(self.jobs.result_by_key(&vm_key(name)).await?))
    }

    pub async fn forecast_result_by_id(&self, job_id: &str) -> Result<Option<ForecastMap>> {
        Ok(into_forecast_map(self.jobs.result(job_id).await?))
    }
}
