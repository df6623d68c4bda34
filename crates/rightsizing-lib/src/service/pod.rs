use super::{
    annotate_status, into_forecast_map, tracked, ForecastMap, QUEUE_ONLY, RIGHTSIZING, STORE_ONLY,
};
use crate::aggregation::AggregationEngine;
use crate::error::{Result, RightsizingError};
use crate::health::HealthRegistry;
use crate::jobs::{JobDeduplicator, JobSpec, JobState, PodForecastTask, FORECAST_POD_TASK};
use crate::models::{pod_key, PodRecord, QueryWindow};
use crate::summary::{ClusterSummary, ClusterSummaryCache};
use std::sync::Arc;
use tracing::debug;

/// Pod views: current state with recommendations, quota, cluster summary
/// and asynchronous forecasts
pub struct PodService {
    engine: Arc<AggregationEngine>,
    summary: Arc<ClusterSummaryCache>,
    jobs: Arc<JobDeduplicator>,
    health: HealthRegistry,
}

fn annotate_pod(pod: &mut PodRecord) {
    for container in &mut pod.containers {
        annotate_status(&mut container.usages);
    }
}

fn require_pod(namespace: &str, name: &str) -> Result<()> {
    if namespace.is_empty() || name.is_empty() {
        return Err(RightsizingError::Validation(
            "pod namespace and name are required".to_string(),
        ));
    }
    Ok(())
}

impl PodService {
    pub fn new(
        engine: Arc<AggregationEngine>,
        summary: Arc<ClusterSummaryCache>,
        jobs: Arc<JobDeduplicator>,
        health: HealthRegistry,
    ) -> Self {
        Self {
            engine,
            summary,
            jobs,
            health,
        }
    }

    /// Every pod, rightsized, sorted by namespace then name
    pub async fn get_all_pods(&self, window: &QueryWindow) -> Result<Vec<PodRecord>> {
        debug!(start = %window.start, end = %window.end, "Rightsizing all pods");
        let result = async {
            let mut pods = self.engine.get_all_pods(window).await?;
            self.engine
                .rightsize_pods(&mut pods, self.engine.deadline())
                .await?;
            pods.iter_mut().for_each(annotate_pod);
            Ok::<_, RightsizingError>(pods)
        }
        .await;
        tracked(&self.health, RIGHTSIZING, result).await
    }

    pub async fn get_pod(&self, window: &QueryWindow, namespace: &str, name: &str) -> Result<PodRecord> {
        debug!(namespace = %namespace, pod = %name, "Rightsizing pod");
        let result = async {
            let mut pod = self.engine.get_pod(window, namespace, name).await?;
            self.engine.rightsize_pod(&mut pod, self.engine.deadline()).await?;
            annotate_pod(&mut pod);
            Ok::<_, RightsizingError>(pod)
        }
        .await;
        tracked(&self.health, RIGHTSIZING, result).await
    }

    /// Declared quota of every pod, without usage
    pub async fn get_all_pod_quota(&self) -> Result<Vec<PodRecord>> {
        tracked(&self.health, STORE_ONLY, self.engine.get_all_pod_quota().await).await
    }

    pub async fn cluster_info(&self) -> Result<ClusterSummary> {
        tracked(&self.health, STORE_ONLY, self.summary.get_summary().await).await
    }

    /// Start (or join) the forecast job of a pod and return its id
    pub async fn forecast(&self, window: &QueryWindow, namespace: &str, name: &str) -> Result<String> {
        require_pod(namespace, name)?;
        let spec = JobSpec::new(
            FORECAST_POD_TASK,
            PodForecastTask::args(namespace, name, window),
            self.jobs.retry_count(),
        );
        let submitted = self.jobs.submit(&pod_key(namespace, name), spec).await;
        tracked(&self.health, QUEUE_ONLY, submitted).await
    }

    pub async fn forecast_status(&self, namespace: &str, name: &str) -> Result<JobState> {
        require_pod(namespace, name)?;
        self.jobs.status_by_key(&pod_key(namespace, name)).await
    }

    pub async fn forecast_status_by_id(&self, job_id: &str) -> Result<JobState> {
        self.jobs.status(job_id).await
    }

    /// Forecast of the pod's current job; `None` until the job succeeds
    pub async fn forecast_result(&self, namespace: &str, name: &str) -> Result<Option<ForecastMap>> {
        require_pod(namespace, name)?;
        let usages = self.jobs.result_by_key(&pod_key(namespace, name)).await?;
        Ok(into_forecast_map(usages))
    }

    pub async fn forecast_result_by_id(&self, job_id: &str) -> Result<Option<ForecastMap>> {
        Ok(into_forecast_map(self.jobs.result(job_id).await?))
    }
}
