//! Resource aggregation engine
//!
//! This module provides:
//! - Concurrent fan-out of the per-metric usage queries and the request /
//!   limit quota queries, joined fail-fast
//! - Keyed merge of series and quota into container and vm records, applied
//!   in whatever order the sub-queries complete
//! - Rollup of containers into pods
//! - The rightsizing pass against the inference gateway

mod entity;
mod rollup;

pub use entity::{EntitySet, ResourceEntity};
pub use rollup::{recompute_totals, rollup_pods};

use crate::error::{Result, RightsizingError};
use crate::inference::InferenceGateway;
use crate::models::{ContainerRecord, PodRecord, QueryWindow, ResourceUsage, VmRecord};
use crate::observability::ServerMetrics;
use crate::source::{
    container_metric_tables, vm_metric_tables, MetricSeries, MetricSource, MetricTable, QuotaKind,
    QuotaRow, QuotaSource, Scope,
};
use futures::future::{try_join_all, BoxFuture};
use futures::stream::{FuturesUnordered, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// One completed sub-query of a container aggregation
enum SubQuery<'a> {
    Series(&'a str, Vec<MetricSeries>),
    Quota(QuotaKind, Vec<QuotaRow>),
}

/// Configuration for the aggregation engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Series shorter than this are not sent for rightsizing
    pub min_rightsizing_samples: usize,
    /// Budget for one rightsizing pass
    pub inference_timeout: Duration,
    pub container_tables: Vec<MetricTable>,
    pub vm_tables: Vec<MetricTable>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_rightsizing_samples: 100,
            inference_timeout: Duration::from_secs(30),
            container_tables: container_metric_tables(),
            vm_tables: vm_metric_tables(),
        }
    }
}

/// Joins usage series with declared quota and rolls them up
pub struct AggregationEngine {
    metrics: Arc<dyn MetricSource>,
    quota: Arc<dyn QuotaSource>,
    gateway: Arc<dyn InferenceGateway>,
    config: EngineConfig,
    server_metrics: ServerMetrics,
}

impl AggregationEngine {
    pub fn new(
        metrics: Arc<dyn MetricSource>,
        quota: Arc<dyn QuotaSource>,
        gateway: Arc<dyn InferenceGateway>,
        config: EngineConfig,
    ) -> Self {
        Self {
            metrics,
            quota,
            gateway,
            config,
            server_metrics: ServerMetrics::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Deadline for inference calls started now
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.config.inference_timeout
    }

    /// Run one query per table concurrently and merge the results; any
    /// failing query fails the whole call.
    async fn query_series<E: ResourceEntity>(
        &self,
        tables: &[MetricTable],
        scope: &Scope,
        window: &QueryWindow,
    ) -> Result<EntitySet<E>> {
        let queries = tables.iter().map(|table| async move {
            let series = self.metrics.query_series(table, scope, window).await?;
            Ok::<_, RightsizingError>((table.metric.as_str(), series))
        });
        let results = try_join_all(queries).await?;

        let mut set = EntitySet::new();
        for (metric, series) in results {
            set.merge_series(metric, series);
        }
        Ok(set)
    }

    /// Container records with usage series and declared quota.
    ///
    /// Usage and quota queries all run concurrently and each result is
    /// merged as soon as it arrives. The first failure cancels the rest.
    pub async fn query_containers(
        &self,
        scope: &Scope,
        window: &QueryWindow,
    ) -> Result<Vec<ContainerRecord>> {
        let start = std::time::Instant::now();
        let mut pending: FuturesUnordered<BoxFuture<'_, Result<SubQuery>>> =
            FuturesUnordered::new();
        for table in &self.config.container_tables {
            pending.push(Box::pin(async move {
                let series = self.metrics.query_series(table, scope, window).await?;
                Ok(SubQuery::Series(table.metric.as_str(), series))
            }));
        }
        for kind in [QuotaKind::Request, QuotaKind::Limit] {
            pending.push(Box::pin(async move {
                let rows = self.quota.query_quota(kind, scope).await?;
                Ok(SubQuery::Quota(kind, rows))
            }));
        }

        let mut set = EntitySet::<ContainerRecord>::new();
        while let Some(part) = pending.try_next().await? {
            match part {
                SubQuery::Series(metric, series) => set.merge_series(metric, series),
                SubQuery::Quota(kind, rows) => set.merge_quota(kind, rows),
            }
        }

        let elapsed = start.elapsed();
        self.server_metrics
            .observe_query_latency(ContainerRecord::KIND, elapsed.as_secs_f64());
        debug!(
            scope = ?scope,
            containers = set.len(),
            elapsed_ms = elapsed.as_millis(),
            "Container aggregation completed"
        );
        Ok(set.into_vec())
    }

    /// Container records with usage series only, as used for forecasting
    pub async fn query_container_series(
        &self,
        scope: &Scope,
        window: &QueryWindow,
    ) -> Result<Vec<ContainerRecord>> {
        let set = self
            .query_series::<ContainerRecord>(&self.config.container_tables, scope, window)
            .await?;
        Ok(set.into_vec())
    }

    /// Vm records; name conflicts are kept visible to the caller
    pub async fn query_vms(&self, scope: &Scope, window: &QueryWindow) -> Result<EntitySet<VmRecord>> {
        let start = std::time::Instant::now();
        let set = self
            .query_series::<VmRecord>(&self.config.vm_tables, scope, window)
            .await?;
        self.server_metrics
            .observe_query_latency(VmRecord::KIND, start.elapsed().as_secs_f64());
        Ok(set)
    }

    /// Every pod with usage or quota in the window
    pub async fn get_all_pods(&self, window: &QueryWindow) -> Result<Vec<PodRecord>> {
        let containers = self.query_containers(&Scope::All, window).await?;
        if containers.is_empty() {
            return Err(RightsizingError::not_found("pod", "all"));
        }
        Ok(rollup_pods(containers))
    }

    pub async fn get_pod(&self, window: &QueryWindow, namespace: &str, name: &str) -> Result<PodRecord> {
        let scope = Scope::pod(namespace, name);
        if scope == Scope::All {
            return Err(RightsizingError::Validation(
                "pod namespace and name are required".to_string(),
            ));
        }
        let containers = self.query_containers(&scope, window).await?;
        let mut pods = rollup_pods(containers);
        match pods.len() {
            0 => Err(RightsizingError::not_found("pod", format!("{}/{}", namespace, name))),
            1 => Ok(pods.remove(0)),
            _ => Err(RightsizingError::not_unique("pod", format!("{}/{}", namespace, name))),
        }
    }

    /// Exactly one vm by name: zero is not found, several are not unique
    pub async fn get_vm(&self, window: &QueryWindow, name: &str) -> Result<VmRecord> {
        let scope = Scope::vm(name);
        if scope == Scope::All {
            return Err(RightsizingError::Validation("vm name is required".to_string()));
        }
        let set = self.query_vms(&scope, window).await?;
        if set.has_duplicates() || set.len() > 1 {
            return Err(RightsizingError::not_unique(VmRecord::KIND, name));
        }
        set.into_vec()
            .pop()
            .ok_or_else(|| RightsizingError::not_found(VmRecord::KIND, name))
    }

    /// Pods built from declared quota alone, without usage series
    pub async fn get_all_pod_quota(&self) -> Result<Vec<PodRecord>> {
        let (requests, limits) = tokio::try_join!(
            self.quota.query_quota(QuotaKind::Request, &Scope::All),
            self.quota.query_quota(QuotaKind::Limit, &Scope::All),
        )?;
        let mut set = EntitySet::<ContainerRecord>::new();
        set.merge_quota(QuotaKind::Request, requests);
        set.merge_quota(QuotaKind::Limit, limits);
        if set.is_empty() {
            return Err(RightsizingError::not_found("pod", "all"));
        }
        Ok(rollup_pods(set.into_vec()))
    }

    /// Ask the gateway for the optimal value of one resource. Returns
    /// false when the series is too short to be sent.
    async fn rightsize_usage(&self, usage: &ResourceUsage, deadline: Instant) -> Result<bool> {
        if usage.sample_count() < self.config.min_rightsizing_samples {
            return Ok(false);
        }
        let start = std::time::Instant::now();
        let result = self.gateway.rightsize(&usage.values(), deadline).await;
        self.server_metrics
            .observe_inference_latency("rightsizing", start.elapsed().as_secs_f64());
        match result {
            Ok(value) => {
                usage.set_optimized_usage(value);
                Ok(true)
            }
            Err(e) => {
                self.server_metrics.inc_inference_errors("rightsizing");
                Err(e)
            }
        }
    }

    /// Rightsize every resource of the given entities concurrently
    pub async fn rightsize_entities<E: ResourceEntity>(
        &self,
        entities: &[E],
        deadline: Instant,
    ) -> Result<usize> {
        let calls = entities
            .iter()
            .flat_map(|e| e.usages().values())
            .map(|usage| self.rightsize_usage(usage, deadline));
        let sent = try_join_all(calls).await?;
        Ok(sent.into_iter().filter(|s| *s).count())
    }

    /// Rightsize a pod's containers and fold the results into its totals
    pub async fn rightsize_pod(&self, pod: &mut PodRecord, deadline: Instant) -> Result<()> {
        self.rightsize_pods(std::slice::from_mut(pod), deadline).await
    }

    pub async fn rightsize_pods(&self, pods: &mut [PodRecord], deadline: Instant) -> Result<()> {
        let calls = pods
            .iter()
            .map(|pod| self.rightsize_entities(&pod.containers, deadline));
        let sent: usize = try_join_all(calls).await?.into_iter().sum();
        for pod in pods.iter_mut() {
            recompute_totals(pod, true);
        }
        info!(pods = pods.len(), resources = sent, "Rightsizing pass completed");
        Ok(())
    }

    pub async fn rightsize_vm(&self, vm: &VmRecord, deadline: Instant) -> Result<()> {
        self.rightsize_entities(std::slice::from_ref(vm), deadline)
            .await
            .map(|_| ())
    }
}
