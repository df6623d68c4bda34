//! Cluster-wide usage summary
//!
//! Aggregating every pod is expensive, so the result is cached under a
//! single key. Raw series are dropped before caching; only scalars are
//! kept. Concurrent misses may each recompute.

use crate::aggregation::AggregationEngine;
use crate::cache::{CacheValue, SharedCache};
use crate::error::Result;
use crate::models::{PodRecord, QueryWindow, DEFAULT_WINDOW_DAYS, POD_RESOURCES};
use crate::observability::ServerMetrics;
use crate::status::{classify, standard_quota, Allocation};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const SUMMARY_KEY: &str = "cluster:summary";

/// Configuration for the summary cache
#[derive(Debug, Clone)]
pub struct SummaryConfig {
    /// Trailing window aggregated on a miss
    pub window_days: i64,
    pub ttl: Duration,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
            ttl: Duration::from_secs(300),
        }
    }
}

/// Average usage and allocation histogram of one resource across pods
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceSummary {
    pub average: f64,
    pub optimized: usize,
    pub underallocated: usize,
    pub overallocated: usize,
}

impl ResourceSummary {
    fn count(&mut self, allocation: Allocation) {
        match allocation {
            Allocation::Optimized => self.optimized += 1,
            Allocation::Underallocated => self.underallocated += 1,
            Allocation::Overallocated => self.overallocated += 1,
            Allocation::Unknown => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub pods: usize,
    pub resources: BTreeMap<String, ResourceSummary>,
}

/// Summarize pod totals; pods without declared quota for a resource add
/// to the average but not to the histogram.
pub fn summarize(pods: &[PodRecord]) -> ClusterSummary {
    let mut resources: BTreeMap<String, ResourceSummary> = POD_RESOURCES
        .iter()
        .map(|r| (r.to_string(), ResourceSummary::default()))
        .collect();

    for pod in pods {
        for (name, usage) in &pod.usages {
            let summary = resources.entry(name.clone()).or_default();
            summary.average += usage.current_usage();
            summary.count(classify(usage.current_usage(), standard_quota(usage)));
        }
    }
    if !pods.is_empty() {
        for summary in resources.values_mut() {
            summary.average /= pods.len() as f64;
        }
    }

    ClusterSummary {
        pods: pods.len(),
        resources,
    }
}

/// Drop raw series everywhere in the pod, keeping scalars
fn strip_series(pod: &mut PodRecord) {
    for usage in pod.usages.values_mut() {
        usage.clear_series();
    }
    for container in &mut pod.containers {
        for usage in container.usages.values_mut() {
            usage.clear_series();
        }
    }
}

/// Series-free pods and the summary computed from them
#[derive(Debug)]
pub struct CachedSummary {
    pub pods: Vec<PodRecord>,
    pub summary: ClusterSummary,
}

/// Cached whole-fleet aggregate
pub struct ClusterSummaryCache {
    engine: Arc<AggregationEngine>,
    cache: SharedCache,
    config: SummaryConfig,
    metrics: ServerMetrics,
}

impl ClusterSummaryCache {
    pub fn new(engine: Arc<AggregationEngine>, cache: SharedCache, config: SummaryConfig) -> Self {
        Self {
            engine,
            cache,
            config,
            metrics: ServerMetrics::new(),
        }
    }

    async fn load(&self) -> Result<Arc<CachedSummary>> {
        if let Some(CacheValue::Summary(cached)) = self.cache.get(SUMMARY_KEY) {
            self.metrics.inc_summary_cache_hit();
            return Ok(cached);
        }
        self.metrics.inc_summary_cache_miss();

        let window = QueryWindow::last_days(self.config.window_days);
        let mut pods = self.engine.get_all_pods(&window).await?;
        pods.iter_mut().for_each(strip_series);
        let summary = summarize(&pods);
        info!(
            pods = summary.pods,
            window_days = self.config.window_days,
            "Cluster summary recomputed"
        );

        let cached = Arc::new(CachedSummary { pods, summary });
        self.cache
            .set_with_ttl(SUMMARY_KEY, CacheValue::Summary(cached.clone()), self.config.ttl);
        Ok(cached)
    }

    pub async fn get_summary(&self) -> Result<ClusterSummary> {
        Ok(self.load().await?.summary.clone())
    }

    /// Drop the cached entry so the next call recomputes
    pub fn invalidate(&self) {
        self.cache.remove(SUMMARY_KEY);
    }
}
