//! In-memory fakes shared by unit tests

use crate::error::{Result, RightsizingError};
use crate::inference::{InferenceGateway, NamedSeries};
use crate::models::{QueryWindow, TimeSeriesDatapoint};
use crate::source::{
    IdentityLayout, MetricSeries, MetricSource, MetricTable, QuotaKind, QuotaRow, QuotaSource, Scope,
    SeriesIdentity,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub fn points(values: &[f64]) -> Vec<TimeSeriesDatapoint> {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| TimeSeriesDatapoint::new(i as i64 * 600, *v))
        .collect()
}

pub fn container_series(id: i64, ns: &str, pod: &str, container: &str, values: &[f64]) -> MetricSeries {
    MetricSeries {
        identity: SeriesIdentity {
            series_id: id,
            namespace: ns.to_string(),
            owner: pod.to_string(),
            container: container.to_string(),
        },
        points: points(values),
    }
}

pub fn vm_series(id: i64, name: &str, values: &[f64]) -> MetricSeries {
    MetricSeries {
        identity: SeriesIdentity {
            series_id: id,
            namespace: String::new(),
            owner: name.to_string(),
            container: String::new(),
        },
        points: points(values),
    }
}

pub fn quota_row(ns: &str, pod: &str, container: &str, resource: &str, value: f64) -> QuotaRow {
    QuotaRow {
        namespace: ns.to_string(),
        pod: pod.to_string(),
        container: container.to_string(),
        resource: resource.to_string(),
        value,
    }
}

fn in_scope(identity: &SeriesIdentity, layout: IdentityLayout, scope: &Scope) -> bool {
    // container and vm series share metric names; the layout tells them apart
    let layout_matches = match layout {
        IdentityLayout::Container => !identity.container.is_empty(),
        IdentityLayout::Domain => identity.container.is_empty(),
    };
    layout_matches
        && match scope {
            Scope::All => true,
            Scope::Pod { namespace, name } => {
                &identity.namespace == namespace && &identity.owner == name
            }
            Scope::Vm { name } => &identity.owner == name,
        }
}

/// Metric source serving fixed series per metric name
#[derive(Default)]
pub struct FakeMetricSource {
    series: HashMap<String, Vec<MetricSeries>>,
    failing_metric: Option<String>,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeMetricSource {
    pub fn with_series(mut self, metric: &str, series: Vec<MetricSeries>) -> Self {
        self.series.entry(metric.to_string()).or_default().extend(series);
        self
    }

    pub fn failing_on(mut self, metric: &str) -> Self {
        self.failing_metric = Some(metric.to_string());
        self
    }

    /// Answer every query only after `delay`
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl MetricSource for FakeMetricSource {
    async fn query_series(
        &self,
        table: &MetricTable,
        scope: &Scope,
        _window: &QueryWindow,
    ) -> Result<Vec<MetricSeries>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.failing_metric.as_deref() == Some(table.metric.as_str()) {
            return Err(RightsizingError::upstream("metric-store", "connection reset"));
        }
        Ok(self
            .series
            .get(&table.metric)
            .map(|all| {
                all.iter()
                    .filter(|s| in_scope(&s.identity, table.layout, scope))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Quota source serving fixed request and limit rows
#[derive(Default)]
pub struct FakeQuotaSource {
    pub requests: Vec<QuotaRow>,
    pub limits: Vec<QuotaRow>,
    pub delay: Duration,
}

#[async_trait]
impl QuotaSource for FakeQuotaSource {
    async fn query_quota(&self, kind: QuotaKind, scope: &Scope) -> Result<Vec<QuotaRow>> {
        tokio::time::sleep(self.delay).await;
        let rows = match kind {
            QuotaKind::Request => &self.requests,
            QuotaKind::Limit => &self.limits,
        };
        Ok(rows
            .iter()
            .filter(|r| match scope {
                Scope::All => true,
                Scope::Pod { namespace, name } => &r.namespace == namespace && &r.pod == name,
                Scope::Vm { .. } => false,
            })
            .cloned()
            .collect())
    }
}

/// Gateway returning the series maximum as the optimal value and a fixed
/// set of forecast labels
#[derive(Default)]
pub struct FakeGateway {
    fail: AtomicBool,
    pub rightsize_calls: AtomicUsize,
    pub forecast_calls: AtomicUsize,
    pub seen_deadlines: Mutex<Vec<Instant>>,
}

impl FakeGateway {
    pub fn failing() -> Self {
        let gateway = Self::default();
        gateway.set_failing(true);
        gateway
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl InferenceGateway for FakeGateway {
    async fn forecast(
        &self,
        series: &[TimeSeriesDatapoint],
        deadline: Instant,
    ) -> Result<Vec<NamedSeries>> {
        self.forecast_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen_deadlines.lock() {
            seen.push(deadline);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(RightsizingError::upstream("inference", "Unavailable"));
        }
        let last = series.last().copied().unwrap_or(TimeSeriesDatapoint::new(0, 0.0));
        Ok(["yhat", "yhat_lower", "yhat_upper"]
            .iter()
            .enumerate()
            .map(|(i, label)| NamedSeries {
                name: label.to_string(),
                points: vec![TimeSeriesDatapoint::new(
                    last.timestamp + 600,
                    last.value + i as f64,
                )],
            })
            .collect())
    }

    async fn rightsize(&self, values: &[f64], deadline: Instant) -> Result<f64> {
        self.rightsize_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen_deadlines.lock() {
            seen.push(deadline);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(RightsizingError::upstream("inference", "Unavailable"));
        }
        Ok(values.iter().copied().fold(0.0, f64::max))
    }
}
