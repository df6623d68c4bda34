//! TimescaleDB-backed metric and quota source
//!
//! Usage series come from Promscale-style identity tables joined with
//! their 10 minute continuous aggregates; quota comes from the
//! `kube_pod_container_resource_{requests,limits}` metric views.

use super::{
    IdentityLayout, MetricSeries, MetricSource, MetricTable, QuotaKind, QuotaRow, QuotaSource,
    Scope, SeriesIdentity,
};
use crate::error::Result;
use crate::models::{QueryWindow, TimeSeriesDatapoint};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Configuration for the Timescale connection
#[derive(Debug, Clone)]
pub struct TimescaleConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Quota is "current state": only values this recent are read
    pub quota_recency: Duration,
}

impl Default for TimescaleConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://postgres@localhost:5432/postgres".to_string(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            quota_recency: Duration::from_secs(5 * 60),
        }
    }
}

/// Metric and quota source backed by a Postgres pool
#[derive(Clone)]
pub struct TimescaleSource {
    pool: PgPool,
    quota_recency: Duration,
}

impl TimescaleSource {
    /// Connect a new pool
    pub async fn connect(config: &TimescaleConfig) -> Result<Self> {
        info!("Connecting to metric store...");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await?;

        info!("Metric store connection established");

        Ok(Self::with_pool(pool, config.quota_recency))
    }

    pub fn with_pool(pool: PgPool, quota_recency: Duration) -> Self {
        Self {
            pool,
            quota_recency,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Cheap round trip used by readiness checks
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Quote a possibly schema-qualified table name; promscale table names
/// contain colons, so every part is always quoted.
fn quote_table(name: &str) -> String {
    let quote = |part: &str| format!("\"{}\"", part.replace('"', "\"\""));
    match name.split_once('.') {
        Some((schema, table)) => format!("{}.{}", quote(schema), quote(table)),
        None => quote(name),
    }
}

fn series_sql(table: &MetricTable, scope: &Scope) -> String {
    let identity = quote_table(&table.identity_table);
    let buckets = quote_table(&table.bucket_table);

    let (columns, mut filter) = match table.layout {
        IdentityLayout::Container => (
            "s.namespace AS namespace, s.pod AS owner, s.container AS container",
            "s.container != 'POD' AND s.container != ''".to_string(),
        ),
        IdentityLayout::Domain => (
            "'' AS namespace, s.domain AS owner, '' AS container",
            "s.domain != ''".to_string(),
        ),
    };

    match (scope, table.layout) {
        (Scope::Pod { .. }, IdentityLayout::Container) => {
            filter.push_str(" AND s.namespace = $3 AND s.pod = $4")
        }
        (Scope::Vm { .. }, IdentityLayout::Domain) => filter.push_str(" AND s.domain = $3"),
        _ => {}
    }

    format!(
        "SELECT s.series_id AS series_id, {columns}, \
         EXTRACT(EPOCH FROM m.bucket)::bigint AS ts, m.value AS value \
         FROM {identity} s \
         LEFT JOIN {buckets} m ON m.series_id = s.series_id \
         AND m.value != 'NaN' AND m.bucket >= $1 AND m.bucket <= $2 \
         WHERE {filter} \
         ORDER BY s.series_id, m.bucket"
    )
}

fn quota_sql(kind: QuotaKind, scope: &Scope) -> String {
    let view = match kind {
        QuotaKind::Request => "prom_metric.kube_pod_container_resource_requests",
        QuotaKind::Limit => "prom_metric.kube_pod_container_resource_limits",
    };
    let target = match scope {
        Scope::Pod { .. } => "AND val(namespace_id) = $2 AND val(pod_id) = $3 ",
        _ => "",
    };
    format!(
        "SELECT DISTINCT ON (namespace_id, pod_id, container_id, resource_id) \
         val(namespace_id) AS namespace, val(pod_id) AS pod, \
         val(container_id) AS container, val(resource_id) AS resource, value \
         FROM {view} \
         WHERE time >= now() - make_interval(secs => $1) {target}\
         AND value != 'NaN' AND val(resource_id) IN ('cpu', 'memory') \
         ORDER BY namespace_id, pod_id, container_id, resource_id, time DESC"
    )
}

/// Fold rows ordered by (series_id, bucket) into one series per identity
fn group_series(rows: Vec<PgRow>) -> Result<Vec<MetricSeries>> {
    let mut series: Vec<MetricSeries> = Vec::new();
    for row in rows {
        let series_id: i64 = row.try_get("series_id")?;
        let is_new = series
            .last()
            .map_or(true, |s| s.identity.series_id != series_id);
        if is_new {
            series.push(MetricSeries {
                identity: SeriesIdentity {
                    series_id,
                    namespace: row.try_get("namespace")?,
                    owner: row.try_get("owner")?,
                    container: row.try_get("container")?,
                },
                points: Vec::new(),
            });
        }

        let ts: Option<i64> = row.try_get("ts")?;
        let value: Option<f64> = row.try_get("value")?;
        if let (Some(ts), Some(value), Some(current)) = (ts, value, series.last_mut()) {
            current.points.push(TimeSeriesDatapoint::new(ts, value));
        }
    }
    Ok(series)
}

#[async_trait]
impl MetricSource for TimescaleSource {
    async fn query_series(
        &self,
        table: &MetricTable,
        scope: &Scope,
        window: &QueryWindow,
    ) -> Result<Vec<MetricSeries>> {
        let start = Instant::now();
        let sql = series_sql(table, scope);

        let mut query = sqlx::query(&sql).bind(window.start).bind(window.end);
        match (scope, table.layout) {
            (Scope::Pod { namespace, name }, IdentityLayout::Container) => {
                query = query.bind(namespace.as_str()).bind(name.as_str());
            }
            (Scope::Vm { name }, IdentityLayout::Domain) => {
                query = query.bind(name.as_str());
            }
            _ => {}
        }

        let rows = query.fetch_all(&self.pool).await?;
        let series = group_series(rows)?;

        debug!(
            metric = %table.metric,
            series = series.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Metric query completed"
        );
        Ok(series)
    }
}

#[async_trait]
impl QuotaSource for TimescaleSource {
    async fn query_quota(&self, kind: QuotaKind, scope: &Scope) -> Result<Vec<QuotaRow>> {
        if matches!(scope, Scope::Vm { .. }) {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let sql = quota_sql(kind, scope);
        let mut query = sqlx::query(&sql).bind(self.quota_recency.as_secs_f64());
        if let Scope::Pod { namespace, name } = scope {
            query = query.bind(namespace.as_str()).bind(name.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        let quota = rows
            .into_iter()
            .map(|row| {
                Ok(QuotaRow {
                    namespace: row.try_get("namespace")?,
                    pod: row.try_get("pod")?,
                    container: row.try_get("container")?,
                    resource: row.try_get("resource")?,
                    value: row.try_get("value")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            kind = kind.as_str(),
            rows = quota.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Quota query completed"
        );
        Ok(quota)
    }
}
