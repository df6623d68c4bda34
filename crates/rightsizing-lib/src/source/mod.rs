//! Read-only adapters over the metric store
//!
//! This module provides:
//! - The table-driven descriptor list of usage metrics
//! - `MetricSource` for bucketed usage series
//! - `QuotaSource` for declared request/limit values
//! - A TimescaleDB (Postgres) implementation of both

mod tables;
mod timescale;

pub use tables::{container_metric_tables, vm_metric_tables, IdentityLayout, MetricTable};
pub use timescale::{TimescaleConfig, TimescaleSource};

use crate::error::Result;
use crate::models::{QueryWindow, TimeSeriesDatapoint};
use async_trait::async_trait;

/// Which entities a query is restricted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Pod { namespace: String, name: String },
    Vm { name: String },
}

impl Scope {
    /// Pod scope; an empty namespace or name matches every pod
    pub fn pod(namespace: &str, name: &str) -> Self {
        if namespace.is_empty() || name.is_empty() {
            Scope::All
        } else {
            Scope::Pod {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }
        }
    }

    /// Vm scope; an empty name matches every vm
    pub fn vm(name: &str) -> Self {
        if name.is_empty() {
            Scope::All
        } else {
            Scope::Vm {
                name: name.to_string(),
            }
        }
    }
}

/// Identity row of one stored series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesIdentity {
    pub series_id: i64,
    /// Empty for vms
    pub namespace: String,
    /// Pod name for containers, domain name for vms
    pub owner: String,
    /// Empty for vms
    pub container: String,
}

/// One stored series with its samples in the requested window, ascending
#[derive(Debug, Clone)]
pub struct MetricSeries {
    pub identity: SeriesIdentity,
    pub points: Vec<TimeSeriesDatapoint>,
}

/// Which declared quota to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    Request,
    Limit,
}

impl QuotaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaKind::Request => "request",
            QuotaKind::Limit => "limit",
        }
    }
}

/// Latest declared quota value of one container resource
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaRow {
    pub namespace: String,
    pub pod: String,
    pub container: String,
    pub resource: String,
    pub value: f64,
}

/// Source of bucketed usage series
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Series of one metric table restricted to the scope and window.
    ///
    /// Implementations must skip NaN samples and sentinel container names
    /// (`POD` and empty).
    async fn query_series(
        &self,
        table: &MetricTable,
        scope: &Scope,
        window: &QueryWindow,
    ) -> Result<Vec<MetricSeries>>;
}

/// Source of declared container quota
#[async_trait]
pub trait QuotaSource: Send + Sync {
    /// Current request or limit values; only the recent past is considered
    /// regardless of any usage window.
    async fn query_quota(&self, kind: QuotaKind, scope: &Scope) -> Result<Vec<QuotaRow>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_empty_fields_match_all() {
        assert_eq!(Scope::pod("", "a"), Scope::All);
        assert_eq!(Scope::pod("ns", ""), Scope::All);
        assert_eq!(Scope::vm(""), Scope::All);
        assert_eq!(
            Scope::pod("ns", "a"),
            Scope::Pod {
                namespace: "ns".into(),
                name: "a".into()
            }
        );
    }
}
