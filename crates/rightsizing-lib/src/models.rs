//! Core data models for the rightsizing server

use crate::error::{Result, RightsizingError};
use crate::status::HealthStatus;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::RwLock;

pub const CPU: &str = "cpu";
pub const MEMORY: &str = "memory";

/// Resources tracked for containers and rolled up into pods
pub const POD_RESOURCES: &[&str] = &[CPU, MEMORY];

/// Resources tracked for virtual machines
pub const VM_RESOURCES: &[&str] = &[MEMORY];

/// Time format used for job arguments and metric store bounds
pub const ARG_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Default trailing window when the caller does not give a start time
pub const DEFAULT_WINDOW_DAYS: i64 = 7;

/// A single bucketed sample, timestamp in unix seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesDatapoint {
    pub timestamp: i64,
    pub value: f64,
}

impl TimeSeriesDatapoint {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Usage, quota and recommendation for one resource of one entity.
///
/// `current_usage` always mirrors the last point of `series` (or 0 when the
/// series is empty); the series is only replaced through
/// [`ResourceUsage::with_series`] or [`ResourceUsage::set_series`].
pub struct ResourceUsage {
    pub resource_name: String,
    series: Vec<TimeSeriesDatapoint>,
    pub request: f64,
    pub limit: f64,
    current_usage: f64,
    optimized_usage: RwLock<f64>,
    pub status: Option<HealthStatus>,
}

impl ResourceUsage {
    /// Empty record with no samples and no quota
    pub fn new(resource_name: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            series: Vec::new(),
            request: 0.0,
            limit: 0.0,
            current_usage: 0.0,
            optimized_usage: RwLock::new(0.0),
            status: None,
        }
    }

    /// Record built from an ascending series of samples
    pub fn with_series(resource_name: impl Into<String>, series: Vec<TimeSeriesDatapoint>) -> Self {
        let mut usage = Self::new(resource_name);
        usage.set_series(series);
        usage
    }

    /// Replace the samples and current usage, keeping quota and optimized usage
    pub fn set_series(&mut self, series: Vec<TimeSeriesDatapoint>) {
        self.current_usage = series.last().map(|p| p.value).unwrap_or(0.0);
        self.series = series;
    }

    pub fn series(&self) -> &[TimeSeriesDatapoint] {
        &self.series
    }

    pub fn sample_count(&self) -> usize {
        self.series.len()
    }

    pub fn current_usage(&self) -> f64 {
        self.current_usage
    }

    /// Drop the raw samples but keep every scalar, including current usage
    pub fn clear_series(&mut self) {
        self.series = Vec::new();
    }

    /// Series values without timestamps, as sent for rightsizing
    pub fn values(&self) -> Vec<f64> {
        self.series.iter().map(|p| p.value).collect()
    }

    pub fn optimized_usage(&self) -> f64 {
        match self.optimized_usage.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set_optimized_usage(&self, value: f64) {
        match self.optimized_usage.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    /// Add another record's scalars into this one (used by pod rollup)
    pub(crate) fn accumulate(&mut self, other: &ResourceUsage, include_optimized: bool) {
        self.request += other.request;
        self.limit += other.limit;
        self.current_usage += other.current_usage;
        if include_optimized {
            let total = self.optimized_usage() + other.optimized_usage();
            self.set_optimized_usage(total);
        }
    }
}

impl Clone for ResourceUsage {
    fn clone(&self) -> Self {
        Self {
            resource_name: self.resource_name.clone(),
            series: self.series.clone(),
            request: self.request,
            limit: self.limit,
            current_usage: self.current_usage,
            optimized_usage: RwLock::new(self.optimized_usage()),
            status: self.status,
        }
    }
}

impl std::fmt::Debug for ResourceUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceUsage")
            .field("resource_name", &self.resource_name)
            .field("samples", &self.series.len())
            .field("request", &self.request)
            .field("limit", &self.limit)
            .field("current_usage", &self.current_usage)
            .field("optimized_usage", &self.optimized_usage())
            .field("status", &self.status)
            .finish()
    }
}

impl Serialize for ResourceUsage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ResourceUsage", 7)?;
        state.serialize_field("name", &self.resource_name)?;
        if self.series.is_empty() {
            state.skip_field("usage")?;
        } else {
            state.serialize_field("usage", &self.series)?;
        }
        state.serialize_field("request", &self.request)?;
        state.serialize_field("limit", &self.limit)?;
        state.serialize_field("current_usage", &self.current_usage)?;
        state.serialize_field("optimized_usage", &self.optimized_usage())?;
        match self.status {
            Some(status) => state.serialize_field("status", &status)?,
            None => state.skip_field("status")?,
        }
        state.end()
    }
}

/// A container of a pod, identified by (namespace, pod, container)
#[derive(Debug, Clone, Serialize)]
pub struct ContainerRecord {
    pub namespace: String,
    #[serde(rename = "pod_name")]
    pub pod: String,
    #[serde(rename = "container_name")]
    pub name: String,
    pub usages: BTreeMap<String, ResourceUsage>,
}

impl ContainerRecord {
    pub fn new(
        namespace: impl Into<String>,
        pod: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            name: name.into(),
            usages: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> String {
        container_key(&self.namespace, &self.pod, &self.name)
    }

    /// Key of the pod that owns this container
    pub fn pod_key(&self) -> String {
        pod_key(&self.namespace, &self.pod)
    }
}

/// A pod and the rolled-up usage of its containers
#[derive(Debug, Clone, Serialize)]
pub struct PodRecord {
    pub namespace: String,
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<ContainerRecord>,
    #[serde(rename = "usage")]
    pub usages: BTreeMap<String, ResourceUsage>,
}

impl PodRecord {
    /// Pod with zeroed totals for every pod resource
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let usages = POD_RESOURCES
            .iter()
            .map(|r| (r.to_string(), ResourceUsage::new(*r)))
            .collect();
        Self {
            namespace: namespace.into(),
            name: name.into(),
            containers: Vec::new(),
            usages,
        }
    }

    pub fn key(&self) -> String {
        pod_key(&self.namespace, &self.name)
    }
}

/// A virtual machine, identified by domain name
#[derive(Debug, Clone, Serialize)]
pub struct VmRecord {
    pub name: String,
    pub usages: BTreeMap<String, ResourceUsage>,
}

impl VmRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            usages: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> String {
        vm_key(&self.name)
    }
}

pub fn container_key(namespace: &str, pod: &str, container: &str) -> String {
    format!("{}_{}_{}", namespace, pod, container)
}

pub fn pod_key(namespace: &str, name: &str) -> String {
    format!("pod:{}-{}", namespace, name)
}

pub fn vm_key(name: &str) -> String {
    format!("vm:{}", name)
}

/// Forecast series of one container or vm, grouped by resource then by
/// forecast label (e.g. `yhat`, `yhat_upper`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastUsage {
    pub name: String,
    pub usage: BTreeMap<String, BTreeMap<String, Vec<TimeSeriesDatapoint>>>,
}

impl ForecastUsage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            usage: BTreeMap::new(),
        }
    }
}

/// Validated [start, end] range for a usage query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl QueryWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(RightsizingError::Validation(
                "the end time should be after the start time".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    /// Trailing window ending now
    pub fn last_days(days: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - Duration::days(days),
            end,
        }
    }

    /// Build a window from optional user-supplied bounds, defaulting to the
    /// last seven days
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        let now = Utc::now();
        let start = match start.filter(|s| !s.is_empty()) {
            Some(s) => parse_time(s)?,
            None => now - Duration::days(DEFAULT_WINDOW_DAYS),
        };
        let end = match end.filter(|s| !s.is_empty()) {
            Some(s) => parse_time(s)?,
            None => now,
        };
        Self::new(start, end)
    }

    /// Rebuild a window from job arguments
    pub fn from_args(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_time(start)?, parse_time(end)?)
    }

    /// Bounds formatted for job arguments
    pub fn to_args(&self) -> (String, String) {
        (
            self.start.format(ARG_TIME_FORMAT).to_string(),
            self.end.format(ARG_TIME_FORMAT).to_string(),
        )
    }
}

/// Parse RFC 3339, `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD HH:MM:SS` or a bare date
pub fn parse_time(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(input) {
        return Ok(t.with_timezone(&Utc));
    }
    for format in [ARG_TIME_FORMAT, "%Y-%m-%d %H:%M:%S"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(Utc.from_utc_datetime(&t));
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(t) = d.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&t));
        }
    }
    Err(RightsizingError::Validation(format!(
        "unrecognised time format: {}",
        input
    )))
}
