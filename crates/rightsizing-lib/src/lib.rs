//! Rightsizing library for pod and vm resource recommendations
//!
//! This crate provides the core functionality for:
//! - Usage and quota retrieval from the metric store
//! - Aggregation of container series into pod and vm records
//! - Rightsizing and forecasting through the inference service
//! - Deduplicated asynchronous forecast jobs
//! - Cluster summaries, health checks and observability

pub mod aggregation;
pub mod cache;
pub mod error;
pub mod health;
pub mod inference;
pub mod jobs;
pub mod models;
pub mod observability;
pub mod proto;
pub mod service;
pub mod source;
pub mod status;
pub mod summary;

#[cfg(test)]
mod testing;

pub use error::{Result, RightsizingError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ServerMetrics, StructuredLogger};
pub use service::{ForecastMap, PodService, VmService};
