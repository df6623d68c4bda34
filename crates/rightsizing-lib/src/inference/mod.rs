//! Inference service gateway
//!
//! The forecasting and optimal-usage algorithms run in a remote service;
//! this module only defines the calls and a gRPC client for them. Every
//! call carries a caller-supplied deadline.

mod client;

pub use client::{GatewayConfig, GrpcInferenceClient};

use crate::error::Result;
use crate::models::TimeSeriesDatapoint;
use async_trait::async_trait;
use tokio::time::Instant;

/// One labelled forecast series (e.g. `yhat`, `yhat_lower`)
#[derive(Debug, Clone, PartialEq)]
pub struct NamedSeries {
    pub name: String,
    pub points: Vec<TimeSeriesDatapoint>,
}

/// Remote forecasting and rightsizing operations
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    /// Forecast a usage series; returns every labelled series the service
    /// produced.
    async fn forecast(
        &self,
        series: &[TimeSeriesDatapoint],
        deadline: Instant,
    ) -> Result<Vec<NamedSeries>>;

    /// Optimal usage value for a series of samples
    async fn rightsize(&self, values: &[f64], deadline: Instant) -> Result<f64>;
}
