//! gRPC client for the forecasting / rightsizing service
//!
//! Holds one lazily-connected channel shared by both service stubs and
//! drops it after transport failures so the next call reconnects.

use super::{InferenceGateway, NamedSeries};
use crate::error::{Result, RightsizingError};
use crate::models::TimeSeriesDatapoint;
use crate::proto::{self, ForecastClient, ForecastRequest, RightsizingClient, RightsizingRequest};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tonic::transport::Channel;
use tracing::{debug, info, warn};

/// Configuration for the inference client
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Service endpoint (e.g., "http://rightsizing-inference:50051")
    pub endpoint: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Keepalive interval
    pub keepalive_interval: Duration,
    /// Keepalive timeout
    pub keepalive_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:50051".to_string(),
            connect_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(10),
        }
    }
}

/// Connection state for health reporting
#[derive(Debug, Clone, Default)]
struct ConnectionState {
    connected: bool,
    last_error: Option<String>,
    failures: u32,
}

/// Inference gateway over a tonic channel
pub struct GrpcInferenceClient {
    config: GatewayConfig,
    channel: Arc<RwLock<Option<Channel>>>,
    connection_state: Arc<RwLock<ConnectionState>>,
}

impl GrpcInferenceClient {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            channel: Arc::new(RwLock::new(None)),
            connection_state: Arc::new(RwLock::new(ConnectionState::default())),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    async fn create_channel(&self) -> Result<Channel> {
        let channel = Channel::from_shared(self.config.endpoint.clone())
            .map_err(|e| RightsizingError::upstream("inference", e.to_string()))?
            .connect_timeout(self.config.connect_timeout)
            .http2_keep_alive_interval(self.config.keepalive_interval)
            .keep_alive_timeout(self.config.keepalive_timeout)
            .keep_alive_while_idle(true)
            .connect()
            .await?;
        Ok(channel)
    }

    /// Get or create a connected channel
    async fn get_channel(&self) -> Result<Channel> {
        {
            let channel = self.channel.read().await;
            if let Some(ch) = channel.as_ref() {
                return Ok(ch.clone());
            }
        }

        let new_channel = self.create_channel().await?;

        let mut channel = self.channel.write().await;
        *channel = Some(new_channel.clone());

        let mut state = self.connection_state.write().await;
        state.connected = true;
        state.last_error = None;

        info!(endpoint = %self.config.endpoint, "Connected to inference service");

        Ok(new_channel)
    }

    async fn handle_failure(&self, error: &RightsizingError) {
        let mut state = self.connection_state.write().await;
        state.connected = false;
        state.failures += 1;
        state.last_error = Some(error.to_string());

        let mut channel = self.channel.write().await;
        *channel = None;

        warn!(
            error = %error,
            failures = state.failures,
            "Inference call failed, channel reset"
        );
    }

    pub async fn is_connected(&self) -> bool {
        self.connection_state.read().await.connected
    }

    /// (connected, failures, last error)
    pub async fn connection_stats(&self) -> (bool, u32, Option<String>) {
        let state = self.connection_state.read().await;
        (state.connected, state.failures, state.last_error.clone())
    }

    /// Run one call under the caller's deadline, resetting the channel on
    /// transport-level failures.
    async fn call<T, F, Fut>(&self, deadline: Instant, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(Channel, Duration) -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, tonic::Status>>,
    {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(RightsizingError::upstream(
                "inference",
                format!("{} deadline already expired", op),
            ));
        }

        // dialing counts against the same deadline as the call itself
        let connected = tokio::time::timeout_at(deadline, self.get_channel())
            .await
            .unwrap_or_else(|_| {
                Err(RightsizingError::upstream(
                    "inference",
                    format!("{} deadline exceeded while connecting", op),
                ))
            });
        let channel = match connected {
            Ok(ch) => ch,
            Err(e) => {
                self.handle_failure(&e).await;
                return Err(e);
            }
        };
        let remaining = deadline.saturating_duration_since(Instant::now());

        let start = std::time::Instant::now();
        let result = match tokio::time::timeout_at(deadline, f(channel, remaining)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(status)) => {
                let transport = matches!(
                    status.code(),
                    tonic::Code::Unavailable | tonic::Code::Unknown
                );
                let err = RightsizingError::from(status);
                if transport {
                    self.handle_failure(&err).await;
                }
                Err(err)
            }
            Err(_) => Err(RightsizingError::upstream(
                "inference",
                format!("{} deadline exceeded", op),
            )),
        };

        debug!(
            op,
            elapsed_ms = start.elapsed().as_millis(),
            ok = result.is_ok(),
            "Inference call completed"
        );
        result
    }
}

fn to_proto_points(series: &[TimeSeriesDatapoint]) -> Vec<proto::TimeSeriesDatapoint> {
    series
        .iter()
        .map(|p| proto::TimeSeriesDatapoint {
            timestamp: p.timestamp,
            value: p.value,
        })
        .collect()
}

fn from_proto_points(points: Vec<proto::TimeSeriesDatapoint>) -> Vec<TimeSeriesDatapoint> {
    points
        .into_iter()
        .map(|p| TimeSeriesDatapoint::new(p.timestamp, p.value))
        .collect()
}

#[async_trait]
impl InferenceGateway for GrpcInferenceClient {
    async fn forecast(
        &self,
        series: &[TimeSeriesDatapoint],
        deadline: Instant,
    ) -> Result<Vec<NamedSeries>> {
        let data = to_proto_points(series);
        let response = self
            .call(deadline, "forecast", |channel, remaining| async move {
                let mut request = tonic::Request::new(ForecastRequest {
                    id: uuid::Uuid::new_v4().to_string(),
                    data,
                });
                request.set_timeout(remaining);
                ForecastClient::new(channel).forecast(request).await
            })
            .await?;

        Ok(response
            .into_inner()
            .result
            .into_iter()
            .map(|r| NamedSeries {
                name: r.name,
                points: from_proto_points(r.data),
            })
            .collect())
    }

    async fn rightsize(&self, values: &[f64], deadline: Instant) -> Result<f64> {
        let data = values.to_vec();
        let response = self
            .call(deadline, "rightsizing", |channel, remaining| async move {
                let mut request = tonic::Request::new(RightsizingRequest {
                    id: uuid::Uuid::new_v4().to_string(),
                    data,
                });
                request.set_timeout(remaining);
                RightsizingClient::new(channel).rightsizing(request).await
            })
            .await?;

        Ok(response.into_inner().result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_config_default() {
        let config = GatewayConfig::default();
        assert_eq!(config.endpoint, "http://localhost:50051");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_point_conversion_keeps_order() {
        let points = vec![
            TimeSeriesDatapoint::new(600, 1.0),
            TimeSeriesDatapoint::new(1200, 2.0),
        ];
        assert_eq!(from_proto_points(to_proto_points(&points)), points);
    }

    #[tokio::test]
    async fn test_expired_deadline_fails_without_connecting() {
        let client = GrpcInferenceClient::new(GatewayConfig::default());
        let err = client
            .rightsize(&[1.0, 2.0], Instant::now() - Duration::from_millis(1))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert!(!client.is_connected().await);
        let (_, failures, _) = client.connection_stats().await;
        assert_eq!(failures, 0);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_upstream_error() {
        let client = GrpcInferenceClient::new(GatewayConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            connect_timeout: Duration::from_millis(200),
            ..Default::default()
        });
        let err = client
            .forecast(&[], Instant::now() + Duration::from_secs(2))
            .await
            .unwrap_err();

        assert!(matches!(err, RightsizingError::Upstream { .. }));
        let (connected, failures, last_error) = client.connection_stats().await;
        assert!(!connected);
        assert_eq!(failures, 1);
        assert!(last_error.is_some());
    }

    #[tokio::test]
    async fn test_connect_is_bounded_by_caller_deadline() {
        // blackholed address: only the deadline can end the dial early
        let client = GrpcInferenceClient::new(GatewayConfig {
            endpoint: "http://10.255.255.1:50051".to_string(),
            connect_timeout: Duration::from_secs(10),
            ..Default::default()
        });
        let start = Instant::now();
        let err = client
            .rightsize(&[1.0], start + Duration::from_millis(100))
            .await
            .unwrap_err();

        assert!(matches!(err, RightsizingError::Upstream { .. }));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(!client.is_connected().await);
    }
}
