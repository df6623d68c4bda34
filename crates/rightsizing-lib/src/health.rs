//! Component health for the liveness and readiness endpoints
//!
//! The registry holds one entry per server component (metric store,
//! inference service, task queue). Services report upstream failures and
//! successes into it; `/healthz` and `/readyz` read it back.

use crate::error::{Result, RightsizingError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Failing calls, but still serving
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    /// Healthy and degraded components still answer liveness checks
    pub fn is_operational(&self) -> bool {
        !matches!(self, ComponentStatus::Unhealthy)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

/// Worst status across components; an empty registry is healthy
fn overall_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
    components
        .values()
        .map(|health| health.status)
        .fold(ComponentStatus::Healthy, |worst, status| match (worst, status) {
            (ComponentStatus::Unhealthy, _) | (_, ComponentStatus::Unhealthy) => {
                ComponentStatus::Unhealthy
            }
            (ComponentStatus::Degraded, _) | (_, ComponentStatus::Degraded) => {
                ComponentStatus::Degraded
            }
            _ => ComponentStatus::Healthy,
        })
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub mod components {
    pub const METRIC_STORE: &str = "metric_store";
    pub const INFERENCE: &str = "inference";
    pub const TASK_QUEUE: &str = "task_queue";

    pub const ALL: &[&str] = &[METRIC_STORE, INFERENCE, TASK_QUEUE];

    /// Component behind an upstream source name
    pub fn for_source(source_name: &str) -> &'static str {
        match source_name {
            "metric-store" => METRIC_STORE,
            "inference" => INFERENCE,
            _ => TASK_QUEUE,
        }
    }
}

/// Shared component health; clones see the same state
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start every server component out healthy
    pub async fn register_all(&self) {
        let mut registered = self.components.write().await;
        for name in components::ALL {
            registered.insert(
                name.to_string(),
                ComponentHealth::new(ComponentStatus::Healthy, None),
            );
        }
    }

    async fn update(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        self.components
            .write()
            .await
            .insert(name.to_string(), ComponentHealth::new(status, message));
    }

    /// Mark the component behind an upstream failure as degraded
    pub async fn record_failure(&self, error: &RightsizingError) {
        if let RightsizingError::Upstream {
            source_name,
            message,
        } = error
        {
            self.set_degraded(components::for_source(source_name), message.clone())
                .await;
        }
    }

    /// Record the outcome of a call against a component. Not-found style
    /// failures say nothing about reachability and leave the status alone.
    pub async fn observe<T>(&self, name: &str, result: &Result<T>) {
        match result {
            Ok(_) => self.set_healthy(name).await,
            Err(e) if e.is_retryable() => self.set_degraded(name, e.to_string()).await,
            Err(_) => {}
        }
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        HealthResponse {
            status: overall_status(&components),
            components,
        }
    }

    /// Ready once startup finished and no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let reason = if !*self.ready.read().await {
            Some("Server not yet initialized")
        } else if !self.health().await.status.is_operational() {
            Some("Critical component unhealthy")
        } else {
            None
        };
        ReadinessResponse {
            ready: reason.is_none(),
            reason: reason.map(str::to_string),
        }
    }
}
