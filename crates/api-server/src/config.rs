//! Server configuration

use anyhow::Result;
use rightsizing_lib::aggregation::EngineConfig;
use rightsizing_lib::inference::GatewayConfig;
use rightsizing_lib::jobs::{DedupConfig, QueueConfig};
use rightsizing_lib::source::TimescaleConfig;
use rightsizing_lib::summary::SummaryConfig;
use serde::Deserialize;
use std::time::Duration;

/// Server configuration, read from `RIGHTSIZING_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port for health/metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Metric store connection string
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,

    /// Inference service gRPC endpoint
    #[serde(default = "default_inference_endpoint")]
    pub inference_endpoint: String,

    /// Budget for the inference calls of one request or job
    #[serde(default = "default_inference_timeout")]
    pub inference_timeout_secs: u64,

    /// How long a forecast job stays attached to its pod or vm
    #[serde(default = "default_job_ttl")]
    pub job_ttl_secs: u64,

    #[serde(default = "default_job_retry_count")]
    pub job_retry_count: u32,

    /// Forecast jobs run concurrently
    #[serde(default = "default_worker_slots")]
    pub worker_slots: usize,

    #[serde(default = "default_summary_ttl")]
    pub summary_ttl_secs: u64,

    #[serde(default = "default_summary_window_days")]
    pub summary_window_days: i64,

    /// Series shorter than this are not rightsized
    #[serde(default = "default_min_rightsizing_samples")]
    pub min_rightsizing_samples: usize,

    /// Quota rows older than this are ignored
    #[serde(default = "default_quota_recency")]
    pub quota_recency_mins: u64,
}

fn default_api_port() -> u16 {
    8000
}

fn default_database_url() -> String {
    TimescaleConfig::default().database_url
}

fn default_database_max_connections() -> u32 {
    5
}

fn default_inference_endpoint() -> String {
    GatewayConfig::default().endpoint
}

fn default_inference_timeout() -> u64 {
    30
}

fn default_job_ttl() -> u64 {
    600
}

fn default_job_retry_count() -> u32 {
    1
}

fn default_worker_slots() -> usize {
    1
}

fn default_summary_ttl() -> u64 {
    300
}

fn default_summary_window_days() -> i64 {
    7
}

fn default_min_rightsizing_samples() -> usize {
    100
}

fn default_quota_recency() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            database_url: default_database_url(),
            database_max_connections: default_database_max_connections(),
            inference_endpoint: default_inference_endpoint(),
            inference_timeout_secs: default_inference_timeout(),
            job_ttl_secs: default_job_ttl(),
            job_retry_count: default_job_retry_count(),
            worker_slots: default_worker_slots(),
            summary_ttl_secs: default_summary_ttl(),
            summary_window_days: default_summary_window_days(),
            min_rightsizing_samples: default_min_rightsizing_samples(),
            quota_recency_mins: default_quota_recency(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("RIGHTSIZING"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn timescale(&self) -> TimescaleConfig {
        TimescaleConfig {
            database_url: self.database_url.clone(),
            max_connections: self.database_max_connections,
            quota_recency: Duration::from_secs(self.quota_recency_mins * 60),
            ..Default::default()
        }
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            endpoint: self.inference_endpoint.clone(),
            ..Default::default()
        }
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            min_rightsizing_samples: self.min_rightsizing_samples,
            inference_timeout: Duration::from_secs(self.inference_timeout_secs),
            ..Default::default()
        }
    }

    pub fn queue(&self) -> QueueConfig {
        QueueConfig {
            worker_slots: self.worker_slots.max(1),
            results_expire_in: Duration::from_secs(self.job_ttl_secs),
            ..Default::default()
        }
    }

    pub fn dedup(&self) -> DedupConfig {
        DedupConfig {
            ttl: Duration::from_secs(self.job_ttl_secs),
            retry_count: self.job_retry_count,
        }
    }

    pub fn summary(&self) -> SummaryConfig {
        SummaryConfig {
            window_days: self.summary_window_days,
            ttl: Duration::from_secs(self.summary_ttl_secs),
        }
    }
}
