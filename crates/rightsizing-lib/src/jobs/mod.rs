//! Asynchronous forecast jobs
//!
//! This module provides:
//! - `TaskQueue`, the seam to a task queue backend, and `LocalTaskQueue`,
//!   an in-process worker pool with retries and lifecycle hooks
//! - `JobDeduplicator`, which keeps at most one live job per logical key
//! - The forecast payload codec and the forecast task handlers

mod codec;
mod dedup;
mod forecast;
mod queue;

pub use codec::{decode_forecast, encode_forecast};
pub use dedup::{DedupConfig, JobDeduplicator, JobHandle};
pub use forecast::{PodForecastTask, VmForecastTask, FORECAST_POD_TASK, FORECAST_VM_TASK};
pub use queue::{LocalTaskQueue, QueueConfig};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A named job with string arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub args: Vec<String>,
    /// Extra attempts after the first failure
    pub retry_count: u32,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, args: Vec<String>, retry_count: u32) -> Self {
        Self {
            name: name.into(),
            args,
            retry_count,
        }
    }
}

/// Job state as reported by the queue backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Pending,
    Started,
    Retry,
    Success,
    Failure,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Started => "STARTED",
            JobState::Retry => "RETRY",
            JobState::Success => "SUCCESS",
            JobState::Failure => "FAILURE",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failure)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task queue backend
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a job and return its id
    async fn submit(&self, spec: JobSpec) -> Result<String>;

    /// Current state; unknown or expired ids are `NotFound`
    async fn state(&self, job_id: &str) -> Result<JobState>;

    /// The opaque result of a successful job, `None` in any other state
    async fn result(&self, job_id: &str) -> Result<Option<String>>;
}

/// Work executed for one job name
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the job and return its opaque result
    async fn run(&self, args: &[String]) -> Result<String>;
}
