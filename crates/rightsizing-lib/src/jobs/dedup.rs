//! One live job per logical key
//!
//! The key -> job id mapping lives in the shared TTL cache. The first
//! caller for a key inserts an empty handle atomically and submits;
//! concurrent callers for the same key wait on that handle instead of
//! submitting again.

use super::{decode_forecast, JobSpec, JobState, TaskQueue};
use crate::cache::{CacheValue, SharedCache};
use crate::error::{Result, RightsizingError};
use crate::models::ForecastUsage;
use crate::observability::{ServerMetrics, StructuredLogger};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

/// Configuration for job deduplication
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// How long a key keeps pointing at its job
    pub ttl: Duration,
    /// Retry count given to submitted jobs
    pub retry_count: u32,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            retry_count: 1,
        }
    }
}

/// Job id of a logical key, filled once by the submitting caller
pub type JobHandle = Arc<OnceCell<String>>;

/// Submits jobs at most once per logical key within the TTL
pub struct JobDeduplicator {
    queue: Arc<dyn TaskQueue>,
    cache: SharedCache,
    config: DedupConfig,
    logger: StructuredLogger,
    metrics: ServerMetrics,
}

impl JobDeduplicator {
    pub fn new(queue: Arc<dyn TaskQueue>, cache: SharedCache, config: DedupConfig) -> Self {
        Self {
            queue,
            cache,
            config,
            logger: StructuredLogger::new("job-dedup"),
            metrics: ServerMetrics::new(),
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.config.retry_count
    }

    /// Job id for `key`, submitting `spec` only if no live job exists
    pub async fn submit(&self, key: &str, spec: JobSpec) -> Result<String> {
        let fresh = CacheValue::Job(Arc::new(OnceCell::new()));
        let handle = match self.cache.insert_if_absent(key, fresh, self.config.ttl).0 {
            CacheValue::Job(handle) => handle,
            CacheValue::Summary(_) => {
                return Err(RightsizingError::Validation(format!(
                    "cache key {} is not a job key",
                    key
                )))
            }
        };

        let submitted = AtomicBool::new(false);
        let job_id = handle
            .get_or_try_init(|| {
                submitted.store(true, Ordering::SeqCst);
                self.queue.submit(spec)
            })
            .await?
            .clone();

        if submitted.load(Ordering::SeqCst) {
            debug!(key = %key, job_id = %job_id, "Submitted job for key");
        } else {
            self.metrics.inc_jobs_deduplicated();
            self.logger.log_job_reused(key, &job_id);
        }
        Ok(job_id)
    }

    /// Job id currently cached for `key`
    pub fn job_id(&self, key: &str) -> Result<String> {
        let job_id = match self.cache.get(key) {
            Some(CacheValue::Job(handle)) => handle.get().cloned(),
            _ => None,
        };
        job_id.ok_or_else(|| RightsizingError::not_found("job", key))
    }

    pub async fn status(&self, job_id: &str) -> Result<JobState> {
        self.queue.state(job_id).await
    }

    /// Decoded result, `None` while the job has not succeeded
    pub async fn result(&self, job_id: &str) -> Result<Option<Vec<ForecastUsage>>> {
        match self.queue.result(job_id).await? {
            Some(payload) => decode_forecast(&payload).map(Some),
            None => Ok(None),
        }
    }

    /// Status of the job cached for `key`. A job still in flight keeps its
    /// key alive so it is not resubmitted while running.
    pub async fn status_by_key(&self, key: &str) -> Result<JobState> {
        let job_id = self.job_id(key)?;
        let state = self.status(&job_id).await?;
        if !state.is_terminal() {
            self.cache.touch(key, self.config.ttl);
        }
        Ok(state)
    }

    pub async fn result_by_key(&self, key: &str) -> Result<Option<Vec<ForecastUsage>>> {
        let job_id = self.job_id(key)?;
        self.result(&job_id).await
    }
}
