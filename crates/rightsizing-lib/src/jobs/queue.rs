//! In-process task queue
//!
//! Jobs are dispatched to a fixed number of worker slots, one job at a time
//! per slot. Retryable failures are re-run up to the job's retry count.
//! Queued and running jobs never expire; state and results are kept for
//! `results_expire_in` after the job reaches a terminal state.

use super::{JobSpec, JobState, TaskHandler, TaskQueue};
use crate::cache::TtlCache;
use crate::error::{Result, RightsizingError};
use crate::observability::{ServerMetrics, StructuredLogger};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Configuration for the local task queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of jobs run concurrently
    pub worker_slots: usize,
    /// How long job state and results stay queryable
    pub results_expire_in: Duration,
    /// Pause before a retry attempt
    pub retry_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_slots: 1,
            results_expire_in: Duration::from_secs(600),
            retry_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
struct JobRecord {
    task: String,
    state: JobState,
    attempts: u32,
    result: Option<String>,
    error: Option<String>,
}

impl JobRecord {
    fn pending(task: &str) -> Self {
        Self {
            task: task.to_string(),
            state: JobState::Pending,
            attempts: 0,
            result: None,
            error: None,
        }
    }
}

struct QueuedJob {
    id: String,
    spec: JobSpec,
}

/// Task queue running registered handlers on tokio workers
pub struct LocalTaskQueue {
    config: QueueConfig,
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    jobs: TtlCache<JobRecord>,
    sender: mpsc::UnboundedSender<QueuedJob>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<QueuedJob>>>,
    shutdown: watch::Sender<bool>,
    logger: StructuredLogger,
    metrics: ServerMetrics,
}

impl LocalTaskQueue {
    pub fn new(config: QueueConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);
        Self {
            jobs: TtlCache::new(config.results_expire_in),
            config,
            handlers: HashMap::new(),
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            shutdown,
            logger: StructuredLogger::new("task-queue"),
            metrics: ServerMetrics::new(),
        }
    }

    /// Register the handler run for jobs named `name`
    pub fn register(mut self, name: impl Into<String>, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    /// Spawn the worker slots
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        info!(
            workers = self.config.worker_slots,
            tasks = ?self.handlers.keys().collect::<Vec<_>>(),
            "Starting task queue workers"
        );
        (0..self.config.worker_slots.max(1))
            .map(|slot| tokio::spawn(Arc::clone(self).worker(slot)))
            .collect()
    }

    /// Stop the workers after their current job
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Drop finished jobs whose results have expired
    pub fn purge_expired(&self) -> usize {
        let purged = self.jobs.purge_expired();
        if purged > 0 {
            debug!(purged, "Expired job records dropped");
        }
        purged
    }

    #[cfg(test)]
    pub(crate) fn failure_reason(&self, job_id: &str) -> Option<String> {
        self.jobs.get(job_id).and_then(|record| record.error)
    }

    #[cfg(test)]
    pub(crate) fn stored_jobs(&self) -> usize {
        self.jobs.len()
    }

    async fn worker(self: Arc<Self>, slot: usize) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            let next = {
                let mut receiver = self.receiver.lock().await;
                tokio::select! {
                    job = receiver.recv() => job,
                    _ = shutdown.wait_for(|stop| *stop) => None,
                }
            };
            match next {
                Some(job) => self.execute(job).await,
                None => break,
            }
        }
        debug!(slot, "Task queue worker stopped");
    }

    /// Apply `apply` to the job's record and store it: pinned while the
    /// job is live, with the results TTL once it is terminal
    fn update(&self, job_id: &str, task: &str, apply: impl FnOnce(&mut JobRecord)) {
        let mut record = self
            .jobs
            .get(job_id)
            .unwrap_or_else(|| JobRecord::pending(task));
        apply(&mut record);
        if record.state.is_terminal() {
            self.jobs.set(job_id, record);
        } else {
            self.jobs.pin(job_id, record);
        }
    }

    async fn execute(&self, job: QueuedJob) {
        let QueuedJob { id, spec } = job;
        let Some(handler) = self.handlers.get(&spec.name).cloned() else {
            let error = format!("no handler registered for {}", spec.name);
            self.logger.log_job_error(&id, &spec.name, 0, &error, false);
            self.finish(&id, &spec.name, Err(error));
            return;
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.update(&id, &spec.name, |record| {
                record.state = JobState::Started;
                record.attempts = attempt;
            });
            self.logger.log_job_started(&id, &spec.name, attempt);

            let start = Instant::now();
            match handler.run(&spec.args).await {
                Ok(result) => {
                    self.logger
                        .log_job_finished(&id, &spec.name, start.elapsed().as_millis());
                    self.finish(&id, &spec.name, Ok(result));
                    return;
                }
                Err(e) => {
                    let will_retry = e.is_retryable() && attempt <= spec.retry_count;
                    self.logger
                        .log_job_error(&id, &spec.name, attempt, &e.to_string(), will_retry);
                    if !will_retry {
                        self.finish(&id, &spec.name, Err(e.to_string()));
                        return;
                    }
                    self.update(&id, &spec.name, |record| record.state = JobState::Retry);
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }

    fn finish(&self, job_id: &str, task: &str, outcome: std::result::Result<String, String>) {
        let state = match outcome {
            Ok(result) => {
                self.update(job_id, task, |record| {
                    record.state = JobState::Success;
                    record.result = Some(result);
                });
                JobState::Success
            }
            Err(error) => {
                self.update(job_id, task, |record| {
                    record.state = JobState::Failure;
                    record.error = Some(error);
                });
                JobState::Failure
            }
        };
        self.metrics.inc_jobs_finished(task, state.as_str());
    }
}

#[async_trait]
impl TaskQueue for LocalTaskQueue {
    async fn submit(&self, spec: JobSpec) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.jobs.pin(id.clone(), JobRecord::pending(&spec.name));

        self.logger.log_job_submitted(&id, &spec.name, &spec.args);
        self.metrics.inc_jobs_submitted(&spec.name);

        if self
            .sender
            .send(QueuedJob {
                id: id.clone(),
                spec,
            })
            .is_err()
        {
            self.jobs.remove(&id);
            return Err(RightsizingError::upstream("task-queue", "queue is closed"));
        }
        Ok(id)
    }

    async fn state(&self, job_id: &str) -> Result<JobState> {
        self.jobs
            .get(job_id)
            .map(|record| record.state)
            .ok_or_else(|| RightsizingError::not_found("job", job_id))
    }

    async fn result(&self, job_id: &str) -> Result<Option<String>> {
        let record = self
            .jobs
            .get(job_id)
            .ok_or_else(|| RightsizingError::not_found("job", job_id))?;
        debug!(
            job_id = %job_id,
            task = %record.task,
            state = %record.state,
            attempts = record.attempts,
            "Job result requested"
        );
        Ok(match record.state {
            JobState::Success => record.result,
            _ => None,
        })
    }
}
