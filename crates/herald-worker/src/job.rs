use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use herald_executor::{Executor, ExecutorError};
use herald_store::JobQueue;
use tracing::{debug, error, info, warn};

use crate::error::WorkerError;
use crate::retry::{retry, retry_if, DEFAULT_MAX_ELAPSED};
use crate::store::blocking;
use crate::Worker;

/// Claims a due job, executes it, and records the outcome.
pub struct JobWorker {
    name: String,
    lease_minutes: u32,
    retry_budget: Duration,
    queue: Arc<dyn JobQueue>,
    executor: Arc<dyn Executor>,
}

impl JobWorker {
    pub fn new(
        name: impl Into<String>,
        lease_minutes: u32,
        queue: Arc<dyn JobQueue>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            name: name.into(),
            lease_minutes,
            retry_budget: DEFAULT_MAX_ELAPSED,
            queue,
            executor,
        }
    }

    /// Budget for each of the two retried calls (execute, complete).
    ///
    /// Keep it well under the lease, or another worker may redeliver the job
    /// while this one is still retrying.
    pub fn with_retry_budget(mut self, budget: Duration) -> Self {
        self.retry_budget = budget;
        self
    }
}

#[async_trait]
impl Worker for JobWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_once(&self) -> Result<bool, WorkerError> {
        let queue = self.queue.clone();
        let owner = self.name.clone();
        let lease_minutes = self.lease_minutes;
        let job = match blocking(move || queue.claim_job(&owner, lease_minutes)).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                debug!(worker = %self.name, "no jobs due");
                return Ok(false);
            }
            Err(e) => {
                error!(worker = %self.name, error = %e, "failed to claim job");
                return Err(WorkerError::Claim(e));
            }
        };
        info!(worker = %self.name, job_id = %job.id, arn = %job.arn, "executing job");

        let executor = &self.executor;
        let (arn, payload) = (job.arn.as_str(), job.payload.as_str());
        let executed = retry_if(self.retry_budget, ExecutorError::is_transient, move || {
            executor.execute(arn, payload)
        })
        .await;

        let execution_error = executed.as_ref().err().map(|e| e.to_string());
        if let Some(message) = &execution_error {
            warn!(worker = %self.name, job_id = %job.id, error = %message, "job execution failed");
        }

        // A failed execution is still terminal: it is recorded as an error response.
        let job_id = job.id;
        let response = executed.as_deref().unwrap_or_default().to_string();
        let completed = retry(self.retry_budget, || {
            let queue = self.queue.clone();
            let response = response.clone();
            let error = execution_error.clone();
            blocking(move || queue.complete_job(job_id, &response, error.as_deref()))
        })
        .await;

        match (executed, completed) {
            (Ok(_), Ok(())) => {
                info!(worker = %self.name, job_id = %job.id, "job complete");
                Ok(true)
            }
            (Ok(_), Err(completion)) => {
                error!(worker = %self.name, job_id = %job.id, error = %completion, "failed to record job response");
                Err(WorkerError::Completion(completion))
            }
            (Err(execution), Ok(())) => Err(WorkerError::Execution(execution)),
            (Err(execution), Err(completion)) => {
                error!(worker = %self.name, job_id = %job.id, error = %completion, "failed to record job error response");
                Err(WorkerError::ExecutionAndCompletion {
                    execution,
                    completion,
                })
            }
        }
    }
}
