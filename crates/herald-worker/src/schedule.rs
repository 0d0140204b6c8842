use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use herald_core::cron::next_fire_time;
use herald_store::{CrontabQueue, StoreError};
use tracing::{debug, error, info};

use crate::error::WorkerError;
use crate::retry::{retry_if, DEFAULT_MAX_ELAPSED};
use crate::store::blocking;
use crate::Worker;

/// Claims a due crontab tick, starts its job, and moves the crontab on.
pub struct ScheduleWorker {
    name: String,
    lease_minutes: u32,
    retry_budget: Duration,
    queue: Arc<dyn CrontabQueue>,
}

impl ScheduleWorker {
    pub fn new(name: impl Into<String>, lease_minutes: u32, queue: Arc<dyn CrontabQueue>) -> Self {
        Self {
            name: name.into(),
            lease_minutes,
            retry_budget: DEFAULT_MAX_ELAPSED,
            queue,
        }
    }

    /// Budget for retrying the advance write on transient store errors.
    pub fn with_retry_budget(mut self, budget: Duration) -> Self {
        self.retry_budget = budget;
        self
    }
}

#[async_trait]
impl Worker for ScheduleWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_once(&self) -> Result<bool, WorkerError> {
        let queue = self.queue.clone();
        let owner = self.name.clone();
        let lease_minutes = self.lease_minutes;
        let claimed = match blocking(move || queue.claim_schedule(&owner, lease_minutes)).await {
            Ok(Some(claimed)) => claimed,
            Ok(None) => {
                debug!(worker = %self.name, "no crontabs due");
                return Ok(false);
            }
            Err(e) => {
                error!(worker = %self.name, error = %e, "failed to claim crontab");
                return Err(WorkerError::Claim(e));
            }
        };
        let crontab_id = claimed.crontab.id;
        let schedule_id = claimed.schedule.id;

        // Always step from the stored next, never from now, so missed ticks
        // are worked through one at a time.
        let new_next = match next_fire_time(&claimed.crontab.expression, claimed.crontab.next) {
            Ok(next) => next,
            Err(source) => {
                error!(
                    worker = %self.name,
                    crontab_id = %crontab_id,
                    expression = %claimed.crontab.expression,
                    error = %source,
                    "skipping crontab: expression does not parse"
                );
                return Err(WorkerError::InvalidCrontab { crontab_id, source });
            }
        };

        let advanced = retry_if(self.retry_budget, StoreError::is_transient, || {
            let queue = self.queue.clone();
            let token = claimed.token.clone();
            blocking(move || queue.start_job_and_advance(crontab_id, schedule_id, &token, new_next))
        })
        .await;

        match advanced {
            Ok(job_id) => {
                info!(
                    worker = %self.name,
                    crontab_id = %crontab_id,
                    schedule_id = %schedule_id,
                    job_id = %job_id,
                    fired = %claimed.crontab.next,
                    next = %new_next,
                    "crontab tick started job"
                );
                Ok(true)
            }
            Err(source) => {
                error!(
                    worker = %self.name,
                    crontab_id = %crontab_id,
                    error = %source,
                    "failed to start job and advance crontab"
                );
                Err(WorkerError::Advance { crontab_id, source })
            }
        }
    }
}
