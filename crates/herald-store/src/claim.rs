//! The claim/lease contract the workers are written against.
//!
//! A claim marks one row as owned by a named worker until `now + lease`. While
//! the lease is valid no other claimant can take the row; once it lapses the
//! row is claimable again, which is how work held by a crashed worker gets
//! redelivered.

use chrono::{DateTime, Utc};
use herald_core::types::{ClaimToken, ClaimedCrontab, CrontabId, Job, JobId, ScheduleId};

use crate::error::Result;

/// Claiming and completing one-off jobs.
pub trait JobQueue: Send + Sync {
    /// Claim the oldest due job that has no response and no valid claim.
    ///
    /// `Ok(None)` means there was nothing to claim (or another worker won the
    /// race), which is not an error.
    fn claim_job(&self, owner: &str, lease_minutes: u32) -> Result<Option<Job>>;

    /// Record the terminal response for a job.
    ///
    /// The claim is not re-validated. Only the first response per job is kept;
    /// a later write is logged and dropped.
    fn complete_job(&self, job_id: JobId, response: &str, error: Option<&str>) -> Result<()>;
}

/// Claiming and advancing crontab ticks.
pub trait CrontabQueue: Send + Sync {
    /// Claim the most overdue crontab under an active schedule, minting a
    /// fresh fencing token for it.
    fn claim_schedule(&self, owner: &str, lease_minutes: u32) -> Result<Option<ClaimedCrontab>>;

    /// Atomically start the tick's job and move the crontab on to `new_next`,
    /// releasing the claim.
    ///
    /// Fails with [`StoreError::ClaimLost`](crate::StoreError::ClaimLost) and
    /// changes nothing if `token` no longer denotes a valid claim.
    fn start_job_and_advance(
        &self,
        crontab_id: CrontabId,
        schedule_id: ScheduleId,
        token: &ClaimToken,
        new_next: DateTime<Utc>,
    ) -> Result<JobId>;
}
