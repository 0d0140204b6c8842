use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration, SubsecRound};
use herald_core::clock::{Clock, SystemClock};
use herald_core::types::{ClaimToken, Job, JobId, JobResponse, JobWithResponse, NewJob, ScheduleId};
use herald_core::validate::validate_job;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info, instrument, warn};

use crate::claim::JobQueue;
use crate::db::{fmt_ts, get_ts};
use crate::error::{Result, StoreError};

/// Thread-safe manager for one-off jobs and their responses.
///
/// Wraps a single SQLite connection in a `Mutex`. Several managers (in one
/// process or many) may point at the same database file; all cross-worker
/// coordination happens through the conditional statements below.
pub struct JobManager {
    db: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl JobManager {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self::with_clock(conn, Arc::new(SystemClock))
    }

    pub fn with_clock(conn: Connection, clock: Arc<dyn Clock>) -> Self {
        Self {
            db: Mutex::new(conn),
            clock,
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Insert a new job, due at `job.when`.
    ///
    /// `schedule_id` is set when a crontab tick created the job.
    #[instrument(skip(self, job), fields(arn = %job.arn))]
    pub fn start_job(&self, job: &NewJob, schedule_id: Option<ScheduleId>) -> Result<Job> {
        validate_job(job)?;
        let when = job.when.trunc_subsecs(6);
        let now = fmt_ts(self.clock.now());

        let db = self.conn()?;
        db.execute(
            "INSERT INTO jobs (schedule_id, run_at, arn, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                schedule_id.map(ScheduleId::get),
                fmt_ts(when),
                job.arn,
                job.payload,
                now
            ],
        )?;
        let id = JobId(db.last_insert_rowid());
        info!(job_id = %id, when = %when, "job started");

        Ok(Job {
            id,
            schedule_id,
            when,
            arn: job.arn.clone(),
            payload: job.payload.clone(),
        })
    }

    /// Look up a job and its response, if any.
    #[instrument(skip(self), fields(job_id = %id))]
    pub fn get_job(&self, id: JobId) -> Result<Option<JobWithResponse>> {
        let db = self.conn()?;
        let found = db
            .query_row(
                "SELECT j.id, j.schedule_id, j.run_at, j.arn, j.payload,
                        r.id, r.time, r.response, r.is_error, r.error
                 FROM jobs j
                 LEFT JOIN job_responses r ON r.job_id = j.id
                 WHERE j.id = ?1",
                [id.get()],
                row_to_job_with_response,
            )
            .optional()?;
        Ok(found)
    }

    /// Delete a job that has not completed and is not currently claimed.
    ///
    /// Returns `false` when the job does not exist, already has a response, or
    /// is held under a valid claim.
    #[instrument(skip(self), fields(job_id = %id))]
    pub fn delete_job(&self, id: JobId) -> Result<bool> {
        let now = fmt_ts(self.clock.now());
        let db = self.conn()?;
        let n = db.execute(
            "DELETE FROM jobs
             WHERE id = ?1
               AND NOT EXISTS (SELECT 1 FROM job_responses r WHERE r.job_id = jobs.id)
               AND (locked_until IS NULL OR locked_until <= ?2)",
            rusqlite::params![id.get(), now],
        )?;
        if n > 0 {
            info!("job deleted");
        }
        Ok(n > 0)
    }
}

impl JobQueue for JobManager {
    #[instrument(skip(self))]
    fn claim_job(&self, owner: &str, lease_minutes: u32) -> Result<Option<Job>> {
        let now = self.clock.now();
        let until = now + Duration::minutes(i64::from(lease_minutes));
        let token = ClaimToken::new();

        let mut db = self.conn()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let job = tx
            .query_row(
                "UPDATE jobs
                 SET locked_by = ?1, locked_until = ?2, claim_token = ?3
                 WHERE id = (
                     SELECT j.id FROM jobs j
                     WHERE j.run_at <= ?4
                       AND NOT EXISTS (SELECT 1 FROM job_responses r WHERE r.job_id = j.id)
                       AND (j.locked_until IS NULL OR j.locked_until <= ?4)
                     ORDER BY j.run_at, j.id
                     LIMIT 1
                 )
                 RETURNING id, schedule_id, run_at, arn, payload",
                rusqlite::params![owner, fmt_ts(until), token.as_str(), fmt_ts(now)],
                row_to_job,
            )
            .optional()?;
        tx.commit()?;

        if let Some(job) = &job {
            debug!(job_id = %job.id, until = %until, "job claimed");
        }
        Ok(job)
    }

    #[instrument(skip(self, response, error), fields(job_id = %job_id, is_error = error.is_some()))]
    fn complete_job(&self, job_id: JobId, response: &str, error: Option<&str>) -> Result<()> {
        let now = fmt_ts(self.clock.now());

        let mut db = self.conn()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
            "INSERT INTO job_responses (job_id, time, response, is_error, error)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (job_id) DO NOTHING",
            rusqlite::params![
                job_id.get(),
                now,
                response,
                error.is_some(),
                error.unwrap_or_default()
            ],
        )?;
        if inserted == 0 {
            warn!("job already has a response; duplicate completion dropped");
        } else {
            tx.execute(
                "UPDATE jobs SET locked_by = NULL, locked_until = NULL, claim_token = NULL
                 WHERE id = ?1",
                [job_id.get()],
            )?;
            debug!("job completed");
        }
        tx.commit()?;
        Ok(())
    }
}

/// Map columns `id, schedule_id, run_at, arn, payload` to a `Job`.
fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: JobId(row.get(0)?),
        schedule_id: row.get::<_, Option<i64>>(1)?.map(ScheduleId),
        when: get_ts(row, 2)?,
        arn: row.get(3)?,
        payload: row.get(4)?,
    })
}

fn row_to_job_with_response(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobWithResponse> {
    let job = row_to_job(row)?;
    let response = match row.get::<_, Option<i64>>(5)? {
        Some(id) => Some(JobResponse {
            id,
            job_id: job.id,
            time: get_ts(row, 6)?,
            response: row.get(7)?,
            is_error: row.get(8)?,
            error: row.get(9)?,
        }),
        None => None,
    };
    Ok(JobWithResponse { job, response })
}
