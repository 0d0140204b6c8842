use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, SubsecRound, Utc};
use herald_core::clock::{Clock, SystemClock};
use herald_core::types::{
    ClaimToken, ClaimedCrontab, Crontab, CrontabId, JobId, NewSchedule, Schedule, ScheduleId,
    ScheduleWithCrontabs,
};
use herald_core::validate::validate_schedule;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info, instrument, warn};

use crate::claim::CrontabQueue;
use crate::db::{fmt_ts, get_opt_ts, get_ts};
use crate::error::{Result, StoreError};

const SCHEDULE_COLUMNS: &str = "id, external_id, created_by, arn, payload, created, starts_at, \
                                active, deactivated_at";
const CRONTAB_COLUMNS: &str =
    "id, schedule_id, expression, previous_run, next_run, last_updated";

/// Thread-safe manager for schedules and their crontabs.
///
/// Same shape as [`JobManager`](crate::JobManager): one `Mutex<Connection>`,
/// coordination with other managers purely through the database.
pub struct ScheduleManager {
    db: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl ScheduleManager {
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

    /// Create an active schedule with one crontab per expression.
    ///
    /// Every crontab starts with `next = from`, so the first tick fires as soon
    /// as `from` has passed.
    #[instrument(skip(self, new), fields(arn = %new.arn, crontabs = new.crontabs.len()))]
    pub fn create_schedule(&self, new: &NewSchedule) -> Result<ScheduleWithCrontabs> {
        validate_schedule(new)?;
        let created = self.clock.now().trunc_subsecs(6);
        let from = new.from.trunc_subsecs(6);

        let mut db = self.conn()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO schedules (external_id, created_by, arn, payload, created, starts_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                new.external_id,
                new.by,
                new.arn,
                new.payload,
                fmt_ts(created),
                fmt_ts(from)
            ],
        )?;
        let schedule_id = ScheduleId(tx.last_insert_rowid());

        let mut crontabs = Vec::with_capacity(new.crontabs.len());
        for expression in &new.crontabs {
            tx.execute(
                "INSERT INTO crontabs (schedule_id, expression, next_run) VALUES (?1, ?2, ?3)",
                rusqlite::params![schedule_id.get(), expression, fmt_ts(from)],
            )?;
            crontabs.push(Crontab {
                id: CrontabId(tx.last_insert_rowid()),
                schedule_id,
                expression: expression.clone(),
                previous: None,
                next: from,
                last_updated: None,
            });
        }
        tx.commit()?;
        info!(schedule_id = %schedule_id, "schedule created");

        Ok(ScheduleWithCrontabs {
            schedule: Schedule {
                id: schedule_id,
                external_id: new.external_id.clone(),
                by: new.by.clone(),
                arn: new.arn.clone(),
                payload: new.payload.clone(),
                created,
                from,
                active: true,
                deactivated_at: None,
            },
            crontabs,
        })
    }

    /// Deactivate a schedule. One-way: its crontabs are never claimed again.
    ///
    /// Returns `false` if the schedule does not exist or was already inactive.
    #[instrument(skip(self), fields(schedule_id = %id))]
    pub fn deactivate_schedule(&self, id: ScheduleId) -> Result<bool> {
        let now = fmt_ts(self.clock.now());
        let db = self.conn()?;
        let n = db.execute(
            "UPDATE schedules SET active = 0, deactivated_at = ?2
             WHERE id = ?1 AND active = 1",
            rusqlite::params![id.get(), now],
        )?;
        if n > 0 {
            info!("schedule deactivated");
        }
        Ok(n > 0)
    }

    /// Look up a schedule and all of its crontabs.
    #[instrument(skip(self), fields(schedule_id = %id))]
    pub fn get_schedule(&self, id: ScheduleId) -> Result<Option<ScheduleWithCrontabs>> {
        let db = self.conn()?;
        let Some(schedule) = load_schedule(&db, id)? else {
            return Ok(None);
        };

        let mut stmt = db.prepare(&format!(
            "SELECT {CRONTAB_COLUMNS} FROM crontabs WHERE schedule_id = ?1 ORDER BY id"
        ))?;
        let crontabs = stmt
            .query_map([id.get()], row_to_crontab)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(ScheduleWithCrontabs { schedule, crontabs }))
    }
}

impl CrontabQueue for ScheduleManager {
    #[instrument(skip(self))]
    fn claim_schedule(&self, owner: &str, lease_minutes: u32) -> Result<Option<ClaimedCrontab>> {
        let now = self.clock.now();
        let until = now + Duration::minutes(i64::from(lease_minutes));
        let token = ClaimToken::new();

        let mut db = self.conn()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let crontab = tx
            .query_row(
                &format!(
                    "UPDATE crontabs
                     SET locked_by = ?1, locked_until = ?2, claim_token = ?3
                     WHERE id = (
                         SELECT c.id FROM crontabs c
                         JOIN schedules s ON s.id = c.schedule_id
                         WHERE s.active = 1
                           AND c.next_run < ?4
                           AND (c.locked_until IS NULL OR c.locked_until <= ?4)
                         ORDER BY c.next_run, c.id
                         LIMIT 1
                     )
                     RETURNING {CRONTAB_COLUMNS}"
                ),
                rusqlite::params![owner, fmt_ts(until), token.as_str(), fmt_ts(now)],
                row_to_crontab,
            )
            .optional()?;

        let Some(crontab) = crontab else {
            return Ok(None);
        };
        let schedule = load_schedule(&tx, crontab.schedule_id)?.ok_or(StoreError::Database(
            rusqlite::Error::QueryReturnedNoRows,
        ))?;
        tx.commit()?;

        debug!(crontab_id = %crontab.id, schedule_id = %schedule.id, until = %until, "crontab claimed");
        Ok(Some(ClaimedCrontab {
            schedule,
            crontab,
            token,
        }))
    }

    #[instrument(skip(self, token), fields(crontab_id = %crontab_id, schedule_id = %schedule_id))]
    fn start_job_and_advance(
        &self,
        crontab_id: CrontabId,
        schedule_id: ScheduleId,
        token: &ClaimToken,
        new_next: DateTime<Utc>,
    ) -> Result<JobId> {
        let now = fmt_ts(self.clock.now());
        let next = fmt_ts(new_next.trunc_subsecs(6));

        let mut db = self.conn()?;
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // The insert only happens while the token still holds a live claim on
        // an active schedule; that single condition is the fence.
        let inserted = tx.execute(
            "INSERT INTO jobs (schedule_id, run_at, arn, payload, created_at)
             SELECT s.id, ?4, s.arn, s.payload, ?4
             FROM crontabs c
             JOIN schedules s ON s.id = c.schedule_id
             WHERE c.id = ?1
               AND s.id = ?2
               AND s.active = 1
               AND c.claim_token = ?3
               AND c.locked_until > ?4",
            rusqlite::params![crontab_id.get(), schedule_id.get(), token.as_str(), now],
        )?;
        if inserted == 0 {
            warn!(token = %token, "claim lost before advance");
            return Err(StoreError::ClaimLost {
                crontab_id,
                token: token.clone(),
            });
        }
        let job_id = JobId(tx.last_insert_rowid());

        let advanced = tx.execute(
            "UPDATE crontabs
             SET previous_run = next_run,
                 next_run     = ?2,
                 last_updated = ?3,
                 locked_by    = NULL,
                 locked_until = NULL,
                 claim_token  = NULL
             WHERE id = ?1 AND claim_token = ?4 AND next_run <= ?2",
            rusqlite::params![crontab_id.get(), next, now, token.as_str()],
        )?;
        if advanced == 0 {
            // dropping `tx` rolls the job insert back
            return Err(StoreError::NonMonotonicAdvance { crontab_id, next });
        }
        tx.commit()?;

        info!(job_id = %job_id, next = %next, "crontab advanced");
        Ok(job_id)
    }
}

fn load_schedule(conn: &Connection, id: ScheduleId) -> Result<Option<Schedule>> {
    let schedule = conn
        .query_row(
            &format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?1"),
            [id.get()],
            row_to_schedule,
        )
        .optional()?;
    Ok(schedule)
}

fn row_to_schedule(row: &rusqlite::Row<'_>) -> rusqlite::Result<Schedule> {
    Ok(Schedule {
        id: ScheduleId(row.get(0)?),
        external_id: row.get(1)?,
        by: row.get(2)?,
        arn: row.get(3)?,
        payload: row.get(4)?,
        created: get_ts(row, 5)?,
        from: get_ts(row, 6)?,
        active: row.get(7)?,
        deactivated_at: get_opt_ts(row, 8)?,
    })
}

fn row_to_crontab(row: &rusqlite::Row<'_>) -> rusqlite::Result<Crontab> {
    Ok(Crontab {
        id: CrontabId(row.get(0)?),
        schedule_id: ScheduleId(row.get(1)?),
        expression: row.get(2)?,
        previous: get_opt_ts(row, 3)?,
        next: get_ts(row, 4)?,
        last_updated: get_opt_ts(row, 5)?,
    })
}
