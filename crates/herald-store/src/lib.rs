//! `herald-store` — SQLite persistence for jobs, schedules and their claims.
//!
//! Every claimable row carries its owner, lease expiry and fencing token
//! inline. Claims are single conditional `UPDATE … RETURNING` statements run
//! inside `BEGIN IMMEDIATE`, so any number of connections (and processes) can
//! share one database file without a lock service.

pub mod claim;
pub mod db;
pub mod error;
pub mod jobs;
pub mod schedules;

pub use claim::{CrontabQueue, JobQueue};
pub use db::{init_db, open};
pub use error::{Result, StoreError};
pub use jobs::JobManager;
pub use schedules::ScheduleManager;
