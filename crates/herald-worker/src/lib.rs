//! Poll cycles that move jobs and crontab ticks along.
//!
//! A [`Worker`] performs one cycle; [`repetitive::work`] drives it until the
//! shutdown signal flips.

pub mod error;
pub mod job;
pub mod repetitive;
pub mod retry;
pub mod schedule;
mod store;

use async_trait::async_trait;

pub use error::WorkerError;
pub use job::JobWorker;
pub use schedule::ScheduleWorker;

/// One poll cycle over the shared store.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Task name used as the claim owner and in logs.
    fn name(&self) -> &str;

    /// Run a single cycle.
    ///
    /// `Ok(true)` means a unit of work was completed and the caller should
    /// look for more straight away; `Ok(false)` means there was nothing due.
    async fn run_once(&self) -> Result<bool, WorkerError>;
}
