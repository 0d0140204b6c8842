use herald_core::types::CrontabId;
use herald_core::HeraldError;
use herald_executor::ExecutorError;
use herald_store::StoreError;
use thiserror::Error;

/// Why a worker cycle failed.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Claiming the next unit of work failed.
    #[error("claim failed: {0}")]
    Claim(#[source] StoreError),

    /// The executor kept failing until the retry budget ran out. The failure
    /// was recorded as the job's error response.
    #[error("execution failed: {0}")]
    Execution(#[source] ExecutorError),

    /// Execution succeeded but its response could not be recorded.
    #[error("completion failed: {0}")]
    Completion(#[source] StoreError),

    /// Both phases failed; neither cause is dropped.
    #[error("execution failed: {execution}; completion failed: {completion}")]
    ExecutionAndCompletion {
        execution: ExecutorError,
        completion: StoreError,
    },

    /// The crontab's expression does not parse. The row is left untouched.
    #[error("crontab {crontab_id} skipped: {source}")]
    InvalidCrontab {
        crontab_id: CrontabId,
        #[source]
        source: HeraldError,
    },

    /// Starting the tick's job and advancing the crontab failed.
    #[error("crontab {crontab_id} not advanced: {source}")]
    Advance {
        crontab_id: CrontabId,
        #[source]
        source: StoreError,
    },
}

impl WorkerError {
    /// Whether the failed cycle still got its unit of work done.
    ///
    /// True when the side effect went out (execution succeeded but completion
    /// did not) or the tick was claimed and acted on.
    pub fn work_done(&self) -> bool {
        matches!(self, WorkerError::Completion(_) | WorkerError::Advance { .. })
    }
}
