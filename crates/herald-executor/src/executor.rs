use async_trait::async_trait;
use thiserror::Error;

/// Errors an executor can return for a single delivery attempt.
///
/// The job worker retries [`is_transient`](Self::is_transient) errors until its
/// budget runs out; anything else becomes an error response straight away.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The target answered with a non-success status.
    #[error("target returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The message broker rejected the publish.
    #[error("publish failed: {0}")]
    Publish(String),

    /// The configured executor cannot be used in this build.
    #[error("executor unavailable: {0}")]
    Unavailable(String),
}

impl ExecutorError {
    /// Whether another attempt could succeed: connection failures, timeouts,
    /// 5xx, 408 and 429. Other 4xx answers are final.
    pub fn is_transient(&self) -> bool {
        match self {
            ExecutorError::Http(e) => !e.is_builder(),
            ExecutorError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            ExecutorError::Publish(_) => true,
            ExecutorError::Unavailable(_) => false,
        }
    }
}

/// Delivers a job payload to its target.
///
/// `target` is the job's ARN: a URL for HTTP, a topic ARN for SNS. Calls may
/// be repeated for the same job (retries, lease-expiry redelivery), so the
/// receiving side must tolerate duplicates.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Stable lowercase identifier (e.g. `"http"`), used in logs.
    fn name(&self) -> &str;

    /// Deliver `payload` to `target`, returning the target's response text.
    async fn execute(&self, target: &str, payload: &str) -> Result<String, ExecutorError>;
}
