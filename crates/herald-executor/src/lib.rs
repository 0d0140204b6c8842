//! Delivery targets for claimed jobs.
//!
//! The HTTP executor is always available; the SNS executor is compiled in
//! with the `sns` cargo feature.

pub mod executor;
pub mod http;
#[cfg(feature = "sns")]
pub mod sns;

use std::sync::Arc;

use herald_core::config::{ExecutorConfig, ExecutorMode};
use tracing::info;

pub use executor::{Executor, ExecutorError};
pub use http::HttpExecutor;
#[cfg(feature = "sns")]
pub use sns::SnsExecutor;

/// Build the executor selected by `config.mode`.
pub async fn from_config(config: &ExecutorConfig) -> Result<Arc<dyn Executor>, ExecutorError> {
    let executor: Arc<dyn Executor> = match config.mode {
        ExecutorMode::Http => Arc::new(HttpExecutor::new(&config.http)?),
        #[cfg(feature = "sns")]
        ExecutorMode::Sns => Arc::new(SnsExecutor::new(&config.sns).await),
        #[cfg(not(feature = "sns"))]
        ExecutorMode::Sns => {
            return Err(ExecutorError::Unavailable(
                "executor mode \"sns\" requires building with the `sns` feature".to_string(),
            ))
        }
    };
    info!(executor = executor.name(), "executor ready");
    Ok(executor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn http_mode_is_the_default() {
        let executor = from_config(&ExecutorConfig::default()).await.unwrap();
        assert_eq!(executor.name(), "http");
    }

    #[cfg(not(feature = "sns"))]
    #[tokio::test]
    async fn sns_mode_without_feature_is_unavailable() {
        let config = ExecutorConfig {
            mode: ExecutorMode::Sns,
            ..Default::default()
        };
        assert!(matches!(
            from_config(&config).await,
            Err(ExecutorError::Unavailable(_))
        ));
    }
}
