use std::time::Duration;

use async_trait::async_trait;
use herald_core::config::HttpExecutorConfig;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::executor::{Executor, ExecutorError};

/// POSTs the payload as JSON to the job's target URL.
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    pub fn new(config: &HttpExecutorConfig) -> Result<Self, ExecutorError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("herald/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    fn name(&self) -> &str {
        "http"
    }

    async fn execute(&self, target: &str, payload: &str) -> Result<String, ExecutorError> {
        let resp = self
            .client
            .post(target)
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        debug!(%target, status = status.as_u16(), "http delivery finished");

        if !status.is_success() {
            return Err(ExecutorError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}
