use async_trait::async_trait;
use aws_sdk_sns::Client as SnsClient;
use herald_core::config::SnsExecutorConfig;
use tracing::{debug, info};

use crate::executor::{Executor, ExecutorError};

/// Publishes the payload to the SNS topic named by the job's ARN.
pub struct SnsExecutor {
    client: SnsClient,
}

impl SnsExecutor {
    /// Build a client from the standard AWS provider chain, with optional
    /// region and endpoint overrides (e.g. LocalStack).
    pub async fn new(config: &SnsExecutorConfig) -> Self {
        let mut builder = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            builder = builder.region(aws_sdk_sns::config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        let aws_config = builder.load().await;
        info!(region = ?aws_config.region(), "SNS client configured");

        Self {
            client: SnsClient::new(&aws_config),
        }
    }
}

#[async_trait]
impl Executor for SnsExecutor {
    fn name(&self) -> &str {
        "sns"
    }

    async fn execute(&self, target: &str, payload: &str) -> Result<String, ExecutorError> {
        let output = self
            .client
            .publish()
            .topic_arn(target)
            .message(payload)
            .send()
            .await
            .map_err(|e| ExecutorError::Publish(format!("failed to publish to {target}: {e}")))?;

        let message_id = output.message_id().unwrap_or_default().to_string();
        debug!(topic_arn = %target, %message_id, "published to SNS");
        Ok(message_id)
    }
}
