//! Bounded retry around model invocations

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::gateway::{AssistantResponse, ModelGateway, Routing};
use crate::models::Message;
use crate::tools::ToolDefinition;

/// Exponential backoff: `initial_backoff`, doubling, capped at `max_backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Invoke the gateway up to `policy.max_attempts` times. Call-time errors
/// are retried and the last one is returned; configuration errors are
/// returned at once.
pub async fn invoke_with_retry(
    gateway: &dyn ModelGateway,
    policy: &RetryPolicy,
    messages: &[Message],
    routing: &Routing,
    tools: &[ToolDefinition],
) -> Result<AssistantResponse, GatewayError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match gateway.invoke(messages, routing, tools).await {
            Ok(response) => {
                debug!(attempt, "Model invocation succeeded");
                return Ok(response);
            }
            Err(e) if e.is_configuration() => {
                warn!(error = %e, "Model gateway misconfigured, not retrying");
                return Err(e);
            }
            Err(e) if attempt < attempts => {
                let backoff = policy.delay_for(attempt);
                warn!(
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Model invocation failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(attempt, error = %e, "Model invocation failed, giving up");
                return Err(e);
            }
        }
    }
}
