//! Scripted gateway for tests

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{AssistantResponse, ModelGateway, Routing};
use crate::error::GatewayError;
use crate::models::Message;
use crate::tools::ToolDefinition;

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub routing: Routing,
    pub tool_names: Vec<&'static str>,
}

/// Replays queued responses in order, then errors once the script runs out.
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Result<AssistantResponse, GatewayError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = Result<AssistantResponse, GatewayError>>,
    {
        Self {
            script: Mutex::new(responses.into_iter().collect()),
            ..Self::default()
        }
    }

    pub async fn push(&self, response: Result<AssistantResponse, GatewayError>) {
        self.script.lock().await.push_back(response);
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn invoke(
        &self,
        messages: &[Message],
        routing: &Routing,
        tools: &[ToolDefinition],
    ) -> Result<AssistantResponse, GatewayError> {
        self.calls.lock().await.push(RecordedCall {
            messages: messages.to_vec(),
            routing: routing.clone(),
            tool_names: tools.iter().map(|t| t.name).collect(),
        });

        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::InvalidResponse("script exhausted".to_string())))
    }
}
