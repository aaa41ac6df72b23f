//! Chat-completions client
//!
//! Every supported provider exposes an OpenAI-compatible endpoint, so one
//! connection-pooled `reqwest::Client` serves them all.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use super::{AssistantResponse, ModelGateway, Provider, Routing};
use crate::config::AgentConfig;
use crate::error::GatewayError;
use crate::models::{Message, Role, ToolCall};
use crate::tools::ToolDefinition;

pub struct ChatCompletionsClient {
    client: Client,
    provider: Provider,
    api_key: String,
    base_url: String,
    title: String,
}

impl ChatCompletionsClient {
    pub fn new(
        provider: Provider,
        api_key: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(GatewayError::MissingCredentials {
                provider: provider.to_string(),
                env_var: provider.env_var().to_string(),
            });
        }

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| GatewayError::Request(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            provider,
            api_key,
            base_url: provider.base_url().to_string(),
            title: title.into(),
        })
    }

    /// Build the client for the configured provider, reading its key from the environment.
    pub fn from_config(config: &AgentConfig) -> Result<Self, GatewayError> {
        let api_key = env::var(config.provider.env_var()).unwrap_or_default();
        let mut client = Self::new(config.provider, api_key, config.project_name.clone())?;
        if let Some(base_url) = &config.gateway_base_url {
            client = client.with_base_url(base_url.clone());
        }
        info!(provider = %config.provider, base_url = %client.base_url, "Model gateway configured");
        Ok(client)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_request(
        &self,
        messages: &[Message],
        routing: &Routing,
        tools: &[ToolDefinition],
    ) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: routing.full_name(),
            messages: to_wire_messages(messages),
            tools: tools
                .iter()
                .map(|tool| WireTool {
                    kind: "function",
                    function: FunctionDefinition {
                        name: tool.name.to_string(),
                        description: tool.description.to_string(),
                        parameters: tool.parameters.clone(),
                    },
                })
                .collect(),
            tool_choice: if tools.is_empty() { None } else { Some("auto") },
        }
    }
}

#[async_trait]
impl ModelGateway for ChatCompletionsClient {
    async fn invoke(
        &self,
        messages: &[Message],
        routing: &Routing,
        tools: &[ToolDefinition],
    ) -> Result<AssistantResponse, GatewayError> {
        let url = self.endpoint();
        let request = self.build_request(messages, routing, tools);

        debug!(
            provider = %self.provider,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Calling chat completions"
        );

        let mut builder = self.client.post(&url).bearer_auth(&self.api_key).json(&request);
        if self.provider == Provider::OpenRouter {
            builder = builder.header("X-Title", &self.title);
        }

        let response = builder.send().await.map_err(|e| {
            error!("Chat completions request failed: {}", e);
            if e.is_timeout() {
                GatewayError::Request("API timeout".to_string())
            } else {
                GatewayError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Chat completions error response: {}", message);
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|e| {
            error!("Failed to parse chat completions response: {}", e);
            GatewayError::InvalidResponse(e.to_string())
        })?;

        from_wire_response(body)
    }
}

//
// ================= Wire format =================
//

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize, PartialEq)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionDefinition,
}

#[derive(Debug, Serialize)]
struct FunctionDefinition {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

/// Map transcript records onto the wire.
///
/// Tool results restored from a checkpoint have lost their correlation id,
/// so they are replayed as assistant text. Empty records are skipped.
fn to_wire_messages(messages: &[Message]) -> Vec<WireMessage> {
    messages
        .iter()
        .filter(|m| !m.content.is_empty() || m.has_tool_calls())
        .map(|m| match (m.role, &m.tool_call_id) {
            (Role::Tool, Some(id)) => WireMessage {
                role: "tool",
                content: Some(m.content.clone()),
                tool_calls: Vec::new(),
                tool_call_id: Some(id.clone()),
            },
            (Role::Tool, None) => WireMessage {
                role: "assistant",
                content: Some(format!("Tool result: {}", m.content)),
                tool_calls: Vec::new(),
                tool_call_id: None,
            },
            (role, _) => WireMessage {
                role: match role {
                    Role::System => "system",
                    Role::User => "user",
                    _ => "assistant",
                },
                content: Some(m.content.clone()),
                tool_calls: m.tool_calls.iter().map(to_wire_tool_call).collect(),
                tool_call_id: None,
            },
        })
        .collect()
}

fn to_wire_tool_call(call: &ToolCall) -> WireToolCall {
    let arguments = match &call.args {
        Value::String(encoded) => encoded.clone(),
        other => other.to_string(),
    };

    WireToolCall {
        id: call.id.clone(),
        kind: function_kind(),
        function: WireFunction {
            name: call.name.clone(),
            arguments,
        },
    }
}

/// Undecodable arguments are kept as a raw string for tool validation to reject.
fn from_wire_tool_call(call: WireToolCall) -> ToolCall {
    let args = if call.function.arguments.trim().is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(&call.function.arguments)
            .unwrap_or(Value::String(call.function.arguments))
    };

    ToolCall {
        id: call.id,
        name: call.function.name,
        args,
    }
}

fn from_wire_response(body: ChatCompletionResponse) -> Result<AssistantResponse, GatewayError> {
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::InvalidResponse("no choices in response".to_string()))?;

    Ok(AssistantResponse {
        content: choice.message.content.unwrap_or_default(),
        tool_calls: choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(from_wire_tool_call)
            .collect(),
    })
}
