//! Model gateway
//!
//! The language model is a black box behind `ModelGateway`: a transcript in,
//! an assistant message (text plus optional tool calls) out. Gateways never
//! retry; the orchestrator owns the retry policy.

pub mod mock;
pub mod openai;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::models::{Message, ToolCall};
use crate::tools::ToolDefinition;

pub use mock::ScriptedGateway;
pub use openai::ChatCompletionsClient;

#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Invoke the model. `tools` is empty when no tools should be bound.
    async fn invoke(
        &self,
        messages: &[Message],
        routing: &Routing,
        tools: &[ToolDefinition],
    ) -> Result<AssistantResponse, GatewayError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: String::new(),
            tool_calls,
        }
    }
}

//
// ================= Providers =================
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Groq,
    Together,
    OpenRouter,
    Gemini,
}

impl Provider {
    pub fn base_url(&self) -> &'static str {
        match self {
            Provider::Groq => "https://api.groq.com/openai/v1",
            Provider::Together => "https://api.together.xyz/v1",
            Provider::OpenRouter => "https://openrouter.ai/api/v1",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
        }
    }

    /// Environment variable holding the provider's API key.
    pub fn env_var(&self) -> &'static str {
        match self {
            Provider::Groq => "GROQ_API_KEY",
            Provider::Together => "TOGETHER_API_KEY",
            Provider::OpenRouter => "OPENROUTER_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
        }
    }
}

impl FromStr for Provider {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(Provider::Groq),
            "together" => Ok(Provider::Together),
            "openrouter" => Ok(Provider::OpenRouter),
            "gemini" => Ok(Provider::Gemini),
            _ => Err(GatewayError::UnsupportedProvider(s.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Provider::Groq => "groq",
            Provider::Together => "together",
            Provider::OpenRouter => "openrouter",
            Provider::Gemini => "gemini",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Routing =================
//

/// Model routing hints derived from a possibly `provider/model` identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routing {
    pub model: String,
    pub provider: Option<String>,
}

impl Routing {
    /// Split at the first `/`. Without a separator the provider hint is `None`.
    pub fn split_model_and_provider(identifier: &str) -> Self {
        match identifier.split_once('/') {
            Some((provider, model)) => Self {
                model: model.to_string(),
                provider: Some(provider.to_string()),
            },
            None => Self {
                model: identifier.to_string(),
                provider: None,
            },
        }
    }

    /// Identifier as sent on the wire.
    pub fn full_name(&self) -> String {
        match &self.provider {
            Some(provider) => format!("{}/{}", provider, self.model),
            None => self.model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("groq".parse::<Provider>(), Ok(Provider::Groq));
        assert_eq!(" Together ".parse::<Provider>(), Ok(Provider::Together));
        assert_eq!("OPENROUTER".parse::<Provider>(), Ok(Provider::OpenRouter));
        assert_eq!("gemini".parse::<Provider>(), Ok(Provider::Gemini));

        let err = "anthropic".parse::<Provider>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported provider: anthropic. Use 'groq', 'together', 'openrouter', or 'gemini'."
        );
    }

    #[test]
    fn test_provider_display_round_trips() {
        for provider in [Provider::Groq, Provider::Together, Provider::OpenRouter, Provider::Gemini] {
            assert_eq!(provider.to_string().parse::<Provider>(), Ok(provider));
        }
    }

    #[test]
    fn test_routing_split() {
        let routing = Routing::split_model_and_provider("meta-llama/llama-4-maverick-17b-128e-instruct");
        assert_eq!(routing.provider.as_deref(), Some("meta-llama"));
        assert_eq!(routing.model, "llama-4-maverick-17b-128e-instruct");
        assert_eq!(routing.full_name(), "meta-llama/llama-4-maverick-17b-128e-instruct");

        let bare = Routing::split_model_and_provider("gemini-2.0-flash");
        assert_eq!(bare.provider, None);
        assert_eq!(bare.model, "gemini-2.0-flash");
        assert_eq!(bare.full_name(), "gemini-2.0-flash");
    }
}
