//! Agent configuration
//!
//! Built once at startup and shared by reference (`Arc<AgentConfig>`).
//! Nothing reads configuration from ambient globals after construction.

use std::env;
use std::time::Duration;

use tracing::info;

use crate::agent::retry::RetryPolicy;
use crate::error::{GatewayError, OrchestrationError};
use crate::gateway::Provider;
use crate::prompt;
use crate::state::StateDefaults;
use crate::Result;

pub const DEFAULT_PROJECT_NAME: &str = "Aza Man";
pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-maverick-17b-128e-instruct";
pub const DEFAULT_CURRENCY: &str = "NGN";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub project_name: String,
    pub backstory: String,
    pub currency_default: String,
    /// Model identifier, optionally qualified as `provider/model`.
    pub model: String,
    pub provider: Provider,
    pub state_defaults: StateDefaults,
    /// System prompt template with `$name` placeholders.
    pub system_prompt: String,
    /// Transcript length above which a turn ends with summarization.
    pub summary_threshold: usize,
    /// Records kept after a successful summarization.
    pub preserve_recent_messages: usize,
    /// Tool rounds allowed in a single turn before it is closed.
    pub max_tool_rounds: usize,
    /// Overrides the provider's chat-completions base URL (proxies, local servers).
    pub gateway_base_url: Option<String>,
    pub retry: RetryPolicy,
    /// Lowercase markers that trigger the content filter.
    pub unsafe_markers: Vec<String>,
    pub database_url: Option<String>,
    pub api_port: u16,
}

impl AgentConfig {
    /// Build configuration from environment variables, falling back to defaults.
    ///
    /// Fails with `UnsupportedProvider` when `PROVIDER` names a provider
    /// outside the supported set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(model) = env::var("MODEL") {
            if !model.trim().is_empty() {
                config.model = model.trim().to_string();
            }
        }

        if let Ok(provider) = env::var("PROVIDER") {
            config = config.with_provider(&provider)?;
        }

        config.gateway_base_url = env::var("MODEL_BASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        if let Ok(currency) = env::var("CURRENCY_DEFAULT") {
            if !currency.trim().is_empty() {
                config.currency_default = currency.trim().to_uppercase();
            }
        }

        config.database_url = env::var("DATABASE_URL")
            .or_else(|_| env::var("POSTGRES_URL"))
            .ok()
            .filter(|url| !url.trim().is_empty());

        if let Ok(port) = env::var("PORT").or_else(|_| env::var("API_PORT")) {
            config.api_port = port.parse().map_err(|_| {
                OrchestrationError::ConfigError(format!("invalid port: {}", port))
            })?;
        }

        config.system_prompt = prompt::default_template(&config);

        info!(
            provider = %config.provider,
            model = %config.model,
            persistent = config.database_url.is_some(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Parse a provider selector, surfacing the configuration-time failure.
    pub fn with_provider(mut self, provider: &str) -> std::result::Result<Self, GatewayError> {
        self.provider = provider.parse()?;
        Ok(self)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        let mut config = Self {
            project_name: DEFAULT_PROJECT_NAME.to_string(),
            backstory: format!(
                "You are {}, an AI-powered personal financial assistant designed to help users \
                 manage their budget, track expenses, and achieve savings goals. \
                 Use the following user information for this session.",
                DEFAULT_PROJECT_NAME
            ),
            currency_default: DEFAULT_CURRENCY.to_string(),
            model: DEFAULT_MODEL.to_string(),
            provider: Provider::Groq,
            state_defaults: StateDefaults::default(),
            system_prompt: String::new(),
            summary_threshold: 10,
            preserve_recent_messages: 4,
            max_tool_rounds: 8,
            gateway_base_url: None,
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_secs(1),
                max_backoff: Duration::from_secs(10),
            },
            unsafe_markers: vec![
                "inappropriate".to_string(),
                "explicit content".to_string(),
                "hate speech".to_string(),
                "violent content".to_string(),
            ],
            database_url: None,
            api_port: 8080,
        };
        config.system_prompt = prompt::default_template(&config);
        config
    }
}
