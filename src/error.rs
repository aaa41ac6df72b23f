//! Error types for the financial assistant agent

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Failures raised by the tool registry.
///
/// These never end a turn: the orchestrator converts each one into a
/// tool-result transcript entry correlated with the failing call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Division by zero.")]
    DivisionByZero,

    #[error("Unsupported operation: {0}.")]
    UnsupportedOperation(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

impl ToolError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ToolError::InvalidInput(message.into())
    }
}

/// Failures raised by the model gateway.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {

    // =============================
    // Configuration (fail fast)
    // =============================

    #[error("Unsupported provider: {0}. Use 'groq', 'together', 'openrouter', or 'gemini'.")]
    UnsupportedProvider(String),

    #[error("Missing credentials for {provider}: set {env_var}")]
    MissingCredentials { provider: String, env_var: String },

    // =============================
    // Invocation (transient)
    // =============================

    #[error("request failed: {0}")]
    Request(String),

    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Configuration errors are raised before any call is made.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GatewayError::UnsupportedProvider(_) | GatewayError::MissingCredentials { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Errors
    // =============================

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Model gateway error: {0}")]
    GatewayError(#[from] GatewayError),

    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Invalid session identity: {0}")]
    InvalidSession(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
