//! Financial Assistant Agent
//!
//! A conversational agent for personal budgeting that:
//! - Routes each user message through a language model
//! - Executes requested tools (budget, expenses, arithmetic, username)
//! - Folds tool results into a structured per-session state
//! - Summarizes long conversations into a rolling digest
//! - Checkpoints the session after every turn
//!
//! TURN LOOP:
//! AWAIT MODEL → EXECUTE TOOLS → AWAIT MODEL … → SUMMARIZE? → DONE

pub mod agent;
pub mod api;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod models;
pub mod prompt;
pub mod state;
pub mod tools;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use agent::Orchestrator;
pub use config::AgentConfig;
pub use state::SessionState;
