//! Context summarization
//!
//! Condenses a long transcript into the session's rolling summary.

use std::sync::Arc;

use tracing::{info, warn};

use crate::agent::retry::{invoke_with_retry, RetryPolicy};
use crate::gateway::{ModelGateway, Routing};
use crate::models::{Message, Role};

/// Stored when there is nothing usable to summarize.
pub const SUMMARY_SENTINEL: &str = "No conversation to summarize";

pub struct ContextSummarizer {
    gateway: Arc<dyn ModelGateway>,
    routing: Routing,
    retry: RetryPolicy,
}

impl ContextSummarizer {
    pub fn new(gateway: Arc<dyn ModelGateway>, routing: Routing, retry: RetryPolicy) -> Self {
        Self {
            gateway,
            routing,
            retry,
        }
    }

    /// Summarize `messages`. `None` when the transcript has no text or
    /// the model could not produce a summary.
    pub async fn summarize_messages(&self, messages: &[Message]) -> Option<String> {
        let conversation_text = Self::format_messages_for_summary(messages);
        if conversation_text.is_empty() {
            return None;
        }

        let prompt = format!("Summarize this conversation:\n{}", conversation_text);

        info!("Summarizing {} messages", messages.len());

        // No tools are bound for summarization.
        match invoke_with_retry(
            self.gateway.as_ref(),
            &self.retry,
            &[Message::user(prompt)],
            &self.routing,
            &[],
        )
        .await
        {
            Ok(response) if !response.content.trim().is_empty() => {
                Some(response.content.trim().to_string())
            }
            Ok(_) => {
                warn!("Summarization returned empty content");
                None
            }
            Err(e) => {
                warn!("Failed to summarize context: {}", e);
                None
            }
        }
    }

    /// One `Role: content` line per non-empty record.
    fn format_messages_for_summary(messages: &[Message]) -> String {
        let mut text = String::new();

        for msg in messages.iter().filter(|m| !m.content.trim().is_empty()) {
            let role_str = match msg.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::Tool => "Tool",
                Role::System => "System",
            };

            text.push_str(&format!("{}: {}\n", role_str, msg.content));
        }

        text
    }
}
