//! Main orchestrator - drives one turn through the stage machine
//!
//! AwaitingModel → ExecutingTools → AwaitingModel … → Summarizing? → Done
//!
//! Every failure inside a turn resolves to a normal transition with an
//! explanatory transcript entry. Only checkpoint I/O can fail a turn.

pub mod guard;
pub mod intent;
pub mod retry;

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::checkpoint::CheckpointStore;
use crate::config::AgentConfig;
use crate::error::GatewayError;
use crate::gateway::{ModelGateway, Routing};
use crate::memory::{ContextSummarizer, SUMMARY_SENTINEL};
use crate::models::{Message, Role, SessionKey, Stage, TurnOutcome};
use crate::prompt::format_system_prompt;
use crate::state::{SessionState, StateUpdate};
use crate::tools::{failure_message, ToolRegistry};
use crate::Result;

use guard::ContentGuard;
use retry::invoke_with_retry;

const TOOL_ROUND_LIMIT_REPLY: &str =
    "I couldn't finish that request in one go. Could you rephrase it or break it into smaller steps?";

/// Next stage after a fresh assistant message.
pub fn route(messages: &[Message], summary_threshold: usize) -> Stage {
    match messages.last() {
        None => Stage::Done,
        Some(last) if last.has_tool_calls() => Stage::ExecutingTools,
        Some(_) if messages.len() > summary_threshold => Stage::Summarizing,
        Some(_) => Stage::Done,
    }
}

/// Greeting for a returning user with a known name.
pub fn welcome_message(state: &SessionState) -> Option<String> {
    if state.username.trim().is_empty() {
        None
    } else {
        Some(format!(
            "Welcome back, {}! How may I assist you?",
            state.username
        ))
    }
}

fn failure_reason(error: &GatewayError) -> String {
    match error {
        GatewayError::Request(reason) => reason.clone(),
        other => other.to_string(),
    }
}

/// Main orchestrator that runs conversational turns
pub struct Orchestrator {
    config: Arc<AgentConfig>,
    gateway: Arc<dyn ModelGateway>,
    checkpoints: Arc<dyn CheckpointStore>,
    tools: ToolRegistry,
    guard: ContentGuard,
    summarizer: ContextSummarizer,
    routing: Routing,
}

impl Orchestrator {
    pub fn new(
        config: Arc<AgentConfig>,
        gateway: Arc<dyn ModelGateway>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        let routing = Routing::split_model_and_provider(&config.model);
        let summarizer = ContextSummarizer::new(gateway.clone(), routing.clone(), config.retry);

        Self {
            tools: ToolRegistry::from_config(&config),
            guard: ContentGuard::new(&config.unsafe_markers, &config.project_name),
            summarizer,
            routing,
            config,
            gateway,
            checkpoints,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Last committed state for `key`, or a fresh one on first contact.
    pub async fn load_session(&self, key: &SessionKey) -> Result<SessionState> {
        match self.checkpoints.get(key).await? {
            Some(checkpoint) => {
                if !checkpoint.verify() {
                    warn!(session = %key, "Checkpoint hash mismatch, loading anyway");
                }
                Ok(SessionState::from_raw(
                    &checkpoint.state,
                    &self.config.state_defaults,
                ))
            }
            None => {
                debug!(session = %key, "No checkpoint, starting fresh session");
                Ok(SessionState::new(&self.config.state_defaults))
            }
        }
    }

    /// Run one full turn for `user_message` and persist the result.
    ///
    /// Callers must not run two turns for the same key concurrently.
    pub async fn run_turn(&self, key: &SessionKey, user_message: &str) -> Result<TurnOutcome> {
        let turn_id = Uuid::new_v4();

        info!(
            turn_id = %turn_id,
            user_id = %key.user_id,
            thread_id = %key.thread_id,
            "Turn started"
        );

        let mut state = self.load_session(key).await?;
        state.messages.push(Message::user(user_message));

        let mut stages = Vec::new();
        let mut stage = Stage::AwaitingModel;
        let mut tool_rounds = 0;
        let mut reply = String::new();

        loop {
            stages.push(stage);
            debug!(turn_id = %turn_id, stage = %stage, "Entering stage");

            stage = match stage {
                Stage::AwaitingModel => {
                    let next = self.await_model(&mut state).await;
                    if let Some(text) = latest_reply(&state.messages) {
                        reply = text.to_string();
                    }
                    next
                }
                Stage::ExecutingTools => {
                    self.execute_tools(&mut state);
                    tool_rounds += 1;

                    if tool_rounds >= self.config.max_tool_rounds {
                        warn!(turn_id = %turn_id, tool_rounds, "Tool round limit reached");
                        state.messages.push(Message::assistant(TOOL_ROUND_LIMIT_REPLY));
                        reply = TOOL_ROUND_LIMIT_REPLY.to_string();
                        Stage::Done
                    } else {
                        Stage::AwaitingModel
                    }
                }
                Stage::Summarizing => {
                    self.summarize(&mut state).await;
                    Stage::Done
                }
                Stage::Done => break,
            };
        }

        let snapshot = state.persisted();
        self.checkpoints.put(key, &snapshot).await?;

        info!(
            turn_id = %turn_id,
            user_id = %key.user_id,
            thread_id = %key.thread_id,
            stages = stages.len(),
            tool_rounds,
            "Turn complete"
        );

        Ok(TurnOutcome {
            turn_id,
            reply,
            stages,
            state: snapshot,
        })
    }

    // === AwaitingModel ===
    async fn await_model(&self, state: &mut SessionState) -> Stage {
        let system_prompt = format_system_prompt(&self.config.system_prompt, state, &self.config);

        let mut messages = Vec::with_capacity(state.messages.len() + 1);
        messages.push(Message::system(system_prompt));
        messages.extend(state.messages.iter().cloned());

        let response = match invoke_with_retry(
            self.gateway.as_ref(),
            &self.config.retry,
            &messages,
            &self.routing,
            &self.tools.definitions(),
        )
        .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Model gateway exhausted retries, ending turn");
                state.messages.push(Message::assistant(format!(
                    "Error: Failed to process request due to {}",
                    failure_reason(&e)
                )));
                return Stage::Done;
            }
        };

        let (content, flagged) = self.guard.screen(response.content);
        if flagged {
            warn!("Assistant reply blocked by content filter");
        }

        let message = if !response.tool_calls.is_empty() {
            Message::assistant_with_tools(content, response.tool_calls)
        } else if let Some(call) = intent::recover_tool_call(&content) {
            info!(tool = %call.name, "Recovered tool call from reply text");
            Message::assistant_with_tools("", vec![call])
        } else {
            Message::assistant(content)
        };

        state.messages.push(message);
        route(&state.messages, self.config.summary_threshold)
    }

    // === ExecutingTools ===
    fn execute_tools(&self, state: &mut SessionState) {
        let calls = match state.messages.last() {
            Some(last) => last.tool_calls.clone(),
            None => return,
        };

        let mut update = StateUpdate::default();
        let mut results = Vec::with_capacity(calls.len());

        for call in &calls {
            let text = match self.tools.dispatch(call) {
                Ok((request, outcome)) => {
                    info!(tool = %call.name, call_id = %call.id, "Tool executed");
                    update.absorb(&request, &outcome);
                    outcome.message()
                }
                Err(e) => {
                    warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool failed");
                    failure_message(&call.name, &e)
                }
            };
            results.push(Message::tool_result(call.id.clone(), text));
        }

        state.messages.extend(results);
        if !update.is_empty() {
            state.merge(update);
        }
    }

    // === Summarizing ===
    async fn summarize(&self, state: &mut SessionState) {
        match self.summarizer.summarize_messages(&state.messages).await {
            Some(summary) => {
                state.summary = summary;
                state.trim_transcript(self.config.preserve_recent_messages);
                info!(
                    kept = state.messages.len(),
                    "Conversation summarized and transcript trimmed"
                );
            }
            None => {
                warn!("Summarization unavailable, storing sentinel");
                state.summary = SUMMARY_SENTINEL.to_string();
            }
        }
    }
}

fn latest_reply(messages: &[Message]) -> Option<&str> {
    messages
        .last()
        .filter(|m| m.role == Role::Assistant && !m.has_tool_calls() && !m.content.is_empty())
        .map(|m| m.content.as_str())
}
