//! Conversational turn runner
//!
//! One turn walks `AwaitingInput -> ModelCall -> (ToolDispatch -> ModelCall)*
//! -> Done`. Every message is appended to the session as soon as it exists,
//! so an interrupted turn leaves a consistent prefix behind.

use std::sync::Arc;

use super::gateway::{ChatModel, ModelOutput};
use super::message::{Message, ToolCallRequest, ToolResult};
use crate::db::SessionStore;
use crate::tools::ToolRegistry;
use crate::{Error, Result};

/// Reply recorded when the model's tool call could not be parsed
pub const MALFORMED_REPLY: &str =
    "Sorry, I got confused trying to use one of my tools. Could you say that another way?";

/// Turn state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingInput,
    ModelCall,
    ToolDispatch,
    Done,
}

/// Result of one completed turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Final assistant text
    pub reply: String,
    /// Every tool call the model requested, in order
    pub tool_calls: Vec<ToolCallRequest>,
    /// Every tool result fed back, in order
    pub tool_results: Vec<ToolResult>,
    /// Tool rounds dispatched
    pub rounds: usize,
    /// The reply is a fallback, not the model's own answer
    pub degraded: bool,
}

/// Drives turns against a model, a tool registry and a session store
pub struct TurnRunner {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    sessions: Arc<dyn SessionStore>,
    max_tool_rounds: usize,
}

impl TurnRunner {
    /// Create a runner; `max_tool_rounds` is raised to at least 1
    #[must_use]
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: Arc<ToolRegistry>,
        sessions: Arc<dyn SessionStore>,
        max_tool_rounds: usize,
    ) -> Self {
        Self {
            model,
            tools,
            sessions,
            max_tool_rounds: max_tool_rounds.max(1),
        }
    }

    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Stored history of a thread
    ///
    /// # Errors
    ///
    /// Returns error if the session store fails
    pub fn history(&self, thread_id: &str) -> Result<Vec<Message>> {
        self.sessions.load(thread_id)
    }

    /// Run one turn for `user_text` on `thread_id`
    ///
    /// Tool failures never abort the turn: unknown tools, bad arguments,
    /// timeouts and execution errors all come back to the model as error
    /// results. Hitting the tool-round cap or a malformed tool call ends the
    /// turn with a degraded reply.
    ///
    /// # Errors
    ///
    /// Returns `ModelUnavailable` or `Auth` from the model, leaving the user
    /// message in the session, or a session store error
    pub async fn submit(&self, user_text: &str, thread_id: &str) -> Result<TurnOutcome> {
        let mut state = TurnState::AwaitingInput;
        let mut history = self.sessions.load(thread_id)?;
        let mut outcome = TurnOutcome {
            reply: String::new(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            rounds: 0,
            degraded: false,
        };

        tracing::info!(thread_id, history = history.len(), "turn started");
        self.record(thread_id, &mut history, Message::user(user_text))?;
        transition(&mut state, TurnState::ModelCall);

        loop {
            let calls = match self.model.generate(&history).await {
                Ok(ModelOutput::Text(text)) => {
                    outcome.reply = text;
                    break;
                }
                Ok(ModelOutput::ToolCalls { preamble, calls }) => {
                    if outcome.rounds >= self.max_tool_rounds {
                        tracing::warn!(
                            thread_id,
                            rounds = outcome.rounds,
                            "tool round cap reached, ending turn"
                        );
                        outcome.reply = format!(
                            "I stopped after {} rounds of tool calls without finishing. Please try again.",
                            outcome.rounds
                        );
                        outcome.degraded = true;
                        break;
                    }
                    self.record(
                        thread_id,
                        &mut history,
                        Message::assistant_with_tool_calls(preamble.unwrap_or_default(), calls.clone()),
                    )?;
                    calls
                }
                Err(Error::MalformedToolCall { reason, text }) => {
                    tracing::warn!(thread_id, %reason, "malformed tool call, answering with fallback");
                    outcome.reply = match text {
                        Some(text) => format!("{text} {MALFORMED_REPLY}"),
                        None => MALFORMED_REPLY.to_string(),
                    };
                    outcome.degraded = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(thread_id, error = %e, "model call failed, turn aborted");
                    return Err(e);
                }
            };

            transition(&mut state, TurnState::ToolDispatch);
            outcome.rounds += 1;

            for call in calls {
                let result = self.dispatch(&call).await;
                self.record(thread_id, &mut history, Message::tool_result(result.clone()))?;
                outcome.tool_calls.push(call);
                outcome.tool_results.push(result);
            }

            transition(&mut state, TurnState::ModelCall);
        }

        self.record(thread_id, &mut history, Message::assistant(outcome.reply.clone()))?;
        transition(&mut state, TurnState::Done);

        tracing::info!(
            thread_id,
            rounds = outcome.rounds,
            degraded = outcome.degraded,
            "turn complete"
        );
        Ok(outcome)
    }

    async fn dispatch(&self, call: &ToolCallRequest) -> ToolResult {
        tracing::info!(tool = %call.name, call_id = %call.id, "dispatching tool");

        match self.tools.dispatch(&call.name, &call.arguments).await {
            Ok(content) => ToolResult {
                call_id: call.id.clone(),
                name: call.name.clone(),
                content,
                is_error: false,
            },
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "tool call failed");
                ToolResult {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    content: format!("Error: {e}"),
                    is_error: true,
                }
            }
        }
    }

    fn record(&self, thread_id: &str, history: &mut Vec<Message>, message: Message) -> Result<()> {
        self.sessions.append(thread_id, &message)?;
        history.push(message);
        Ok(())
    }
}

fn transition(state: &mut TurnState, next: TurnState) {
    tracing::debug!(from = ?*state, to = ?next, "turn state");
    *state = next;
}
