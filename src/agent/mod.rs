//! Conversation agent: messages, model gateway and the turn runner

pub mod chat;
pub mod gateway;
mod message;
pub mod runner;

pub use chat::{UNAVAILABLE_REPLY, respond, run_chat};
pub use gateway::{AnthropicGateway, ChatModel, ModelOutput, OpenAiGateway};
pub use message::{Message, Role, ToolCallRequest, ToolResult};
pub use runner::{MALFORMED_REPLY, TurnOutcome, TurnRunner, TurnState};
