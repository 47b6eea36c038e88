//! Chat-completions client.
//!
//! [`LlmBackend`] is the request/response contract agents depend on (through
//! the agent kernel); [`ChatClient`] implements it against an
//! OpenAI-compatible HTTP API with retries and capped exponential backoff.

mod client;
mod types;

pub use client::{ChatClient, LlmBackend};
pub use types::{ChatRequest, ChatResponse, Choice, ChoiceMessage, Completion, Message, MessageRole, Usage};
