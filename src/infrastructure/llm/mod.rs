//! # LLM Responder
//!
//! Chat-completion backends that answer aggregated turns. Agents are declared in
//! `config.yaml` and routed to an OpenAI-compatible or Anthropic provider.

mod client;
pub mod providers;
mod types;

pub use client::LlmResponder;

pub use types::{Context, Error, Message, MessageRole, Provider, Response, TokenUsage};
