//! # LLM Client
//!
//! Provides `LlmResponder`, the `Responder` backed by the configured assistant agent.
//! Each turn is sent with the system prompt and the peer's recent history.

use anyhow::{Context as _, Result, anyhow};
use async_trait::async_trait;

use crate::domain::config::{AgentConfig, AppConfig};
use crate::domain::errors::ResponderError;
use crate::domain::traits::{Responder, TurnContext};
use crate::domain::types::HistoryRole;
use crate::infrastructure::llm::providers::{self, ProviderConfig};
use crate::infrastructure::llm::{Context, Message, Provider};

pub struct LlmResponder {
    agent_name: String,
    agent: AgentConfig,
    provider: Provider,
    provider_config: ProviderConfig,
    system_prompt: String,
}

impl LlmResponder {
    /// Resolves the assistant's agent from configuration.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let agent_name = config.assistant.agent.clone();
        let agent = config
            .agents
            .get(&agent_name)
            .cloned()
            .ok_or_else(|| anyhow!("Agent '{}' not found in config", agent_name))?;
        let provider = Provider::from_str(&agent.provider)
            .ok_or_else(|| anyhow!("Unknown provider '{}' for agent '{}'", agent.provider, agent_name))?;
        let provider_config = ProviderConfig::from_agent_config(&agent)
            .map_err(|e| anyhow!(e))
            .with_context(|| format!("Agent '{}' is not usable", agent_name))?;

        Ok(Self {
            agent_name,
            agent,
            provider,
            provider_config,
            system_prompt: config.assistant.system_prompt.clone(),
        })
    }

    fn build_context(&self, turn_text: &str, turn: &TurnContext) -> Context {
        let mut context = Context::new()
            .with_temperature(self.agent.temperature)
            .with_max_tokens(self.agent.max_tokens)
            .add_message(Message::system(&self.system_prompt));
        for entry in &turn.history {
            context = context.add_message(match entry.role {
                HistoryRole::User => Message::user(&entry.text),
                HistoryRole::Assistant => Message::assistant(&entry.text),
            });
        }
        context.add_message(Message::user(turn_text))
    }
}

#[async_trait]
impl Responder for LlmResponder {
    async fn generate(&self, turn_text: &str, turn: &TurnContext) -> Result<String, ResponderError> {
        let context = self.build_context(turn_text, turn);
        tracing::debug!(
            "Asking agent '{}' ({}) for {} with {} message(s)",
            self.agent_name,
            self.provider.as_str(),
            turn.peer,
            context.messages.len()
        );
        let response = providers::chat(self.provider, self.provider_config.clone(), context).await?;
        tracing::debug!(
            "Agent '{}' answered with {} ({} tokens)",
            self.agent_name,
            response.model,
            response.usage.total_tokens
        );
        Ok(response.content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::HistoryEntry;
    use crate::infrastructure::llm::MessageRole;
    use chrono::Utc;

    fn config(provider: &str) -> AppConfig {
        AppConfig::from_yaml(&format!(
            r#"
services:
  matrix:
    homeserver: https://example.org
    username: bot
agents:
  default:
    provider: {provider}
    model: test-model
    api_key: sk-test
    temperature: 0.3
assistant:
  system_prompt: Be brief.
"#
        ))
        .unwrap()
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!(Provider::from_str("openai"), Some(Provider::OpenAI));
        assert_eq!(Provider::from_str("Claude"), Some(Provider::Anthropic));
        assert_eq!(Provider::from_str("groq"), Some(Provider::Groq));
        assert_eq!(Provider::from_str("xai"), Some(Provider::XAI));
        assert_eq!(Provider::from_str("unknown"), None);
    }

    #[test]
    fn unknown_agent_or_provider_is_rejected() {
        let mut cfg = config("openai");
        cfg.assistant.agent = "missing".into();
        assert!(LlmResponder::new(&cfg).is_err());
        assert!(LlmResponder::new(&config("carrier-pigeon")).is_err());
    }

    #[test]
    fn context_carries_prompt_history_and_turn() {
        let responder = LlmResponder::new(&config("anthropic")).unwrap();
        let turn = TurnContext {
            peer: "!p:x".into(),
            history: vec![
                HistoryEntry {
                    role: HistoryRole::User,
                    text: "hi".into(),
                    at: Utc::now(),
                },
                HistoryEntry {
                    role: HistoryRole::Assistant,
                    text: "hello!".into(),
                    at: Utc::now(),
                },
            ],
        };
        let context = responder.build_context("are you open?", &turn);

        let roles: Vec<_> = context.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::User,
                MessageRole::Assistant,
                MessageRole::User
            ]
        );
        assert_eq!(context.messages[0].content, "Be brief.");
        assert_eq!(context.messages[3].content, "are you open?");
        assert_eq!(context.temperature, Some(0.3));
    }
}
