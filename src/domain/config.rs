//! # Configuration
//!
//! Manages the loading and parsing of the application's configuration file (`config.yaml`).
//! Defines the structs for the Matrix account, assistant agents, conversation timing,
//! handoff phrase sets, delivery/reconnect policy and seeded broadcast schedules.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::domain::types::BroadcastMessage;

/// Main application configuration structure.
/// Matches the layout of `data/config.yaml`.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub services: ServicesConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub phrases: PhrasesConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Channel id -> messages, written to the store on first start.
    #[serde(default)]
    pub broadcasts: HashMap<String, Vec<BroadcastMessage>>,
    #[serde(default)]
    pub system: SystemConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Configuration for various connected services.
#[derive(Debug, Deserialize, Clone)]
pub struct ServicesConfig {
    pub matrix: MatrixConfig,
}

/// Specific configuration for the Matrix service.
#[derive(Debug, Deserialize, Clone)]
pub struct MatrixConfig {
    pub homeserver: String,
    pub username: String,
    /// Absent when the account only logs in through SSO.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Where the homeserver sends the browser after SSO; the login token is read from it.
    #[serde(default = "default_sso_redirect")]
    pub sso_redirect_url: String,
}

fn default_sso_redirect() -> String {
    "http://localhost:8765/".to_string()
}

pub type AgentsConfig = HashMap<String, AgentConfig>;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>, // e.g. "OPENAI_API_KEY"
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Which agent answers turns, and how it is primed.
#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    #[serde(default = "default_agent")]
    pub agent: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            agent: default_agent(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_agent() -> String {
    "default".to_string()
}

fn default_system_prompt() -> String {
    crate::strings::prompts::DEFAULT_SYSTEM_PROMPT.to_string()
}

/// Human operator accounts and the room their notices go to.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct OperatorConfig {
    /// Matrix user ids whose activity in a room counts as the operator taking over.
    #[serde(default)]
    pub users: Vec<String>,
    /// The operator's own channel for handoff and escalation notices.
    #[serde(default)]
    pub room: Option<String>,
}

impl OperatorConfig {
    pub fn is_operator(&self, sender: &str) -> bool {
        self.users.iter().any(|u| u.eq_ignore_ascii_case(sender))
    }
}

/// Timing of the turn pipeline.
#[derive(Debug, Deserialize, Clone)]
pub struct ConversationConfig {
    /// Quiescence window W.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Liveness repeat period L.
    #[serde(default = "default_liveness_ms")]
    pub liveness_interval_ms: u64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_thirty")]
    pub human_idle_minutes: u64,
    /// K: identical turns before suppression.
    #[serde(default = "default_repetition_limit")]
    pub repetition_limit: u32,
    /// D: suppression length.
    #[serde(default = "default_thirty")]
    pub suppression_minutes: u64,
}

impl ConversationConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms.max(1))
    }

    pub fn human_idle(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.human_idle_minutes as i64)
    }

    pub fn suppression(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.suppression_minutes as i64)
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            liveness_interval_ms: default_liveness_ms(),
            history_limit: default_history_limit(),
            human_idle_minutes: default_thirty(),
            repetition_limit: default_repetition_limit(),
            suppression_minutes: default_thirty(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    3_000
}
fn default_liveness_ms() -> u64 {
    4_000
}
fn default_history_limit() -> usize {
    20
}
fn default_thirty() -> u64 {
    30
}
fn default_repetition_limit() -> u32 {
    3
}

/// Phrase sets matched against normalized turn text.
#[derive(Debug, Deserialize, Clone)]
pub struct PhrasesConfig {
    #[serde(default = "default_opt_out")]
    pub opt_out: Vec<String>,
    #[serde(default = "default_request_human")]
    pub request_human: Vec<String>,
    #[serde(default = "default_return_to_assistant")]
    pub return_to_assistant: Vec<String>,
}

impl Default for PhrasesConfig {
    fn default() -> Self {
        Self {
            opt_out: default_opt_out(),
            request_human: default_request_human(),
            return_to_assistant: default_return_to_assistant(),
        }
    }
}

fn default_opt_out() -> Vec<String> {
    ["stop", "unsubscribe", "leave me alone"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_request_human() -> Vec<String> {
    ["talk to a human", "speak to a person", "human please", "agent please"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_return_to_assistant() -> Vec<String> {
    ["back to bot", "talk to the bot", "unblock", "resume bot"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeliveryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReconnectConfig {
    #[serde(default = "default_reconnect_base")]
    pub base_delay_secs: u64,
    #[serde(default = "default_reconnect_ceiling")]
    pub max_delay_secs: u64,
    #[serde(default = "default_reconnect_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: default_reconnect_base(),
            max_delay_secs: default_reconnect_ceiling(),
            max_attempts: default_reconnect_attempts(),
        }
    }
}

fn default_reconnect_base() -> u64 {
    10
}
fn default_reconnect_ceiling() -> u64 {
    60
}
fn default_reconnect_attempts() -> u32 {
    5
}

/// System-level settings for the bot.
#[derive(Debug, Deserialize, Clone)]
pub struct SystemConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(crate::domain::paths::DATA_DIR)
}
