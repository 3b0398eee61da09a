//! # Domain Types
//!
//! Common data structures and enums used across the application logic:
//! per-peer conversation state, turns, transport session metadata and
//! broadcast schedules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// A conversational counterpart (for Matrix, a room id).
pub type PeerId = String;
/// A broadcast destination.
pub type ChannelId = String;

/// Who answers a peer right now.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConversationMode {
    #[default]
    AiActive,
    HumanActive,
    Blocked,
}

impl ConversationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationMode::AiActive => "ai_active",
            ConversationMode::HumanActive => "human_active",
            ConversationMode::Blocked => "blocked",
        }
    }
}

/// Why a peer is BLOCKED. Repetition blocks expire with the suppression window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BlockReason {
    OptOut,
    Repetition,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RepetitionCounter {
    pub last_normalized: Option<String>,
    pub count: u32,
    pub suppressed_until: Option<DateTime<Utc>>,
}

impl RepetitionCounter {
    pub fn is_suppressed(&self, now: DateTime<Utc>) -> bool {
        self.suppressed_until.is_some_and(|until| now < until)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HistoryRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Persistent per-peer state. Created lazily on a peer's first turn and never evicted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationState {
    pub peer: PeerId,
    #[serde(default)]
    pub mode: ConversationMode,
    #[serde(default)]
    pub block_reason: Option<BlockReason>,
    #[serde(default)]
    pub repetition: RepetitionCounter,
    #[serde(default)]
    pub history: VecDeque<HistoryEntry>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    /// When `mode` last changed.
    #[serde(default)]
    pub mode_since: Option<DateTime<Utc>>,
}

impl ConversationState {
    pub fn new(peer: impl Into<PeerId>) -> Self {
        Self {
            peer: peer.into(),
            mode: ConversationMode::AiActive,
            block_reason: None,
            repetition: RepetitionCounter::default(),
            history: VecDeque::new(),
            last_message_at: None,
            mode_since: None,
        }
    }

    /// Appends to the history, dropping the oldest entries beyond `limit`.
    pub fn record(&mut self, role: HistoryRole, text: impl Into<String>, at: DateTime<Utc>, limit: usize) {
        self.history.push_back(HistoryEntry {
            role,
            text: text.into(),
            at,
        });
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }
}

/// Extra facts the transport knows about an inbound event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboundMetadata {
    /// Transport key of the message (Matrix event id).
    pub key: String,
    pub sender: String,
    /// Sent by a configured human operator.
    pub from_operator: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub peer: PeerId,
    pub text: String,
    pub metadata: InboundMetadata,
}

/// One logical unit of inbound text, possibly merged from several rapid messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub peer: PeerId,
    pub text: String,
    /// Key of the last message folded into this turn.
    pub last_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundPayload {
    pub text: String,
    pub media: Option<ContentPayload>,
}

impl OutboundPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Image,
    Video,
    Document,
}

/// A resolved piece of media ready to be attached to a send.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentPayload {
    pub kind: MediaKind,
    pub url: String,
    pub mime: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportState {
    Disconnected,
    Connecting,
    AwaitingCredential,
    Active,
}

impl TransportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportState::Disconnected => "disconnected",
            TransportState::Connecting => "connecting",
            TransportState::AwaitingCredential => "awaiting_credential",
            TransportState::Active => "active",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMethod {
    /// Log in with the configured password, or restore a persisted session.
    Password,
    /// Ask for out-of-band confirmation (SSO); completes via `confirm_credential`.
    SingleSignOn,
}

/// Out-of-band confirmation the operator has to complete.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialChallenge {
    pub prompt: String,
}

/// Persisted metadata of the live session. `credential` is opaque to the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionMetadata {
    pub account: String,
    pub credential: serde_json::Value,
    pub saved_at: DateTime<Utc>,
}

/// Why a live session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    Logout,
    InvalidCredential,
    Network(String),
    Other(String),
}

impl CloseReason {
    /// Terminal reasons need external re-initiation; everything else reconnects.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CloseReason::Logout | CloseReason::InvalidCredential)
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Logout => write!(f, "logged out"),
            CloseReason::InvalidCredential => write!(f, "invalid credential"),
            CloseReason::Network(e) => write!(f, "network: {e}"),
            CloseReason::Other(e) => write!(f, "{e}"),
        }
    }
}

/// One entry of a channel's rotation. When several interval units are set,
/// days win over hours, hours over minutes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BroadcastMessage {
    pub content: String,
    #[serde(default)]
    pub media_ref: Option<String>,
    #[serde(default)]
    pub days: Option<u64>,
    #[serde(default)]
    pub hours: Option<u64>,
    #[serde(default)]
    pub minutes: Option<u64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl BroadcastMessage {
    pub fn every_minutes(content: impl Into<String>, minutes: u64) -> Self {
        Self {
            content: content.into(),
            media_ref: None,
            days: None,
            hours: None,
            minutes: Some(minutes),
            enabled: true,
        }
    }

    /// Effective interval, or `None` when no positive unit is set or the value overflows.
    pub fn interval(&self) -> Option<Duration> {
        let positive = |v: Option<u64>| v.filter(|n| *n > 0);
        let secs = match (positive(self.days), positive(self.hours), positive(self.minutes)) {
            (Some(days), _, _) => days.checked_mul(86_400),
            (None, Some(hours), _) => hours.checked_mul(3_600),
            (None, None, Some(minutes)) => minutes.checked_mul(60),
            (None, None, None) => None,
        }?;
        Some(Duration::from_secs(secs))
    }

    /// Enabled and carrying a usable interval.
    pub fn is_schedulable(&self) -> bool {
        self.enabled && self.interval().is_some()
    }
}

/// A channel's whole rotation. Replaced wholesale on reconfiguration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BroadcastChannelSchedule {
    pub channel: ChannelId,
    pub messages: Vec<BroadcastMessage>,
    #[serde(default)]
    pub cursor: usize,
    #[serde(default)]
    pub next_fire_at: Option<DateTime<Utc>>,
}

impl BroadcastChannelSchedule {
    pub fn new(channel: impl Into<ChannelId>, messages: Vec<BroadcastMessage>) -> Self {
        Self {
            channel: channel.into(),
            messages,
            cursor: 0,
            next_fire_at: None,
        }
    }

    /// Index of the first schedulable message at or after `from`, wrapping around.
    pub fn next_schedulable(&self, from: usize) -> Option<usize> {
        let len = self.messages.len();
        (0..len)
            .map(|offset| (from + offset) % len)
            .find(|&i| self.messages[i].is_schedulable())
    }
}
