//! # Domain Traits
//!
//! Abstract interfaces for the collaborators around the orchestration core
//! (transport, responder, content, persistence, operator notices, time).
//! Allows for pluggable implementations in the Infrastructure layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::errors::{ContentError, DeliveryError, ResponderError, TransportError};
use crate::domain::types::{
    BroadcastChannelSchedule, CloseReason, ConnectMethod, ContentPayload, ConversationState,
    CredentialChallenge, HistoryEntry, InboundEvent, MediaKind, OutboundPayload, PeerId,
    SessionMetadata,
};

/// One live transport session.
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Send a payload, returning the transport key of the sent message.
    async fn send(&self, target: &str, payload: &OutboundPayload) -> Result<String, DeliveryError>;

    /// Send a "composing" indicator.
    async fn typing(&self, target: &str) -> Result<(), DeliveryError>;

    /// Resolves once the session has ended.
    async fn closed(&self) -> CloseReason;

    /// Metadata worth persisting so the session can be restored.
    fn metadata(&self) -> SessionMetadata;
}

/// Result of a connect call.
pub enum ConnectOutcome {
    Active(Arc<dyn ChatSession>),
    Challenge(CredentialChallenge),
}

/// Receives inbound events from the transport.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn on_inbound(&self, event: InboundEvent);
}

/// Factory for transport sessions.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Register the inbound handler every future session delivers to.
    fn subscribe(&self, handler: Arc<dyn InboundHandler>);

    /// Start a session. `credential` is a persisted credential blob, if any.
    async fn connect(
        &self,
        method: ConnectMethod,
        credential: Option<serde_json::Value>,
    ) -> Result<ConnectOutcome, TransportError>;

    /// Complete a pending out-of-band challenge.
    async fn confirm_credential(&self, proof: &str) -> Result<Arc<dyn ChatSession>, TransportError>;
}

/// What the responder knows about a peer besides the turn text.
#[derive(Debug, Clone, Default)]
pub struct TurnContext {
    pub peer: PeerId,
    pub history: Vec<HistoryEntry>,
}

/// The AI/content-generation collaborator.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn generate(&self, turn_text: &str, context: &TurnContext) -> Result<String, ResponderError>;
}

/// Media/content lookups.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn fetch(&self, kind: MediaKind, query: &str) -> Result<ContentPayload, ContentError>;
}

/// Best-effort operator notices.
#[async_trait]
pub trait OperatorSink: Send + Sync {
    async fn notify(&self, operator: &str, text: &str) -> Result<(), DeliveryError>;
}

/// Opaque persistence of orchestration state.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_conversations(&self) -> anyhow::Result<Vec<ConversationState>>;
    async fn save_conversation(&self, state: &ConversationState) -> anyhow::Result<()>;

    async fn load_session(&self) -> anyhow::Result<Option<SessionMetadata>>;
    async fn save_session(&self, metadata: &SessionMetadata) -> anyhow::Result<()>;
    async fn clear_session(&self) -> anyhow::Result<()>;

    async fn load_schedules(&self) -> anyhow::Result<Vec<BroadcastChannelSchedule>>;
    async fn save_schedule(&self, schedule: &BroadcastChannelSchedule) -> anyhow::Result<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
