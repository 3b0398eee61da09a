//! # Turn Pipeline
//!
//! What happens to one aggregated turn: handoff gating, repetition throttling,
//! the responder call and reply delivery. Every outbound call goes through the
//! delivery retrier. Operator notices are spawned and best-effort.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::application::aggregator::TurnSink;
use crate::application::handle::TransportHandleProvider;
use crate::application::handoff::{HandoffMachine, HandoffOutcome, HandoffPhrases, Silence};
use crate::application::retry::DeliveryRetrier;
use crate::application::state::ConversationRegistry;
use crate::application::throttle::{RepetitionThrottle, ThrottleVerdict};
use crate::domain::config::AppConfig;
use crate::domain::errors::DeliveryError;
use crate::domain::traits::{Clock, OperatorSink, Responder, TurnContext};
use crate::domain::types::{BlockReason, ConversationMode, ConversationState, HistoryRole, OutboundPayload, Turn};
use crate::strings::messages;

/// What the gates decided for a turn.
enum Step {
    Acknowledge(&'static str),
    Handoff,
    Suppress,
    Silent(Silence),
    Respond(TurnContext),
}

pub struct TurnPipeline {
    registry: ConversationRegistry,
    handoff: HandoffMachine,
    throttle: RepetitionThrottle,
    responder: Arc<dyn Responder>,
    retrier: DeliveryRetrier,
    handle: TransportHandleProvider,
    operator: Arc<dyn OperatorSink>,
    operator_room: Option<String>,
    clock: Arc<dyn Clock>,
    history_limit: usize,
}

impl TurnPipeline {
    pub fn new(
        config: &AppConfig,
        registry: ConversationRegistry,
        responder: Arc<dyn Responder>,
        handle: TransportHandleProvider,
        operator: Arc<dyn OperatorSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let phrases = HandoffPhrases::from_config(&config.phrases)?;
        Ok(Self {
            registry,
            handoff: HandoffMachine::new(phrases, config.conversation.human_idle()),
            throttle: RepetitionThrottle::from_config(&config.conversation),
            responder,
            retrier: DeliveryRetrier::from_config(&config.delivery),
            handle,
            operator,
            operator_room: config.operator.room.clone(),
            clock,
            history_limit: config.conversation.history_limit,
        })
    }

    /// Effective mode of a peer, with lazy expiries applied. Unknown peers are `AiActive`.
    pub async fn query_mode(&self, peer: &str) -> ConversationMode {
        let Some(mut state) = self.registry.get(peer).await else {
            return ConversationMode::AiActive;
        };
        self.handoff.expire(&mut state, self.clock.now());
        state.mode
    }

    /// Operator override: back to the assistant, clearing any block or suppression.
    pub async fn force_unblock(&self, peer: &str) {
        let now = self.clock.now();
        self.registry.update(peer, |state| self.handoff.resume(state, now)).await;
        tracing::info!("Operator returned {} to the assistant", peer);
    }

    /// Operator override: a human handles the peer from now on.
    pub async fn force_human_mode(&self, peer: &str) {
        let now = self.clock.now();
        let changed = self
            .registry
            .update(peer, |state| {
                let changed = state.mode != ConversationMode::HumanActive;
                self.handoff.enter_human(state, now);
                changed
            })
            .await;
        if changed {
            tracing::info!("Operator took over {}", peer);
        }
    }

    pub fn registry(&self) -> &ConversationRegistry {
        &self.registry
    }

    fn gate(&self, state: &mut ConversationState, text: &str, now: DateTime<Utc>) -> Step {
        match self.handoff.evaluate(state, text, now) {
            HandoffOutcome::ResumedAssistant => Step::Acknowledge(messages::RESUME_ACK),
            HandoffOutcome::EnteredHuman => Step::Handoff,
            HandoffOutcome::OptedOut => Step::Acknowledge(messages::OPT_OUT_CONFIRM),
            HandoffOutcome::Silenced(silence) => Step::Silent(silence),
            HandoffOutcome::Continue => match self.throttle.observe(&mut state.repetition, text, now) {
                ThrottleVerdict::Allow => {
                    let context = TurnContext {
                        peer: state.peer.clone(),
                        history: state.history.iter().cloned().collect(),
                    };
                    state.record(HistoryRole::User, text, now, self.history_limit);
                    Step::Respond(context)
                }
                ThrottleVerdict::Escalate => {
                    self.handoff.block(state, BlockReason::Repetition, now);
                    Step::Suppress
                }
                ThrottleVerdict::Drop => Step::Silent(Silence::Suppressed),
            },
        }
    }

    async fn respond(&self, turn: &Turn, context: TurnContext) {
        let label = format!("responder for {}", turn.peer);
        let generated = self
            .retrier
            .run(&label, || self.responder.generate(&turn.text, &context))
            .await;

        let reply = match generated {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("No answer for {}: {}", turn.peer, e);
                if let Err(e) = self.deliver(&turn.peer, messages::APOLOGY).await {
                    tracing::error!("Apology to {} not delivered: {}", turn.peer, e);
                }
                return;
            }
        };

        match self.deliver(&turn.peer, &reply).await {
            Ok(_) => {
                let now = self.clock.now();
                let limit = self.history_limit;
                self.registry
                    .update(&turn.peer, |state| state.record(HistoryRole::Assistant, reply, now, limit))
                    .await;
            }
            Err(e) => {
                tracing::error!("Reply to {} not delivered: {}", turn.peer, e);
                self.notify_operator(messages::delivery_escalation(&turn.peer, &e.to_string()));
            }
        }
    }

    /// Sends text to a peer through whatever session is live at each attempt.
    async fn deliver(&self, peer: &str, text: &str) -> Result<String, DeliveryError> {
        let payload = OutboundPayload::text(text);
        let (handle, payload) = (&self.handle, &payload);
        self.retrier
            .run(&format!("reply to {peer}"), move || async move {
                let session = handle.require()?;
                session.send(peer, payload).await
            })
            .await
    }

    async fn acknowledge(&self, peer: &str, text: &str) {
        if let Err(e) = self.deliver(peer, text).await {
            tracing::warn!("Acknowledgement to {} not delivered: {}", peer, e);
        }
    }

    fn notify_operator(&self, text: String) {
        let Some(room) = self.operator_room.clone() else {
            tracing::debug!("No operator room configured; dropping notice: {}", text);
            return;
        };
        let operator = self.operator.clone();
        let retrier = self.retrier.clone();
        tokio::spawn(async move {
            retrier
                .best_effort("operator notice", || operator.notify(&room, &text))
                .await;
        });
    }
}

#[async_trait]
impl TurnSink for TurnPipeline {
    async fn handle_turn(&self, turn: Turn) {
        let now = self.clock.now();
        let step = self
            .registry
            .update(&turn.peer, |state| self.gate(state, &turn.text, now))
            .await;

        match step {
            Step::Respond(context) => self.respond(&turn, context).await,
            Step::Acknowledge(text) => self.acknowledge(&turn.peer, text).await,
            Step::Handoff => {
                tracing::info!("{} asked for a human", turn.peer);
                self.acknowledge(&turn.peer, messages::HANDOFF_ACK).await;
                self.notify_operator(messages::handoff_requested(&turn.peer, &turn.text));
            }
            Step::Suppress => {
                tracing::info!("Suppressing repeated input from {}", turn.peer);
                self.acknowledge(&turn.peer, messages::SUPPRESSION_NOTICE).await;
                self.notify_operator(messages::repetition_escalation(&turn.peer, &turn.text));
            }
            Step::Silent(silence) => {
                tracing::debug!("Not answering {} ({:?})", turn.peer, silence);
            }
        }
    }
}
