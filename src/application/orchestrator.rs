//! # Orchestrator
//!
//! Entry point for everything the transport delivers, and the operations exposed
//! to the outside: registering inbound events, configuring broadcasts, and
//! querying or overriding a peer's handoff mode.

use async_trait::async_trait;
use std::sync::Arc;

use crate::application::aggregator::Aggregator;
use crate::application::broadcast::BroadcastScheduler;
use crate::application::pipeline::TurnPipeline;
use crate::application::retry::DeliveryRetrier;
use crate::application::router::CommandRouter;
use crate::application::supervisor::ConnectionSupervisor;
use crate::domain::config::AppConfig;
use crate::domain::traits::InboundHandler;
use crate::domain::types::{BroadcastMessage, ConversationMode, InboundEvent};

pub struct Orchestrator {
    supervisor: Arc<ConnectionSupervisor>,
    aggregator: Aggregator,
    pipeline: Arc<TurnPipeline>,
    scheduler: Arc<BroadcastScheduler>,
    router: CommandRouter,
    operator_room: Option<String>,
}

impl Orchestrator {
    pub fn new(
        config: &AppConfig,
        supervisor: Arc<ConnectionSupervisor>,
        pipeline: Arc<TurnPipeline>,
        scheduler: Arc<BroadcastScheduler>,
    ) -> Self {
        let aggregator = Aggregator::new(
            config.conversation.debounce(),
            config.conversation.liveness_interval(),
            supervisor.handle(),
            pipeline.clone(),
        );
        let router = CommandRouter::new(
            pipeline.clone(),
            scheduler.clone(),
            supervisor.clone(),
            DeliveryRetrier::from_config(&config.delivery),
        );
        Self {
            supervisor,
            aggregator,
            pipeline,
            scheduler,
            router,
            operator_room: config.operator.room.clone(),
        }
    }

    /// Accepts one inbound message. Peer messages are queued for aggregation and
    /// never wait on downstream work. Operator messages are commands, or mark the
    /// operator as having taken over the room.
    pub async fn register_inbound_event(&self, event: InboundEvent) {
        if event.text.trim().is_empty() {
            return;
        }
        self.supervisor.touch();
        let in_operator_room = self.operator_room.as_deref() == Some(event.peer.as_str());

        if event.metadata.from_operator {
            if self
                .router
                .route(&event.peer, &event.metadata.sender, &event.text)
                .await
            {
                return;
            }
            if !in_operator_room {
                self.force_human_mode(&event.peer).await;
            }
            return;
        }
        if in_operator_room {
            tracing::debug!("Ignoring non-operator message in the operator room");
            return;
        }

        self.aggregator
            .enqueue(&event.peer, &event.text, &event.metadata.key);
    }

    pub async fn configure_broadcast(&self, channel: &str, messages: Vec<BroadcastMessage>) -> anyhow::Result<()> {
        self.scheduler.configure(channel, messages).await
    }

    pub async fn query_handoff_state(&self, peer: &str) -> ConversationMode {
        self.pipeline.query_mode(peer).await
    }

    pub async fn force_unblock(&self, peer: &str) {
        self.pipeline.force_unblock(peer).await;
    }

    pub async fn force_human_mode(&self, peer: &str) {
        self.pipeline.force_human_mode(peer).await;
    }
}

#[async_trait]
impl InboundHandler for Orchestrator {
    async fn on_inbound(&self, event: InboundEvent) {
        self.register_inbound_event(event).await;
    }
}
