//! # Conversation Aggregator
//!
//! Collapses bursts of inbound messages from one peer into a single turn.
//! Every enqueue (re)arms the peer's quiescence timer; while it is pending the peer
//! sees a "composing" indicator, repeated until the window closes. When the window
//! closes the batch is joined in arrival order and handed downstream. Turns for
//! the same peer are processed one at a time.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::application::handle::TransportHandleProvider;
use crate::application::timer::ScheduledTask;
use crate::domain::types::{PeerId, Turn};

/// Downstream consumer of completed turns.
#[async_trait]
pub trait TurnSink: Send + Sync {
    async fn handle_turn(&self, turn: Turn);
}

struct PendingInput {
    text: String,
    key: String,
}

struct PeerSlot {
    pending: Vec<PendingInput>,
    /// The one debounce timer for this peer; replacing it cancels the old one.
    timer: Option<ScheduledTask>,
    /// Held for the duration of a turn.
    turn_lock: Arc<tokio::sync::Mutex<()>>,
}

impl PeerSlot {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
            timer: None,
            turn_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }
}

type Slots = Arc<Mutex<HashMap<PeerId, PeerSlot>>>;

#[derive(Clone)]
pub struct Aggregator {
    window: Duration,
    liveness_every: Duration,
    handle: TransportHandleProvider,
    sink: Arc<dyn TurnSink>,
    slots: Slots,
}

impl Aggregator {
    pub fn new(
        window: Duration,
        liveness_every: Duration,
        handle: TransportHandleProvider,
        sink: Arc<dyn TurnSink>,
    ) -> Self {
        Self {
            window,
            liveness_every,
            handle,
            sink,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Queue one inbound message. Never blocks on downstream work.
    pub fn enqueue(&self, peer: &str, text: &str, key: &str) {
        let Ok(mut slots) = self.slots.lock() else {
            tracing::error!("Aggregator state poisoned; dropping message from {}", peer);
            return;
        };
        let slot = slots.entry(peer.to_string()).or_insert_with(PeerSlot::new);
        slot.pending.push(PendingInput {
            text: text.to_string(),
            key: key.to_string(),
        });
        slot.timer = Some(self.arm(peer.to_string()));
    }

    /// Number of messages waiting for the peer's window to close.
    pub fn pending(&self, peer: &str) -> usize {
        self.slots
            .lock()
            .ok()
            .and_then(|slots| slots.get(peer).map(|s| s.pending.len()))
            .unwrap_or(0)
    }

    fn arm(&self, peer: PeerId) -> ScheduledTask {
        let window = self.window;
        let liveness_every = self.liveness_every;
        let handle = self.handle.clone();
        let sink = self.sink.clone();
        let slots = self.slots.clone();

        ScheduledTask::spawn(async move {
            let deadline = tokio::time::sleep(window);
            tokio::pin!(deadline);
            let mut liveness = tokio::time::interval(liveness_every);
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    _ = liveness.tick() => send_liveness(&handle, &peer),
                }
            }
            fire(&slots, &peer, sink);
        })
    }
}

/// Fire-and-forget composing indicator.
fn send_liveness(handle: &TransportHandleProvider, peer: &str) {
    let Some(session) = handle.current() else {
        tracing::debug!("No live session; skipping liveness signal for {}", peer);
        return;
    };
    let peer = peer.to_string();
    tokio::spawn(async move {
        if let Err(e) = session.typing(&peer).await {
            tracing::warn!("Liveness signal to {} failed: {}", peer, e);
        }
    });
}

/// Drain the batch and process it as one turn, behind the peer's turn lock.
fn fire(slots: &Slots, peer: &str, sink: Arc<dyn TurnSink>) {
    let (inputs, turn_lock) = {
        let Ok(mut slots) = slots.lock() else {
            return;
        };
        let Some(slot) = slots.get_mut(peer) else {
            return;
        };
        (std::mem::take(&mut slot.pending), slot.turn_lock.clone())
    };
    let Some(last) = inputs.last() else {
        return;
    };

    let turn = Turn {
        peer: peer.to_string(),
        last_key: last.key.clone(),
        text: inputs
            .iter()
            .map(|i| i.text.as_str())
            .collect::<Vec<_>>()
            .join(" "),
    };
    tracing::debug!("Turn ready for {} ({} message(s))", peer, inputs.len());

    tokio::spawn(async move {
        let _turn = turn_lock.lock().await;
        sink.handle_turn(turn).await;
    });
}
