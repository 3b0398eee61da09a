//! Test doubles for the collaborators around the orchestration core.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::application::supervisor::SessionListener;
use crate::domain::errors::{ContentError, DeliveryError, ResponderError, TransportError};
use crate::domain::traits::{
    ChatSession, Clock, ConnectOutcome, ContentProvider, InboundHandler, OperatorSink, Responder,
    StateStore, Transport, TurnContext,
};
use crate::domain::types::{
    BroadcastChannelSchedule, ChannelId, CloseReason, ConnectMethod, ContentPayload,
    ConversationState, CredentialChallenge, InboundEvent, MediaKind, OutboundPayload, PeerId,
    SessionMetadata,
};

/// A transport session that records everything sent through it.
pub struct FakeSession {
    sent: Mutex<Vec<(String, OutboundPayload, Instant)>>,
    send_attempts: AtomicUsize,
    send_failures: Mutex<VecDeque<DeliveryError>>,
    typing: Mutex<Vec<(String, Instant)>>,
    typing_fails: AtomicBool,
    close_tx: watch::Sender<Option<CloseReason>>,
}

impl FakeSession {
    pub fn new() -> Arc<Self> {
        let (close_tx, _) = watch::channel(None);
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            send_attempts: AtomicUsize::new(0),
            send_failures: Mutex::new(VecDeque::new()),
            typing: Mutex::new(Vec::new()),
            typing_fails: AtomicBool::new(false),
            close_tx,
        })
    }

    pub fn close(&self, reason: CloseReason) {
        self.close_tx.send_replace(Some(reason));
    }

    /// The next sends fail with these errors, in order.
    pub fn fail_sends(&self, errors: impl IntoIterator<Item = DeliveryError>) {
        self.send_failures.lock().unwrap().extend(errors);
    }

    pub fn fail_typing(&self) {
        self.typing_fails.store(true, Ordering::SeqCst);
    }

    pub fn sent_texts(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(to, p, _)| (to.clone(), p.text.clone()))
            .collect()
    }

    pub fn sent_to(&self, target: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _, _)| to == target)
            .map(|(_, p, _)| p.text.clone())
            .collect()
    }

    pub fn sent_payloads(&self) -> Vec<(String, OutboundPayload, Instant)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub fn typing_times(&self, target: &str) -> Vec<Instant> {
        self.typing
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == target)
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl ChatSession for FakeSession {
    async fn send(&self, target: &str, payload: &OutboundPayload) -> Result<String, DeliveryError> {
        let n = self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.send_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.sent
            .lock()
            .unwrap()
            .push((target.to_string(), payload.clone(), Instant::now()));
        Ok(format!("$event{n}"))
    }

    async fn typing(&self, target: &str) -> Result<(), DeliveryError> {
        self.typing
            .lock()
            .unwrap()
            .push((target.to_string(), Instant::now()));
        if self.typing_fails.load(Ordering::SeqCst) {
            return Err(DeliveryError::Transient("typing rejected".into()));
        }
        Ok(())
    }

    async fn closed(&self) -> CloseReason {
        let mut rx = self.close_tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone().unwrap_or(CloseReason::Other("closed".into())),
            Err(_) => CloseReason::Other("session dropped".into()),
        }
    }

    fn metadata(&self) -> SessionMetadata {
        SessionMetadata {
            account: "@bot:example.org".into(),
            credential: serde_json::json!({ "access_token": "secret" }),
            saved_at: Utc::now(),
        }
    }
}

enum Scripted {
    Active(Arc<FakeSession>),
    Challenge(String),
    Error(TransportError),
}

/// A transport that plays back scripted connect outcomes. Once the script runs
/// out, every connect fails transiently.
pub struct FakeTransport {
    script: Mutex<VecDeque<Scripted>>,
    confirm: Mutex<Option<Arc<FakeSession>>>,
    confirm_errors: Mutex<VecDeque<TransportError>>,
    latency: Mutex<Duration>,
    calls: Mutex<Vec<Instant>>,
    inbound: Mutex<Option<Arc<dyn InboundHandler>>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            confirm: Mutex::new(None),
            confirm_errors: Mutex::new(VecDeque::new()),
            latency: Mutex::new(Duration::ZERO),
            calls: Mutex::new(Vec::new()),
            inbound: Mutex::new(None),
        })
    }

    pub fn push_active(&self, session: Arc<FakeSession>) {
        self.script.lock().unwrap().push_back(Scripted::Active(session));
    }

    pub fn push_challenge(&self, prompt: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Challenge(prompt.to_string()));
    }

    pub fn push_transient(&self, message: &str) {
        self.push_error(TransportError::Unavailable(message.to_string()));
    }

    pub fn push_error(&self, error: TransportError) {
        self.script.lock().unwrap().push_back(Scripted::Error(error));
    }

    pub fn set_confirm_session(&self, session: Arc<FakeSession>) {
        *self.confirm.lock().unwrap() = Some(session);
    }

    pub fn push_confirm_error(&self, error: TransportError) {
        self.confirm_errors.lock().unwrap().push_back(error);
    }

    pub fn set_connect_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn connect_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }

    pub fn inbound(&self) -> Option<Arc<dyn InboundHandler>> {
        self.inbound.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn subscribe(&self, handler: Arc<dyn InboundHandler>) {
        *self.inbound.lock().unwrap() = Some(handler);
    }

    async fn connect(
        &self,
        _method: ConnectMethod,
        _credential: Option<serde_json::Value>,
    ) -> Result<ConnectOutcome, TransportError> {
        self.calls.lock().unwrap().push(Instant::now());
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Active(session)) => Ok(ConnectOutcome::Active(session)),
            Some(Scripted::Challenge(prompt)) => {
                Ok(ConnectOutcome::Challenge(CredentialChallenge { prompt }))
            }
            Some(Scripted::Error(e)) => Err(e),
            None => Err(TransportError::Unavailable("connection refused".into())),
        }
    }

    async fn confirm_credential(&self, _proof: &str) -> Result<Arc<dyn ChatSession>, TransportError> {
        if let Some(error) = self.confirm_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        let session = self.confirm.lock().unwrap().take();
        match session {
            Some(session) => Ok(session),
            None => Err(TransportError::InvalidCredential("unknown token".into())),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    conversations: Mutex<HashMap<PeerId, ConversationState>>,
    session: Mutex<Option<SessionMetadata>>,
    schedules: Mutex<HashMap<ChannelId, BroadcastChannelSchedule>>,
    save_delays: Mutex<VecDeque<Duration>>,
    load_delays: Mutex<VecDeque<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn session(&self) -> Option<SessionMetadata> {
        self.session.lock().unwrap().clone()
    }

    pub fn seed_session(&self, account: &str) {
        *self.session.lock().unwrap() = Some(SessionMetadata {
            account: account.to_string(),
            credential: serde_json::json!({}),
            saved_at: Utc::now(),
        });
    }

    pub fn conversation(&self, peer: &str) -> Option<ConversationState> {
        self.conversations.lock().unwrap().get(peer).cloned()
    }

    pub fn seed_conversation(&self, state: ConversationState) {
        self.conversations
            .lock()
            .unwrap()
            .insert(state.peer.clone(), state);
    }

    pub fn seed_schedule(&self, schedule: BroadcastChannelSchedule) {
        self.schedules
            .lock()
            .unwrap()
            .insert(schedule.channel.clone(), schedule);
    }

    /// Each following conversation save waits the next delay before it lands.
    pub fn delay_conversation_saves(&self, delays: impl IntoIterator<Item = Duration>) {
        self.save_delays.lock().unwrap().extend(delays);
    }

    /// Each following schedule load reads immediately, then waits the next delay before returning.
    pub fn delay_schedule_loads(&self, delays: impl IntoIterator<Item = Duration>) {
        self.load_delays.lock().unwrap().extend(delays);
    }

    pub fn schedule(&self, channel: &str) -> Option<BroadcastChannelSchedule> {
        self.schedules.lock().unwrap().get(channel).cloned()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load_conversations(&self) -> anyhow::Result<Vec<ConversationState>> {
        Ok(self.conversations.lock().unwrap().values().cloned().collect())
    }

    async fn save_conversation(&self, state: &ConversationState) -> anyhow::Result<()> {
        let delay = self.save_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.seed_conversation(state.clone());
        Ok(())
    }

    async fn load_session(&self) -> anyhow::Result<Option<SessionMetadata>> {
        Ok(self.session())
    }

    async fn save_session(&self, metadata: &SessionMetadata) -> anyhow::Result<()> {
        *self.session.lock().unwrap() = Some(metadata.clone());
        Ok(())
    }

    async fn clear_session(&self) -> anyhow::Result<()> {
        *self.session.lock().unwrap() = None;
        Ok(())
    }

    async fn load_schedules(&self) -> anyhow::Result<Vec<BroadcastChannelSchedule>> {
        let mut schedules: Vec<_> = self.schedules.lock().unwrap().values().cloned().collect();
        schedules.sort_by(|a, b| a.channel.cmp(&b.channel));
        let delay = self.load_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(schedules)
    }

    async fn save_schedule(&self, schedule: &BroadcastChannelSchedule) -> anyhow::Result<()> {
        self.seed_schedule(schedule.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingListener {
    activations: AtomicUsize,
    terminations: AtomicUsize,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionListener for RecordingListener {
    async fn on_active(&self) {
        self.activations.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_terminated(&self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
    }
}

/// Answers `reply: <turn>` unless a failure is queued.
#[derive(Default)]
pub struct ScriptedResponder {
    turns: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<ResponderError>>,
}

impl ScriptedResponder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, errors: impl IntoIterator<Item = ResponderError>) {
        self.failures.lock().unwrap().extend(errors);
    }

    pub fn turns(&self) -> Vec<String> {
        self.turns.lock().unwrap().clone()
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn generate(&self, turn_text: &str, _context: &TurnContext) -> Result<String, ResponderError> {
        self.turns.lock().unwrap().push(turn_text.to_string());
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(format!("reply: {turn_text}"))
    }
}

#[derive(Default)]
pub struct RecordingOperatorSink {
    notices: Mutex<Vec<(String, String)>>,
    fails: AtomicBool,
}

impl RecordingOperatorSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self) {
        self.fails.store(true, Ordering::SeqCst);
    }

    pub fn notices(&self) -> Vec<(String, String)> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl OperatorSink for RecordingOperatorSink {
    async fn notify(&self, operator: &str, text: &str) -> Result<(), DeliveryError> {
        if self.fails.load(Ordering::SeqCst) {
            return Err(DeliveryError::Transient("operator room unreachable".into()));
        }
        self.notices
            .lock()
            .unwrap()
            .push((operator.to_string(), text.to_string()));
        Ok(())
    }
}

/// Resolves every query to a link payload, or fails when told to.
#[derive(Default)]
pub struct FakeContentProvider {
    fails: AtomicBool,
}

impl FakeContentProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self) {
        self.fails.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentProvider for FakeContentProvider {
    async fn fetch(&self, kind: MediaKind, query: &str) -> Result<ContentPayload, ContentError> {
        if self.fails.load(Ordering::SeqCst) {
            return Err(ContentError(format!("{query} not found")));
        }
        Ok(ContentPayload {
            kind,
            url: query.to_string(),
            mime: None,
        })
    }
}

/// Wall clock the test moves by hand.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap()),
        })
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Collects inbound events handed to it.
#[derive(Default)]
pub struct RecordingInbound {
    events: Mutex<Vec<InboundEvent>>,
}

impl RecordingInbound {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<InboundEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl InboundHandler for RecordingInbound {
    async fn on_inbound(&self, event: InboundEvent) {
        self.events.lock().unwrap().push(event);
    }
}
