//! # Connection Supervisor
//!
//! Owns the one live transport session. Drives it through
//! `Disconnected -> Connecting -> (AwaitingCredential) -> Active`, classifies
//! unexpected closes, reconnects with bounded linear backoff and tells dependents
//! (the broadcast scheduler) when the session comes up or is torn down for good.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use crate::application::handle::TransportHandleProvider;
use crate::application::timer::ScheduledTask;
use crate::domain::config::ReconnectConfig;
use crate::domain::errors::TransportError;
use crate::domain::traits::{ChatSession, ConnectOutcome, StateStore, Transport};
use crate::domain::types::{CloseReason, ConnectMethod, CredentialChallenge, TransportState};

/// How often a waiting connect request re-checks the gate.
const GATE_POLL: Duration = Duration::from_millis(250);

/// Things that care about the session lifecycle.
#[async_trait]
pub trait SessionListener: Send + Sync {
    /// The session reached ACTIVE (first connect or any reconnect).
    async fn on_active(&self);
    /// The session was torn down and needs external re-initiation.
    async fn on_terminated(&self);
}

/// Linear backoff: `base × attempt`, capped at `ceiling`. The last allowed
/// attempt always waits the full ceiling.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub ceiling: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            base: Duration::from_secs(config.base_delay_secs),
            ceiling: Duration::from_secs(config.max_delay_secs),
            max_attempts: config.max_attempts,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt >= self.max_attempts {
            return self.ceiling;
        }
        (self.base * attempt).min(self.ceiling)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

/// What a connect request ended in.
#[derive(Debug, Clone, PartialEq)]
pub enum Connected {
    Active,
    AlreadyActive,
    Challenge(CredentialChallenge),
}

/// Snapshot for status queries.
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorStatus {
    pub state: TransportState,
    pub reconnect_attempts: u32,
    pub last_activity: Option<DateTime<Utc>>,
}

struct Session {
    status: SupervisorStatus,
    method: ConnectMethod,
    /// Bumped on every activation; stale close notifications are ignored.
    generation: u64,
}

pub struct ConnectionSupervisor {
    transport: Arc<dyn Transport>,
    store: Arc<dyn StateStore>,
    handle: TransportHandleProvider,
    policy: ReconnectPolicy,
    session: Mutex<Session>,
    state_tx: watch::Sender<TransportState>,
    connecting: AtomicBool,
    reconnect: Mutex<Option<ScheduledTask>>,
    monitor: Mutex<Option<ScheduledTask>>,
    listeners: Mutex<Vec<Arc<dyn SessionListener>>>,
}

/// Releases the connect gate when the in-flight attempt finishes.
struct GateGuard<'a>(&'a AtomicBool);

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ConnectionSupervisor {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn StateStore>,
        handle: TransportHandleProvider,
        policy: ReconnectPolicy,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(TransportState::Disconnected);
        Arc::new(Self {
            transport,
            store,
            handle,
            policy,
            session: Mutex::new(Session {
                status: SupervisorStatus {
                    state: TransportState::Disconnected,
                    reconnect_attempts: 0,
                    last_activity: None,
                },
                method: ConnectMethod::Password,
                generation: 0,
            }),
            state_tx,
            connecting: AtomicBool::new(false),
            reconnect: Mutex::new(None),
            monitor: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn add_listener(&self, listener: Arc<dyn SessionListener>) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(listener);
        }
    }

    pub fn handle(&self) -> TransportHandleProvider {
        self.handle.clone()
    }

    pub fn state(&self) -> TransportState {
        *self.state_tx.borrow()
    }

    pub fn status(&self) -> SupervisorStatus {
        self.session
            .lock()
            .map(|s| s.status.clone())
            .unwrap_or(SupervisorStatus {
                state: self.state(),
                reconnect_attempts: 0,
                last_activity: None,
            })
    }

    /// Record inbound/outbound activity on the live session.
    pub fn touch(&self) {
        if let Ok(mut session) = self.session.lock() {
            session.status.last_activity = Some(Utc::now());
        }
    }

    /// Explicit connect request. Cancels any pending automatic reconnect and waits
    /// for an in-flight attempt instead of racing it.
    pub async fn connect(self: &Arc<Self>, method: ConnectMethod) -> Result<Connected, TransportError> {
        self.cancel_reconnect();
        self.attempt(method).await
    }

    /// First connect of the process. Transient failures are left to the reconnect
    /// backoff and only terminal ones are returned. A challenge is answered with
    /// proofs from `read_proof` until one is accepted.
    pub async fn start<F, Fut>(self: &Arc<Self>, method: ConnectMethod, mut read_proof: F) -> Result<(), TransportError>
    where
        F: FnMut(CredentialChallenge) -> Fut,
        Fut: Future<Output = Option<String>>,
    {
        let challenge = match self.connect(method).await {
            Ok(Connected::Challenge(challenge)) => challenge,
            Ok(_) => return Ok(()),
            Err(e) if e.is_terminal() => return Err(e),
            Err(e) => {
                tracing::warn!("Initial connect failed, retrying in the background: {}", e);
                return Ok(());
            }
        };

        loop {
            let Some(proof) = read_proof(challenge.clone()).await else {
                return Err(TransportError::InvalidCredential("no credential entered".into()));
            };
            match self.confirm_credential(proof.trim()).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_terminal() || e == TransportError::NoPendingChallenge => return Err(e),
                Err(e) => tracing::warn!("Credential confirmation failed, try again: {}", e),
            }
        }
    }

    /// Complete an out-of-band credential challenge.
    pub async fn confirm_credential(self: &Arc<Self>, proof: &str) -> Result<Connected, TransportError> {
        let _gate = self.acquire_gate().await;
        if self.state() != TransportState::AwaitingCredential {
            return Err(TransportError::NoPendingChallenge);
        }
        match self.transport.confirm_credential(proof).await {
            Ok(session) => {
                self.activate(session).await;
                Ok(Connected::Active)
            }
            Err(e) if e.is_terminal() => {
                tracing::error!("Credential confirmation rejected: {}", e);
                self.teardown(CloseReason::InvalidCredential).await;
                Err(e)
            }
            Err(e) => {
                tracing::warn!("Credential confirmation failed, still waiting: {}", e);
                Err(e)
            }
        }
    }

    async fn acquire_gate(&self) -> GateGuard<'_> {
        while self
            .connecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tokio::time::sleep(GATE_POLL).await;
        }
        GateGuard(&self.connecting)
    }

    async fn attempt(self: &Arc<Self>, method: ConnectMethod) -> Result<Connected, TransportError> {
        let _gate = self.acquire_gate().await;
        if self.state() == TransportState::Active {
            return Ok(Connected::AlreadyActive);
        }

        if let Ok(mut session) = self.session.lock() {
            session.method = method;
        }
        self.set_state(TransportState::Connecting);

        let credential = match self.store.load_session().await {
            Ok(saved) => saved.map(|m| m.credential),
            Err(e) => {
                tracing::warn!("Could not load persisted session: {}", e);
                None
            }
        };

        match self.transport.connect(method, credential).await {
            Ok(ConnectOutcome::Active(session)) => {
                self.activate(session).await;
                Ok(Connected::Active)
            }
            Ok(ConnectOutcome::Challenge(challenge)) => {
                tracing::info!("Transport awaiting credential confirmation");
                self.set_state(TransportState::AwaitingCredential);
                Ok(Connected::Challenge(challenge))
            }
            Err(e) if e.is_terminal() => {
                tracing::error!("Connect rejected: {}", e);
                self.teardown(CloseReason::InvalidCredential).await;
                Err(e)
            }
            Err(e) => {
                tracing::warn!("Connect failed: {}", e);
                self.set_state(TransportState::Disconnected);
                self.schedule_reconnect();
                Err(e)
            }
        }
    }

    async fn activate(self: &Arc<Self>, session: Arc<dyn ChatSession>) {
        let generation = match self.session.lock() {
            Ok(mut s) => {
                s.generation += 1;
                s.status.reconnect_attempts = 0;
                s.status.last_activity = Some(Utc::now());
                s.generation
            }
            Err(_) => return,
        };

        self.handle.replace(Some(session.clone()));
        self.set_state(TransportState::Active);
        tracing::info!("Transport session active");

        if let Err(e) = self.store.save_session(&session.metadata()).await {
            tracing::warn!("Failed to persist session metadata: {}", e);
        }

        let this = self.clone();
        let watched = session.clone();
        let monitor = ScheduledTask::spawn(async move {
            let reason = watched.closed().await;
            this.on_closed(generation, reason).await;
        });
        if let Ok(mut slot) = self.monitor.lock() {
            *slot = Some(monitor);
        }

        let listeners = self.listeners();
        futures::future::join_all(listeners.iter().map(|l| l.on_active())).await;
    }

    async fn on_closed(self: &Arc<Self>, generation: u64, reason: CloseReason) {
        let current = self.session.lock().map(|s| s.generation).unwrap_or(0);
        if current != generation {
            return;
        }
        if reason.is_terminal() {
            tracing::error!("Transport session ended ({}); manual re-initiation required", reason);
            self.teardown(reason).await;
        } else {
            tracing::warn!("Transport session closed ({}); scheduling reconnect", reason);
            self.handle.replace(None);
            self.set_state(TransportState::Disconnected);
            self.schedule_reconnect();
        }
    }

    /// Full teardown: forget the credential and stop dependents.
    async fn teardown(&self, reason: CloseReason) {
        self.handle.replace(None);
        self.set_state(TransportState::Disconnected);
        self.cancel_reconnect();
        if let Err(e) = self.store.clear_session().await {
            tracing::warn!("Failed to clear persisted session after {}: {}", reason, e);
        }
        let listeners = self.listeners();
        futures::future::join_all(listeners.iter().map(|l| l.on_terminated())).await;
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let (attempt, method) = match self.session.lock() {
            Ok(mut s) => {
                if s.status.reconnect_attempts >= self.policy.max_attempts {
                    tracing::error!(
                        "Giving up after {} reconnect attempts; transport stays disconnected",
                        s.status.reconnect_attempts
                    );
                    return;
                }
                s.status.reconnect_attempts += 1;
                (s.status.reconnect_attempts, s.method)
            }
            Err(_) => return,
        };

        let delay = self.policy.delay_for(attempt);
        tracing::info!("Reconnect attempt {} in {:?}", attempt, delay);
        let this = self.clone();
        let timer = ScheduledTask::spawn(async move {
            tokio::time::sleep(delay).await;
            // Detached so the attempt can re-arm this slot without aborting itself.
            tokio::spawn(async move {
                let _ = this.attempt(method).await;
            });
        });
        if let Ok(mut slot) = self.reconnect.lock() {
            *slot = Some(timer);
        }
    }

    fn cancel_reconnect(&self) {
        if let Ok(mut slot) = self.reconnect.lock() {
            slot.take();
        }
    }

    fn set_state(&self, state: TransportState) {
        if let Ok(mut session) = self.session.lock() {
            session.status.state = state;
        }
        self.state_tx.send_replace(state);
    }

    fn listeners(&self) -> Vec<Arc<dyn SessionListener>> {
        self.listeners.lock().map(|l| l.clone()).unwrap_or_default()
    }
}
