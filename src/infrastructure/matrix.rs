//! # Matrix Transport Adapter
//!
//! Implements the `Transport` and `ChatSession` traits for the Matrix protocol using the `matrix_sdk`.
//! A connect builds a fresh client, restores a persisted session or logs in (password or SSO),
//! registers the event handlers and runs the sync loop. The sync loop's exit is
//! what tells the supervisor the session closed, and why.

use async_trait::async_trait;
use chrono::Utc;
use matrix_sdk::authentication::matrix::MatrixSession;
use matrix_sdk::config::SyncSettings;
use matrix_sdk::room::Room;
use matrix_sdk::ruma::api::client::error::{ErrorKind, RetryAfter};
use matrix_sdk::ruma::events::room::member::{MembershipState, StrippedRoomMemberEvent};
use matrix_sdk::ruma::events::room::message::{MessageType, RoomMessageEventContent, SyncRoomMessageEvent};
use matrix_sdk::ruma::RoomId;
use matrix_sdk::store::RoomLoadSettings;
use matrix_sdk::Client;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;

use crate::application::timer::ScheduledTask;
use crate::domain::config::{MatrixConfig, OperatorConfig};
use crate::domain::errors::{DeliveryError, TransportError};
use crate::domain::traits::{ChatSession, ConnectOutcome, InboundHandler, Transport};
use crate::domain::types::{
    CloseReason, ConnectMethod, CredentialChallenge, InboundEvent, InboundMetadata, OutboundPayload,
    SessionMetadata,
};
use crate::strings::logs;

type SharedHandler = Arc<RwLock<Option<Arc<dyn InboundHandler>>>>;

pub struct MatrixTransport {
    config: MatrixConfig,
    operator: OperatorConfig,
    handler: SharedHandler,
    /// Client waiting for an SSO login token.
    pending_sso: Mutex<Option<Client>>,
}

impl MatrixTransport {
    pub fn new(config: MatrixConfig, operator: OperatorConfig) -> Self {
        Self {
            config,
            operator,
            handler: Arc::new(RwLock::new(None)),
            pending_sso: Mutex::new(None),
        }
    }

    async fn build_client(&self) -> Result<Client, TransportError> {
        Client::builder()
            .homeserver_url(&self.config.homeserver)
            .build()
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))
    }

    fn device_name(&self) -> &str {
        self.config.display_name.as_deref().unwrap_or("parley")
    }

    async fn restore(&self, credential: serde_json::Value) -> Option<Client> {
        let session: MatrixSession = match serde_json::from_value(credential) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Persisted session unreadable, logging in again: {}", e);
                return None;
            }
        };
        let client = self.build_client().await.ok()?;
        match client
            .matrix_auth()
            .restore_session(session, RoomLoadSettings::default())
            .await
        {
            Ok(()) => {
                tracing::info!("{}", logs::SESSION_RESTORED);
                Some(client)
            }
            Err(e) => {
                tracing::warn!("Failed to restore session, logging in again: {}", e);
                None
            }
        }
    }

    /// Wires a logged-in client up and starts its sync loop.
    async fn start(&self, client: Client) -> Arc<dyn ChatSession> {
        if let Some(name) = &self.config.display_name {
            tracing::info!("{}", logs::setting_display_name(name));
            if let Err(e) = client.account().set_display_name(Some(name.as_str())).await {
                tracing::warn!("{}", logs::set_display_name_fail(&e.to_string()));
            }
        }

        let start_time = SystemTime::now();
        let handler = self.handler.clone();
        let operator = self.operator.clone();
        client.add_event_handler(move |ev: SyncRoomMessageEvent, room: Room| {
            let handler = handler.clone();
            let operator = operator.clone();
            async move {
                let Some(original) = ev.as_original() else {
                    return;
                };
                let event_time = UNIX_EPOCH + Duration::from_millis(ev.origin_server_ts().get().into());
                if event_time < start_time {
                    return;
                }
                if original.sender == room.own_user_id() {
                    return;
                }
                let MessageType::Text(text) = &original.content.msgtype else {
                    return;
                };
                let Some(handler) = handler.read().ok().and_then(|h| h.clone()) else {
                    tracing::warn!("No inbound handler subscribed; dropping message");
                    return;
                };

                let sender = original.sender.as_str();
                tracing::debug!("Received message from {} in {}", sender, room.room_id());
                handler
                    .on_inbound(InboundEvent {
                        peer: room.room_id().to_string(),
                        text: text.body.clone(),
                        metadata: InboundMetadata {
                            key: original.event_id.to_string(),
                            sender: sender.to_string(),
                            from_operator: operator.is_operator(sender),
                        },
                    })
                    .await;
            }
        });

        client.add_event_handler(|ev: StrippedRoomMemberEvent, room: Room| async move {
            if ev.content.membership == MembershipState::Invite {
                tracing::info!("{}", logs::invite_received(room.room_id().as_str()));
                match room.join().await {
                    Ok(()) => tracing::info!("{}", logs::JOIN_INVITE_SUCCESS),
                    Err(e) => tracing::warn!("{}", logs::join_invite_fail(&e.to_string())),
                }
            }
        });

        let (close_tx, close_rx) = watch::channel(None);
        let sync_client = client.clone();
        let sync = ScheduledTask::spawn(async move {
            tracing::info!("{}", logs::SYNC_LOOP_START);
            let reason = match sync_client.sync(SyncSettings::default()).await {
                Ok(()) => CloseReason::Other("sync loop stopped".into()),
                Err(e) => {
                    tracing::warn!("{}", logs::sync_loop_fail(&e.to_string()));
                    close_reason(&e)
                }
            };
            close_tx.send_replace(Some(reason));
        });

        Arc::new(MatrixChat {
            client,
            close_rx,
            _sync: sync,
        })
    }
}

#[async_trait]
impl Transport for MatrixTransport {
    fn subscribe(&self, handler: Arc<dyn InboundHandler>) {
        if let Ok(mut slot) = self.handler.write() {
            *slot = Some(handler);
        }
    }

    async fn connect(
        &self,
        method: ConnectMethod,
        credential: Option<serde_json::Value>,
    ) -> Result<ConnectOutcome, TransportError> {
        if let Some(credential) = credential {
            if let Some(client) = self.restore(credential).await {
                return Ok(ConnectOutcome::Active(self.start(client).await));
            }
        }

        let client = self.build_client().await?;
        match method {
            ConnectMethod::Password => {
                let Some(password) = &self.config.password else {
                    return Err(TransportError::InvalidCredential(
                        "no password configured; use SSO".into(),
                    ));
                };
                client
                    .matrix_auth()
                    .login_username(&self.config.username, password)
                    .initial_device_display_name(self.device_name())
                    .send()
                    .await
                    .map_err(login_error)?;
                tracing::info!("{}", logs::LOGIN_SUCCESS);
                Ok(ConnectOutcome::Active(self.start(client).await))
            }
            ConnectMethod::SingleSignOn => {
                let url = client
                    .matrix_auth()
                    .get_sso_login_url(&self.config.sso_redirect_url, None)
                    .await
                    .map_err(|e| TransportError::Unavailable(e.to_string()))?;
                if let Ok(mut pending) = self.pending_sso.lock() {
                    *pending = Some(client);
                }
                Ok(ConnectOutcome::Challenge(CredentialChallenge {
                    prompt: logs::sso_prompt(&url),
                }))
            }
        }
    }

    async fn confirm_credential(&self, proof: &str) -> Result<Arc<dyn ChatSession>, TransportError> {
        let client = self
            .pending_sso
            .lock()
            .ok()
            .and_then(|mut pending| pending.take())
            .ok_or(TransportError::NoPendingChallenge)?;
        client
            .matrix_auth()
            .login_token(proof.trim())
            .initial_device_display_name(self.device_name())
            .send()
            .await
            .map_err(login_error)?;
        tracing::info!("{}", logs::LOGIN_SUCCESS);
        Ok(self.start(client).await)
    }
}

/// One logged-in client with a running sync loop. Dropping it stops the loop.
pub struct MatrixChat {
    client: Client,
    close_rx: watch::Receiver<Option<CloseReason>>,
    _sync: ScheduledTask,
}

impl MatrixChat {
    fn room(&self, target: &str) -> Result<Room, DeliveryError> {
        let room_id = RoomId::parse(target).map_err(|e| DeliveryError::Terminal {
            status: 400,
            message: format!("{target}: {e}"),
        })?;
        self.client.get_room(&room_id).ok_or_else(|| DeliveryError::Terminal {
            status: 404,
            message: format!("not joined to {target}"),
        })
    }
}

#[async_trait]
impl ChatSession for MatrixChat {
    async fn send(&self, target: &str, payload: &OutboundPayload) -> Result<String, DeliveryError> {
        let room = self.room(target)?;
        tracing::info!("Bot sending message to {}", target);
        room.send(RoomMessageEventContent::text_markdown(message_body(payload)))
            .await
            .map(|resp| resp.event_id.to_string())
            .map_err(delivery_error)
    }

    async fn typing(&self, target: &str) -> Result<(), DeliveryError> {
        self.room(target)?
            .typing_notice(true)
            .await
            .map_err(delivery_error)
    }

    async fn closed(&self) -> CloseReason {
        let mut rx = self.close_rx.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone().unwrap_or(CloseReason::Other("closed".into())),
            Err(_) => CloseReason::Other("sync loop dropped".into()),
        }
    }

    fn metadata(&self) -> SessionMetadata {
        let credential = self
            .client
            .matrix_auth()
            .session()
            .and_then(|s| serde_json::to_value(s).ok())
            .unwrap_or(serde_json::Value::Null);
        SessionMetadata {
            account: self
                .client
                .user_id()
                .map(|u| u.to_string())
                .unwrap_or_default(),
            credential,
            saved_at: Utc::now(),
        }
    }
}

/// Markdown body; media is linked below the text.
fn message_body(payload: &OutboundPayload) -> String {
    match &payload.media {
        Some(media) if payload.text.trim().is_empty() => media.url.clone(),
        Some(media) => format!("{}\n\n{}", payload.text, media.url),
        None => payload.text.clone(),
    }
}

fn close_reason(e: &matrix_sdk::Error) -> CloseReason {
    match e.client_api_error_kind() {
        Some(ErrorKind::UnknownToken { .. }) => CloseReason::InvalidCredential,
        Some(ErrorKind::UserDeactivated) => CloseReason::Logout,
        _ => CloseReason::Network(e.to_string()),
    }
}

fn login_error(e: matrix_sdk::Error) -> TransportError {
    let status = e.as_client_api_error().map(|api| api.status_code.as_u16());
    match status {
        Some(400 | 401 | 403) => TransportError::InvalidCredential(e.to_string()),
        _ => TransportError::Unavailable(e.to_string()),
    }
}

fn delivery_error(e: matrix_sdk::Error) -> DeliveryError {
    match e.client_api_error_kind() {
        Some(ErrorKind::LimitExceeded { retry_after }) => {
            let retry_after = match retry_after {
                Some(RetryAfter::Delay(delay)) => Some(*delay),
                _ => None,
            };
            return DeliveryError::RateLimited { retry_after };
        }
        Some(ErrorKind::UnknownToken { .. }) => return DeliveryError::SessionTerminal(e.to_string()),
        _ => {}
    }
    match e.as_client_api_error() {
        Some(api) => DeliveryError::from_status(api.status_code.as_u16(), e.to_string(), None),
        None => DeliveryError::Transient(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{ContentPayload, MediaKind};

    #[test]
    fn media_is_linked_below_the_text() {
        let mut payload = OutboundPayload::text("Today's menu");
        assert_eq!(message_body(&payload), "Today's menu");

        payload.media = Some(ContentPayload {
            kind: MediaKind::Image,
            url: "https://cdn.example.org/menu.png".into(),
            mime: Some("image/png".into()),
        });
        assert_eq!(
            message_body(&payload),
            "Today's menu\n\nhttps://cdn.example.org/menu.png"
        );

        payload.text.clear();
        assert_eq!(message_body(&payload), "https://cdn.example.org/menu.png");
    }
}
