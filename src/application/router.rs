//! # Command Router
//!
//! Routes operator commands (e.g., `.unblock`) to the appropriate handler in
//! `interface/commands` and posts the handler's answer back into the room the
//! command was typed in.

use std::sync::Arc;

use crate::application::broadcast::BroadcastScheduler;
use crate::application::handle::TransportHandleProvider;
use crate::application::pipeline::TurnPipeline;
use crate::application::retry::DeliveryRetrier;
use crate::application::supervisor::ConnectionSupervisor;
use crate::domain::types::{BroadcastMessage, OutboundPayload};
use crate::interface::commands;

#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    Unblock(String),
    Human(String),
    Mode(String),
    Broadcast(BroadcastRequest),
    Status,
    Help,
    Usage(&'static str),
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastRequest {
    Set {
        channel: String,
        messages: Vec<BroadcastMessage>,
    },
    Off {
        channel: String,
    },
}

/// Parses `.command args`. Room arguments default to the room the command was typed in.
pub fn parse(message: &str, room: &str) -> Option<OperatorCommand> {
    let msg = message.trim();
    if !msg.starts_with('.') {
        return None;
    }
    let (cmd, args) = match msg.find(char::is_whitespace) {
        Some(idx) => (&msg[..idx], msg[idx..].trim()),
        None => (msg, ""),
    };
    let target = || {
        args.split_whitespace()
            .next()
            .unwrap_or(room)
            .to_string()
    };

    let command = match cmd.to_lowercase().as_str() {
        ".unblock" => OperatorCommand::Unblock(target()),
        ".human" => OperatorCommand::Human(target()),
        ".mode" => OperatorCommand::Mode(target()),
        ".status" => OperatorCommand::Status,
        ".help" => OperatorCommand::Help,
        ".broadcast" => parse_broadcast(args),
        other => OperatorCommand::Unknown(other.to_string()),
    };
    Some(command)
}

/// `<room> off`, `<room> <minutes> <text>`, or `<room> [<json messages>]` for a full rotation.
fn parse_broadcast(args: &str) -> OperatorCommand {
    let usage = OperatorCommand::Usage(crate::strings::messages::BROADCAST_USAGE);
    let Some((channel, rest)) = args.split_once(char::is_whitespace) else {
        return usage;
    };
    let rest = rest.trim();
    let set = |messages| {
        OperatorCommand::Broadcast(BroadcastRequest::Set {
            channel: channel.to_string(),
            messages,
        })
    };

    if rest.starts_with('[') {
        return match serde_json::from_str::<Vec<BroadcastMessage>>(rest) {
            Ok(messages) if messages.iter().any(BroadcastMessage::is_schedulable) => set(messages),
            Ok(_) => usage,
            Err(e) => {
                tracing::debug!("Rejected broadcast rotation: {}", e);
                usage
            }
        };
    }
    if rest.eq_ignore_ascii_case("off") {
        return OperatorCommand::Broadcast(BroadcastRequest::Off {
            channel: channel.to_string(),
        });
    }

    let (minutes, content) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let content = content.trim();
    match minutes.parse::<u64>() {
        Ok(minutes) if !content.is_empty() => {
            let message = BroadcastMessage::every_minutes(content, minutes);
            if message.is_schedulable() { set(vec![message]) } else { usage }
        }
        _ => usage,
    }
}

pub struct CommandRouter {
    pipeline: Arc<TurnPipeline>,
    scheduler: Arc<BroadcastScheduler>,
    supervisor: Arc<ConnectionSupervisor>,
    handle: TransportHandleProvider,
    retrier: DeliveryRetrier,
}

impl CommandRouter {
    pub fn new(
        pipeline: Arc<TurnPipeline>,
        scheduler: Arc<BroadcastScheduler>,
        supervisor: Arc<ConnectionSupervisor>,
        retrier: DeliveryRetrier,
    ) -> Self {
        Self {
            pipeline,
            scheduler,
            handle: supervisor.handle(),
            supervisor,
            retrier,
        }
    }

    /// Runs the command if `message` is one. Returns whether it was.
    pub async fn route(&self, room: &str, sender: &str, message: &str) -> bool {
        let Some(command) = parse(message, room) else {
            return false;
        };
        tracing::info!("Router dispatching {:?} sender='{}'", command, sender);

        let answer = match command {
            OperatorCommand::Unblock(peer) => commands::conversation::handle_unblock(&self.pipeline, &peer).await,
            OperatorCommand::Human(peer) => commands::conversation::handle_human(&self.pipeline, &peer).await,
            OperatorCommand::Mode(peer) => commands::conversation::handle_mode(&self.pipeline, &peer).await,
            OperatorCommand::Broadcast(request) => {
                commands::broadcast::handle_broadcast(&self.scheduler, request).await
            }
            OperatorCommand::Status => {
                commands::status::handle_status(&self.supervisor, &self.pipeline, &self.scheduler).await
            }
            OperatorCommand::Help => commands::help::handle_help(),
            OperatorCommand::Usage(usage) => usage.to_string(),
            OperatorCommand::Unknown(cmd) => {
                tracing::debug!("Unknown operator command {}", cmd);
                crate::strings::messages::UNKNOWN_COMMAND.to_string()
            }
        };

        let payload = OutboundPayload::text(answer);
        let (handle, payload) = (&self.handle, &payload);
        self.retrier
            .best_effort("command answer", move || async move {
                handle.require()?.send(room, payload).await
            })
            .await;
        true
    }
}
