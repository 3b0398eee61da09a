//! # Broadcast Command
//!
//! Handles `.broadcast`.
//! Replaces a channel's rotation, or clears it.

use crate::application::broadcast::BroadcastScheduler;
use crate::application::router::BroadcastRequest;
use crate::strings::messages;

pub async fn handle_broadcast(scheduler: &BroadcastScheduler, request: BroadcastRequest) -> String {
    let (channel, messages_to_send) = match request {
        BroadcastRequest::Set { channel, messages } => (channel, messages),
        BroadcastRequest::Off { channel } => (channel, Vec::new()),
    };
    let count = messages_to_send.len();

    match scheduler.configure(&channel, messages_to_send).await {
        Ok(()) if count == 0 => messages::broadcast_cleared(&channel),
        Ok(()) => messages::broadcast_configured(&channel, count),
        Err(e) => {
            tracing::error!("Failed to configure broadcast for {}: {:#}", channel, e);
            messages::command_failed(&e.to_string())
        }
    }
}
