//! # Conversation Commands
//!
//! Handles `.unblock`, `.human` and `.mode`.
//! Operator overrides of a peer's handoff mode.

use crate::application::pipeline::TurnPipeline;
use crate::strings::messages;

pub async fn handle_unblock(pipeline: &TurnPipeline, peer: &str) -> String {
    pipeline.force_unblock(peer).await;
    messages::unblocked(peer)
}

pub async fn handle_human(pipeline: &TurnPipeline, peer: &str) -> String {
    pipeline.force_human_mode(peer).await;
    messages::human_mode_forced(peer)
}

pub async fn handle_mode(pipeline: &TurnPipeline, peer: &str) -> String {
    let mode = pipeline.query_mode(peer).await;
    messages::mode_report(peer, mode.as_str())
}
