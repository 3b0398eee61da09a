//! # Status Command
//!
//! Handles `.status`.
//! Reports the connection state, non-default conversation modes and running broadcasts.

use crate::application::broadcast::BroadcastScheduler;
use crate::application::pipeline::TurnPipeline;
use crate::application::supervisor::ConnectionSupervisor;
use crate::domain::types::ConversationMode;

pub async fn handle_status(
    supervisor: &ConnectionSupervisor,
    pipeline: &TurnPipeline,
    scheduler: &BroadcastScheduler,
) -> String {
    let status = supervisor.status();
    let mut out = format!(
        "**📡 Connection**: `{}` (reconnect attempts: {})\n",
        status.state.as_str(),
        status.reconnect_attempts
    );
    if let Some(at) = status.last_activity {
        out.push_str(&format!("Last activity: {}\n", at.format("%Y-%m-%d %H:%M:%S UTC")));
    }

    let conversations = pipeline.registry().all().await;
    let mut flagged = Vec::new();
    for state in &conversations {
        let mode = pipeline.query_mode(&state.peer).await;
        if mode != ConversationMode::AiActive {
            flagged.push(format!("* {}: `{}`", state.peer, mode.as_str()));
        }
    }
    out.push_str(&format!("\n**💬 Conversations**: {}\n", conversations.len()));
    for line in flagged {
        out.push_str(&line);
        out.push('\n');
    }

    let broadcasts = scheduler.snapshot();
    out.push_str(&format!("\n**📣 Broadcasts**: {}\n", broadcasts.len()));
    for schedule in broadcasts {
        let next = schedule
            .next_fire_at
            .map(|at| at.format("%H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "* {}: message {}/{} next at {}\n",
            schedule.channel,
            schedule.cursor + 1,
            schedule.messages.len(),
            next
        ));
    }
    out
}
