//! # Messages
//!
//! Contains constant strings and format functions for user-facing messages.
//! Includes peer replies for handoff transitions, operator notices and command feedback.

// Peer-facing
pub const APOLOGY: &str =
    "Sorry, I'm having trouble answering right now. Please try again in a little while.";
pub const HANDOFF_ACK: &str = "👋 Got it, I'm connecting you with a member of our team. They'll reply here shortly.";
pub const RESUME_ACK: &str = "🤖 I'm back! How can I help?";
pub const OPT_OUT_CONFIRM: &str =
    "You won't receive any more automated replies. Send \"resume bot\" any time to start again.";
pub const SUPPRESSION_NOTICE: &str =
    "It looks like we're going in circles. I'll pause for a while; ask for a human if you need one.";

// Operator-facing
pub fn handoff_requested(peer: &str, text: &str) -> String {
    format!("🙋 **Handoff requested** in {peer}: \"{text}\"")
}

pub fn delivery_escalation(peer: &str, err: &str) -> String {
    format!("⚠️ **Reply not delivered** to {peer}: {err}")
}

pub fn repetition_escalation(peer: &str, text: &str) -> String {
    format!("🔁 **Repetition suppressed** in {peer}: \"{text}\"")
}

// Commands
pub const UNKNOWN_COMMAND: &str = "❓ Unknown command. Try `.help`.";
pub const BROADCAST_USAGE: &str = "Usage: `.broadcast <room_id> <minutes> <message>`, `.broadcast <room_id> [{\"content\": ..., \"minutes\": ...}]` or `.broadcast <room_id> off`";

pub fn unblocked(peer: &str) -> String {
    format!("✅ {peer} is back with the assistant.")
}

pub fn human_mode_forced(peer: &str) -> String {
    format!("🧑 {peer} is now handled by a human.")
}

pub fn mode_report(peer: &str, mode: &str) -> String {
    format!("**{peer}**: `{mode}`")
}

pub fn broadcast_configured(channel: &str, count: usize) -> String {
    format!("📣 Broadcast for {channel} set ({count} message(s)).")
}

pub fn broadcast_cleared(channel: &str) -> String {
    format!("🔕 Broadcast for {channel} cleared.")
}

pub fn command_failed(err: &str) -> String {
    format!("❌ **Command Failed**: {err}")
}
