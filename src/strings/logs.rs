pub fn config_loaded(user: &str) -> String {
    format!("Loaded configuration for user: {user}")
}

pub const LOGIN_SUCCESS: &str = "Logged in successfully!";
pub const SESSION_RESTORED: &str = "Restored persisted session.";

pub fn setting_display_name(name: &str) -> String {
    format!("Setting display name to: {name}")
}

pub fn set_display_name_fail(err: &str) -> String {
    format!("Failed to set display name: {err}")
}

pub const SYNC_LOOP_START: &str = "Starting sync loop...";

pub fn sync_loop_fail(err: &str) -> String {
    format!("Sync loop failed: {err}")
}

pub const SHUTDOWN: &str = "Shutting down...";

pub fn shutdown_fail(err: &str) -> String {
    format!("Unable to listen for shutdown signal: {err}")
}

pub fn invite_received(room_id: &str) -> String {
    format!("💌 Received invite for room {room_id:?}")
}

pub fn join_invite_fail(err: &str) -> String {
    format!("Failed to join room after invite: {err}")
}

pub const JOIN_INVITE_SUCCESS: &str = "✅ Successfully joined room!";

pub fn sso_prompt(url: &str) -> String {
    format!(
        "Open this URL to log in, then paste the `loginToken` value from the redirect:\n{url}"
    )
}

pub fn hydrated(conversations: usize) -> String {
    format!("Loaded {conversations} conversation(s) from disk")
}

pub fn broadcasts_seeded(channels: usize) -> String {
    format!("Seeded {channels} broadcast channel(s) from config")
}
