//! # Data Paths
//!
//! Centralized definitions for where the bot keeps its files.
//! Acts as the single source of truth for the layout of the data directory.

use std::path::{Path, PathBuf};

pub const DATA_DIR: &str = "data";
pub const CONFIG_FILE: &str = "config.yaml";
pub const LOG_FILE: &str = "session.log";
pub const CONVERSATIONS_FILE: &str = "conversations.json";
pub const SESSION_FILE: &str = "session.json";
pub const BROADCASTS_FILE: &str = "broadcasts.json";

/// Default config location: `data/config.yaml`, falling back to the user config dir.
pub fn default_config_path() -> PathBuf {
    let local = Path::new(DATA_DIR).join(CONFIG_FILE);
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|dir| dir.join("parley").join(CONFIG_FILE))
        .filter(|p| p.exists())
        .unwrap_or(local)
}

pub fn conversations_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONVERSATIONS_FILE)
}

pub fn session_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SESSION_FILE)
}

pub fn broadcasts_path(data_dir: &Path) -> PathBuf {
    data_dir.join(BROADCASTS_FILE)
}
