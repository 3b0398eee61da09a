//! # JSON State Store
//!
//! Persists orchestration state as pretty-printed JSON files in the data directory:
//! per-peer conversations, the transport session and broadcast schedules.
//! Writes go to a temporary file first and are renamed into place.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::domain::paths;
use crate::domain::traits::StateStore;
use crate::domain::types::{
    BroadcastChannelSchedule, ChannelId, ConversationState, PeerId, SessionMetadata,
};

pub struct JsonStateStore {
    data_dir: PathBuf,
    /// Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl JsonStateStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(value))
    }

    async fn write<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.data_dir.display()))?;
        let content = serde_json::to_string_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load_conversations(&self) -> Result<Vec<ConversationState>> {
        let path = paths::conversations_path(&self.data_dir);
        let map: BTreeMap<PeerId, ConversationState> = self.read(&path).await?.unwrap_or_default();
        Ok(map.into_values().collect())
    }

    async fn save_conversation(&self, state: &ConversationState) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = paths::conversations_path(&self.data_dir);
        let mut map: BTreeMap<PeerId, ConversationState> = self.read(&path).await?.unwrap_or_default();
        map.insert(state.peer.clone(), state.clone());
        self.write(&path, &map).await
    }

    async fn load_session(&self) -> Result<Option<SessionMetadata>> {
        self.read(&paths::session_path(&self.data_dir)).await
    }

    async fn save_session(&self, metadata: &SessionMetadata) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(&paths::session_path(&self.data_dir), metadata).await
    }

    async fn clear_session(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = paths::session_path(&self.data_dir);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }

    async fn load_schedules(&self) -> Result<Vec<BroadcastChannelSchedule>> {
        let path = paths::broadcasts_path(&self.data_dir);
        let map: BTreeMap<ChannelId, BroadcastChannelSchedule> =
            self.read(&path).await?.unwrap_or_default();
        Ok(map.into_values().collect())
    }

    async fn save_schedule(&self, schedule: &BroadcastChannelSchedule) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = paths::broadcasts_path(&self.data_dir);
        let mut map: BTreeMap<ChannelId, BroadcastChannelSchedule> =
            self.read(&path).await?.unwrap_or_default();
        map.insert(schedule.channel.clone(), schedule.clone());
        self.write(&path, &map).await
    }
}
