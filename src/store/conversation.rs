use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::EventBus;
use crate::models::ConversationRecord;

/// Persistence behind the single conversation slot.
///
/// Both variants honor the same contract: `save` replaces unconditionally
/// (last write wins, no merge), `load` returns whatever was last written.
#[async_trait]
pub trait ConversationBackend: Send + Sync {
    async fn save(&self, record: &ConversationRecord) -> Result<()>;
    async fn load(&self) -> Result<Option<ConversationRecord>>;
    async fn clear(&self) -> Result<()>;
}

/// Ephemeral in-process slot.
pub struct MemoryBackend {
    slot: RwLock<Option<ConversationRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationBackend for MemoryBackend {
    async fn save(&self, record: &ConversationRecord) -> Result<()> {
        *self.slot.write().await = Some(record.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<ConversationRecord>> {
        Ok(self.slot.read().await.clone())
    }

    async fn clear(&self) -> Result<()> {
        *self.slot.write().await = None;
        Ok(())
    }
}

/// Durable slot: one JSON file at a fixed path, no schema versioning.
///
/// Every `load` re-reads the file so a write from another process within the
/// same environment is observed; there is deliberately no in-process cache in
/// front of the file.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ConversationBackend for FileBackend {
    async fn save(&self, record: &ConversationRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let bytes = serde_json::to_vec(record)?;
        tokio::fs::write(&self.path, bytes)
            .await
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<ConversationRecord>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let record = serde_json::from_slice(&bytes)
                    .with_context(|| format!("parsing {}", self.path.display()))?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", self.path.display())),
        }
    }
}

/// Authoritative holder of the most recent conversation, with change
/// notification through the [`EventBus`].
///
/// Single-writer-at-a-time is assumed (one webhook delivery at a time);
/// overlapping `set` calls race with last-write-wins on the backend.
pub struct ConversationStore {
    backend: Box<dyn ConversationBackend>,
    bus: Arc<EventBus>,
}

impl ConversationStore {
    pub fn new(backend: Box<dyn ConversationBackend>, bus: Arc<EventBus>) -> Self {
        Self { backend, bus }
    }

    pub fn in_memory(bus: Arc<EventBus>) -> Self {
        Self::new(Box::new(MemoryBackend::new()), bus)
    }

    pub fn file_backed(path: PathBuf, bus: Arc<EventBus>) -> Self {
        Self::new(Box::new(FileBackend::new(path)), bus)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Replace the current conversation unconditionally, then publish it.
    pub async fn set(&self, record: ConversationRecord) -> Result<()> {
        self.backend.save(&record).await?;
        self.bus.publish(&record).await;
        Ok(())
    }

    /// Current conversation, or `None` if nothing has been received yet.
    pub async fn get(&self) -> Result<Option<ConversationRecord>> {
        self.backend.load().await
    }

    /// Return to the absent state.
    pub async fn clear(&self) -> Result<()> {
        self.backend.clear().await
    }
}
