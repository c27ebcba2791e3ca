// ABOUTME: Durable persistence for SyncState behind a narrow StateStore trait
// ABOUTME: JSON file store for deployments, in-memory store for tests and dry runs

use anyhow::{Context, Result};
use async_trait::async_trait;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

use super::state::SyncState;

/// Exclusive hold on the persisted state, released on drop.
#[must_use]
pub struct StateLock {
    file: Option<File>,
}

impl StateLock {
    /// Lock for a store that no other process can reach.
    pub fn unshared() -> Self {
        Self { file: None }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            if let Err(e) = FileExt::unlock(file) {
                tracing::warn!("Failed to release sync state lock: {}", e);
            }
        }
    }
}

/// Storage for the process-wide SyncState.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Take the store's exclusive lock; hold it from load until the final save.
    async fn lock(&self) -> Result<StateLock> {
        Ok(StateLock::unshared())
    }

    /// Load the persisted state. Missing or unreadable state yields an empty state.
    async fn load(&self) -> SyncState;

    /// Persist the full state.
    async fn save(&self, state: &SyncState) -> Result<()>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// SyncState persisted as pretty-printed JSON on disk.
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default state file location, relative to the working directory.
    pub fn default_path() -> PathBuf {
        PathBuf::from(".crm-sync-bridge/sync-state.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file that serializes access across processes.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "sync-state".into());
        name.push(".lock");
        self.path.with_file_name(name)
    }

    async fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create directory {:?}", parent))?;
            }
        }
        Ok(())
    }

    async fn read(&self) -> Result<SyncState> {
        let contents = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read sync state from {:?}", self.path))?;
        let state: SyncState = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse sync state from {:?}", self.path))?;
        Ok(state)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn lock(&self) -> Result<StateLock> {
        self.ensure_parent().await?;

        let lock_path = self.lock_path();
        let file = tokio::task::spawn_blocking(move || -> Result<File> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)
                .with_context(|| format!("Failed to open state lock {:?}", lock_path))?;
            // Blocks while another process holds the state
            file.lock_exclusive()
                .with_context(|| format!("Failed to lock {:?}", lock_path))?;
            Ok(file)
        })
        .await
        .context("State lock task failed")??;

        tracing::debug!("Locked sync state at {:?}", self.path);
        Ok(StateLock { file: Some(file) })
    }

    async fn load(&self) -> SyncState {
        if !self.path.exists() {
            tracing::info!("No sync state at {:?}, starting empty", self.path);
            return SyncState::new();
        }

        match self.read().await {
            Ok(state) => {
                tracing::debug!("Loaded sync state from {:?}", self.path);
                state
            }
            Err(e) => {
                tracing::warn!("{:#}. Starting with empty state.", e);
                SyncState::new()
            }
        }
    }

    async fn save(&self, state: &SyncState) -> Result<()> {
        self.ensure_parent().await?;

        let contents =
            serde_json::to_string_pretty(state).context("Failed to serialize sync state")?;

        // Write to a sibling file and rename so a crash never leaves a torn state file
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, contents)
            .await
            .with_context(|| format!("Failed to write sync state to {:?}", tmp_path))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to move sync state into {:?}", self.path))?;

        tracing::debug!("Saved sync state to {:?}", self.path);
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// SyncState held in memory only.
#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<SyncState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the currently stored state.
    pub async fn snapshot(&self) -> SyncState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> SyncState {
        self.state.lock().await.clone()
    }

    async fn save(&self, state: &SyncState) -> Result<()> {
        *self.state.lock().await = state.clone();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
