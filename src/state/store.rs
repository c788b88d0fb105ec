//! Bookmark persistence
//!
//! [`FileBookmarkStore`] keeps every bookmark in one JSON file written
//! atomically (temp file + rename). [`MemoryBookmarkStore`] keeps them in
//! process memory.

use super::types::{Bookmark, StateFile};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Durable storage for per-entity bookmarks
#[async_trait]
pub trait BookmarkStore: Send + Sync {
    /// Load the committed bookmark of an entity
    async fn load(&self, entity: &str) -> Result<Option<Bookmark>>;

    /// Commit a bookmark for an entity
    async fn save(&self, entity: &str, bookmark: Bookmark) -> Result<()>;

    /// All committed bookmarks
    async fn all(&self) -> Result<BTreeMap<String, Bookmark>>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Bookmark store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryBookmarkStore {
    bookmarks: RwLock<BTreeMap<String, Bookmark>>,
}

impl MemoryBookmarkStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated from state JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let state: StateFile = serde_json::from_str(json)
            .map_err(|e| Error::state(format!("Failed to parse state JSON: {e}")))?;
        Ok(Self {
            bookmarks: RwLock::new(state.bookmarks),
        })
    }
}

#[async_trait]
impl BookmarkStore for MemoryBookmarkStore {
    async fn load(&self, entity: &str) -> Result<Option<Bookmark>> {
        Ok(self.bookmarks.read().await.get(entity).cloned())
    }

    async fn save(&self, entity: &str, bookmark: Bookmark) -> Result<()> {
        self.bookmarks
            .write()
            .await
            .insert(entity.to_string(), bookmark);
        Ok(())
    }

    async fn all(&self) -> Result<BTreeMap<String, Bookmark>> {
        Ok(self.bookmarks.read().await.clone())
    }
}

// ============================================================================
// File store
// ============================================================================

/// Bookmark store backed by a JSON file
#[derive(Debug)]
pub struct FileBookmarkStore {
    /// Path to the state file
    path: PathBuf,
    /// Current state (cached)
    state: RwLock<StateFile>,
    /// One writer per entity at a time
    entity_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Serialises whole-file writes
    write_lock: Mutex<()>,
}

impl FileBookmarkStore {
    /// Open a store, loading existing bookmarks if the file is present
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if tokio::fs::try_exists(&path).await? {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::state(format!("Failed to read state file: {e}")))?;
            if contents.trim().is_empty() {
                StateFile::default()
            } else {
                serde_json::from_str(&contents)
                    .map_err(|e| Error::state(format!("Failed to parse state file: {e}")))?
            }
        } else {
            StateFile::default()
        };

        debug!(
            "Opened bookmark store {} with {} bookmarks",
            path.display(),
            state.bookmarks.len()
        );

        Ok(Self {
            path,
            state: RwLock::new(state),
            entity_locks: Mutex::new(HashMap::new()),
            write_lock: Mutex::new(()),
        })
    }

    /// Get the state file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn entity_lock(&self, entity: &str) -> Arc<Mutex<()>> {
        let mut locks = self.entity_locks.lock().await;
        Arc::clone(locks.entry(entity.to_string()).or_default())
    }

    /// Write `state` to disk
    ///
    /// Callers hold `write_lock`.
    async fn persist(&self, state: &StateFile) -> Result<()> {
        let contents = serde_json::to_string_pretty(state)
            .map_err(|e| Error::state(format!("Failed to serialize state: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::state(format!("Failed to create state directory: {e}")))?;
        }

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents)
            .await
            .map_err(|e| Error::state(format!("Failed to write state file: {e}")))?;

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::state(format!("Failed to rename state file: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl BookmarkStore for FileBookmarkStore {
    async fn load(&self, entity: &str) -> Result<Option<Bookmark>> {
        Ok(self.state.read().await.bookmarks.get(entity).cloned())
    }

    async fn save(&self, entity: &str, bookmark: Bookmark) -> Result<()> {
        let lock = self.entity_lock(entity).await;
        let _entity_guard = lock.lock().await;

        // Readers only see the bookmark once it is on disk
        let _write_guard = self.write_lock.lock().await;
        let mut staged = self.state.read().await.clone();
        staged.bookmarks.insert(entity.to_string(), bookmark);
        self.persist(&staged).await?;
        *self.state.write().await = staged;

        debug!("Committed bookmark for '{entity}' to {}", self.path.display());
        Ok(())
    }

    async fn all(&self) -> Result<BTreeMap<String, Bookmark>> {
        Ok(self.state.read().await.bookmarks.clone())
    }
}
