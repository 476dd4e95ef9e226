//! Reindex action persistence.
//!
//! Actions are written once when an attempt starts and updated once when it
//! ends. The history feeds candidate selection, which skips indexes that were
//! rebuilt recently.
//!
//! # Storage Format
//!
//! ```text
//! reindex_actions/
//!   ├── 0b6f3c1e-....bin     # one bincode-encoded ReindexAction per file
//!   └── 9a41d2f7-....bin
//! ```

use crate::error::{ActionStoreError, Result};
use crate::reindexing::action::ReindexAction;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

/// Durable storage for reindex actions.
#[async_trait]
pub trait ActionStore: Send + Sync + std::fmt::Debug {
    /// Persist a new action.
    async fn create(&self, action: &ReindexAction) -> Result<()>;

    /// Overwrite an existing action.
    async fn update(&self, action: &ReindexAction) -> Result<()>;

    /// Load an action by ID.
    async fn load(&self, id: Uuid) -> Result<Option<ReindexAction>>;

    /// All actions for `index_identifier` in `database`, oldest first.
    async fn actions_for_index(
        &self,
        database: &str,
        index_identifier: &str,
    ) -> Result<Vec<ReindexAction>>;
}

/// In-memory action store.
#[derive(Debug, Default)]
pub struct InMemoryActionStore {
    actions: RwLock<HashMap<Uuid, ReindexAction>>,
}

impl InMemoryActionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored action, oldest first.
    pub fn all(&self) -> Vec<ReindexAction> {
        let mut actions: Vec<_> = self.actions.read().values().cloned().collect();
        actions.sort_by_key(|a| a.action_start_ms);
        actions
    }
}

#[async_trait]
impl ActionStore for InMemoryActionStore {
    async fn create(&self, action: &ReindexAction) -> Result<()> {
        self.actions.write().insert(action.id, action.clone());
        Ok(())
    }

    async fn update(&self, action: &ReindexAction) -> Result<()> {
        let mut actions = self.actions.write();
        match actions.get_mut(&action.id) {
            Some(stored) => {
                *stored = action.clone();
                Ok(())
            }
            None => Err(ActionStoreError::NotFound(action.id).into()),
        }
    }

    async fn load(&self, id: Uuid) -> Result<Option<ReindexAction>> {
        Ok(self.actions.read().get(&id).cloned())
    }

    async fn actions_for_index(
        &self,
        database: &str,
        index_identifier: &str,
    ) -> Result<Vec<ReindexAction>> {
        let mut actions: Vec<_> = self
            .actions
            .read()
            .values()
            .filter(|a| a.database == database && a.index_identifier == index_identifier)
            .cloned()
            .collect();
        actions.sort_by_key(|a| a.action_start_ms);
        Ok(actions)
    }
}

/// File-based action store, one bincode file per action.
#[derive(Debug)]
pub struct FileActionStore {
    base_dir: PathBuf,
}

impl FileActionStore {
    /// Open (and create if needed) a store rooted at `base_dir`.
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)
            .await
            .map_err(ActionStoreError::from)?;

        Ok(Self { base_dir })
    }

    /// Root directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn action_path(&self, id: Uuid) -> PathBuf {
        self.base_dir.join(format!("{}.bin", id))
    }

    /// Write to a temp file, sync, then rename over the target.
    async fn atomic_write(&self, path: &Path, content: &[u8]) -> Result<()> {
        let temp_path = path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(ActionStoreError::from)?;
        file.write_all(content).await.map_err(ActionStoreError::from)?;
        file.sync_all().await.map_err(ActionStoreError::from)?;

        fs::rename(&temp_path, path)
            .await
            .map_err(ActionStoreError::from)?;

        Ok(())
    }

    async fn write_action(&self, action: &ReindexAction) -> Result<()> {
        let bytes = bincode::serialize(action)?;
        self.atomic_write(&self.action_path(action.id), &bytes).await?;
        debug!(action_id = %action.id, state = %action.state, "Saved reindex action");
        Ok(())
    }

    async fn read_action(&self, path: &Path) -> Result<Option<ReindexAction>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ActionStoreError::from(e).into()),
        }
    }
}

#[async_trait]
impl ActionStore for FileActionStore {
    async fn create(&self, action: &ReindexAction) -> Result<()> {
        self.write_action(action).await
    }

    async fn update(&self, action: &ReindexAction) -> Result<()> {
        if fs::metadata(self.action_path(action.id)).await.is_err() {
            return Err(ActionStoreError::NotFound(action.id).into());
        }
        self.write_action(action).await
    }

    async fn load(&self, id: Uuid) -> Result<Option<ReindexAction>> {
        self.read_action(&self.action_path(id)).await
    }

    async fn actions_for_index(
        &self,
        database: &str,
        index_identifier: &str,
    ) -> Result<Vec<ReindexAction>> {
        let mut entries = fs::read_dir(&self.base_dir)
            .await
            .map_err(ActionStoreError::from)?;
        let mut actions = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(ActionStoreError::from)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("bin") {
                continue;
            }

            if let Some(action) = self.read_action(&path).await? {
                if action.database == database && action.index_identifier == index_identifier {
                    actions.push(action);
                }
            }
        }

        actions.sort_by_key(|a| a.action_start_ms);
        Ok(actions)
    }
}
