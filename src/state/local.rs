//! Local file-based state storage.
//!
//! The state document is a pretty-printed JSON file; a sibling lock file
//! holds the current [`LockInfo`].

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{NetifError, Result, StateError};

use super::lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
use super::store::StateStore;
use super::types::{STATE_VERSION, StateDocument};

/// Default state directory name.
pub const STATE_DIR: &str = ".maas-netif";

/// State file name.
const STATE_FILE: &str = "state.json";

/// Lock file name.
const LOCK_FILE: &str = "state.lock";

/// Local file-based state store.
#[derive(Debug)]
pub struct LocalStateStore {
    /// Directory holding the state and lock files.
    base_dir: PathBuf,
    /// Path to the state file.
    state_path: PathBuf,
    /// Path to the lock file.
    lock_path: PathBuf,
}

fn corrupted(message: String) -> NetifError {
    NetifError::State(StateError::Corrupted { message })
}

fn lock_failed(message: String) -> NetifError {
    NetifError::State(StateError::LockFailed { message })
}

impl LocalStateStore {
    /// Creates a store in `.maas-netif/` under the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new() -> Result<Self> {
        let base_dir = std::env::current_dir()
            .map_err(|e| NetifError::internal(format!("Cannot determine current directory: {e}")))?
            .join(STATE_DIR);

        Ok(Self::with_base_dir(base_dir))
    }

    /// Creates a store in a custom directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let state_path = base_dir.join(STATE_FILE);
        let lock_path = base_dir.join(LOCK_FILE);

        Self {
            base_dir,
            state_path,
            lock_path,
        }
    }

    /// Creates a store for an explicit state file; the lock sits next to it.
    #[must_use]
    pub fn with_state_path(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let base_dir = state_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let lock_path = base_dir.join(LOCK_FILE);

        Self {
            base_dir,
            state_path,
            lock_path,
        }
    }

    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating state directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir)
                .await
                .map_err(|e| StateError::write(format!("Failed to create state directory: {e}")))?;
        }
        Ok(())
    }

    async fn read_lock_file(&self) -> Result<Option<LockInfo>> {
        if !self.lock_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.lock_path)
            .await
            .map_err(|e| corrupted(format!("Failed to read lock file: {e}")))?;

        let lock_info = serde_json::from_str(&content)
            .map_err(|e| corrupted(format!("Failed to parse lock file: {e}")))?;

        Ok(Some(lock_info))
    }

    async fn write_lock_file(&self, lock_info: &LockInfo) -> Result<()> {
        self.ensure_dir().await?;

        let content = serde_json::to_string_pretty(lock_info)
            .map_err(|e| StateError::serialization(format!("Failed to serialize lock: {e}")))?;

        let mut file = fs::File::create(&self.lock_path)
            .await
            .map_err(|e| lock_failed(format!("Failed to create lock file: {e}")))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| lock_failed(format!("Failed to write lock file: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| lock_failed(format!("Failed to sync lock file: {e}")))?;

        Ok(())
    }

    async fn delete_lock_file(&self) -> Result<()> {
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path)
                .await
                .map_err(|e| lock_failed(format!("Failed to delete lock file: {e}")))?;
        }
        Ok(())
    }
}

/// Only the major component of the format version must match.
fn check_version(found: &str) -> Result<()> {
    let major = |v: &str| v.split('.').next().unwrap_or_default().to_string();
    if major(found) == major(STATE_VERSION) {
        Ok(())
    } else {
        Err(StateError::VersionMismatch {
            expected: STATE_VERSION.to_string(),
            found: found.to_string(),
        }
        .into())
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self) -> Result<Option<StateDocument>> {
        if !self.state_path.exists() {
            debug!("State file does not exist: {}", self.state_path.display());
            return Ok(None);
        }

        debug!("Loading state from: {}", self.state_path.display());

        let content = fs::read_to_string(&self.state_path)
            .await
            .map_err(|e| corrupted(format!("Failed to read state file: {e}")))?;

        let state: StateDocument = serde_json::from_str(&content)
            .map_err(|e| corrupted(format!("Failed to parse state file: {e}")))?;
        check_version(&state.version)?;

        Ok(Some(state))
    }

    async fn save(&self, state: &StateDocument) -> Result<()> {
        self.ensure_dir().await?;

        info!("Saving state to: {}", self.state_path.display());

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| StateError::serialization(format!("Failed to serialize state: {e}")))?;

        let temp_path = self.state_path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StateError::write(format!("Failed to create temp state file: {e}")))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| StateError::write(format!("Failed to write state file: {e}")))?;
        file.sync_all()
            .await
            .map_err(|e| StateError::write(format!("Failed to sync state file: {e}")))?;

        fs::rename(&temp_path, &self.state_path)
            .await
            .map_err(|e| StateError::write(format!("Failed to rename state file: {e}")))?;

        debug!("State saved successfully");
        Ok(())
    }

    async fn acquire_lock(&self, holder: &str, operation: &str) -> Result<LockInfo> {
        if let Some(existing) = self.read_lock_file().await? {
            if !existing.is_expired() {
                return Err(StateError::LockedByOther {
                    holder: existing.holder,
                    since: existing.acquired_at.to_rfc3339(),
                }
                .into());
            }
            warn!("Taking over expired lock held by {}", existing.holder);
        }

        let holder_id = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };

        let lock_info = LockInfo::new(&holder_id, operation);
        self.write_lock_file(&lock_info).await?;

        debug!(
            "Acquired state lock: {} (expires in {LOCK_EXPIRY_SECS}s)",
            lock_info.lock_id
        );

        Ok(lock_info)
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        if let Some(existing) = self.read_lock_file().await? {
            if existing.lock_id == lock_id {
                self.delete_lock_file().await?;
                debug!("Released state lock: {lock_id}");
            } else {
                debug!(
                    "Lock ID mismatch: expected {lock_id}, found {}",
                    existing.lock_id
                );
            }
        }
        Ok(())
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        self.read_lock_file().await
    }

    async fn force_unlock(&self) -> Result<Option<LockInfo>> {
        let existing = self.read_lock_file().await.unwrap_or_default();
        self.delete_lock_file().await?;
        if let Some(lock) = &existing {
            info!("Removed state lock {}", lock.lock_id);
        }
        Ok(existing)
    }

    fn location(&self) -> String {
        self.state_path.display().to_string()
    }
}
