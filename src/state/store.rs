//! State store trait definition.

use async_trait::async_trait;

use super::lock::LockInfo;
use super::types::StateDocument;
use crate::error::Result;

/// Persistence for the state document.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the state document, or `None` if none was written yet.
    async fn load(&self) -> Result<Option<StateDocument>>;

    /// Saves the state document.
    async fn save(&self, state: &StateDocument) -> Result<()>;

    /// Acquires the state lock for `operation`.
    ///
    /// An empty `holder` generates one for the current process.
    async fn acquire_lock(&self, holder: &str, operation: &str) -> Result<LockInfo>;

    /// Releases the lock if it is still held under `lock_id`.
    async fn release_lock(&self, lock_id: &str) -> Result<()>;

    /// Gets the current lock, if any (expired locks included).
    async fn get_lock_info(&self) -> Result<Option<LockInfo>>;

    /// Removes the lock regardless of holder.
    async fn force_unlock(&self) -> Result<Option<LockInfo>>;

    /// Human-readable location of the state.
    fn location(&self) -> String;
}

#[async_trait]
impl StateStore for Box<dyn StateStore> {
    async fn load(&self) -> Result<Option<StateDocument>> {
        (**self).load().await
    }

    async fn save(&self, state: &StateDocument) -> Result<()> {
        (**self).save(state).await
    }

    async fn acquire_lock(&self, holder: &str, operation: &str) -> Result<LockInfo> {
        (**self).acquire_lock(holder, operation).await
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        (**self).release_lock(lock_id).await
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        (**self).get_lock_info().await
    }

    async fn force_unlock(&self) -> Result<Option<LockInfo>> {
        (**self).force_unlock().await
    }

    fn location(&self) -> String {
        (**self).location()
    }
}
