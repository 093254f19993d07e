// # Memory Snapshot Store
//
// In-memory implementation of SnapshotStore.
//
// ## Crash Behavior
//
// - All entries are lost on restart
// - The first cycle after start treats every bucket as "never applied" and
//   reconciles it against the router
// - That first pass is harmless: reconciliation is an idempotent re-diff

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use async_trait::async_trait;

use crate::traits::address_source::Snapshot;
use crate::traits::snapshot_store::{SnapshotRecord, SnapshotStore};
use crate::Error;

/// In-memory snapshot store
///
/// # Example
///
/// ```rust,no_run
/// use mtsync_core::state::MemorySnapshotStore;
/// use mtsync_core::traits::{Snapshot, SnapshotStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemorySnapshotStore::new();
///
///     let applied: Snapshot = ["2606:4700::/32".to_string()].into();
///     store.set_snapshot("v6/cloudflarev6", applied.clone()).await?;
///
///     let cached = store.get_snapshot("v6/cloudflarev6").await?;
///     assert_eq!(cached.map(|r| r.addresses), Some(applied));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    inner: Arc<RwLock<HashMap<String, SnapshotRecord>>>,
}

impl MemorySnapshotStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached keys
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get_snapshot(&self, key: &str) -> Result<Option<SnapshotRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(key).cloned())
    }

    async fn set_snapshot(&self, key: &str, addresses: Snapshot) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.insert(key.to_string(), SnapshotRecord::new(addresses));
        Ok(())
    }
}
