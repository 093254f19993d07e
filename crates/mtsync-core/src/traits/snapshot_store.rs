// # Snapshot Store Trait
//
// Holds the last successfully applied snapshot per cache key. It is an
// optimization only: removal decisions always come from the router's own
// listing, never from here.
//
// ## Update rule
//
// An entry is written only after the reconciliation it describes finished
// without error. A failed cycle leaves the entry stale so the next cycle
// retries the full diff.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::traits::address_source::Snapshot;

/// A cached snapshot and when it was applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Addresses that were applied
    pub addresses: Snapshot,

    /// When the reconciliation finished
    pub applied_at: DateTime<Utc>,
}

impl SnapshotRecord {
    /// Create a record stamped with the current time
    pub fn new(addresses: Snapshot) -> Self {
        Self {
            addresses,
            applied_at: Utc::now(),
        }
    }
}

/// Trait for last-applied snapshot storage
///
/// `get_snapshot` returning `None` means "never applied", which is distinct
/// from an applied empty set.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Last applied snapshot for a key
    async fn get_snapshot(&self, key: &str) -> Result<Option<SnapshotRecord>, crate::Error>;

    /// Record a successfully applied snapshot
    async fn set_snapshot(&self, key: &str, addresses: Snapshot) -> Result<(), crate::Error>;
}
