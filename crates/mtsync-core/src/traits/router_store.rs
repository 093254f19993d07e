// # Router Store Trait
//
// Defines the interface to the router's management API: two address-list
// tables (one per address family) and the static DNS table.
//
// ## Implementations
//
// - RouterOS API over TCP: `mtsync-store-routeros` crate
//
// Records are identified by an opaque handle assigned by the router. This
// system never invents handles; it only passes back what a listing returned.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address family of a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    V4,
    V6,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => f.write_str("v4"),
            AddressFamily::V6 => f.write_str("v6"),
        }
    }
}

/// A named address list on the router, scoped by address family
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bucket {
    pub family: AddressFamily,
    pub list: String,
}

impl Bucket {
    pub fn new(family: AddressFamily, list: impl Into<String>) -> Self {
        Self {
            family,
            list: list.into(),
        }
    }

    pub fn v4(list: impl Into<String>) -> Self {
        Self::new(AddressFamily::V4, list)
    }

    pub fn v6(list: impl Into<String>) -> Self {
        Self::new(AddressFamily::V6, list)
    }

    /// Key used by the snapshot cache, e.g. `v6/cloudflarev6`
    pub fn cache_key(&self) -> String {
        format!("{}/{}", self.family, self.list)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.list, self.family)
    }
}

/// Store-assigned record identifier (RouterOS `.id`, e.g. `*1A`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordHandle(pub String);

impl RecordHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One address-list record as stored on the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub handle: RecordHandle,
    pub list: String,
    pub address: String,
}

/// One static AAAA record as stored on the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsEntry {
    pub handle: RecordHandle,
    pub name: String,
    pub address: String,
}

/// Trait for router store implementations
///
/// # Contract
///
/// - Every call is a single remote operation. No retries, no batching and no
///   rollback: the reconciler relies on re-diffing next cycle instead.
/// - `list_entries` returns only records whose list equals `bucket.list`.
/// - `list_dns_records` returns only records of type AAAA.
/// - Implementations bound each call with a timeout.
#[async_trait]
pub trait RouterStore: Send + Sync {
    /// Current records of an address list
    async fn list_entries(&self, bucket: &Bucket) -> Result<Vec<ListEntry>, crate::Error>;

    /// Add `address` to the bucket's list
    async fn add_entry(&self, bucket: &Bucket, address: &str) -> Result<(), crate::Error>;

    /// Remove an address-list record by handle
    async fn remove_entry(
        &self,
        bucket: &Bucket,
        handle: &RecordHandle,
    ) -> Result<(), crate::Error>;

    /// Current static AAAA records
    async fn list_dns_records(&self) -> Result<Vec<DnsEntry>, crate::Error>;

    /// Add a static AAAA record
    async fn add_dns_record(&self, name: &str, address: &str) -> Result<(), crate::Error>;

    /// Remove a static DNS record by handle
    async fn remove_dns_record(&self, handle: &RecordHandle) -> Result<(), crate::Error>;

    /// Short name used in logs and errors
    fn store_name(&self) -> &'static str;
}
