// # Address Source Traits
//
// Defines the producers of desired state. Each source is a pure function of
// external state: it is asked for a snapshot once per cycle and keeps nothing
// between calls.
//
// ## Implementations
//
// - Cloudflare published ranges: `mtsync-source-cloudflare` crate
// - Local interface address (`ip -6 addr show`): `mtsync-source-iproute` crate
//
// ## Usage
//
// ```rust,ignore
// use mtsync_core::traits::{InterfaceSource, RangeSource};
//
// let ranges = range_source.ranges().await?;
// println!("{} v4 / {} v6 ranges", ranges.ipv4.len(), ranges.ipv6.len());
//
// match interface_source.global_ipv6().await? {
//     Some(addr) => println!("interface address: {}", addr),
//     None => println!("no global IPv6 assigned"),
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeSet;

/// A point-in-time set of addresses
///
/// Identity is the exact text form; no canonicalization is applied.
/// Ordered so that equality is order-independent and logs are stable.
pub type Snapshot = BTreeSet<String>;

/// Published ranges split by address family
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSnapshot {
    /// IPv4 CIDR blocks
    pub ipv4: Snapshot,
    /// IPv6 CIDR blocks
    pub ipv6: Snapshot,
}

impl RangeSnapshot {
    /// Build a snapshot from raw lists, coalescing duplicates
    pub fn new<I4, I6, S>(ipv4: I4, ipv6: I6) -> Self
    where
        I4: IntoIterator<Item = S>,
        I6: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ipv4: ipv4.into_iter().map(Into::into).collect(),
            ipv6: ipv6.into_iter().map(Into::into).collect(),
        }
    }
}

/// Source of published edge IP ranges
///
/// # Contract
///
/// - A failed fetch returns `Err` and nothing else: no partial snapshot.
/// - An empty list from the upstream is returned as an empty set; deciding
///   what to do with it belongs to the engine.
/// - No retries, no caching. The engine owns both.
#[async_trait]
pub trait RangeSource: Send + Sync {
    /// Fetch the current IPv4 and IPv6 ranges
    async fn ranges(&self) -> Result<RangeSnapshot, crate::Error>;

    /// Short name used in logs and errors
    fn source_name(&self) -> &'static str;
}

/// Source of the local interface's global IPv6 address
///
/// `Ok(None)` means no global-scope IPv6 address is currently assigned.
/// That is a normal outcome and must not be reported as an error.
#[async_trait]
pub trait InterfaceSource: Send + Sync {
    /// First global-scope IPv6 address on the interface, without prefix length
    async fn global_ipv6(&self) -> Result<Option<String>, crate::Error>;

    /// Interface being tracked
    fn interface_name(&self) -> &str;
}
