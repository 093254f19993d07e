//! Core traits for the sync system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`RangeSource`] / [`InterfaceSource`]: produce desired state
//! - [`RouterStore`]: read and mutate the router's tables
//! - [`SnapshotStore`]: remember what was last applied

pub mod address_source;
pub mod router_store;
pub mod snapshot_store;

pub use address_source::{InterfaceSource, RangeSnapshot, RangeSource, Snapshot};
pub use router_store::{AddressFamily, Bucket, DnsEntry, ListEntry, RecordHandle, RouterStore};
pub use snapshot_store::{SnapshotRecord, SnapshotStore};
