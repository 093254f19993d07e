// # mtsync-core
//
// Core library for keeping RouterOS firewall address lists and static DNS
// in line with external truth sources.
//
// ## Architecture Overview
//
// - **RangeSource / InterfaceSource**: Traits producing desired snapshots
// - **RouterStore**: Trait over the router's address-list and DNS tables
// - **SnapshotStore**: Trait for last-applied snapshots (change detection)
// - **reconcile**: Set diff and remove-then-add application
// - **SyncEngine**: Poll loop driving the above on a fixed interval
//
// ## Design Principles
//
// 1. **Router is ground truth**: removals come from listing the router, never from cache
// 2. **Self-healing**: no rollback; a failed cycle leaves the cache stale and the
//    next cycle re-diffs
// 3. **Failure isolation**: one bucket failing never stops the others
// 4. **Library-first**: collaborators live in their own crates behind traits

pub mod traits;
pub mod engine;
pub mod reconcile;
pub mod config;
pub mod error;
pub mod normalize;
pub mod state;

// Re-export core types for convenience
pub use traits::{InterfaceSource, RangeSource, RouterStore, SnapshotStore};
pub use engine::{BucketStatus, CycleReport, EngineEvent, SyncEngine};
pub use config::{CloudflareConfig, EngineConfig, InterfaceConfig, RouterConfig, SyncConfig};
pub use error::{Error, Result};
pub use normalize::{InterfaceName, validate_interface_name};
pub use state::MemorySnapshotStore;
