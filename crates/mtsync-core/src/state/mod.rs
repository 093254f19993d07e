// # Snapshot Store Implementations
//
// Last-applied snapshots live in process memory only.

pub mod memory;

pub use memory::MemorySnapshotStore;
