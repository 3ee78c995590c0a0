//! `state` crate — `StateManager` (spec.md §4.6): per-execution state,
//! checkpoints, snapshots, and the pluggable persistence abstraction.

pub mod error;
pub mod manager;
pub mod models;
pub mod persistence;

pub use error::StateError;
pub use manager::{StateManager, StateManagerConfig};
pub use models::{
    CacheLookup, HistoryAction, HistoryEntry, PersistenceStrategy, SnapshotReason, StateCheckpoint,
    StateMetadata, StateSnapshot, StateStatus, WorkflowState, WorkflowStateRecord,
};
pub use persistence::{
    DatabasePersistence, ExternalKvPersistence, FilePersistence, MemoryPersistence, PersistenceProvider,
};
