//! Persisted-state data model (spec.md §6 "Persisted state layout", §3
//! `StateCheckpoint`/`StateSnapshot`).

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mirrors `engine::ExecutionStatus` without creating a crate dependency —
/// `state` sits below `engine` in the workspace (the engine calls into
/// `StateManager`, not the other way around).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

/// Which [`PersistenceProvider`](crate::persistence::PersistenceProvider)
/// strategy a state is backed by (spec §6 `persistence.strategy`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceStrategy {
    Memory,
    ExternalKv,
    Database,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMetadata {
    pub version: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub ttl_secs: Option<u64>,
}

/// A frozen copy of an execution's variables at a particular node (spec §3
/// `StateCheckpoint`). Append-only within an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateCheckpoint {
    pub id: Uuid,
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
    pub variables: serde_json::Map<String, serde_json::Value>,
    pub success: bool,
    pub duration_ms: i64,
}

/// Why a [`StateSnapshot`] was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotReason {
    Manual,
    Auto,
    Error,
    Checkpoint,
}

/// A frozen copy of an entire execution record (spec §3 `StateSnapshot`,
/// GLOSSARY). `compressed` is set once the serialised record exceeds the
/// configured compression threshold; the payload itself is still a plain
/// JSON value (no real codec — see `StateManager::create_snapshot`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub id: Uuid,
    pub state_id: Uuid,
    pub reason: SnapshotReason,
    pub taken_at: DateTime<Utc>,
    pub compressed: bool,
    pub record: WorkflowStateRecord,
}

/// An append-only entry recording one `set_variable`/`delete_variable` call
/// (spec §4.6 "each recorded in the execution's append-only `history`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub key: String,
    pub action: HistoryAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Set,
    Delete,
}

/// The JSON-serialisable core of [`WorkflowState`] — what actually gets
/// persisted and what a snapshot freezes (spec §6 persisted state layout).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStateRecord {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub execution_id: Uuid,
    pub status: StateStatus,
    pub current_step: Option<String>,
    pub context: serde_json::Map<String, serde_json::Value>,
    pub checkpoints: Vec<StateCheckpoint>,
    pub metadata: StateMetadata,
    pub strategy: PersistenceStrategy,
}

/// Live, in-process representation of one execution's state. Kept separate
/// from [`WorkflowStateRecord`] so the cache/history/snapshot bookkeeping
/// doesn't get serialised on every save.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub record: WorkflowStateRecord,
    pub history: Vec<HistoryEntry>,
    pub snapshots: VecDeque<StateSnapshot>,
}

impl WorkflowState {
    pub(crate) fn new(
        workflow_id: Uuid,
        execution_id: Uuid,
        initial_context: serde_json::Map<String, serde_json::Value>,
        strategy: PersistenceStrategy,
    ) -> Self {
        let now = Utc::now();
        Self {
            record: WorkflowStateRecord {
                id: Uuid::new_v4(),
                workflow_id,
                execution_id,
                status: StateStatus::Pending,
                current_step: None,
                context: initial_context,
                checkpoints: Vec::new(),
                metadata: StateMetadata {
                    version: 0,
                    started_at: now,
                    updated_at: now,
                    completed_at: None,
                    ttl_secs: None,
                },
                strategy,
            },
            history: Vec::new(),
            snapshots: VecDeque::new(),
        }
    }
}

/// An entry in the TTL cache attached to a state (spec §4.6 "Session data
/// and cache (with TTL) accessors").
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of a cache read, distinguishing hit/miss/expired for the
/// caller-visible metrics spec §4.6 requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    Hit,
    Miss,
    Expired,
}
