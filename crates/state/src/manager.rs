//! `StateManager` (spec.md §4.6) — owns `WorkflowState` and drives the
//! configured [`PersistenceProvider`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::StateError;
use crate::models::{
    CacheEntry, CacheLookup, HistoryAction, HistoryEntry, PersistenceStrategy, SnapshotReason,
    StateCheckpoint, StateSnapshot, StateStatus, WorkflowState,
};
use crate::persistence::PersistenceProvider;

/// Tuning knobs (spec §6 `StateManager` environment options).
#[derive(Debug, Clone)]
pub struct StateManagerConfig {
    pub cleanup_enabled: bool,
    pub cleanup_max_age: Duration,
    pub cleanup_max_entries: usize,
    pub max_snapshots: usize,
    /// Serialised-record size in bytes above which a snapshot is marked
    /// `compressed` (no real codec is applied — see `create_snapshot`).
    pub snapshot_compression_threshold_bytes: usize,
}

impl Default for StateManagerConfig {
    fn default() -> Self {
        Self {
            cleanup_enabled: true,
            cleanup_max_age: Duration::from_secs(24 * 3600),
            cleanup_max_entries: 10_000,
            max_snapshots: 10,
            snapshot_compression_threshold_bytes: 64 * 1024,
        }
    }
}

struct CacheKey {
    state_id: Uuid,
    key: String,
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.state_id == other.state_id && self.key == other.key
    }
}
impl Eq for CacheKey {}
impl std::hash::Hash for CacheKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.state_id.hash(state);
        self.key.hash(state);
    }
}

/// Owns every execution's live state plus the configured durable backend.
pub struct StateManager {
    states: DashMap<Uuid, WorkflowState>,
    cache: DashMap<(Uuid, String), CacheEntry>,
    provider: Arc<dyn PersistenceProvider>,
    strategy: PersistenceStrategy,
    config: StateManagerConfig,
}

impl StateManager {
    #[must_use]
    pub fn new(provider: Arc<dyn PersistenceProvider>, strategy: PersistenceStrategy, config: StateManagerConfig) -> Self {
        Self { states: DashMap::new(), cache: DashMap::new(), provider, strategy, config }
    }

    /// Loads every persisted record from the backend into the live map —
    /// recovery on cold start (spec §4.6 "load/list support recovery").
    pub async fn recover(&self) -> Result<usize, StateError> {
        let records = self.provider.list().await?;
        let count = records.len();
        for record in records {
            self.states.insert(
                record.id,
                WorkflowState { record, history: Vec::new(), snapshots: Default::default() },
            );
        }
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Creation / lookup
    // -----------------------------------------------------------------------

    pub async fn create_state(
        &self,
        workflow_id: Uuid,
        execution_id: Uuid,
        initial_context: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<Uuid, StateError> {
        let state = WorkflowState::new(
            workflow_id,
            execution_id,
            initial_context.unwrap_or_default(),
            self.strategy,
        );
        let id = state.record.id;
        self.provider.save(&state.record).await?;
        self.states.insert(id, state);
        Ok(id)
    }

    #[must_use]
    pub fn get(&self, state_id: Uuid) -> Option<crate::models::WorkflowStateRecord> {
        self.states.get(&state_id).map(|s| s.record.clone())
    }

    /// Applies an arbitrary patch to `context`, bumping `version` and
    /// `updated_at` — persisted before returning (spec §4.6, §5: "save must
    /// be durable before update_state returns").
    pub async fn update_state(
        &self,
        state_id: Uuid,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), StateError> {
        let record = {
            let mut entry = self.states.get_mut(&state_id).ok_or(StateError::NotFound(state_id))?;
            entry.record.context.extend(patch);
            entry.record.metadata.version += 1;
            entry.record.metadata.updated_at = Utc::now();
            entry.record.clone()
        };
        self.provider.save(&record).await
    }

    // -----------------------------------------------------------------------
    // Variable accessors
    // -----------------------------------------------------------------------

    pub async fn set_variable(&self, state_id: Uuid, key: &str, value: serde_json::Value) -> Result<(), StateError> {
        let record = {
            let mut entry = self.states.get_mut(&state_id).ok_or(StateError::NotFound(state_id))?;
            entry.record.context.insert(key.to_owned(), value);
            entry.record.metadata.version += 1;
            entry.record.metadata.updated_at = Utc::now();
            entry.history.push(HistoryEntry { at: Utc::now(), key: key.to_owned(), action: HistoryAction::Set });
            entry.record.clone()
        };
        self.provider.save(&record).await
    }

    #[must_use]
    pub fn get_variable(&self, state_id: Uuid, key: &str) -> Option<serde_json::Value> {
        self.states.get(&state_id)?.record.context.get(key).cloned()
    }

    pub async fn delete_variable(&self, state_id: Uuid, key: &str) -> Result<(), StateError> {
        let record = {
            let mut entry = self.states.get_mut(&state_id).ok_or(StateError::NotFound(state_id))?;
            entry.record.context.remove(key);
            entry.record.metadata.version += 1;
            entry.record.metadata.updated_at = Utc::now();
            entry.history.push(HistoryEntry { at: Utc::now(), key: key.to_owned(), action: HistoryAction::Delete });
            entry.record.clone()
        };
        self.provider.save(&record).await
    }

    #[must_use]
    pub fn history(&self, state_id: Uuid) -> Vec<HistoryEntry> {
        self.states.get(&state_id).map(|s| s.history.clone()).unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // TTL cache
    // -----------------------------------------------------------------------

    pub fn cache_set(&self, state_id: Uuid, key: &str, value: serde_json::Value, ttl: Duration) {
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        self.cache.insert((state_id, key.to_owned()), CacheEntry { value, expires_at });
    }

    /// Returns the cached value plus whether it was a hit, miss, or an
    /// expired entry (spec §4.6: "cache hits record hit/miss; cache misses
    /// on expiration emit expiry events"). The caller (e.g. `monitoring`)
    /// is responsible for turning `Expired` into an actual emitted event.
    pub fn cache_get(&self, state_id: Uuid, key: &str) -> (Option<serde_json::Value>, CacheLookup) {
        let cache_key = (state_id, key.to_owned());
        match self.cache.get(&cache_key) {
            Some(entry) if entry.expires_at > Utc::now() => (Some(entry.value.clone()), CacheLookup::Hit),
            Some(_) => {
                self.cache.remove(&cache_key);
                (None, CacheLookup::Expired)
            }
            None => (None, CacheLookup::Miss),
        }
    }

    // -----------------------------------------------------------------------
    // Checkpoints
    // -----------------------------------------------------------------------

    pub async fn create_checkpoint(&self, state_id: Uuid, node_id: &str, success: bool, duration_ms: i64) -> Result<Uuid, StateError> {
        let (checkpoint_id, record) = {
            let mut entry = self.states.get_mut(&state_id).ok_or(StateError::NotFound(state_id))?;
            let checkpoint = StateCheckpoint {
                id: Uuid::new_v4(),
                node_id: node_id.to_owned(),
                timestamp: Utc::now(),
                variables: entry.record.context.clone(),
                success,
                duration_ms,
            };
            let id = checkpoint.id;
            entry.record.checkpoints.push(checkpoint);
            entry.record.current_step = Some(node_id.to_owned());
            (id, entry.record.clone())
        };
        self.provider.save(&record).await?;
        Ok(checkpoint_id)
    }

    /// Replaces `context` with the checkpoint's frozen variables; bumps
    /// `version` (spec §4.6, §8 round-trip invariant).
    pub async fn restore_from_checkpoint(&self, state_id: Uuid, checkpoint_id: Uuid) -> Result<(), StateError> {
        let record = {
            let mut entry = self.states.get_mut(&state_id).ok_or(StateError::NotFound(state_id))?;
            let checkpoint = entry
                .record
                .checkpoints
                .iter()
                .find(|c| c.id == checkpoint_id)
                .ok_or(StateError::CheckpointNotFound(checkpoint_id))?
                .clone();
            entry.record.context = checkpoint.variables;
            entry.record.metadata.version += 1;
            entry.record.metadata.updated_at = Utc::now();
            entry.record.clone()
        };
        self.provider.save(&record).await
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub async fn create_snapshot(&self, state_id: Uuid, reason: SnapshotReason) -> Result<Uuid, StateError> {
        let (snapshot_id, record) = {
            let mut entry = self.states.get_mut(&state_id).ok_or(StateError::NotFound(state_id))?;
            let serialized_len = serde_json::to_vec(&entry.record).map(|b| b.len()).unwrap_or(0);
            let snapshot = StateSnapshot {
                id: Uuid::new_v4(),
                state_id,
                reason,
                taken_at: Utc::now(),
                compressed: serialized_len > self.config.snapshot_compression_threshold_bytes,
                record: entry.record.clone(),
            };
            let id = snapshot.id;
            entry.snapshots.push_back(snapshot);
            while entry.snapshots.len() > self.config.max_snapshots {
                entry.snapshots.pop_front();
            }
            (id, entry.record.clone())
        };
        self.provider.save(&record).await?;
        Ok(snapshot_id)
    }

    pub async fn restore_from_snapshot(&self, state_id: Uuid, snapshot_id: Uuid) -> Result<(), StateError> {
        let record = {
            let mut entry = self.states.get_mut(&state_id).ok_or(StateError::NotFound(state_id))?;
            let snapshot = entry
                .snapshots
                .iter()
                .find(|s| s.id == snapshot_id)
                .ok_or(StateError::SnapshotNotFound(snapshot_id))?
                .clone();
            entry.record = snapshot.record;
            entry.record.metadata.version += 1;
            entry.record.metadata.updated_at = Utc::now();
            entry.record.clone()
        };
        self.provider.save(&record).await
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    async fn transition(&self, state_id: Uuid, to: StateStatus, terminal: bool) -> Result<(), StateError> {
        let record = {
            let mut entry = self.states.get_mut(&state_id).ok_or(StateError::NotFound(state_id))?;
            entry.record.status = to;
            entry.record.metadata.version += 1;
            entry.record.metadata.updated_at = Utc::now();
            if terminal {
                entry.record.metadata.completed_at = Some(Utc::now());
            }
            entry.record.clone()
        };
        self.provider.save(&record).await
    }

    pub async fn pause_state(&self, state_id: Uuid) -> Result<(), StateError> {
        self.transition(state_id, StateStatus::Paused, false).await
    }
    pub async fn resume_state(&self, state_id: Uuid) -> Result<(), StateError> {
        self.transition(state_id, StateStatus::Running, false).await
    }
    pub async fn complete_state(&self, state_id: Uuid) -> Result<(), StateError> {
        self.transition(state_id, StateStatus::Completed, true).await
    }
    pub async fn fail_state(&self, state_id: Uuid) -> Result<(), StateError> {
        self.transition(state_id, StateStatus::Failed, true).await
    }
    pub async fn cancel_state(&self, state_id: Uuid) -> Result<(), StateError> {
        self.transition(state_id, StateStatus::Cancelled, true).await
    }

    pub async fn delete_state(&self, state_id: Uuid) -> Result<(), StateError> {
        self.states.remove(&state_id);
        self.provider.delete(state_id).await
    }

    // -----------------------------------------------------------------------
    // Cleanup
    // -----------------------------------------------------------------------

    /// Prunes states older than `max_age` or beyond `max_entries`, oldest
    /// first (spec §4.6). Intended to be called periodically by `cli`.
    pub async fn cleanup(&self) -> Result<usize, StateError> {
        if !self.config.cleanup_enabled {
            return Ok(0);
        }
        let now = Utc::now();
        let max_age = chrono::Duration::from_std(self.config.cleanup_max_age).unwrap_or_else(|_| chrono::Duration::days(365 * 100));

        let mut candidates: Vec<(Uuid, chrono::DateTime<Utc>)> = self
            .states
            .iter()
            .map(|e| (*e.key(), e.value().record.metadata.updated_at))
            .collect();
        candidates.sort_by_key(|(_, updated_at)| *updated_at);

        let mut removed = 0usize;
        let overflow = candidates.len().saturating_sub(self.config.cleanup_max_entries);

        for (idx, (id, updated_at)) in candidates.into_iter().enumerate() {
            let too_old = now.signed_duration_since(updated_at) > max_age;
            let beyond_capacity = idx < overflow;
            if too_old || beyond_capacity {
                self.delete_state(id).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryPersistence;

    fn manager() -> StateManager {
        StateManager::new(Arc::new(MemoryPersistence::default()), PersistenceStrategy::Memory, StateManagerConfig::default())
    }

    #[tokio::test]
    async fn version_is_monotonic_across_updates() {
        let mgr = manager();
        let id = mgr.create_state(Uuid::new_v4(), Uuid::new_v4(), None).await.unwrap();
        mgr.set_variable(id, "a", serde_json::json!(1)).await.unwrap();
        mgr.set_variable(id, "b", serde_json::json!(2)).await.unwrap();
        assert_eq!(mgr.get(id).unwrap().metadata.version, 2);
    }

    #[tokio::test]
    async fn checkpoint_round_trips_variables() {
        let mgr = manager();
        let id = mgr.create_state(Uuid::new_v4(), Uuid::new_v4(), None).await.unwrap();
        mgr.set_variable(id, "x", serde_json::json!(42)).await.unwrap();
        let checkpoint_id = mgr.create_checkpoint(id, "node1", true, 5).await.unwrap();
        mgr.set_variable(id, "x", serde_json::json!(99)).await.unwrap();
        assert_eq!(mgr.get_variable(id, "x"), Some(serde_json::json!(99)));
        mgr.restore_from_checkpoint(id, checkpoint_id).await.unwrap();
        assert_eq!(mgr.get_variable(id, "x"), Some(serde_json::json!(42)));
    }

    #[tokio::test]
    async fn snapshots_evict_oldest_beyond_max() {
        let mut config = StateManagerConfig::default();
        config.max_snapshots = 2;
        let mgr = StateManager::new(Arc::new(MemoryPersistence::default()), PersistenceStrategy::Memory, config);
        let id = mgr.create_state(Uuid::new_v4(), Uuid::new_v4(), None).await.unwrap();
        let s1 = mgr.create_snapshot(id, SnapshotReason::Auto).await.unwrap();
        let _s2 = mgr.create_snapshot(id, SnapshotReason::Auto).await.unwrap();
        let _s3 = mgr.create_snapshot(id, SnapshotReason::Auto).await.unwrap();
        let state = mgr.states.get(&id).unwrap();
        assert_eq!(state.snapshots.len(), 2);
        assert!(state.snapshots.iter().all(|s| s.id != s1));
    }

    #[tokio::test]
    async fn cache_reports_hit_miss_and_expiry() {
        let mgr = manager();
        let id = mgr.create_state(Uuid::new_v4(), Uuid::new_v4(), None).await.unwrap();
        assert_eq!(mgr.cache_get(id, "k").1, CacheLookup::Miss);
        mgr.cache_set(id, "k", serde_json::json!("v"), Duration::from_secs(60));
        assert_eq!(mgr.cache_get(id, "k").1, CacheLookup::Hit);
        mgr.cache_set(id, "expired", serde_json::json!("v"), Duration::from_secs(0));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(mgr.cache_get(id, "expired").1, CacheLookup::Expired);
    }
}
