//! `PersistenceProvider` (spec.md §4.6): `{save, load, delete, list, close}`
//! over the four strategies spec §6 enumerates. `memory` and `file` are
//! fully implemented; `database` delegates to `db::repository::state_records`;
//! `external_kv` is an explicit stub — spec.md's own Open Questions note
//! that non-memory persistence beyond the happy path is aspirational in the
//! source this was distilled from.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StateError;
use crate::models::WorkflowStateRecord;

/// The contract every persistence strategy fulfils. `save` must be durable
/// before it returns — `StateManager::update_state` relies on that to
/// preserve the "save before version advances" invariant (spec §5, §7).
#[async_trait]
pub trait PersistenceProvider: Send + Sync {
    async fn save(&self, record: &WorkflowStateRecord) -> Result<(), StateError>;
    async fn load(&self, id: Uuid) -> Result<Option<WorkflowStateRecord>, StateError>;
    async fn delete(&self, id: Uuid) -> Result<(), StateError>;
    async fn list(&self) -> Result<Vec<WorkflowStateRecord>, StateError>;
    async fn close(&self) -> Result<(), StateError>;
}

// ---------------------------------------------------------------------------
// memory
// ---------------------------------------------------------------------------

/// In-process, non-durable strategy. The default — matches spec.md's
/// Non-goals ("all state is in-process with a pluggable persistence
/// backend").
#[derive(Default)]
pub struct MemoryPersistence {
    store: DashMap<Uuid, WorkflowStateRecord>,
}

#[async_trait]
impl PersistenceProvider for MemoryPersistence {
    async fn save(&self, record: &WorkflowStateRecord) -> Result<(), StateError> {
        self.store.insert(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<WorkflowStateRecord>, StateError> {
        Ok(self.store.get(&id).map(|r| r.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<(), StateError> {
        self.store.remove(&id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WorkflowStateRecord>, StateError> {
        Ok(self.store.iter().map(|r| r.value().clone()).collect())
    }

    async fn close(&self) -> Result<(), StateError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// file
// ---------------------------------------------------------------------------

/// One JSON file per state under `directory`, named `<id>.json`. Durable
/// across process restarts; concurrent writers are serialised by an
/// internal mutex (the contract forbids concurrent saves of the same state
/// id anyway — spec §5).
pub struct FilePersistence {
    directory: std::path::PathBuf,
    write_lock: Mutex<()>,
}

impl FilePersistence {
    pub fn new(directory: impl Into<std::path::PathBuf>) -> Self {
        Self { directory: directory.into(), write_lock: Mutex::new(()) }
    }

    fn path_for(&self, id: Uuid) -> std::path::PathBuf {
        self.directory.join(format!("{id}.json"))
    }
}

#[async_trait]
impl PersistenceProvider for FilePersistence {
    async fn save(&self, record: &WorkflowStateRecord) -> Result<(), StateError> {
        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.directory).await?;
        let json = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(self.path_for(record.id), json).await?;
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<WorkflowStateRecord>, StateError> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), StateError> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<WorkflowStateRecord>, StateError> {
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                let bytes = tokio::fs::read(entry.path()).await?;
                out.push(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(out)
    }

    async fn close(&self) -> Result<(), StateError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// database
// ---------------------------------------------------------------------------

/// Delegates to the `state_records` table via the `db` crate.
pub struct DatabasePersistence {
    pool: db::DbPool,
}

impl DatabasePersistence {
    #[must_use]
    pub fn new(pool: db::DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PersistenceProvider for DatabasePersistence {
    async fn save(&self, record: &WorkflowStateRecord) -> Result<(), StateError> {
        let payload = serde_json::to_value(record)?;
        db::repository::state_records::upsert_state_record(
            &self.pool,
            record.workflow_id,
            record.execution_id,
            payload,
            record.metadata.version as i64,
        )
        .await?;
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<WorkflowStateRecord>, StateError> {
        // `state_records` is keyed by `execution_id`, which is a 1:1 match
        // for a `WorkflowStateRecord.id` in this schema (one state per
        // execution).
        let row = db::repository::state_records::get_state_record(&self.pool, id).await?;
        Ok(match row {
            Some(row) => Some(serde_json::from_value(row.record)?),
            None => None,
        })
    }

    async fn delete(&self, id: Uuid) -> Result<(), StateError> {
        db::repository::state_records::delete_state_record(&self.pool, id).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WorkflowStateRecord>, StateError> {
        let rows = db::repository::state_records::list_state_records(&self.pool).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row.record).map_err(StateError::from))
            .collect()
    }

    async fn close(&self) -> Result<(), StateError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// external_kv (documented stub)
// ---------------------------------------------------------------------------

/// Placeholder for a Redis/etcd-style strategy. Spec.md's Open Questions
/// note persistence providers beyond in-memory were stubbed in the system
/// this was distilled from; this type keeps the four-way strategy surface
/// complete while being honest that nothing is wired up yet.
#[derive(Default)]
pub struct ExternalKvPersistence;

#[async_trait]
impl PersistenceProvider for ExternalKvPersistence {
    async fn save(&self, _record: &WorkflowStateRecord) -> Result<(), StateError> {
        Err(StateError::StrategyNotImplemented("external_kv"))
    }

    async fn load(&self, _id: Uuid) -> Result<Option<WorkflowStateRecord>, StateError> {
        Err(StateError::StrategyNotImplemented("external_kv"))
    }

    async fn delete(&self, _id: Uuid) -> Result<(), StateError> {
        Err(StateError::StrategyNotImplemented("external_kv"))
    }

    async fn list(&self) -> Result<Vec<WorkflowStateRecord>, StateError> {
        Err(StateError::StrategyNotImplemented("external_kv"))
    }

    async fn close(&self) -> Result<(), StateError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PersistenceStrategy, StateMetadata, StateStatus};
    use chrono::Utc;

    fn sample_record() -> WorkflowStateRecord {
        WorkflowStateRecord {
            id: Uuid::new_v4(),
            workflow_id: Uuid::new_v4(),
            execution_id: Uuid::new_v4(),
            status: StateStatus::Running,
            current_step: Some("a".into()),
            context: serde_json::Map::new(),
            checkpoints: Vec::new(),
            metadata: StateMetadata {
                version: 1,
                started_at: Utc::now(),
                updated_at: Utc::now(),
                completed_at: None,
                ttl_secs: None,
            },
            strategy: PersistenceStrategy::Memory,
        }
    }

    #[tokio::test]
    async fn memory_round_trips() {
        let provider = MemoryPersistence::default();
        let record = sample_record();
        provider.save(&record).await.unwrap();
        let loaded = provider.load(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, record.id);
        provider.delete(record.id).await.unwrap();
        assert!(provider.load(record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_round_trips() {
        let dir = std::env::temp_dir().join(format!("state-test-{}", Uuid::new_v4()));
        let provider = FilePersistence::new(&dir);
        let record = sample_record();
        provider.save(&record).await.unwrap();
        let loaded = provider.load(record.id).await.unwrap().unwrap();
        assert_eq!(loaded.workflow_id, record.workflow_id);
        let all = provider.list().await.unwrap();
        assert_eq!(all.len(), 1);
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn external_kv_is_an_explicit_stub() {
        let provider = ExternalKvPersistence;
        assert!(matches!(
            provider.save(&sample_record()).await,
            Err(StateError::StrategyNotImplemented("external_kv"))
        ));
    }
}
