//! CRUD for `state_records` — the `database` persistence strategy backing
//! `state::StateManager`.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::StateRecordRow};

/// Insert or fully replace the state record for `execution_id`.
pub async fn upsert_state_record(
    pool: &PgPool,
    workflow_id: Uuid,
    execution_id: Uuid,
    record: serde_json::Value,
    version: i64,
) -> Result<StateRecordRow, DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let row = sqlx::query_as!(
        StateRecordRow,
        r#"
        INSERT INTO state_records (id, workflow_id, execution_id, record, version, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (execution_id) DO UPDATE
            SET record = EXCLUDED.record,
                version = EXCLUDED.version,
                updated_at = EXCLUDED.updated_at
        RETURNING id, workflow_id, execution_id, record, version, updated_at
        "#,
        id,
        workflow_id,
        execution_id,
        record,
        version,
        now,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_state_record(
    pool: &PgPool,
    execution_id: Uuid,
) -> Result<StateRecordRow, DbError> {
    let row = sqlx::query_as!(
        StateRecordRow,
        r#"SELECT id, workflow_id, execution_id, record, version, updated_at
           FROM state_records WHERE execution_id = $1"#,
        execution_id,
    )
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

pub async fn list_state_records(pool: &PgPool) -> Result<Vec<StateRecordRow>, DbError> {
    let rows = sqlx::query_as!(
        StateRecordRow,
        r#"SELECT id, workflow_id, execution_id, record, version, updated_at
           FROM state_records ORDER BY updated_at DESC"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn delete_state_record(pool: &PgPool, execution_id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query!("DELETE FROM state_records WHERE execution_id = $1", execution_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
