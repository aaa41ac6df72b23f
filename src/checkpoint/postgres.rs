//! Postgres checkpoint store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    PgPool, Row,
};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::{Checkpoint, CheckpointStore};
use crate::error::OrchestrationError;
use crate::models::SessionKey;
use crate::state::SessionState;
use crate::Result;

pub struct PostgresCheckpointStore {
    pool: PgPool,
    schema_ready: OnceCell<()>,
}

impl PostgresCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: OnceCell::new(),
        }
    }

    /// Pool connections are opened on first use.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .map_err(|e| OrchestrationError::DatabaseError(e.to_string()))?;
        Ok(Self::new(pool))
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS session_checkpoints (
                      user_id TEXT NOT NULL,
                      thread_id TEXT NOT NULL,
                      state TEXT NOT NULL,
                      state_hash TEXT NOT NULL,
                      saved_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                      PRIMARY KEY (user_id, thread_id)
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                OrchestrationError::DatabaseError(format!(
                    "Failed to initialize checkpoint schema: {}",
                    e
                ))
            })?;

        Ok(())
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name).map_err(|e| {
        OrchestrationError::CheckpointError(format!("Failed to read column {}: {}", name, e))
    })
}

/// Stored state text as JSON. Undecodable text becomes `null`, which
/// `SessionState::from_raw` normalizes to a fresh state.
fn decode_state(key: &SessionKey, raw: &str) -> Value {
    match serde_json::from_str(raw) {
        Ok(state) => state,
        Err(e) => {
            warn!(session = %key, error = %e, "Stored checkpoint state is not valid JSON, resetting");
            Value::Null
        }
    }
}

#[async_trait]
impl CheckpointStore for PostgresCheckpointStore {
    async fn get(&self, key: &SessionKey) -> Result<Option<Checkpoint>> {
        self.ensure_schema().await?;

        let row = sqlx::query(
            r#"
            SELECT state, state_hash, saved_at
            FROM session_checkpoints
            WHERE user_id = $1 AND thread_id = $2
            "#,
        )
        .bind(&key.user_id)
        .bind(&key.thread_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OrchestrationError::DatabaseError(format!("Failed to load checkpoint: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = column(&row, "state")?;
        let state_hash: String = column(&row, "state_hash")?;
        let saved_at: DateTime<Utc> = column(&row, "saved_at")?;

        Ok(Some(Checkpoint {
            state: decode_state(key, &raw),
            saved_at,
            state_hash,
        }))
    }

    async fn put(&self, key: &SessionKey, state: &SessionState) -> Result<Checkpoint> {
        self.ensure_schema().await?;

        let checkpoint = Checkpoint::capture(state)?;
        let encoded = serde_json::to_string(&checkpoint.state)?;

        sqlx::query(
            r#"
            INSERT INTO session_checkpoints (user_id, thread_id, state, state_hash, saved_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, thread_id) DO UPDATE
            SET state = EXCLUDED.state,
                state_hash = EXCLUDED.state_hash,
                saved_at = EXCLUDED.saved_at
            "#,
        )
        .bind(&key.user_id)
        .bind(&key.thread_id)
        .bind(&encoded)
        .bind(&checkpoint.state_hash)
        .bind(checkpoint.saved_at)
        .execute(&self.pool)
        .await
        .map_err(|e| OrchestrationError::DatabaseError(format!("Failed to save checkpoint: {}", e)))?;

        debug!(session = %key, "Checkpoint saved");
        Ok(checkpoint)
    }
}
