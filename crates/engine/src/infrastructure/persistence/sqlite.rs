//! SQLite-backed session snapshots.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use taleweaver_domain::{GameState, SessionId};

use crate::infrastructure::ports::{ClockPort, RepoError, SessionRepo};

/// One row per session holding the latest full `GameState` as JSON.
pub struct SqliteSessionRepo {
    pool: SqlitePool,
    clock: Arc<dyn ClockPort>,
}

impl SqliteSessionRepo {
    pub async fn new(db_path: &str, clock: Arc<dyn ClockPort>) -> Result<Self, RepoError> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .map_err(|e| RepoError::database("connect", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY NOT NULL,
                world_id TEXT NOT NULL,
                turn INTEGER NOT NULL,
                state_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| RepoError::database("migrate", e))?;

        Ok(Self { pool, clock })
    }
}

#[async_trait]
impl SessionRepo for SqliteSessionRepo {
    async fn load(&self, id: SessionId) -> Result<Option<GameState>, RepoError> {
        let row = sqlx::query("SELECT state_json FROM sessions WHERE session_id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("load_session", e))?;

        match row {
            Some(row) => {
                let json: String = row.get("state_json");
                let state = serde_json::from_str(&json)
                    .map_err(|e| RepoError::Serialization(e.to_string()))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, id: SessionId, state: &GameState) -> Result<(), RepoError> {
        let json =
            serde_json::to_string(state).map_err(|e| RepoError::Serialization(e.to_string()))?;
        let now = self.clock.now().to_rfc3339();
        let turn = i64::try_from(state.turn)
            .map_err(|_| RepoError::serialization(format!("turn {} out of range", state.turn)))?;

        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, world_id, turn, state_json, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                world_id = excluded.world_id,
                turn = excluded.turn,
                state_json = excluded.state_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id.to_string())
        .bind(state.world_id.as_str())
        .bind(turn)
        .bind(json)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("save_session", e))?;

        Ok(())
    }
}
