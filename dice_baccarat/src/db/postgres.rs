//! PostgreSQL implementation of [`Store`].

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};

use super::{
    Store, StoreResult,
    timeouts::{DEFAULT_QUERY_TIMEOUT, LONG_OPERATION_TIMEOUT, with_timeout},
};
use crate::game::GameRecord;

/// Store backed by the `kv_store` and `game_history` tables.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let row = with_timeout(
            DEFAULT_QUERY_TIMEOUT,
            sqlx::query("SELECT value FROM kv_store WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.map(|r| r.get::<Value, _>("value")))
    }

    async fn put(&self, key: &str, value: Value) -> StoreResult<()> {
        with_timeout(
            DEFAULT_QUERY_TIMEOUT,
            sqlx::query(
                "INSERT INTO kv_store (key, value, updated_at) VALUES ($1, $2, NOW())
                 ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
            )
            .bind(key)
            .bind(value)
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let result = with_timeout(
            DEFAULT_QUERY_TIMEOUT,
            sqlx::query("DELETE FROM kv_store WHERE key = $1")
                .bind(key)
                .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn archive(&self, record: &GameRecord) -> StoreResult<()> {
        let body = serde_json::to_value(record)?;
        let winner = record
            .game
            .outcome
            .map(|o| o.winner.to_string());

        with_timeout(
            DEFAULT_QUERY_TIMEOUT,
            sqlx::query(
                "INSERT INTO game_history (round_id, room_id, winner, record, archived_at)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (round_id) DO NOTHING",
            )
            .bind(record.game.round_id.as_str())
            .bind(record.game.room_id)
            .bind(winner)
            .bind(body)
            .bind(record.archived_at)
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let rows = with_timeout(
            LONG_OPERATION_TIMEOUT,
            sqlx::query("SELECT key FROM kv_store WHERE left(key, length($1)) = $1 ORDER BY key")
                .bind(prefix)
                .fetch_all(&self.pool),
        )
        .await?;

        Ok(rows.iter().map(|r| r.get("key")).collect())
    }
}
