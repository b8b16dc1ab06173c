//! PostgreSQL backend.
//!
//! Table layout: `user_api_keys(user_id BIGINT PRIMARY KEY, data JSONB)`.
//! The earliest deployments stored a bare `token TEXT` column instead of
//! `data`; [`PostgresBackend::init`] converts such tables in place.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::types::Json;
use tracing::info;

use super::backend::KeyBackend;
use super::error::StorageError;
use super::migrate::StoredRecord;

const MAX_CONNECTIONS: u32 = 5;

/// Key storage in a single PostgreSQL table.
#[derive(Debug, Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Connects a small pool to the given database.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the database is unreachable.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        Self::connect_with(url.parse()?).await
    }

    /// Connects a small pool using pre-built connection options.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable.
    pub async fn connect_with(options: PgConnectOptions) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Converts rows from the single-token schema into JSON documents and drops
    /// the legacy column. Returns the number of migrated rows.
    async fn migrate_token_column(&self) -> Result<u64, StorageError> {
        let mut tx = self.pool.begin().await?;

        let has_token_column: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM information_schema.columns \
             WHERE table_schema = current_schema() \
               AND table_name = 'user_api_keys' AND column_name = 'token'",
        )
        .fetch_optional(&mut *tx)
        .await?;

        if has_token_column.is_none() {
            tx.commit().await?;
            return Ok(0);
        }

        info!("Legacy 'token' column detected, migrating to JSONB 'data'");

        sqlx::query(
            "ALTER TABLE user_api_keys ADD COLUMN IF NOT EXISTS data JSONB NOT NULL DEFAULT '{}'",
        )
        .execute(&mut *tx)
        .await?;

        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT user_id, token FROM user_api_keys WHERE token IS NOT NULL")
                .fetch_all(&mut *tx)
                .await?;

        let mut migrated = 0;
        for (user_id, token) in rows {
            let record = StoredRecord::classify(Value::String(token))
                .map(StoredRecord::into_current)
                .unwrap_or_default();
            sqlx::query("UPDATE user_api_keys SET data = $1 WHERE user_id = $2")
                .bind(Json(record.to_document()?))
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            migrated += 1;
        }

        sqlx::query("ALTER TABLE user_api_keys DROP COLUMN IF EXISTS token")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("Migrated {} rows and dropped legacy 'token' column", migrated);
        Ok(migrated)
    }
}

#[async_trait]
impl KeyBackend for PostgresBackend {
    async fn init(&self) -> Result<(), StorageError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS user_api_keys (\
                user_id BIGINT PRIMARY KEY, \
                data    JSONB NOT NULL DEFAULT '{}'\
             )",
        )
        .execute(&self.pool)
        .await?;

        self.migrate_token_column().await?;
        info!("PostgreSQL key storage initialised");
        Ok(())
    }

    async fn load(&self, user_id: i64) -> Result<Option<Value>, StorageError> {
        let row: Option<(Json<Value>,)> =
            sqlx::query_as("SELECT data FROM user_api_keys WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(Json(data),)| data))
    }

    async fn save(&self, user_id: i64, document: &Value) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO user_api_keys (user_id, data) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(user_id)
        .bind(Json(document))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, user_id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM user_api_keys WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn user_ids(&self) -> Result<Vec<i64>, StorageError> {
        let ids = sqlx::query_scalar("SELECT user_id FROM user_api_keys ORDER BY user_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    fn describe(&self) -> String {
        "PostgreSQL".to_owned()
    }
}
