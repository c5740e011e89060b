use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::core::errors::ApiError;
use crate::pipeline::types::PipelineResult;

pub const DEFAULT_USER_LIMIT: i64 = 50;
pub const DEFAULT_ADMIN_LIMIT: i64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: i64,
    pub user_id: i64,
    pub query: String,
    pub answer: String,
    pub sources: Value,
    pub evaluation: Value,
    /// seconds
    pub response_time: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    pub total_queries: i64,
    pub total_users: i64,
    pub active_users: i64,
    pub avg_queries_per_user: f64,
}

/// Per-user log of answered questions. Lives beside `users` in the same database.
#[derive(Clone)]
pub struct QueryHistoryStore {
    pool: SqlitePool,
}

impl QueryHistoryStore {
    /// The `users` table must already exist.
    pub async fn new(pool: SqlitePool) -> Result<Self, ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS query_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                query TEXT NOT NULL,
                answer TEXT NOT NULL,
                sources JSON NOT NULL DEFAULT '[]',
                evaluation JSON NOT NULL DEFAULT '{}',
                response_time REAL NOT NULL DEFAULT 0,
                timestamp TEXT NOT NULL,
                FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init query_history table: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_query_history_user ON query_history(user_id)")
            .execute(&pool)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to create index: {}", e)))?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_query_history_timestamp ON query_history(timestamp)",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create index: {}", e)))?;

        Ok(Self { pool })
    }

    fn row_to_record(row: &SqliteRow) -> QueryRecord {
        let sources: String = row.try_get("sources").unwrap_or_default();
        let evaluation: String = row.try_get("evaluation").unwrap_or_default();
        QueryRecord {
            id: row.get("id"),
            user_id: row.get("user_id"),
            query: row.get("query"),
            answer: row.get("answer"),
            sources: serde_json::from_str(&sources).unwrap_or(Value::Array(Vec::new())),
            evaluation: serde_json::from_str(&evaluation).unwrap_or(Value::Null),
            response_time: row.get("response_time"),
            timestamp: row.get("timestamp"),
        }
    }

    /// Stores the answer and bumps the user's `total_queries` in one transaction.
    pub async fn save_query(
        &self,
        user_id: i64,
        query: &str,
        result: &PipelineResult,
        response_time: f64,
    ) -> Result<i64, ApiError> {
        let sources = serde_json::to_string(&result.sources).map_err(ApiError::internal)?;
        let evaluation = serde_json::to_string(&result.evaluation).map_err(ApiError::internal)?;

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        let inserted = sqlx::query(
            "INSERT INTO query_history (user_id, query, answer, sources, evaluation, response_time, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(user_id)
        .bind(query)
        .bind(&result.answer)
        .bind(&sources)
        .bind(&evaluation)
        .bind(response_time)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("UPDATE users SET total_queries = total_queries + 1 WHERE id = ?1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        tracing::info!("Saved query for user: {}", user_id);
        Ok(inserted.last_insert_rowid())
    }

    /// Newest first.
    pub async fn user_queries(&self, user_id: i64, limit: i64) -> Result<Vec<QueryRecord>, ApiError> {
        let rows = sqlx::query(
            "SELECT * FROM query_history WHERE user_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )
        .bind(user_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;
        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    pub async fn all_queries(&self, limit: i64) -> Result<Vec<QueryRecord>, ApiError> {
        let rows = sqlx::query("SELECT * FROM query_history ORDER BY timestamp DESC, id DESC LIMIT ?1")
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    pub async fn stats(&self) -> Result<QueryStats, ApiError> {
        let total_queries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM query_history")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        let total_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        let active_users: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE total_queries > 0")
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)?;

        let avg_queries_per_user = if total_users > 0 {
            total_queries as f64 / total_users as f64
        } else {
            0.0
        };

        Ok(QueryStats {
            total_queries,
            total_users,
            active_users,
            avg_queries_per_user,
        })
    }
}
