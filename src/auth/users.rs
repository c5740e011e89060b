use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::core::errors::ApiError;

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub hashed_password: String,
    pub full_name: String,
    pub role: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: String,
    pub last_login: Option<String>,
    pub total_queries: i64,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Stand-in admin used for every request while authentication is disabled.
    pub fn developer() -> Self {
        Self {
            id: 0,
            email: "dev@financerag.com".to_string(),
            username: "developer".to_string(),
            hashed_password: String::new(),
            full_name: "Developer".to_string(),
            role: ROLE_ADMIN.to_string(),
            is_active: true,
            is_verified: true,
            created_at: String::new(),
            last_login: None,
            total_queries: 0,
        }
    }
}

pub struct NewUser<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub hashed_password: &'a str,
    pub full_name: &'a str,
    pub role: &'a str,
}

const USER_COLUMNS: &str = "id, email, username, hashed_password, full_name, role, is_active, \
     is_verified, created_at, last_login, total_queries";

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub async fn new(pool: SqlitePool) -> Result<Self, ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL UNIQUE,
                username TEXT NOT NULL UNIQUE,
                hashed_password TEXT NOT NULL,
                full_name TEXT NOT NULL DEFAULT '',
                role TEXT NOT NULL DEFAULT 'user',
                is_active INTEGER NOT NULL DEFAULT 1,
                is_verified INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                last_login TEXT,
                total_queries INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init users table: {}", e)))?;

        Ok(Self { pool })
    }

    fn row_to_user(row: &SqliteRow) -> User {
        User {
            id: row.get("id"),
            email: row.get("email"),
            username: row.get("username"),
            hashed_password: row.get("hashed_password"),
            full_name: row.get("full_name"),
            role: row.get("role"),
            is_active: row.get("is_active"),
            is_verified: row.get("is_verified"),
            created_at: row.get("created_at"),
            last_login: row.get("last_login"),
            total_queries: row.get("total_queries"),
        }
    }

    /// `Ok(None)` when the email or username is already taken.
    pub async fn create_user(&self, new_user: NewUser<'_>) -> Result<Option<User>, ApiError> {
        let result = sqlx::query(
            "INSERT INTO users (email, username, hashed_password, full_name, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(new_user.email.trim().to_lowercase())
        .bind(new_user.username.trim().to_lowercase())
        .bind(new_user.hashed_password)
        .bind(new_user.full_name)
        .bind(new_user.role)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => {
                tracing::info!("Created user: {}", new_user.email);
                self.get_by_id(done.last_insert_rowid()).await
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                tracing::warn!("User already exists: {}", new_user.email);
                Ok(None)
            }
            Err(e) => Err(ApiError::internal(e)),
        }
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> Result<Option<User>, ApiError> {
        let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, clause);
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(row.as_ref().map(Self::row_to_user))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, ApiError> {
        self.fetch_one_where("email", &email.trim().to_lowercase()).await
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, ApiError> {
        self.fetch_one_where("username", &username.trim().to_lowercase())
            .await
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, ApiError> {
        let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(row.as_ref().map(Self::row_to_user))
    }

    pub async fn update_last_login(&self, id: i64) -> Result<(), ApiError> {
        sqlx::query("UPDATE users SET last_login = ?1 WHERE id = ?2")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(())
    }

    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        let sql = format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(rows.iter().map(Self::row_to_user).collect())
    }

    /// Removes the user and, through the foreign key, their query history.
    pub async fn delete_user(&self, id: i64) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        if result.rows_affected() > 0 {
            tracing::info!("Deleted user: {}", id);
        }
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_role(&self, id: i64, role: &str) -> Result<bool, ApiError> {
        if role != ROLE_USER && role != ROLE_ADMIN {
            return Err(ApiError::BadRequest(format!(
                "Role must be '{}' or '{}'",
                ROLE_USER, ROLE_ADMIN
            )));
        }
        let result = sqlx::query("UPDATE users SET role = ?1 WHERE id = ?2")
            .bind(role)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self) -> Result<i64, ApiError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)
    }
}
