//! Repository layer for database operations
//!
//! Methods without a suffix run on the pool. Methods ending in `_tx` run on
//! a caller-supplied connection, normally an open transaction, so that the
//! note orchestrator can commit tag counters, note rows and image rows
//! together.

mod images;
mod notes;
mod tags;

pub use notes::NewNote;
pub use tags::NoteScope;

use super::models::User;
use crate::error::{AppError, Result};
use chrono::Utc;
use sqlx::pool::PoolConnection;
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};

/// Repository for database operations
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a transaction for a multi-statement write
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Check out a plain connection for reads
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Create an owner row
    pub async fn create_user(&self, email: &str) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, created_at)
            VALUES (?, ?)
            RETURNING *
            "#,
        )
        .bind(email)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!("Created user: {}", user.id);
        Ok(user)
    }

    /// Get an owner row by ID
    pub async fn get_user(&self, id: i64) -> Result<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("User", id))
    }
}

/// Append `(?, ?, ...)` binding every id.
fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    qb.push("(");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}
