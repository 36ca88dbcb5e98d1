//! Rolling per-user interaction log, capped at the last few exchanges.

use crate::InteractionKind;
use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// How many interactions are kept per user. Older rows are evicted on
/// append, so history stays bounded without a sweep job.
pub const HISTORY_LIMIT: i64 = 5;

/// One stored exchange. `bot_response` is `None` when the bot chose to stay
/// silent.
#[derive(Debug, Clone)]
pub struct InteractionRecord {
    pub user_message: String,
    pub bot_response: Option<String>,
    pub kind: InteractionKind,
    pub created_at: DateTime<Utc>,
}

/// Interaction log backed by SQLite.
pub struct InteractionLog {
    pool: SqlitePool,
}

impl InteractionLog {
    pub fn new(pool: SqlitePool) -> Arc<Self> {
        Arc::new(Self { pool })
    }

    /// The user's recent interactions, oldest first, at most `HISTORY_LIMIT`.
    pub async fn list_recent(&self, user_id: &str) -> Result<Vec<InteractionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT user_message, bot_response, kind, created_at
            FROM interactions
            WHERE user_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(HISTORY_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Query)?;

        let mut records: Vec<InteractionRecord> =
            rows.iter().map(row_to_record).collect();
        records.reverse();
        Ok(records)
    }

    /// Append one exchange, evicting the oldest rows so the user keeps at
    /// most `HISTORY_LIMIT` entries.
    pub async fn append(
        &self,
        user_id: &str,
        user_message: &str,
        bot_response: Option<&str>,
        kind: InteractionKind,
    ) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM interactions
            WHERE user_id = ?
              AND id NOT IN (
                  SELECT id FROM interactions
                  WHERE user_id = ?
                  ORDER BY id DESC
                  LIMIT ?
              )
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .bind(HISTORY_LIMIT - 1)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Query)?;

        sqlx::query(
            r#"
            INSERT INTO interactions (user_id, user_message, bot_response, kind)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(user_message)
        .bind(bot_response)
        .bind(kind.as_str())
        .execute(&self.pool)
        .await
        .map_err(StoreError::Query)?;

        Ok(())
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> InteractionRecord {
    let kind: String = row.try_get("kind").unwrap_or_default();
    InteractionRecord {
        user_message: row.try_get("user_message").unwrap_or_default(),
        bot_response: row.try_get("bot_response").ok().flatten(),
        kind: InteractionKind::from_db(&kind),
        created_at: row
            .try_get::<chrono::NaiveDateTime, _>("created_at")
            .map(|v| v.and_utc())
            .unwrap_or_else(|_| Utc::now()),
    }
}
