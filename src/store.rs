//! SQLite-backed persistence: user profiles and the interaction log.

pub mod interactions;
pub mod profiles;

pub use interactions::InteractionLog;
pub use profiles::ProfileStore;

use crate::error::{Result, StoreError};
use sqlx::SqlitePool;

/// Create the vibebot tables if they don't exist.
pub async fn initialize(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_profiles (
            user_id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            charisma INTEGER NOT NULL DEFAULT 50,
            vibe TEXT NOT NULL DEFAULT 'neutral',
            total_messages INTEGER NOT NULL DEFAULT 0,
            last_interaction TIMESTAMP,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(StoreError::Query)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS interactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            user_message TEXT NOT NULL,
            bot_response TEXT,
            kind TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(StoreError::Query)?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_interactions_user ON interactions(user_id, id)")
        .execute(pool)
        .await
        .map_err(StoreError::Query)?;

    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    use sqlx::sqlite::SqlitePoolOptions;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite should connect");
    initialize(&pool).await.expect("schema should be created");
    pool
}
