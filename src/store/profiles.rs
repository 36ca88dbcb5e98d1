//! Per-user profile storage: charisma score and current mood.

use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Charisma score bounds. New profiles start at the midpoint.
pub const CHARISMA_MIN: i64 = 0;
pub const CHARISMA_MAX: i64 = 100;
pub const CHARISMA_DEFAULT: i64 = 50;

/// Mood assigned to profiles that have never had one set.
pub const DEFAULT_VIBE: &str = "neutral";

/// A user's stored profile.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub charisma: i64,
    pub vibe: String,
    pub total_messages: i64,
    pub last_interaction: Option<DateTime<Utc>>,
}

/// Profile store backed by SQLite.
pub struct ProfileStore {
    pool: SqlitePool,
}

impl ProfileStore {
    pub fn new(pool: SqlitePool) -> Arc<Self> {
        Arc::new(Self { pool })
    }

    /// Look up a profile without creating one.
    pub async fn get(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, username, charisma, vibe, total_messages, last_interaction
            FROM user_profiles
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Query)?;

        Ok(row.map(|row| row_to_profile(&row)))
    }

    /// Fetch a profile, creating it with defaults on first contact. The
    /// stored username is refreshed on every call so renames stick.
    pub async fn get_or_create(&self, user_id: &str, username: &str) -> Result<UserProfile> {
        sqlx::query(
            r#"
            INSERT INTO user_profiles (user_id, username)
            VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                username = excluded.username,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(user_id)
        .bind(username)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Query)?;

        self.get(user_id).await?.ok_or_else(|| {
            StoreError::ProfileNotFound {
                user_id: user_id.to_string(),
            }
            .into()
        })
    }

    /// Apply a charisma delta, clamped to `[CHARISMA_MIN, CHARISMA_MAX]`, and
    /// bump the interaction counters. Returns the post-update score.
    pub async fn apply_score_delta(&self, user_id: &str, delta: i64) -> Result<i64> {
        let current = self.get(user_id).await?.ok_or_else(|| {
            crate::Error::from(StoreError::ProfileNotFound {
                user_id: user_id.to_string(),
            })
        })?;

        // The delta comes straight from model output, so it can be any i64.
        let updated = current
            .charisma
            .saturating_add(delta)
            .clamp(CHARISMA_MIN, CHARISMA_MAX);

        sqlx::query(
            r#"
            UPDATE user_profiles
            SET charisma = ?,
                total_messages = total_messages + 1,
                last_interaction = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE user_id = ?
            "#,
        )
        .bind(updated)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Query)?;

        Ok(updated)
    }

    /// Overwrite the stored mood.
    pub async fn set_vibe(&self, user_id: &str, vibe: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE user_profiles
            SET vibe = ?, updated_at = CURRENT_TIMESTAMP
            WHERE user_id = ?
            "#,
        )
        .bind(vibe)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Query)?;

        Ok(())
    }
}

fn row_to_profile(row: &sqlx::sqlite::SqliteRow) -> UserProfile {
    UserProfile {
        user_id: row.try_get("user_id").unwrap_or_default(),
        username: row.try_get("username").unwrap_or_default(),
        charisma: row.try_get("charisma").unwrap_or(CHARISMA_DEFAULT),
        vibe: row
            .try_get("vibe")
            .unwrap_or_else(|_| DEFAULT_VIBE.to_string()),
        total_messages: row.try_get("total_messages").unwrap_or(0),
        last_interaction: row
            .try_get::<chrono::NaiveDateTime, _>("last_interaction")
            .ok()
            .map(|v| v.and_utc()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_pool;

    #[tokio::test]
    async fn get_or_create_uses_defaults() {
        let store = ProfileStore::new(test_pool().await);
        let profile = store
            .get_or_create("1001", "alice")
            .await
            .expect("profile should be created");

        assert_eq!(profile.charisma, CHARISMA_DEFAULT);
        assert_eq!(profile.vibe, DEFAULT_VIBE);
        assert_eq!(profile.total_messages, 0);
        assert!(profile.last_interaction.is_none());
    }

    #[tokio::test]
    async fn get_or_create_refreshes_username_without_resetting_score() {
        let store = ProfileStore::new(test_pool().await);
        store
            .get_or_create("1001", "alice")
            .await
            .expect("profile should be created");
        store
            .apply_score_delta("1001", 5)
            .await
            .expect("delta should apply");

        let profile = store
            .get_or_create("1001", "alice_renamed")
            .await
            .expect("profile should be fetched");
        assert_eq!(profile.username, "alice_renamed");
        assert_eq!(profile.charisma, 55);
    }

    #[tokio::test]
    async fn score_delta_clamps_at_both_bounds() {
        let store = ProfileStore::new(test_pool().await);
        store
            .get_or_create("1001", "alice")
            .await
            .expect("profile should be created");

        let high = store
            .apply_score_delta("1001", 200)
            .await
            .expect("delta should apply");
        assert_eq!(high, CHARISMA_MAX);

        let low = store
            .apply_score_delta("1001", -500)
            .await
            .expect("delta should apply");
        assert_eq!(low, CHARISMA_MIN);
    }

    #[tokio::test]
    async fn extreme_score_delta_saturates_instead_of_overflowing() {
        let store = ProfileStore::new(test_pool().await);
        store
            .get_or_create("1001", "alice")
            .await
            .expect("profile should be created");

        let high = store
            .apply_score_delta("1001", i64::MAX)
            .await
            .expect("delta should apply");
        assert_eq!(high, CHARISMA_MAX);

        let low = store
            .apply_score_delta("1001", i64::MIN)
            .await
            .expect("delta should apply");
        assert_eq!(low, CHARISMA_MIN);
    }

    #[tokio::test]
    async fn score_delta_bumps_counters() {
        let store = ProfileStore::new(test_pool().await);
        store
            .get_or_create("1001", "alice")
            .await
            .expect("profile should be created");
        store
            .apply_score_delta("1001", 0)
            .await
            .expect("delta should apply");

        let profile = store
            .get("1001")
            .await
            .expect("query should succeed")
            .expect("profile should exist");
        assert_eq!(profile.total_messages, 1);
        assert!(profile.last_interaction.is_some());
    }

    #[tokio::test]
    async fn score_delta_on_missing_profile_fails() {
        let store = ProfileStore::new(test_pool().await);
        let error = store
            .apply_score_delta("9999", 1)
            .await
            .expect_err("missing profile must fail");
        assert!(error.to_string().contains("profile not found"));
    }

    #[tokio::test]
    async fn set_vibe_overwrites_mood() {
        let store = ProfileStore::new(test_pool().await);
        store
            .get_or_create("1001", "alice")
            .await
            .expect("profile should be created");
        store
            .set_vibe("1001", "flirty")
            .await
            .expect("vibe should be set");

        let profile = store
            .get("1001")
            .await
            .expect("query should succeed")
            .expect("profile should exist");
        assert_eq!(profile.vibe, "flirty");
    }
}
