//! Per-profile change history persisted in `user_profile.metadata`.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use tidy_core::defaults::HISTORY_METADATA_KEY;
use tidy_core::{ChangeLog, ChangeRecord, Error, HistoryStore, Result};

/// PostgreSQL implementation of [`HistoryStore`] for one profile.
///
/// Records are stored newest first as a JSON array under the
/// `organize_history` key; the capacity is not persisted and always comes
/// from configuration.
#[derive(Clone)]
pub struct PgHistoryStore {
    pool: Pool<Postgres>,
    profile_id: Uuid,
    capacity: usize,
}

impl PgHistoryStore {
    pub fn new(pool: Pool<Postgres>, profile_id: Uuid, capacity: usize) -> Self {
        Self {
            pool,
            profile_id,
            capacity,
        }
    }

    pub fn profile_id(&self) -> Uuid {
        self.profile_id
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn load(&self) -> Result<ChangeLog> {
        let row = sqlx::query("SELECT metadata -> $2::text AS history FROM user_profile WHERE id = $1")
            .bind(self.profile_id)
            .bind(HISTORY_METADATA_KEY)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        let history: Option<JsonValue> = row.and_then(|r| r.get("history"));
        let records: Vec<ChangeRecord> = match history {
            Some(value) if !value.is_null() => serde_json::from_value(value)?,
            _ => Vec::new(),
        };
        Ok(ChangeLog::from_records(self.capacity, records))
    }

    async fn save(&self, log: &ChangeLog) -> Result<()> {
        let records: Vec<&ChangeRecord> = log.iter().collect();
        let value = serde_json::to_value(records)?;

        sqlx::query(
            r#"
            INSERT INTO user_profile (id, metadata, updated_at_utc)
            VALUES ($1, jsonb_build_object($2::text, $3::jsonb), NOW())
            ON CONFLICT (id) DO UPDATE
            SET metadata = jsonb_set(COALESCE(user_profile.metadata, '{}'::jsonb),
                                     ARRAY[$2::text], $3::jsonb, true),
                updated_at_utc = NOW()
            "#,
        )
        .bind(self.profile_id)
        .bind(HISTORY_METADATA_KEY)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}
