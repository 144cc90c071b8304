use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::PgPool;

use super::{RepositoryError, SettingsStore};
use crate::models::settings::{SettingsRecord, SettingsUpdate};

#[derive(Clone)]
pub struct SettingsRepository {
    conn: PgPool,
}

impl SettingsRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SettingsStore for SettingsRepository {
    async fn get_settings(&self) -> Result<Option<SettingsRecord>, RepositoryError> {
        let record = sqlx::query_as::<_, SettingsRecord>(
            "SELECT api_key, prompt, version, updated_at FROM settings WHERE id = 1",
        )
        .fetch_optional(&self.conn)
        .await?;

        Ok(record)
    }

    async fn upsert_settings(
        &self,
        update: &SettingsUpdate,
        now: NaiveDateTime,
    ) -> Result<SettingsRecord, RepositoryError> {
        let record = sqlx::query_as::<_, SettingsRecord>(
            r#"
                INSERT INTO settings (id, api_key, prompt, version, updated_at)
                VALUES (1, $1, $2, 1, $3)
                ON CONFLICT (id) DO UPDATE
                SET api_key = COALESCE(EXCLUDED.api_key, settings.api_key),
                    prompt = COALESCE(EXCLUDED.prompt, settings.prompt),
                    version = settings.version + 1,
                    updated_at = EXCLUDED.updated_at
                RETURNING api_key, prompt, version, updated_at
            "#,
        )
        .bind(&update.api_key)
        .bind(&update.prompt)
        .bind(now)
        .fetch_one(&self.conn)
        .await?;

        Ok(record)
    }
}
