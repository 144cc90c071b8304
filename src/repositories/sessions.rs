use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::PgPool;

use super::{RepositoryError, SessionStore};
use crate::models::{sessions::Session, users::User};

#[derive(Clone)]
pub struct SessionRepository {
    conn: PgPool,
}

impl SessionRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn create_session(&self, session: Session) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO sessions (token_hash, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&session.token_hash)
            .bind(&session.user_id)
            .bind(session.expires_at)
            .execute(&self.conn)
            .await?;

        Ok(())
    }

    async fn find_session_user(
        &self,
        token_hash: &str,
        now: NaiveDateTime,
    ) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
                SELECT u.*
                FROM sessions s
                JOIN users u ON u.id = s.user_id
                WHERE s.token_hash = $1 AND s.expires_at > $2
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.conn)
        .await?;

        Ok(user)
    }

    async fn delete_session(&self, token_hash: &str) -> Result<bool, RepositoryError> {
        let deleted = sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.conn)
            .await?
            .rows_affected();

        Ok(deleted > 0)
    }

    async fn delete_expired_sessions(&self, now: NaiveDateTime) -> Result<u64, RepositoryError> {
        let deleted = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.conn)
            .await?
            .rows_affected();

        Ok(deleted)
    }
}
