use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{is_unique_violation, RepositoryError, UserStore};
use crate::models::users::{NewUser, ProfileUpdate, User, UserDetails, DEFAULT_SUBSCRIPTION};

pub(crate) const USER_COLUMNS: &str = "id, name, email, password_hash, credits, subscription, \
    is_admin, reset_token, reset_token_expires_at, created_at, updated_at";

#[derive(Clone)]
pub struct UserRepository {
    conn: PgPool,
}

impl UserRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }
}

/// Loads a user row and holds its lock until the surrounding transaction ends.
pub(crate) async fn lock_user(
    conn: &mut PgConnection,
    user_id: &str,
) -> Result<User, RepositoryError> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
    ))
    .bind(user_id)
    .fetch_optional(conn)
    .await?
    .ok_or(RepositoryError::NotFound("User"))
}

pub(crate) async fn store_credits(
    conn: &mut PgConnection,
    user: &User,
) -> Result<User, RepositoryError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET credits = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(user.credits)
    .bind(&user.id)
    .fetch_one(conn)
    .await?;

    Ok(user)
}

#[async_trait]
impl UserStore for UserRepository {
    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let user_id = Uuid::new_v4().hyphenated().to_string();

        sqlx::query_as::<_, User>(&format!(
            r#"
                INSERT INTO users (id, name, email, password_hash, credits, subscription, is_admin)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.credits)
        .bind(DEFAULT_SUBSCRIPTION)
        .bind(user.is_admin)
        .fetch_one(&self.conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepositoryError::Conflict("Email")
            } else {
                RepositoryError::Database(e)
            }
        })
    }

    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.conn)
        .await?;

        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at"
        ))
        .fetch_all(&self.conn)
        .await?;

        Ok(users)
    }

    async fn get_user_details(&self, id: &str) -> Result<Option<UserDetails>, RepositoryError> {
        let Some(user) = self.get_user_by_id(id).await? else {
            return Ok(None);
        };

        let facts: Vec<String> =
            sqlx::query_scalar("SELECT id FROM facts WHERE user_id = $1 ORDER BY created_at DESC")
                .bind(id)
                .fetch_all(&self.conn)
                .await?;
        let favorite_facts: Vec<String> = sqlx::query_scalar(
            "SELECT fact_id FROM favorites WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(id)
        .fetch_all(&self.conn)
        .await?;
        let ltd_codes: Vec<String> =
            sqlx::query_scalar("SELECT id FROM ltd_codes WHERE user_id = $1 ORDER BY used_at")
                .bind(id)
                .fetch_all(&self.conn)
                .await?;

        Ok(Some(UserDetails {
            user: user.summary(),
            is_admin: user.is_admin,
            facts,
            favorite_facts,
            ltd_codes,
        }))
    }

    async fn grant_credits(&self, id: &str, amount: i32) -> Result<User, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let mut user = lock_user(&mut *tx, id).await?;
        user.grant_credits(amount)?;
        let user = store_credits(&mut *tx, &user).await?;

        tx.commit().await?;
        Ok(user)
    }

    async fn update_password(
        &self,
        id: &str,
        password_hash: &str,
    ) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET password_hash = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(password_hash)
        .bind(id)
        .fetch_optional(&self.conn)
        .await?
        .ok_or(RepositoryError::NotFound("User"))
    }

    async fn update_profile(
        &self,
        id: &str,
        update: &ProfileUpdate,
    ) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
                UPDATE users
                SET name = COALESCE($1, name),
                    email = COALESCE($2, email),
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = $3
                RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&update.name)
        .bind(&update.email)
        .bind(id)
        .fetch_optional(&self.conn)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepositoryError::Conflict("Email")
            } else {
                RepositoryError::Database(e)
            }
        })?
        .ok_or(RepositoryError::NotFound("User"))
    }

    async fn set_reset_token(
        &self,
        email: &str,
        token: &str,
        expires_at: NaiveDateTime,
    ) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
                UPDATE users
                SET reset_token = $1, reset_token_expires_at = $2, updated_at = CURRENT_TIMESTAMP
                WHERE email = $3
                RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(token)
        .bind(expires_at)
        .bind(email)
        .fetch_optional(&self.conn)
        .await?;

        Ok(user)
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        password_hash: &str,
        now: NaiveDateTime,
    ) -> Result<Option<User>, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let holder = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE reset_token = $1 FOR UPDATE"
        ))
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(holder) = holder.filter(|user| user.reset_token_valid(token, now)) else {
            return Ok(None);
        };

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
                UPDATE users
                SET password_hash = $1,
                    reset_token = NULL,
                    reset_token_expires_at = NULL,
                    updated_at = CURRENT_TIMESTAMP
                WHERE id = $2
                RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(password_hash)
        .bind(&holder.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(user))
    }
}

#[cfg(test)]
pub(crate) async fn seed_user(conn: &PgPool, email: &str, credits: i32) -> User {
    UserRepository::new(conn.clone())
        .insert_user(NewUser {
            name: "Test".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            credits,
            is_admin: false,
        })
        .await
        .unwrap()
}
