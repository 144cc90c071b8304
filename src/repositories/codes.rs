use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{
    users::{lock_user, store_credits},
    CodeStore, RedemptionTerms, RepositoryError,
};
use crate::models::codes::PromoCode;

const CODE_COLUMNS: &str = "id, code, platform, user_id, used_at, last_grant_on, created_at";

#[derive(Clone)]
pub struct CodeRepository {
    conn: PgPool,
}

impl CodeRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }
}

async fn lock_code(
    conn: &mut PgConnection,
    column: &str,
    value: &str,
) -> Result<Option<PromoCode>, RepositoryError> {
    let code = sqlx::query_as::<_, PromoCode>(&format!(
        "SELECT {CODE_COLUMNS} FROM ltd_codes WHERE {column} = $1 FOR UPDATE"
    ))
    .bind(value)
    .fetch_optional(conn)
    .await?;

    Ok(code)
}

async fn store_code(conn: &mut PgConnection, code: &PromoCode) -> Result<PromoCode, RepositoryError> {
    let code = sqlx::query_as::<_, PromoCode>(&format!(
        r#"
            UPDATE ltd_codes SET user_id = $1, used_at = $2, last_grant_on = $3
            WHERE id = $4
            RETURNING {CODE_COLUMNS}
        "#
    ))
    .bind(&code.user_id)
    .bind(code.used_at)
    .bind(code.last_grant_on)
    .bind(&code.id)
    .fetch_one(conn)
    .await?;

    Ok(code)
}

#[async_trait]
impl CodeStore for CodeRepository {
    async fn insert_codes(
        &self,
        platform: &str,
        codes: Vec<String>,
    ) -> Result<Vec<PromoCode>, RepositoryError> {
        let mut tx = self.conn.begin().await?;
        let mut inserted = Vec::with_capacity(codes.len());

        for code in codes {
            let promo = sqlx::query_as::<_, PromoCode>(&format!(
                "INSERT INTO ltd_codes (id, code, platform) VALUES ($1, $2, $3) \
                 RETURNING {CODE_COLUMNS}"
            ))
            .bind(Uuid::new_v4().hyphenated().to_string())
            .bind(code)
            .bind(platform)
            .fetch_one(&mut *tx)
            .await?;
            inserted.push(promo);
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn list_codes(&self) -> Result<Vec<PromoCode>, RepositoryError> {
        let codes = sqlx::query_as::<_, PromoCode>(&format!(
            "SELECT {CODE_COLUMNS} FROM ltd_codes ORDER BY created_at"
        ))
        .fetch_all(&self.conn)
        .await?;

        Ok(codes)
    }

    async fn find_code(&self, code: &str) -> Result<Option<PromoCode>, RepositoryError> {
        let code = sqlx::query_as::<_, PromoCode>(&format!(
            "SELECT {CODE_COLUMNS} FROM ltd_codes WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.conn)
        .await?;

        Ok(code)
    }

    async fn redeemed_by(&self, user_id: &str) -> Result<Vec<PromoCode>, RepositoryError> {
        let codes = sqlx::query_as::<_, PromoCode>(&format!(
            "SELECT {CODE_COLUMNS} FROM ltd_codes \
             WHERE user_id = $1 AND used_at IS NOT NULL ORDER BY used_at"
        ))
        .bind(user_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(codes)
    }

    async fn redeem_code(
        &self,
        user_id: &str,
        code: &str,
        now: NaiveDateTime,
        terms: RedemptionTerms,
    ) -> Result<PromoCode, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let mut promo = lock_code(&mut *tx, "code", code)
            .await?
            .ok_or(RepositoryError::NotFound("Code"))?;
        promo.redeem(user_id, now)?;

        let mut user = lock_user(&mut *tx, user_id).await?;
        let redeemed: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM ltd_codes WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        user.claim_code_slot(redeemed as usize, terms.max_codes)?;
        user.grant_credits(terms.grant)?;

        store_credits(&mut *tx, &user).await?;
        let promo = store_code(&mut *tx, &promo).await?;

        tx.commit().await?;
        Ok(promo)
    }

    async fn delete_code(&self, id: &str) -> Result<PromoCode, RepositoryError> {
        sqlx::query_as::<_, PromoCode>(&format!(
            "DELETE FROM ltd_codes WHERE id = $1 RETURNING {CODE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.conn)
        .await?
        .ok_or(RepositoryError::NotFound("LTD code"))
    }

    async fn grant_anniversary(
        &self,
        code_id: &str,
        today: NaiveDate,
        amount: i32,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let Some(mut promo) = lock_code(&mut *tx, "id", code_id).await? else {
            return Err(RepositoryError::NotFound("LTD code"));
        };
        let Some(owner) = promo.user_id.clone().filter(|_| promo.anniversary_due(today)) else {
            return Ok(false);
        };

        let mut user = lock_user(&mut *tx, &owner).await?;
        user.grant_credits(amount)?;
        store_credits(&mut *tx, &user).await?;

        promo.last_grant_on = Some(today);
        store_code(&mut *tx, &promo).await?;

        tx.commit().await?;
        Ok(true)
    }
}
