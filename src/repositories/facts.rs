use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use super::{
    users::{lock_user, store_credits},
    FactStore, RepositoryError,
};
use crate::models::{
    facts::{Fact, FactView, FactWithFavorites, NewFact},
    ledger::LedgerError,
};

const FACT_COLUMNS: &str = r#"f.id, f.user_id, f.title, f.truth_status, f.severity, f.explanation,
    f.key_facts, f."references", f.created_at"#;

#[derive(sqlx::FromRow)]
struct HistoryRow {
    #[sqlx(flatten)]
    fact: Fact,
    is_favorite: bool,
}

#[derive(Clone)]
pub struct FactRepository {
    conn: PgPool,
}

impl FactRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl FactStore for FactRepository {
    async fn insert_fact_charging(&self, fact: NewFact) -> Result<Fact, RepositoryError> {
        let fact_id = Uuid::new_v4().hyphenated().to_string();
        let mut tx = self.conn.begin().await?;

        let mut user = lock_user(&mut *tx, &fact.user_id).await?;
        user.spend_credit()?;
        store_credits(&mut *tx, &user).await?;

        let verdict = fact.verdict;
        let stored = sqlx::query_as::<_, Fact>(&format!(
            r#"
                INSERT INTO facts AS f
                (id, user_id, title, truth_status, severity, explanation, key_facts, "references")
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING {FACT_COLUMNS}
            "#
        ))
        .bind(fact_id)
        .bind(&fact.user_id)
        .bind(&fact.title)
        .bind(verdict.truth_status)
        .bind(verdict.severity)
        .bind(verdict.explanation)
        .bind(verdict.key_facts)
        .bind(Json(verdict.references))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn get_fact(&self, id: &str) -> Result<Option<FactWithFavorites>, RepositoryError> {
        let fact = sqlx::query_as::<_, Fact>(&format!(
            "SELECT {FACT_COLUMNS} FROM facts f WHERE f.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.conn)
        .await?;

        let Some(fact) = fact else {
            return Ok(None);
        };

        let favorite_users: Vec<String> = sqlx::query_scalar(
            "SELECT user_id FROM favorites WHERE fact_id = $1 ORDER BY created_at",
        )
        .bind(id)
        .fetch_all(&self.conn)
        .await?;

        Ok(Some(FactWithFavorites {
            fact,
            favorite_users,
        }))
    }

    async fn delete_owned_fact(
        &self,
        fact_id: &str,
        user_id: &str,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.conn.begin().await?;

        let owner: Option<String> =
            sqlx::query_scalar("SELECT user_id FROM facts WHERE id = $1 FOR UPDATE")
                .bind(fact_id)
                .fetch_optional(&mut *tx)
                .await?;

        match owner {
            None => return Err(RepositoryError::NotFound("Fact")),
            Some(owner) if owner != user_id => return Err(LedgerError::NotOwner.into()),
            Some(_) => {}
        }

        sqlx::query("DELETE FROM favorites WHERE fact_id = $1")
            .bind(fact_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM facts WHERE id = $1")
            .bind(fact_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn add_favorite(&self, user_id: &str, fact_id: &str) -> Result<(), RepositoryError> {
        let mut tx = self.conn.begin().await?;

        lock_user(&mut *tx, user_id).await?;
        let fact: Option<String> = sqlx::query_scalar("SELECT id FROM facts WHERE id = $1 FOR SHARE")
            .bind(fact_id)
            .fetch_optional(&mut *tx)
            .await?;
        if fact.is_none() {
            return Err(RepositoryError::NotFound("Fact"));
        }

        let inserted = sqlx::query(
            "INSERT INTO favorites (user_id, fact_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(fact_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Err(LedgerError::AlreadyFavorite.into());
        }

        tx.commit().await?;
        Ok(())
    }

    async fn remove_favorite(&self, user_id: &str, fact_id: &str) -> Result<(), RepositoryError> {
        let removed = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND fact_id = $2")
            .bind(user_id)
            .bind(fact_id)
            .execute(&self.conn)
            .await?
            .rows_affected();

        if removed == 0 {
            return Err(LedgerError::NotFavorite.into());
        }

        Ok(())
    }

    async fn favorites(&self, user_id: &str) -> Result<Vec<Fact>, RepositoryError> {
        let facts = sqlx::query_as::<_, Fact>(&format!(
            r#"
                SELECT {FACT_COLUMNS}
                FROM favorites fav
                JOIN facts f ON f.id = fav.fact_id
                WHERE fav.user_id = $1
                ORDER BY fav.created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.conn)
        .await?;

        Ok(facts)
    }

    async fn history(&self, user_id: &str, limit: i64) -> Result<Vec<FactView>, RepositoryError> {
        let rows = sqlx::query_as::<_, HistoryRow>(&format!(
            r#"
                SELECT {FACT_COLUMNS},
                    EXISTS(
                        SELECT 1 FROM favorites fav
                        WHERE fav.fact_id = f.id AND fav.user_id = $1
                    ) AS is_favorite
                FROM facts f
                WHERE f.user_id = $1
                ORDER BY f.created_at DESC
                LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| FactView {
                fact: row.fact,
                is_favorite: row.is_favorite,
            })
            .collect())
    }
}
