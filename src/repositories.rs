use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};

use crate::models::{
    codes::PromoCode,
    facts::{Fact, FactView, FactWithFavorites, NewFact},
    ledger::LedgerError,
    sessions::Session,
    settings::{SettingsRecord, SettingsUpdate},
    users::{NewUser, ProfileUpdate, User, UserDetails},
};

pub mod codes;
pub mod fact_check;
pub mod facts;
pub mod mail;
pub mod sessions;
pub mod settings;
pub mod users;

#[cfg(test)]
pub mod memory;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0} is already taken")]
    Conflict(&'static str),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Terms applied when a user redeems a promotional code.
#[derive(Clone, Copy, Debug)]
pub struct RedemptionTerms {
    pub grant: i32,
    pub max_codes: usize,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> Result<User, RepositoryError>;

    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, RepositoryError>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError>;

    async fn get_user_details(&self, id: &str) -> Result<Option<UserDetails>, RepositoryError>;

    async fn grant_credits(&self, id: &str, amount: i32) -> Result<User, RepositoryError>;

    async fn update_password(&self, id: &str, password_hash: &str)
        -> Result<User, RepositoryError>;

    async fn update_profile(&self, id: &str, update: &ProfileUpdate)
        -> Result<User, RepositoryError>;

    /// Stores a reset token on the account owning `email`, if any.
    async fn set_reset_token(
        &self,
        email: &str,
        token: &str,
        expires_at: NaiveDateTime,
    ) -> Result<Option<User>, RepositoryError>;

    /// Swaps the password of the account holding a live `token` and clears
    /// the token in the same write.
    async fn consume_reset_token(
        &self,
        token: &str,
        password_hash: &str,
        now: NaiveDateTime,
    ) -> Result<Option<User>, RepositoryError>;
}

#[async_trait]
pub trait FactStore: Send + Sync {
    /// Stores the fact and debits one credit from its author atomically.
    async fn insert_fact_charging(&self, fact: NewFact) -> Result<Fact, RepositoryError>;

    async fn get_fact(&self, id: &str) -> Result<Option<FactWithFavorites>, RepositoryError>;

    /// Deletes a fact owned by `user_id` together with every favorite link.
    async fn delete_owned_fact(&self, fact_id: &str, user_id: &str)
        -> Result<(), RepositoryError>;

    async fn add_favorite(&self, user_id: &str, fact_id: &str) -> Result<(), RepositoryError>;

    async fn remove_favorite(&self, user_id: &str, fact_id: &str) -> Result<(), RepositoryError>;

    async fn favorites(&self, user_id: &str) -> Result<Vec<Fact>, RepositoryError>;

    /// The user's own facts, newest first.
    async fn history(&self, user_id: &str, limit: i64) -> Result<Vec<FactView>, RepositoryError>;
}

#[async_trait]
pub trait CodeStore: Send + Sync {
    async fn insert_codes(
        &self,
        platform: &str,
        codes: Vec<String>,
    ) -> Result<Vec<PromoCode>, RepositoryError>;

    async fn list_codes(&self) -> Result<Vec<PromoCode>, RepositoryError>;

    async fn find_code(&self, code: &str) -> Result<Option<PromoCode>, RepositoryError>;

    async fn redeemed_by(&self, user_id: &str) -> Result<Vec<PromoCode>, RepositoryError>;

    /// Marks the code redeemed by `user_id` and grants the redemption credits
    /// in one transaction.
    async fn redeem_code(
        &self,
        user_id: &str,
        code: &str,
        now: NaiveDateTime,
        terms: RedemptionTerms,
    ) -> Result<PromoCode, RepositoryError>;

    async fn delete_code(&self, id: &str) -> Result<PromoCode, RepositoryError>;

    /// Grants `amount` credits to the code owner if the code's anniversary
    /// falls on `today` and has not been paid yet. Returns whether it paid.
    async fn grant_anniversary(
        &self,
        code_id: &str,
        today: NaiveDate,
        amount: i32,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_settings(&self) -> Result<Option<SettingsRecord>, RepositoryError>;

    async fn upsert_settings(
        &self,
        update: &SettingsUpdate,
        now: NaiveDateTime,
    ) -> Result<SettingsRecord, RepositoryError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: Session) -> Result<(), RepositoryError>;

    async fn find_session_user(
        &self,
        token_hash: &str,
        now: NaiveDateTime,
    ) -> Result<Option<User>, RepositoryError>;

    async fn delete_session(&self, token_hash: &str) -> Result<bool, RepositoryError>;

    /// Drops every session that expired at or before `now`.
    async fn delete_expired_sessions(&self, now: NaiveDateTime) -> Result<u64, RepositoryError>;
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}
