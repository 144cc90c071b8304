//! In-memory stores backing the service tests. They run the same model rules
//! as the Postgres repositories, with one mutex standing in for row locks.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::types::Json;
use uuid::Uuid;

use super::{
    CodeStore, FactStore, RedemptionTerms, RepositoryError, SessionStore, SettingsStore, UserStore,
};
use crate::models::{
    codes::PromoCode,
    facts::{Fact, FactView, FactWithFavorites, NewFact},
    ledger::LedgerError,
    sessions::Session,
    settings::{SettingsRecord, SettingsUpdate},
    users::{NewUser, ProfileUpdate, User, UserDetails, DEFAULT_SUBSCRIPTION},
};

#[derive(Default)]
struct State {
    users: Vec<User>,
    facts: Vec<Fact>,
    favorites: Vec<(String, String)>,
    codes: Vec<PromoCode>,
    settings: Option<SettingsRecord>,
    sessions: Vec<Session>,
}

impl State {
    fn user_mut(&mut self, id: &str) -> Result<&mut User, RepositoryError> {
        self.users
            .iter_mut()
            .find(|user| user.id == id)
            .ok_or(RepositoryError::NotFound("User"))
    }

    fn email_taken(&self, email: &str, except: Option<&str>) -> bool {
        self.users
            .iter()
            .any(|user| user.email == email && Some(user.id.as_str()) != except)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn seed_user(&self, email: &str, credits: i32) -> User {
        let user = User {
            id: Uuid::new_v4().hyphenated().to_string(),
            name: email.split('@').next().unwrap_or_default().to_string(),
            email: email.to_string(),
            password_hash: String::new(),
            credits,
            subscription: DEFAULT_SUBSCRIPTION.to_string(),
            is_admin: false,
            reset_token: None,
            reset_token_expires_at: None,
            created_at: now(),
            updated_at: now(),
        };
        self.state().users.push(user.clone());
        user
    }

    pub fn seed_fact(&self, user_id: &str, title: &str) -> Fact {
        let fact = Fact {
            id: Uuid::new_v4().hyphenated().to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            truth_status: "True".to_string(),
            severity: "Low".to_string(),
            explanation: String::new(),
            key_facts: Vec::new(),
            references: Json(Vec::new()),
            created_at: now(),
        };
        self.state().facts.push(fact.clone());
        fact
    }

    pub fn seed_codes(&self, platform: &str, codes: &[&str]) -> Vec<PromoCode> {
        let seeded: Vec<PromoCode> = codes
            .iter()
            .map(|code| PromoCode {
                id: Uuid::new_v4().hyphenated().to_string(),
                code: code.to_string(),
                platform: platform.to_string(),
                user_id: None,
                used_at: None,
                last_grant_on: None,
                created_at: now(),
            })
            .collect();
        self.state().codes.extend(seeded.iter().cloned());
        seeded
    }

    pub fn credits(&self, user_id: &str) -> i32 {
        self.state()
            .users
            .iter()
            .find(|user| user.id == user_id)
            .map(|user| user.credits)
            .unwrap_or_default()
    }

    pub fn set_credits(&self, user_id: &str, credits: i32) {
        if let Some(user) = self.state().users.iter_mut().find(|user| user.id == user_id) {
            user.credits = credits;
        }
    }

    pub fn make_admin(&self, user_id: &str) {
        if let Some(user) = self.state().users.iter_mut().find(|user| user.id == user_id) {
            user.is_admin = true;
        }
    }

    pub fn fact_count(&self) -> usize {
        self.state().facts.len()
    }

    pub fn favorite_count(&self) -> usize {
        self.state().favorites.len()
    }

    pub fn session_count(&self) -> usize {
        self.state().sessions.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, new_user: NewUser) -> Result<User, RepositoryError> {
        let mut state = self.state();
        if state.email_taken(&new_user.email, None) {
            return Err(RepositoryError::Conflict("Email"));
        }

        let user = User {
            id: Uuid::new_v4().hyphenated().to_string(),
            name: new_user.name,
            email: new_user.email,
            password_hash: new_user.password_hash,
            credits: new_user.credits,
            subscription: DEFAULT_SUBSCRIPTION.to_string(),
            is_admin: new_user.is_admin,
            reset_token: None,
            reset_token_expires_at: None,
            created_at: now(),
            updated_at: now(),
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.state().users.iter().find(|user| user.id == id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.state().users.iter().find(|user| user.email == email).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        Ok(self.state().users.clone())
    }

    async fn get_user_details(&self, id: &str) -> Result<Option<UserDetails>, RepositoryError> {
        let state = self.state();
        let Some(user) = state.users.iter().find(|user| user.id == id) else {
            return Ok(None);
        };

        Ok(Some(UserDetails {
            user: user.summary(),
            is_admin: user.is_admin,
            facts: state
                .facts
                .iter()
                .rev()
                .filter(|fact| fact.user_id == id)
                .map(|fact| fact.id.clone())
                .collect(),
            favorite_facts: state
                .favorites
                .iter()
                .filter(|(user_id, _)| user_id == id)
                .map(|(_, fact_id)| fact_id.clone())
                .collect(),
            ltd_codes: state
                .codes
                .iter()
                .filter(|code| code.user_id.as_deref() == Some(id))
                .map(|code| code.id.clone())
                .collect(),
        }))
    }

    async fn grant_credits(&self, id: &str, amount: i32) -> Result<User, RepositoryError> {
        let mut state = self.state();
        let user = state.user_mut(id)?;
        user.grant_credits(amount)?;
        Ok(user.clone())
    }

    async fn update_password(
        &self,
        id: &str,
        password_hash: &str,
    ) -> Result<User, RepositoryError> {
        let mut state = self.state();
        let user = state.user_mut(id)?;
        user.password_hash = password_hash.to_string();
        Ok(user.clone())
    }

    async fn update_profile(
        &self,
        id: &str,
        update: &ProfileUpdate,
    ) -> Result<User, RepositoryError> {
        let mut state = self.state();
        if let Some(email) = &update.email {
            if state.email_taken(email, Some(id)) {
                return Err(RepositoryError::Conflict("Email"));
            }
        }

        let user = state.user_mut(id)?;
        if let Some(name) = &update.name {
            user.name = name.clone();
        }
        if let Some(email) = &update.email {
            user.email = email.clone();
        }
        Ok(user.clone())
    }

    async fn set_reset_token(
        &self,
        email: &str,
        token: &str,
        expires_at: NaiveDateTime,
    ) -> Result<Option<User>, RepositoryError> {
        let mut state = self.state();
        let Some(user) = state.users.iter_mut().find(|user| user.email == email) else {
            return Ok(None);
        };

        user.reset_token = Some(token.to_string());
        user.reset_token_expires_at = Some(expires_at);
        Ok(Some(user.clone()))
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        password_hash: &str,
        now: NaiveDateTime,
    ) -> Result<Option<User>, RepositoryError> {
        let mut state = self.state();
        let Some(user) = state
            .users
            .iter_mut()
            .find(|user| user.reset_token_valid(token, now))
        else {
            return Ok(None);
        };

        user.password_hash = password_hash.to_string();
        user.reset_token = None;
        user.reset_token_expires_at = None;
        Ok(Some(user.clone()))
    }
}

#[async_trait]
impl FactStore for MemoryStore {
    async fn insert_fact_charging(&self, new_fact: NewFact) -> Result<Fact, RepositoryError> {
        let mut state = self.state();
        state.user_mut(&new_fact.user_id)?.spend_credit()?;

        let verdict = new_fact.verdict;
        let fact = Fact {
            id: Uuid::new_v4().hyphenated().to_string(),
            user_id: new_fact.user_id,
            title: new_fact.title,
            truth_status: verdict.truth_status,
            severity: verdict.severity,
            explanation: verdict.explanation,
            key_facts: verdict.key_facts,
            references: Json(verdict.references),
            created_at: now(),
        };
        state.facts.push(fact.clone());
        Ok(fact)
    }

    async fn get_fact(&self, id: &str) -> Result<Option<FactWithFavorites>, RepositoryError> {
        let state = self.state();
        let Some(fact) = state.facts.iter().find(|fact| fact.id == id) else {
            return Ok(None);
        };

        Ok(Some(FactWithFavorites {
            fact: fact.clone(),
            favorite_users: state
                .favorites
                .iter()
                .filter(|(_, fact_id)| fact_id == id)
                .map(|(user_id, _)| user_id.clone())
                .collect(),
        }))
    }

    async fn delete_owned_fact(
        &self,
        fact_id: &str,
        user_id: &str,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state();
        let Some(position) = state.facts.iter().position(|fact| fact.id == fact_id) else {
            return Err(RepositoryError::NotFound("Fact"));
        };
        if state.facts[position].user_id != user_id {
            return Err(LedgerError::NotOwner.into());
        }

        state.facts.remove(position);
        state.favorites.retain(|(_, favorite)| favorite != fact_id);
        Ok(())
    }

    async fn add_favorite(&self, user_id: &str, fact_id: &str) -> Result<(), RepositoryError> {
        let mut state = self.state();
        state.user_mut(user_id)?;
        if !state.facts.iter().any(|fact| fact.id == fact_id) {
            return Err(RepositoryError::NotFound("Fact"));
        }

        let link = (user_id.to_string(), fact_id.to_string());
        if state.favorites.contains(&link) {
            return Err(LedgerError::AlreadyFavorite.into());
        }

        state.favorites.push(link);
        Ok(())
    }

    async fn remove_favorite(&self, user_id: &str, fact_id: &str) -> Result<(), RepositoryError> {
        let mut state = self.state();
        let before = state.favorites.len();
        state
            .favorites
            .retain(|(owner, favorite)| !(owner == user_id && favorite == fact_id));

        if state.favorites.len() == before {
            return Err(LedgerError::NotFavorite.into());
        }

        Ok(())
    }

    async fn favorites(&self, user_id: &str) -> Result<Vec<Fact>, RepositoryError> {
        let state = self.state();

        Ok(state
            .favorites
            .iter()
            .rev()
            .filter(|(owner, _)| owner == user_id)
            .filter_map(|(_, fact_id)| state.facts.iter().find(|fact| &fact.id == fact_id))
            .cloned()
            .collect())
    }

    async fn history(&self, user_id: &str, limit: i64) -> Result<Vec<FactView>, RepositoryError> {
        let state = self.state();

        Ok(state
            .facts
            .iter()
            .rev()
            .filter(|fact| fact.user_id == user_id)
            .take(limit.max(0) as usize)
            .map(|fact| FactView {
                is_favorite: state
                    .favorites
                    .iter()
                    .any(|(owner, fact_id)| owner == user_id && fact_id == &fact.id),
                fact: fact.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl CodeStore for MemoryStore {
    async fn insert_codes(
        &self,
        platform: &str,
        codes: Vec<String>,
    ) -> Result<Vec<PromoCode>, RepositoryError> {
        let codes: Vec<&str> = codes.iter().map(String::as_str).collect();
        Ok(self.seed_codes(platform, &codes))
    }

    async fn list_codes(&self) -> Result<Vec<PromoCode>, RepositoryError> {
        Ok(self.state().codes.clone())
    }

    async fn find_code(&self, code: &str) -> Result<Option<PromoCode>, RepositoryError> {
        Ok(self.state().codes.iter().find(|promo| promo.code == code).cloned())
    }

    async fn redeemed_by(&self, user_id: &str) -> Result<Vec<PromoCode>, RepositoryError> {
        Ok(self
            .state()
            .codes
            .iter()
            .filter(|promo| promo.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect())
    }

    async fn redeem_code(
        &self,
        user_id: &str,
        code: &str,
        now: NaiveDateTime,
        terms: RedemptionTerms,
    ) -> Result<PromoCode, RepositoryError> {
        let mut state = self.state();
        let mut promo = state
            .codes
            .iter()
            .find(|promo| promo.code == code)
            .cloned()
            .ok_or(RepositoryError::NotFound("Code"))?;
        promo.redeem(user_id, now)?;

        let redeemed = state
            .codes
            .iter()
            .filter(|promo| promo.user_id.as_deref() == Some(user_id))
            .count();
        let mut user = state.user_mut(user_id)?.clone();
        user.claim_code_slot(redeemed, terms.max_codes)?;
        user.grant_credits(terms.grant)?;

        *state.user_mut(user_id)? = user;
        if let Some(stored) = state.codes.iter_mut().find(|stored| stored.id == promo.id) {
            *stored = promo.clone();
        }
        Ok(promo)
    }

    async fn delete_code(&self, id: &str) -> Result<PromoCode, RepositoryError> {
        let mut state = self.state();
        let position = state
            .codes
            .iter()
            .position(|promo| promo.id == id)
            .ok_or(RepositoryError::NotFound("LTD code"))?;

        Ok(state.codes.remove(position))
    }

    async fn grant_anniversary(
        &self,
        code_id: &str,
        today: NaiveDate,
        amount: i32,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state();
        let promo = state
            .codes
            .iter()
            .find(|promo| promo.id == code_id)
            .cloned()
            .ok_or(RepositoryError::NotFound("LTD code"))?;
        let Some(owner) = promo.user_id.clone().filter(|_| promo.anniversary_due(today)) else {
            return Ok(false);
        };

        state.user_mut(&owner)?.grant_credits(amount)?;
        if let Some(stored) = state.codes.iter_mut().find(|stored| stored.id == code_id) {
            stored.last_grant_on = Some(today);
        }
        Ok(true)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_settings(&self) -> Result<Option<SettingsRecord>, RepositoryError> {
        Ok(self.state().settings.clone())
    }

    async fn upsert_settings(
        &self,
        update: &SettingsUpdate,
        now: NaiveDateTime,
    ) -> Result<SettingsRecord, RepositoryError> {
        let mut state = self.state();
        let record = match state.settings.take() {
            Some(current) => SettingsRecord {
                api_key: update.api_key.clone().or(current.api_key),
                prompt: update.prompt.clone().or(current.prompt),
                version: current.version + 1,
                updated_at: now,
            },
            None => SettingsRecord {
                api_key: update.api_key.clone(),
                prompt: update.prompt.clone(),
                version: 1,
                updated_at: now,
            },
        };

        state.settings = Some(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: Session) -> Result<(), RepositoryError> {
        self.state().sessions.push(session);
        Ok(())
    }

    async fn find_session_user(
        &self,
        token_hash: &str,
        now: NaiveDateTime,
    ) -> Result<Option<User>, RepositoryError> {
        let state = self.state();
        let Some(session) = state
            .sessions
            .iter()
            .find(|session| session.token_hash == token_hash && session.expires_at > now)
        else {
            return Ok(None);
        };

        Ok(state.users.iter().find(|user| user.id == session.user_id).cloned())
    }

    async fn delete_session(&self, token_hash: &str) -> Result<bool, RepositoryError> {
        let mut state = self.state();
        let before = state.sessions.len();
        state.sessions.retain(|session| session.token_hash != token_hash);

        Ok(state.sessions.len() < before)
    }

    async fn delete_expired_sessions(&self, now: NaiveDateTime) -> Result<u64, RepositoryError> {
        let mut state = self.state();
        let before = state.sessions.len();
        state.sessions.retain(|session| session.expires_at > now);

        Ok((before - state.sessions.len()) as u64)
    }
}
