use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::ledger::LedgerError;

pub const DEFAULT_SUBSCRIPTION: &str = "Starter plan";

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub credits: i32,
    pub subscription: String,
    pub is_admin: bool,
    #[serde(skip_serializing)]
    pub reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token_expires_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    /// Debits the single credit a fact-check search costs.
    pub fn spend_credit(&mut self) -> Result<(), LedgerError> {
        if self.credits <= 0 {
            return Err(LedgerError::InsufficientCredits);
        }

        self.credits -= 1;
        Ok(())
    }

    pub fn grant_credits(&mut self, amount: i32) -> Result<(), LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::NonPositiveGrant);
        }

        self.credits = self.credits.saturating_add(amount);
        Ok(())
    }

    /// Checks that one more promotional code fits in the user's slots.
    pub fn claim_code_slot(&self, redeemed: usize, max_codes: usize) -> Result<(), LedgerError> {
        if redeemed >= max_codes {
            return Err(LedgerError::CodeLimitReached(max_codes));
        }

        Ok(())
    }

    pub fn reset_token_valid(&self, token: &str, now: NaiveDateTime) -> bool {
        match (&self.reset_token, self.reset_token_expires_at) {
            (Some(stored), Some(expires_at)) => stored == token && expires_at > now,
            _ => false,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            credits: self.credits,
            subscription: self.subscription.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub credits: i32,
    pub is_admin: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub name: String,
    pub credits: i32,
    pub subscription: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UserDetails {
    #[serde(flatten)]
    pub user: UserSummary,
    pub is_admin: bool,
    pub facts: Vec<String>,
    pub favorite_facts: Vec<String>,
    pub ltd_codes: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
