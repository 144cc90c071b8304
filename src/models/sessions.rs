use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Session {
    pub token_hash: String,
    pub user_id: String,
    pub expires_at: NaiveDateTime,
}

/// Identity attached to a request once its bearer token checks out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub is_admin: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: NaiveDateTime,
    pub user: super::users::UserSummary,
}
