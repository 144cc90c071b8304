use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::{
    auth::{hash_password, validate_password, verify_password},
    RequestHandler, Service, ServiceError,
};
use crate::{
    models::{
        facts::{FactView, Fact},
        users::{normalize_email, ProfileUpdate, User, UserDetails, UserSummary},
    },
    repositories::{
        mail::{password_reset_mail, Mailer},
        FactStore, UserStore,
    },
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordReset {
    pub token: String,
    pub password: String,
}

pub enum UserRequest {
    GetUser {
        id: String,
        response: oneshot::Sender<Result<UserSummary, ServiceError>>,
    },
    GetUserDetails {
        id: String,
        response: oneshot::Sender<Result<UserDetails, ServiceError>>,
    },
    ListUsers {
        response: oneshot::Sender<Result<Vec<User>, ServiceError>>,
    },
    AddCredits {
        id: String,
        amount: i32,
        response: oneshot::Sender<Result<UserSummary, ServiceError>>,
    },
    UpdateProfile {
        id: String,
        update: ProfileUpdate,
        response: oneshot::Sender<Result<UserSummary, ServiceError>>,
    },
    UpdatePassword {
        id: String,
        change: PasswordChange,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    History {
        id: String,
        response: oneshot::Sender<Result<Vec<FactView>, ServiceError>>,
    },
    Favorites {
        id: String,
        response: oneshot::Sender<Result<Vec<FactView>, ServiceError>>,
    },
    AddFavorite {
        id: String,
        fact_id: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    RemoveFavorite {
        id: String,
        fact_id: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    RequestPasswordReset {
        email: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    ResetPassword {
        reset: PasswordReset,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
}

#[derive(Debug, Clone)]
pub struct AccountPolicy {
    pub bcrypt_cost: u32,
    pub history_limit: i64,
    pub mail_from: String,
    pub reset_url: String,
}

const RESET_TOKEN_TTL_HOURS: i64 = 1;

#[derive(Clone)]
pub struct UserRequestHandler {
    users: Arc<dyn UserStore>,
    facts: Arc<dyn FactStore>,
    mailer: Arc<dyn Mailer>,
    policy: Arc<AccountPolicy>,
}

impl UserRequestHandler {
    pub fn new(
        users: Arc<dyn UserStore>,
        facts: Arc<dyn FactStore>,
        mailer: Arc<dyn Mailer>,
        policy: AccountPolicy,
    ) -> Self {
        UserRequestHandler {
            users,
            facts,
            mailer,
            policy: Arc::new(policy),
        }
    }

    async fn find_user(&self, id: &str) -> Result<User, ServiceError> {
        self.users
            .get_user_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }

    async fn get_user(&self, id: &str) -> Result<UserSummary, ServiceError> {
        Ok(self.find_user(id).await?.summary())
    }

    async fn get_user_details(&self, id: &str) -> Result<UserDetails, ServiceError> {
        self.users
            .get_user_details(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }

    async fn list_users(&self) -> Result<Vec<User>, ServiceError> {
        Ok(self.users.list_users().await?)
    }

    async fn add_credits(&self, id: &str, amount: i32) -> Result<UserSummary, ServiceError> {
        let user = self.users.grant_credits(id, amount).await?;

        log::info!("Granted {} credits to user {}.", amount, id);
        Ok(user.summary())
    }

    async fn update_profile(
        &self,
        id: &str,
        update: ProfileUpdate,
    ) -> Result<UserSummary, ServiceError> {
        let name = update.name.map(|name| name.trim().to_string());
        if name.as_deref() == Some("") {
            return Err(ServiceError::BadRequest("Name is required".to_string()));
        }

        let email = update.email.map(|email| normalize_email(&email));
        if email.as_deref().is_some_and(|email| !email.contains('@')) {
            return Err(ServiceError::BadRequest("Invalid email".to_string()));
        }

        let user = self
            .users
            .update_profile(id, &ProfileUpdate { name, email })
            .await?;
        Ok(user.summary())
    }

    async fn update_password(&self, id: &str, change: PasswordChange) -> Result<(), ServiceError> {
        let user = self.find_user(id).await?;
        if !verify_password(&change.current_password, &user.password_hash).await? {
            return Err(ServiceError::BadRequest(
                "Current password is incorrect".to_string(),
            ));
        }
        validate_password(&change.new_password)?;

        let password_hash = hash_password(&change.new_password, self.policy.bcrypt_cost).await?;
        self.users.update_password(id, &password_hash).await?;
        Ok(())
    }

    async fn history(&self, id: &str) -> Result<Vec<FactView>, ServiceError> {
        self.find_user(id).await?;

        Ok(self.facts.history(id, self.policy.history_limit).await?)
    }

    async fn favorites(&self, id: &str) -> Result<Vec<FactView>, ServiceError> {
        let facts: Vec<Fact> = self.facts.favorites(id).await?;

        Ok(facts
            .into_iter()
            .map(|fact| FactView {
                fact,
                is_favorite: true,
            })
            .collect())
    }

    async fn add_favorite(&self, id: &str, fact_id: &str) -> Result<(), ServiceError> {
        Ok(self.facts.add_favorite(id, fact_id).await?)
    }

    async fn remove_favorite(&self, id: &str, fact_id: &str) -> Result<(), ServiceError> {
        Ok(self.facts.remove_favorite(id, fact_id).await?)
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), ServiceError> {
        let email = normalize_email(email);
        let token = Uuid::new_v4().hyphenated().to_string();
        let expires_at =
            chrono::Utc::now().naive_utc() + chrono::Duration::hours(RESET_TOKEN_TTL_HOURS);

        let Some(user) = self.users.set_reset_token(&email, &token, expires_at).await? else {
            return Err(ServiceError::BadRequest("User not found".to_string()));
        };

        let link = format!("{}/{}", self.policy.reset_url.trim_end_matches('/'), token);
        self.mailer
            .send(password_reset_mail(&self.policy.mail_from, &user.email, &link))
            .await
            .map_err(|e| {
                ServiceError::ExternalService("Mail relay".to_string(), "send".to_string(), e.to_string())
            })
    }

    async fn reset_password(&self, reset: PasswordReset) -> Result<(), ServiceError> {
        validate_password(&reset.password)?;
        let password_hash = hash_password(&reset.password, self.policy.bcrypt_cost).await?;
        let now = chrono::Utc::now().naive_utc();

        match self
            .users
            .consume_reset_token(&reset.token, &password_hash, now)
            .await?
        {
            Some(user) => {
                log::info!("Password reset for user {}.", user.id);
                Ok(())
            }
            None => Err(ServiceError::BadRequest("Invalid or expired token".to_string())),
        }
    }
}

#[async_trait]
impl RequestHandler<UserRequest> for UserRequestHandler {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::GetUser { id, response } => {
                let _ = response.send(self.get_user(&id).await);
            }
            UserRequest::GetUserDetails { id, response } => {
                let _ = response.send(self.get_user_details(&id).await);
            }
            UserRequest::ListUsers { response } => {
                let _ = response.send(self.list_users().await);
            }
            UserRequest::AddCredits {
                id,
                amount,
                response,
            } => {
                let _ = response.send(self.add_credits(&id, amount).await);
            }
            UserRequest::UpdateProfile {
                id,
                update,
                response,
            } => {
                let _ = response.send(self.update_profile(&id, update).await);
            }
            UserRequest::UpdatePassword {
                id,
                change,
                response,
            } => {
                let _ = response.send(self.update_password(&id, change).await);
            }
            UserRequest::History { id, response } => {
                let _ = response.send(self.history(&id).await);
            }
            UserRequest::Favorites { id, response } => {
                let _ = response.send(self.favorites(&id).await);
            }
            UserRequest::AddFavorite {
                id,
                fact_id,
                response,
            } => {
                let _ = response.send(self.add_favorite(&id, &fact_id).await);
            }
            UserRequest::RemoveFavorite {
                id,
                fact_id,
                response,
            } => {
                let _ = response.send(self.remove_favorite(&id, &fact_id).await);
            }
            UserRequest::RequestPasswordReset { email, response } => {
                let result = self.request_password_reset(&email).await;
                if let Err(e) = &result {
                    log::warn!("Password reset request failed: {}", e);
                }
                let _ = response.send(result);
            }
            UserRequest::ResetPassword { reset, response } => {
                let _ = response.send(self.reset_password(reset).await);
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

#[async_trait]
impl Service<UserRequest, UserRequestHandler> for UserService {}
