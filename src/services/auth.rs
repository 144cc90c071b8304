use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::oneshot;
use uuid::Uuid;

use super::{RequestHandler, Service, ServiceError};
use crate::{
    models::{
        sessions::{AuthenticatedUser, IssuedSession, Session},
        users::{normalize_email, NewUser, User},
    },
    repositories::{SessionStore, UserStore},
};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

pub enum AuthRequest {
    Register {
        registration: Registration,
        response: oneshot::Sender<Result<IssuedSession, ServiceError>>,
    },
    Login {
        credentials: Credentials,
        response: oneshot::Sender<Result<IssuedSession, ServiceError>>,
    },
    Logout {
        token: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    Authenticate {
        token: String,
        response: oneshot::Sender<Result<AuthenticatedUser, ServiceError>>,
    },
}

#[derive(Debug, Clone)]
pub struct AuthPolicy {
    pub admin_emails: Vec<String>,
    pub session_ttl: chrono::Duration,
    pub bcrypt_cost: u32,
    pub signup_credits: i32,
}

/// Sessions are looked up by the SHA-256 of their bearer token.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn validate_password(password: &str) -> Result<(), ServiceError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ServiceError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }

    Ok(())
}

pub async fn hash_password(password: &str, cost: u32) -> Result<String, ServiceError> {
    let password = password.to_string();

    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))?
        .map_err(|e| ServiceError::Internal(e.to_string()))
}

pub async fn verify_password(password: &str, hash: &str) -> Result<bool, ServiceError> {
    let password = password.to_string();
    let hash = hash.to_string();

    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| ServiceError::Internal(e.to_string()))?
        .map_err(|e| ServiceError::Internal(e.to_string()))
}

fn invalid_credentials() -> ServiceError {
    ServiceError::Unauthorized("Invalid credentials".to_string())
}

#[derive(Clone)]
pub struct AuthRequestHandler {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    policy: Arc<AuthPolicy>,
}

impl AuthRequestHandler {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        policy: AuthPolicy,
    ) -> Self {
        AuthRequestHandler {
            users,
            sessions,
            policy: Arc::new(policy),
        }
    }

    fn is_admin_email(&self, email: &str) -> bool {
        self.policy
            .admin_emails
            .iter()
            .any(|admin| normalize_email(admin) == email)
    }

    async fn issue_session(&self, user: &User) -> Result<IssuedSession, ServiceError> {
        let now = chrono::Utc::now().naive_utc();
        let purged = self.sessions.delete_expired_sessions(now).await?;
        if purged > 0 {
            log::debug!("Purged {} expired sessions.", purged);
        }

        let token = Uuid::new_v4().hyphenated().to_string();
        let expires_at = now + self.policy.session_ttl;

        self.sessions
            .create_session(Session {
                token_hash: hash_token(&token),
                user_id: user.id.clone(),
                expires_at,
            })
            .await?;

        Ok(IssuedSession {
            token,
            expires_at,
            user: user.summary(),
        })
    }

    async fn register(&self, registration: Registration) -> Result<IssuedSession, ServiceError> {
        let name = registration.name.trim().to_string();
        let email = normalize_email(&registration.email);

        if name.is_empty() {
            return Err(ServiceError::BadRequest("Name is required".to_string()));
        }
        if !email.contains('@') {
            return Err(ServiceError::BadRequest("Invalid email".to_string()));
        }
        validate_password(&registration.password)?;

        let password_hash = hash_password(&registration.password, self.policy.bcrypt_cost).await?;
        let user = self
            .users
            .insert_user(NewUser {
                name,
                is_admin: self.is_admin_email(&email),
                email,
                password_hash,
                credits: self.policy.signup_credits,
            })
            .await?;

        log::info!("Registered user {} (admin: {}).", user.id, user.is_admin);
        self.issue_session(&user).await
    }

    async fn login(&self, credentials: Credentials) -> Result<IssuedSession, ServiceError> {
        let email = normalize_email(&credentials.email);
        let Some(user) = self.users.get_user_by_email(&email).await? else {
            return Err(invalid_credentials());
        };

        if !verify_password(&credentials.password, &user.password_hash).await? {
            log::warn!("Failed login for user {}.", user.id);
            return Err(invalid_credentials());
        }

        self.issue_session(&user).await
    }

    async fn logout(&self, token: &str) -> Result<(), ServiceError> {
        self.sessions.delete_session(&hash_token(token)).await?;
        Ok(())
    }

    async fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, ServiceError> {
        let now = chrono::Utc::now().naive_utc();
        let user = self
            .sessions
            .find_session_user(&hash_token(token), now)
            .await?
            .ok_or_else(|| ServiceError::Unauthorized("Invalid or expired token".to_string()))?;

        Ok(AuthenticatedUser {
            user_id: user.id,
            is_admin: user.is_admin,
        })
    }
}

#[async_trait]
impl RequestHandler<AuthRequest> for AuthRequestHandler {
    async fn handle_request(&self, request: AuthRequest) {
        match request {
            AuthRequest::Register {
                registration,
                response,
            } => {
                let _ = response.send(self.register(registration).await);
            }
            AuthRequest::Login {
                credentials,
                response,
            } => {
                let _ = response.send(self.login(credentials).await);
            }
            AuthRequest::Logout { token, response } => {
                let _ = response.send(self.logout(&token).await);
            }
            AuthRequest::Authenticate { token, response } => {
                let _ = response.send(self.authenticate(&token).await);
            }
        }
    }
}

pub struct AuthService;

impl AuthService {
    pub fn new() -> Self {
        AuthService {}
    }
}

#[async_trait]
impl Service<AuthRequest, AuthRequestHandler> for AuthService {}
