use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::{mpsc, oneshot};

use crate::{
    models::{ledger::LedgerError, settings::FactCheckDefaults},
    repositories::{
        codes::CodeRepository,
        fact_check::{CompletionApi, FactChecker},
        facts::FactRepository,
        mail::{MailRelayApi, Mailer},
        sessions::SessionRepository,
        settings::SettingsRepository,
        users::UserRepository,
        CodeStore, FactStore, RedemptionTerms, RepositoryError, SessionStore, SettingsStore,
        UserStore,
    },
    settings::Settings,
};

pub mod auth;
pub mod codes;
pub mod facts;
pub mod http;
pub mod settings;
pub mod users;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("Something went wrong!")]
    FactCheck(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
    #[error("External service error: {0} -> {1} => {2}")]
    ExternalService(String, String, String),
}

impl From<RepositoryError> for ServiceError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(e) => ServiceError::Database(e.to_string()),
            RepositoryError::NotFound(what) => ServiceError::NotFound(format!("{what} not found")),
            RepositoryError::Conflict(what) => {
                ServiceError::BadRequest(format!("{what} is already taken"))
            }
            RepositoryError::Ledger(ledger) => ledger.into(),
        }
    }
}

impl From<LedgerError> for ServiceError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::InsufficientCredits | LedgerError::NotOwner => {
                ServiceError::Forbidden(error.to_string())
            }
            LedgerError::CodeAlreadyRedeemed => ServiceError::NotFound(error.to_string()),
            LedgerError::NonPositiveGrant
            | LedgerError::CodeLimitReached(_)
            | LedgerError::AlreadyFavorite
            | LedgerError::NotFavorite => ServiceError::BadRequest(error.to_string()),
        }
    }
}

impl From<axum::extract::rejection::JsonRejection> for ServiceError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        ServiceError::BadRequest(rejection.body_text())
    }
}

/// Sends `build(response)` to a service and waits for its answer.
pub async fn call<Req, T>(
    channel: &mpsc::Sender<Req>,
    service: &str,
    build: impl FnOnce(oneshot::Sender<Result<T, ServiceError>>) -> Req,
) -> Result<T, ServiceError> {
    let (response_tx, response_rx) = oneshot::channel();

    channel
        .send(build(response_tx))
        .await
        .map_err(|e| ServiceError::Communication(service.to_string(), e.to_string()))?;

    response_rx
        .await
        .map_err(|e| ServiceError::Communication(service.to_string(), e.to_string()))?
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// Persistence backends shared by the services.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub facts: Arc<dyn FactStore>,
    pub codes: Arc<dyn CodeStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub sessions: Arc<dyn SessionStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Stores {
            users: Arc::new(UserRepository::new(pool.clone())),
            facts: Arc::new(FactRepository::new(pool.clone())),
            codes: Arc::new(CodeRepository::new(pool.clone())),
            settings: Arc::new(SettingsRepository::new(pool.clone())),
            sessions: Arc::new(SessionRepository::new(pool)),
        }
    }
}

/// Outbound API clients.
#[derive(Clone)]
pub struct Clients {
    pub fact_checker: Arc<dyn FactChecker>,
    pub mailer: Arc<dyn Mailer>,
}

/// Request channels of every running service.
#[derive(Clone)]
pub struct Channels {
    pub auth: mpsc::Sender<auth::AuthRequest>,
    pub users: mpsc::Sender<users::UserRequest>,
    pub facts: mpsc::Sender<facts::FactRequest>,
    pub codes: mpsc::Sender<codes::CodeRequest>,
    pub settings: mpsc::Sender<settings::SettingsRequest>,
}

/// Spawns every service on the current runtime and returns their channels.
pub fn spawn_services(stores: Stores, clients: Clients, settings: &Settings) -> Channels {
    let (auth_tx, mut auth_rx) = mpsc::channel(512);
    let (user_tx, mut user_rx) = mpsc::channel(512);
    let (fact_tx, mut fact_rx) = mpsc::channel(512);
    let (code_tx, mut code_rx) = mpsc::channel(512);
    let (settings_tx, mut settings_rx) = mpsc::channel(512);

    log::info!("Starting settings service.");
    let settings_handler = settings::SettingsRequestHandler::new(
        stores.settings.clone(),
        FactCheckDefaults {
            url: settings.fact_check.url.clone(),
            model: settings.fact_check.model.clone(),
            api_key: settings.fact_check.api_key.clone(),
            prompt: crate::models::settings::DEFAULT_PROMPT.to_string(),
        },
    );
    tokio::spawn(async move {
        settings::SettingsService::new()
            .run(settings_handler, &mut settings_rx)
            .await;
    });

    log::info!("Starting auth service.");
    let auth_handler = auth::AuthRequestHandler::new(
        stores.users.clone(),
        stores.sessions.clone(),
        auth::AuthPolicy {
            admin_emails: settings.auth.admin_emails.clone(),
            session_ttl: chrono::Duration::hours(settings.auth.session_ttl_hours),
            bcrypt_cost: settings.auth.bcrypt_cost,
            signup_credits: settings.credits.signup,
        },
    );
    tokio::spawn(async move {
        auth::AuthService::new().run(auth_handler, &mut auth_rx).await;
    });

    log::info!("Starting user service.");
    let user_handler = users::UserRequestHandler::new(
        stores.users.clone(),
        stores.facts.clone(),
        clients.mailer.clone(),
        users::AccountPolicy {
            bcrypt_cost: settings.auth.bcrypt_cost,
            history_limit: settings.fact_check.history_limit,
            mail_from: settings.mail.from.clone(),
            reset_url: settings.mail.reset_url.clone(),
        },
    );
    tokio::spawn(async move {
        users::UserService::new().run(user_handler, &mut user_rx).await;
    });

    log::info!("Starting fact service.");
    let fact_handler = facts::FactRequestHandler::new(
        stores.users.clone(),
        stores.facts.clone(),
        clients.fact_checker.clone(),
        settings_tx.clone(),
    );
    tokio::spawn(async move {
        facts::FactService::new().run(fact_handler, &mut fact_rx).await;
    });

    log::info!("Starting code service.");
    let code_handler = codes::CodeRequestHandler::new(
        stores.codes.clone(),
        stores.users.clone(),
        RedemptionTerms {
            grant: settings.credits.redemption_grant,
            max_codes: settings.credits.max_codes_per_user,
        },
        settings.credits.anniversary_grant,
    );
    let anniversary_every = Duration::from_secs(settings.credits.anniversary_check_secs);
    tokio::spawn(async move {
        code_handler.start_anniversary_task(anniversary_every);
        codes::CodeService::new().run(code_handler, &mut code_rx).await;
    });

    Channels {
        auth: auth_tx,
        users: user_tx,
        facts: fact_tx,
        codes: code_tx,
        settings: settings_tx,
    }
}

pub async fn start_services(pool: PgPool, settings: Settings) -> Result<(), anyhow::Error> {
    let clients = Clients {
        fact_checker: Arc::new(CompletionApi::new(Duration::from_secs(
            settings.fact_check.timeout_secs,
        ))?),
        mailer: Arc::new(MailRelayApi::new(&settings.mail.url, &settings.mail.api_key)),
    };

    let channels = spawn_services(Stores::postgres(pool), clients, &settings);
    log::info!("Started services.");

    http::start_http_server(channels, &settings.server.listen).await
}
