use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put, MethodRouter},
    Json, Router,
};
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use super::{
    auth::AuthRequest, call, codes::CodeRequest, facts::FactRequest, settings::SettingsRequest,
    users::UserRequest, Channels, ServiceError,
};
use crate::models::sessions::AuthenticatedUser;

mod auth;
mod coupon_codes;
mod facts;
mod ltd_codes;
mod settings;
mod users;

#[derive(Clone)]
pub struct AppState {
    auth_channel: mpsc::Sender<AuthRequest>,
    user_channel: mpsc::Sender<UserRequest>,
    fact_channel: mpsc::Sender<FactRequest>,
    code_channel: mpsc::Sender<CodeRequest>,
    settings_channel: mpsc::Sender<SettingsRequest>,
}

impl From<Channels> for AppState {
    fn from(channels: Channels) -> Self {
        AppState {
            auth_channel: channels.auth,
            user_channel: channels.users,
            fact_channel: channels.facts,
            code_channel: channels.codes,
            settings_channel: channels.settings,
        }
    }
}

/// Raw bearer token of an authenticated request.
#[derive(Clone, Debug)]
pub struct BearerToken(pub String);

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
            ServiceError::BadRequest(_) | ServiceError::FactCheck(_) => {
                (StatusCode::BAD_REQUEST, "Bad request")
            }
            ServiceError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden"),
            ServiceError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            ServiceError::Database(_)
            | ServiceError::Internal(_)
            | ServiceError::Communication(_, _)
            | ServiceError::ExternalService(_, _, _) => {
                log::error!("{}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let details = match status {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal server error.".to_string(),
            _ => self.to_string(),
        };

        (
            status,
            Json(json!({
                "error": error,
                "details": details
            })),
        )
            .into_response()
    }
}

pub fn extract_bearer_token(req: &Request) -> Result<String, ServiceError> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ServiceError::Unauthorized("Missing authorization header".to_string()))?
        .to_str()
        .map_err(|_| ServiceError::Unauthorized("Invalid authorization header".to_string()))?;

    match value.split_whitespace().collect::<Vec<_>>().as_slice() {
        ["Bearer", token] => Ok(token.to_string()),
        _ => Err(ServiceError::Unauthorized(
            "Invalid authorization header".to_string(),
        )),
    }
}

pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let token = extract_bearer_token(&req)?;
    let identity = call(&state.auth_channel, "Auth", |response| {
        AuthRequest::Authenticate {
            token: token.clone(),
            response,
        }
    })
    .await?;

    req.extensions_mut().insert(identity);
    req.extensions_mut().insert(BearerToken(token));
    Ok(next.run(req).await)
}

/// Must run after `authenticate`.
pub async fn admin_only(req: Request, next: Next) -> Result<Response, ServiceError> {
    match req.extensions().get::<AuthenticatedUser>() {
        Some(identity) if identity.is_admin => Ok(next.run(req).await),
        Some(_) => Err(ServiceError::Forbidden("Admin access required".to_string())),
        None => Err(ServiceError::Unauthorized(
            "Missing authorization header".to_string(),
        )),
    }
}

fn signed_in(route: MethodRouter<AppState>, state: &AppState) -> MethodRouter<AppState> {
    route.route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
}

fn admin(route: MethodRouter<AppState>, state: &AppState) -> MethodRouter<AppState> {
    signed_in(route.route_layer(middleware::from_fn(admin_only)), state)
}

pub fn router(state: AppState) -> Router {
    let s = &state;

    Router::new()
        .route("/health", get(|| async { "OK" }))
        // auth
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", signed_in(post(auth::logout), s))
        // users
        .route("/user", admin(get(users::list_users), s))
        .route("/user/me", signed_in(get(users::me).patch(users::update_profile), s))
        .route("/user/details", signed_in(get(users::details), s))
        .route("/user/history", signed_in(get(users::history), s))
        .route("/user/password", signed_in(put(users::update_password), s))
        .route("/user/password-reset", post(users::request_password_reset))
        .route("/user/password-reset/confirm", post(users::reset_password))
        .route("/user/favorites", signed_in(get(users::favorites), s))
        .route(
            "/user/favorites/{fact_id}",
            signed_in(post(users::add_favorite).delete(users::remove_favorite), s),
        )
        .route("/user/{id}/credits", admin(post(users::add_credits), s))
        // facts
        .route("/fact", signed_in(post(facts::submit_fact), s))
        .route(
            "/fact/{id}",
            signed_in(get(facts::get_fact).delete(facts::delete_fact), s),
        )
        // promotional codes
        .route(
            "/ltdCode",
            admin(post(ltd_codes::generate).get(ltd_codes::list), s),
        )
        .route("/ltdCode/redeem/{code}", signed_in(post(ltd_codes::redeem), s))
        .route(
            "/ltdCode/coupons/{user_id}",
            signed_in(get(ltd_codes::redeemed_by), s),
        )
        .route("/ltdCode/owner/{code}", admin(get(ltd_codes::owner), s))
        .route("/ltdCode/{id}", admin(delete(ltd_codes::remove), s))
        .route(
            "/couponCode",
            admin(post(coupon_codes::create).get(coupon_codes::list), s),
        )
        .route("/couponCode/{code}", signed_in(get(coupon_codes::status), s))
        // settings
        .route(
            "/settings",
            admin(get(settings::get_settings).post(settings::update_settings), s),
        )
        .route("/settings/reload", admin(post(settings::reload_settings), s))
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(channels: Channels, listen: &str) -> Result<(), anyhow::Error> {
    let app = router(AppState::from(channels));

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
