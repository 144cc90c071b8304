use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;

use super::{AppState, BearerToken};
use crate::services::{
    auth::{AuthRequest, Credentials, Registration},
    call, ServiceError,
};

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<Registration>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(registration) = payload?;
    let session = call(&state.auth_channel, "Auth", |response| AuthRequest::Register {
        registration,
        response,
    })
    .await?;

    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(credentials) = payload?;
    let session = call(&state.auth_channel, "Auth", |response| AuthRequest::Login {
        credentials,
        response,
    })
    .await?;

    Ok(Json(session))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(BearerToken(token)): Extension<BearerToken>,
) -> Result<impl IntoResponse, ServiceError> {
    call(&state.auth_channel, "Auth", |response| AuthRequest::Logout {
        token,
        response,
    })
    .await?;

    Ok(Json(json!({ "message": "Logged out" })))
}
