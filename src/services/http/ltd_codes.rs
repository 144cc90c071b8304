use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;

use super::AppState;
use crate::{
    models::{codes::NewCodes, sessions::AuthenticatedUser},
    services::{call, codes::CodeRequest, ServiceError},
};

pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<NewCodes>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(request) = payload?;
    let codes = call(&state.code_channel, "Code", |response| CodeRequest::Generate {
        request,
        response,
    })
    .await?;

    Ok((StatusCode::CREATED, Json(codes)))
}

pub async fn list(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let codes = call(&state.code_channel, "Code", |response| CodeRequest::List { response }).await?;

    Ok(Json(codes))
}

pub async fn redeem(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedUser>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    call(&state.code_channel, "Code", |response| CodeRequest::Redeem {
        user_id: identity.user_id,
        code,
        response,
    })
    .await?;

    Ok(Json(json!({ "message": "Code redeemed" })))
}

pub async fn redeemed_by(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedUser>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    if identity.user_id != user_id && !identity.is_admin {
        return Err(ServiceError::Forbidden(
            "You can only view your own codes".to_string(),
        ));
    }

    let codes = call(&state.code_channel, "Code", |response| CodeRequest::RedeemedBy {
        user_id,
        response,
    })
    .await?;

    Ok(Json(codes))
}

pub async fn owner(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let owner = call(&state.code_channel, "Code", |response| CodeRequest::Owner {
        code,
        response,
    })
    .await?;

    Ok(Json(owner))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(code_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    call(&state.code_channel, "Code", |response| CodeRequest::Remove {
        id: code_id,
        response,
    })
    .await?;

    Ok(Json(json!({ "message": "LTD code removed" })))
}
