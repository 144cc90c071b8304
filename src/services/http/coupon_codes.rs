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

/// Same batch generation as `/ltdCode`, answered with a count as well.
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<NewCodes>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(request) = payload?;
    let platform = request.platform.clone();
    let codes = call(&state.code_channel, "Code", |response| CodeRequest::Generate {
        request,
        response,
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "platform": platform,
            "count": codes.len(),
            "codes": codes
        })),
    ))
}

pub async fn list(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let codes = call(&state.code_channel, "Code", |response| CodeRequest::List { response }).await?;

    Ok(Json(codes))
}

pub async fn status(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedUser>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = call(&state.code_channel, "Code", |response| CodeRequest::CouponStatus {
        code,
        user_id: identity.user_id,
        response,
    })
    .await?;

    Ok(Json(status))
}
