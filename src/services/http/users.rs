use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::{
    models::{sessions::AuthenticatedUser, users::ProfileUpdate},
    services::{
        call,
        users::{PasswordChange, PasswordReset, UserRequest},
        ServiceError,
    },
};

#[derive(Deserialize)]
pub struct CreditGrant {
    amount: i32,
}

#[derive(Deserialize)]
pub struct ResetRequest {
    email: String,
}

pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = call(&state.user_channel, "User", |response| UserRequest::GetUser {
        id: identity.user_id,
        response,
    })
    .await?;

    Ok(Json(user))
}

pub async fn details(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, ServiceError> {
    let details = call(&state.user_channel, "User", |response| {
        UserRequest::GetUserDetails {
            id: identity.user_id,
            response,
        }
    })
    .await?;

    Ok(Json(details))
}

pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let users = call(&state.user_channel, "User", |response| UserRequest::ListUsers {
        response,
    })
    .await?;

    Ok(Json(users))
}

pub async fn add_credits(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<CreditGrant>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(grant) = payload?;
    let user = call(&state.user_channel, "User", |response| UserRequest::AddCredits {
        id: user_id,
        amount: grant.amount,
        response,
    })
    .await?;

    Ok(Json(user))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedUser>,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(update) = payload?;
    let user = call(&state.user_channel, "User", |response| {
        UserRequest::UpdateProfile {
            id: identity.user_id,
            update,
            response,
        }
    })
    .await?;

    Ok(Json(user))
}

pub async fn update_password(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedUser>,
    payload: Result<Json<PasswordChange>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(change) = payload?;
    call(&state.user_channel, "User", |response| {
        UserRequest::UpdatePassword {
            id: identity.user_id,
            change,
            response,
        }
    })
    .await?;

    Ok(Json(json!({ "message": "Password updated" })))
}

pub async fn history(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, ServiceError> {
    let facts = call(&state.user_channel, "User", |response| UserRequest::History {
        id: identity.user_id,
        response,
    })
    .await?;

    Ok(Json(facts))
}

pub async fn favorites(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, ServiceError> {
    let facts = call(&state.user_channel, "User", |response| UserRequest::Favorites {
        id: identity.user_id,
        response,
    })
    .await?;

    Ok(Json(facts))
}

pub async fn add_favorite(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedUser>,
    Path(fact_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    call(&state.user_channel, "User", |response| UserRequest::AddFavorite {
        id: identity.user_id,
        fact_id,
        response,
    })
    .await?;

    Ok(Json(json!({ "message": "Fact added to favorites" })))
}

pub async fn remove_favorite(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedUser>,
    Path(fact_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    call(&state.user_channel, "User", |response| {
        UserRequest::RemoveFavorite {
            id: identity.user_id,
            fact_id,
            response,
        }
    })
    .await?;

    Ok(Json(json!({ "message": "Fact removed from favorites" })))
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    payload: Result<Json<ResetRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(request) = payload?;
    call(&state.user_channel, "User", |response| {
        UserRequest::RequestPasswordReset {
            email: request.email,
            response,
        }
    })
    .await?;

    Ok(Json(json!({ "message": "Password reset link sent" })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    payload: Result<Json<PasswordReset>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(reset) = payload?;
    call(&state.user_channel, "User", |response| UserRequest::ResetPassword {
        reset,
        response,
    })
    .await?;

    Ok(Json(json!({ "message": "Password has been reset" })))
}
