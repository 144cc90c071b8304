use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::{
    models::sessions::AuthenticatedUser,
    services::{call, facts::FactRequest, ServiceError},
};

#[derive(Deserialize)]
pub struct NewClaim {
    fact: String,
}

pub async fn submit_fact(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedUser>,
    payload: Result<Json<NewClaim>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(claim) = payload?;
    let fact = call(&state.fact_channel, "Fact", |response| FactRequest::Submit {
        user_id: identity.user_id,
        claim: claim.fact,
        response,
    })
    .await?;

    Ok((StatusCode::CREATED, Json(fact)))
}

pub async fn get_fact(
    State(state): State<AppState>,
    Path(fact_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let fact = call(&state.fact_channel, "Fact", |response| FactRequest::GetFact {
        id: fact_id,
        response,
    })
    .await?;

    Ok(Json(fact))
}

pub async fn delete_fact(
    State(state): State<AppState>,
    Extension(identity): Extension<AuthenticatedUser>,
    Path(fact_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    call(&state.fact_channel, "Fact", |response| FactRequest::DeleteFact {
        id: fact_id,
        user_id: identity.user_id,
        response,
    })
    .await?;

    Ok(Json(json!({ "message": "Fact deleted" })))
}
