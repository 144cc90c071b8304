use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use super::AppState;
use crate::{
    models::settings::SettingsUpdate,
    services::{call, settings::SettingsRequest, ServiceError},
};

pub async fn get_settings(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let record = call(&state.settings_channel, "Settings", |response| {
        SettingsRequest::GetRecord { response }
    })
    .await?;

    Ok(Json(record))
}

pub async fn update_settings(
    State(state): State<AppState>,
    payload: Result<Json<SettingsUpdate>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(update) = payload?;
    let record = call(&state.settings_channel, "Settings", |response| {
        SettingsRequest::Update { update, response }
    })
    .await?;

    Ok(Json(record))
}

pub async fn reload_settings(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let config = call(&state.settings_channel, "Settings", |response| {
        SettingsRequest::Reload { response }
    })
    .await?;

    Ok(Json(json!({
        "message": "Settings reloaded",
        "version": config.version
    })))
}
