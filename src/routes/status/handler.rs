use axum::{
    Json,
    extract::State,
    http::HeaderMap,
};

use super::model::StatusResponse;
use crate::{AppState, utils::secrets_match};

pub const STATUS_TOKEN_HEADER: &str = "x-status-token";

#[axum::debug_handler]
pub async fn status(State(state): State<AppState>, headers: HeaderMap) -> Json<StatusResponse> {
    let authorized = match (
        state.config.status_secret.as_deref(),
        headers.get(STATUS_TOKEN_HEADER).and_then(|h| h.to_str().ok()),
    ) {
        (Some(secret), Some(given)) => secrets_match(given, secret),
        _ => false,
    };

    if !authorized {
        return Json(StatusResponse::ok());
    }

    Json(StatusResponse {
        remote_store: Some(state.gate.is_remote_available()),
        rate_limits: Some(state.limiters.stats()),
        checked_at: Some(chrono::Utc::now()),
        ..StatusResponse::ok()
    })
}
