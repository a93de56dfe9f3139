use axum::{
    Json,
    extract::State,
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::{
    AppState,
    error::AppError,
    rate_limit::{ANALYZE_BUCKET, TRANSLATE_BUCKET},
    utils::success_to_api_response,
};

pub const CACHE_STATUS_HEADER: &str = "x-cache";

#[axum::debug_handler]
pub async fn translate(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let url = state.config.translate_upstream_url.clone();
    forward(&state, TRANSLATE_BUCKET, url.as_deref(), body).await
}

#[axum::debug_handler]
pub async fn analyze(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let url = state.config.analyze_upstream_url.clone();
    forward(&state, ANALYZE_BUCKET, url.as_deref(), body).await
}

/// 先查缓存，未命中再调用上游服务并写回缓存
async fn forward(
    state: &AppState,
    prefix: &str,
    url: Option<&str>,
    body: Value,
) -> Result<Response, AppError> {
    if !body.is_object() {
        return Err(AppError::InvalidRequest(
            "Request body must be a JSON object".to_string(),
        ));
    }
    let Some(url) = url else {
        return Err(AppError::UpstreamUnavailable);
    };

    // 对象键有序，相同请求序列化结果相同
    let raw_key = body.to_string();

    if let Some(cached) = state.cache.get::<Value>(prefix, &raw_key).await {
        return Ok(with_cache_status(cached, "hit"));
    }

    let response = state
        .http
        .post(url)
        .json(&body)
        .send()
        .await
        .map_err(|e| AppError::UpstreamFailed(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::UpstreamFailed(format!(
            "{} returned status {}",
            url, status
        )));
    }

    let result: Value = response
        .json()
        .await
        .map_err(|e| AppError::UpstreamFailed(e.to_string()))?;

    state
        .cache
        .set(prefix, &raw_key, &result, state.config.cache_ttl())
        .await;

    Ok(with_cache_status(result, "miss"))
}

fn with_cache_status(data: Value, status: &'static str) -> Response {
    let mut response = success_to_api_response(data).into_response();
    response.headers_mut().insert(
        HeaderName::from_static(CACHE_STATUS_HEADER),
        HeaderValue::from_static(status),
    );
    response
}
