use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};

use crate::{
    AppState,
    middleware::{IdentityPolicy, RateLimitGuard, log_errors, rate_limit},
    routes,
};

// 每个受保护的接口挂自己的限流器
fn guarded_routes(state: &AppState) -> Router<AppState> {
    let identity = IdentityPolicy::from_config(&state.config);

    let translate = Router::new()
        .route("/translate", post(routes::upstream::translate))
        .route_layer(from_fn_with_state(
            RateLimitGuard {
                limiter: state.limiters.translate.clone(),
                identity: identity.clone(),
            },
            rate_limit,
        ));

    let analyze = Router::new()
        .route("/analyze", post(routes::upstream::analyze))
        .route_layer(from_fn_with_state(
            RateLimitGuard {
                limiter: state.limiters.analyze.clone(),
                identity,
            },
            rate_limit,
        ));

    translate.merge(analyze)
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(routes::status::status))
        .merge(guarded_routes(&state));

    let base = state.config.api_base_uri.trim_end_matches('/').to_string();
    let router = if base.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(&base, api)
    };

    router.layer(from_fn(log_errors)).with_state(state)
}
