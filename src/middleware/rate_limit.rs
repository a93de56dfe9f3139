use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{
    config::Config,
    rate_limit::{Decision, RateLimiter},
    utils::{ApiResponse, error_codes},
};

const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// 如何从请求中识别调用方
///
/// 只有配置过的 API key 才能作为身份，代理头只在 `trust_proxy` 打开时使用，
/// 否则调用方随便换个头就能绕过限流。
#[derive(Debug, Clone, Default)]
pub struct IdentityPolicy {
    // 存的是 key 的 sha256 十六进制
    api_keys: Arc<HashSet<String>>,
    trust_proxy: bool,
}

impl IdentityPolicy {
    pub fn new<I, S>(api_keys: I, trust_proxy: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            api_keys: Arc::new(api_keys.into_iter().map(|k| digest(k.as_ref())).collect()),
            trust_proxy,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.api_keys, config.trust_proxy)
    }
}

/// 限流中间件的状态：某个桶的限流器加身份识别规则
#[derive(Debug, Clone)]
pub struct RateLimitGuard {
    pub limiter: Arc<RateLimiter>,
    pub identity: IdentityPolicy,
}

#[derive(Debug, Serialize)]
struct RetryAfter {
    retry_after: u64,
}

pub async fn rate_limit(
    State(guard): State<RateLimitGuard>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let identity = client_identity(&req, &guard.identity);

    match guard.limiter.check(&identity).await {
        Decision::Allowed { limit, remaining } => {
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(limit));
            headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(remaining));
            response
        }
        Decision::Denied {
            limit,
            retry_after_secs,
        } => {
            let body = Json(ApiResponse {
                code: error_codes::RATE_LIMIT,
                msg: format!("Too many requests, retry in {} seconds", retry_after_secs),
                resp_data: Some(RetryAfter {
                    retry_after: retry_after_secs,
                }),
            });

            let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(limit));
            headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(0u32));
            response
        }
    }
}

/// 识别调用方：已知 API key 优先，其次客户端 IP
pub fn client_identity<B>(req: &Request<B>, policy: &IdentityPolicy) -> String {
    if let Some(key) = header_str(req.headers(), "x-api-key") {
        let hashed = digest(key);
        if policy.api_keys.contains(&hashed) {
            return format!("key:{}", &hashed[..16]);
        }
        tracing::debug!("Ignoring unknown x-api-key, limiting by address");
    }

    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    let forwarded = if policy.trust_proxy {
        header_str(req.headers(), "x-real-ip").or_else(|| {
            header_str(req.headers(), "x-forwarded-for")
                .and_then(|s| s.split(',').map(str::trim).find(|ip| !ip.is_empty()))
        })
    } else {
        None
    };

    let ip = forwarded
        .or(remote_ip.as_deref())
        .unwrap_or("unknown");

    format!("ip:{}", ip)
}

fn digest(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
