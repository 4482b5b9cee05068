use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    rate_limiter::RateLimiter,
    utils::{error_codes, error_to_api_response},
};

/// 客户端标识：优先使用代理头中的IP，否则使用连接IP
pub fn client_key<B>(req: &Request<B>) -> String {
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    req.headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .filter(|ip| !ip.trim().is_empty())
        .or_else(|| {
            req.headers()
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .or(remote_ip.as_deref()) // 降级使用连接IP
        .unwrap_or("unknown")
        .trim()
        .to_string()
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = client_key(&req);
    let now = Instant::now();

    if !limiter.is_allowed_at(&key, now) {
        tracing::info!(client = %key, "request rejected by rate limiter");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            error_to_api_response::<()>(
                error_codes::RATE_LIMIT,
                format!(
                    "请求过于频繁，请在{}秒后重试",
                    limiter.window().as_secs().max(1)
                ),
            ),
        )
            .into_response();
    }

    let response = next.run(req).await;
    // 请求内容无效时未调用算法，不占用限流窗口
    if response.status() == StatusCode::BAD_REQUEST {
        limiter.revoke(&key, now);
    }
    response
}
