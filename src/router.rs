use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::{
    AppState,
    middleware::{log_errors, rate_limit},
    rate_limiter::RateLimiter,
    routes,
};

// 接口路由，限流只作用于识别接口
fn api_routes(state: &AppState, rate_limiter: Arc<RateLimiter>) -> Router<AppState> {
    let recognize = post(routes::recognize::recognize)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(axum::middleware::from_fn_with_state(rate_limiter, rate_limit));

    Router::new()
        .route("/ping", get(routes::health::ping))
        .route("/samples", get(routes::samples::list_samples))
        .route("/recognize", recognize)
}

fn cors_layer() -> CorsLayer {
    // 开发环境允许所有来源，生产环境只允许同源
    if cfg!(debug_assertions) {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    }
}

// 创建主路由
pub fn create_router(state: AppState, rate_limiter: Arc<RateLimiter>) -> Router {
    let api = api_routes(&state, rate_limiter);
    let base_uri = state.config.api_base_uri.trim_end_matches('/');

    let router = if base_uri.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(base_uri, api)
    };

    router
        .fallback_service(ServeDir::new(&state.config.web_root))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(log_errors))
                .layer(cors_layer()),
        )
        .with_state(state)
}
