use axum::{http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::utils::success_to_api_response;

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// 服务器时间（Unix 秒）
    pub timestamp: i64,
}

pub async fn ping() -> impl IntoResponse {
    (
        StatusCode::OK,
        success_to_api_response(PingResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            timestamp: chrono::Utc::now().timestamp(),
        }),
    )
}
