use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::{
    AppState,
    utils::{error_codes, error_to_api_response, success_to_api_response},
};

use super::model::load_sample_images;

pub async fn list_samples(State(state): State<AppState>) -> impl IntoResponse {
    match load_sample_images(&state.config.sample_dir()).await {
        Ok(samples) => (StatusCode::OK, success_to_api_response(samples)),
        Err(e) => {
            tracing::error!("Failed to list sample images: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "读取示例图片失败".to_string()),
            )
        }
    }
}
