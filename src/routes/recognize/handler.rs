use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    runner::RunnerError,
    utils::{error_codes, error_to_api_response, success_to_api_response, truncate_text},
};

use super::model::{RecognizeRequest, RecognizeResponse};

// 返回给前端的错误输出最多保留的字符数
const MAX_STDERR_CHARS: usize = 2048;

#[axum::debug_handler]
pub async fn recognize(State(state): State<AppState>, multipart: Multipart) -> impl IntoResponse {
    let req = match RecognizeRequest::from_multipart(multipart).await {
        Ok(req) => req,
        Err(e) => {
            tracing::debug!("invalid recognize request: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                error_to_api_response::<RecognizeResponse>(
                    error_codes::VALIDATION_ERROR,
                    e.to_string(),
                ),
            );
        }
    };

    tracing::info!(
        bytes = req.image.len(),
        params = ?req.params,
        "recognize request accepted"
    );

    match state.runner.process_image(&req.image, &req.params).await {
        Ok(image_base64) => (
            StatusCode::OK,
            success_to_api_response(RecognizeResponse {
                content_type: "image/png",
                image_base64,
            }),
        ),
        Err(e) => {
            let (code, msg) = failure_message(&e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(code, msg),
            )
        }
    }
}

/// 启动失败不返回细节，算法失败时附带其错误输出
fn failure_message(err: &RunnerError) -> (i32, String) {
    match err {
        RunnerError::LaunchFailure { .. } => {
            (error_codes::LAUNCH_FAILED, "启动识别算法失败".to_string())
        }
        RunnerError::ProcessFailure { exit_code, stderr } => (
            error_codes::PROCESS_FAILED,
            with_detail(format!("算法执行失败，错误码 {}", exit_code), stderr),
        ),
        RunnerError::OutputMissing { stderr } => (
            error_codes::OUTPUT_MISSING,
            with_detail("未找到算法输出文件".to_string(), stderr),
        ),
        RunnerError::Timeout { after } => (
            error_codes::PROCESS_TIMEOUT,
            format!("算法执行超时（{}秒）", after.as_secs()),
        ),
        RunnerError::Io(e) => {
            tracing::error!("recognize failed with I/O error: {}", e);
            (error_codes::INTERNAL_ERROR, "内部服务器错误".to_string())
        }
    }
}

fn with_detail(msg: String, stderr: &str) -> String {
    let detail = truncate_text(stderr, MAX_STDERR_CHARS);
    if detail.is_empty() {
        msg
    } else {
        format!("{}：{}", msg, detail)
    }
}
