use std::num::NonZeroU32;
use std::str::FromStr;

use axum::body::Bytes;
use axum::extract::{Multipart, multipart::MultipartError};
use serde::Serialize;
use thiserror::Error;

use crate::runner::ProcessParameters;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("缺少图片文件")]
    MissingImage,
    #[error("参数 {field} 的值无效：{value}")]
    InvalidField { field: &'static str, value: String },
    #[error("无法解析上传内容：{0}")]
    Multipart(#[from] MultipartError),
}

/// 上传的图片和可选参数
#[derive(Debug)]
pub struct RecognizeRequest {
    pub image: Bytes,
    pub params: ProcessParameters,
}

#[derive(Debug, Serialize)]
pub struct RecognizeResponse {
    pub content_type: &'static str,
    pub image_base64: String,
}

impl RecognizeRequest {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, RequestError> {
        let mut image = None;
        let mut params = ProcessParameters::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "image" {
                image = Some(field.bytes().await?);
            } else {
                let value = field.text().await?;
                apply_field(&mut params, &name, &value)?;
            }
        }

        match image {
            Some(image) if !image.is_empty() => Ok(Self { image, params }),
            _ => Err(RequestError::MissingImage),
        }
    }
}

/// 写入一个文本参数，空值视为未设置，未知字段忽略
pub(crate) fn apply_field(
    params: &mut ProcessParameters,
    name: &str,
    value: &str,
) -> Result<(), RequestError> {
    match name {
        "iterations" => {
            params.iterations = parse_optional::<NonZeroU32>("iterations", value)?.map(NonZeroU32::get)
        }
        "slope_factor" => params.slope_factor = parse_real("slope_factor", value)?,
        "hug_factor" => params.hug_factor = parse_real("hug_factor", value)?,
        "seed" => params.seed = parse_optional("seed", value)?,
        _ => tracing::debug!(field = name, "ignoring unknown form field"),
    }
    Ok(())
}

fn parse_optional<T: FromStr>(field: &'static str, value: &str) -> Result<Option<T>, RequestError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value.parse().map(Some).map_err(|_| RequestError::InvalidField {
        field,
        value: value.to_string(),
    })
}

fn parse_real(field: &'static str, value: &str) -> Result<Option<f64>, RequestError> {
    match parse_optional::<f64>(field, value)? {
        Some(v) if !v.is_finite() => Err(RequestError::InvalidField {
            field,
            value: value.trim().to_string(),
        }),
        v => Ok(v),
    }
}
