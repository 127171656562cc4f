use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use log::error;

use super::state::AppState;
use super::types::ErrorResponse;
use crate::upload::Rejection;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// API错误类型
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    PayloadTooLarge(String),
    NotFound,
    Internal(anyhow::Error),
}

impl AppError {
    /// 上传文件校验失败
    pub fn rejected(rejection: Rejection) -> Self {
        match rejection {
            Rejection::TooLarge(_) => Self::PayloadTooLarge(rejection.to_string()),
            _ => Self::BadRequest(rejection.to_string()),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::BadRequest(msg) | Self::PayloadTooLarge(msg) => msg,
            Self::NotFound => "Resource not found".to_string(),
            Self::Internal(err) => {
                error!("处理请求时出错: {err:#}");
                format!("Internal server error: {err:#}")
            }
        };
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}

/// 将请求体限制层返回的纯文本 413 改写为 JSON 错误
pub async fn payload_too_large(State(state): State<Arc<AppState>>, response: Response) -> Response {
    if response.status() != StatusCode::PAYLOAD_TOO_LARGE {
        return response;
    }
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if is_json {
        return response;
    }
    AppError::rejected(state.too_large()).into_response()
}
