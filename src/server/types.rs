use axum::body::Bytes;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use serde::Serialize;
use utoipa::ToSchema;

use crate::engine::BatchEntry;
use crate::similarity::SimilarityResult;

/// 比较表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct CompareForm {
    /// 第一张图片，PNG/JPG/JPEG
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub image1: String,
    /// 第二张图片，PNG/JPG/JPEG
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub image2: String,
}

/// 比较响应
#[derive(Debug, Serialize, ToSchema)]
pub struct CompareResponse {
    /// 固定为 `success`
    pub status: String,
    #[serde(flatten)]
    pub result: SimilarityResult,
    /// 计算耗时，单位为毫秒
    pub time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image1_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image2_url: Option<String>,
}

/// 批量比较请求参数
#[derive(TryFromMultipart)]
pub struct BatchRequest {
    pub reference: FieldData<Bytes>,
    pub candidates: Vec<FieldData<Bytes>>,
}

/// 批量比较表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct BatchForm {
    /// 参考图片
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub reference: String,
    /// 待比较的图片，可以是多张
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub candidates: String,
}

/// 批量比较响应
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchResponse {
    pub status: String,
    /// 计算耗时，单位为毫秒
    pub time: u64,
    /// 按相似度从高到低排序
    pub result: Vec<BatchEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    /// RFC 3339 格式的当前时间
    pub timestamp: String,
}

/// 错误响应
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// 固定为 `error`
    pub status: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { status: "error".to_string(), message: message.into() }
    }
}
