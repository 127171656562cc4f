use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum_typed_multipart::{TypedMultipart, TypedMultipartError};
use chrono::Local;
use log::info;
use tokio::task::spawn_blocking;

use super::error::{AppError, Result};
use super::state::AppState;
use super::types::*;
use crate::metrics;
use crate::upload::Rejection;

const INDEX_HTML: &str = include_str!("../../assets/index.html");

/// 上传的单个文件
struct Upload {
    filename: String,
    data: Bytes,
}

fn multipart_error(state: &AppState, err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::rejected(state.too_large())
    } else {
        AppError::BadRequest(err.body_text())
    }
}

fn typed_multipart_error(state: &AppState, err: TypedMultipartError) -> AppError {
    if err.get_status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::rejected(state.too_large())
    } else {
        AppError::BadRequest(err.to_string())
    }
}

/// 上传页面
pub async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// 比较两张图片的相似度
#[utoipa::path(
    post,
    path = "/compare",
    request_body(content = CompareForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = CompareResponse),
        (status = 400, body = ErrorResponse, description = "缺少图片或文件类型不允许"),
        (status = 413, body = ErrorResponse, description = "文件过大"),
        (status = 500, body = ErrorResponse),
    )
)]
pub async fn compare_handler(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<CompareResponse>> {
    // 不是 multipart 请求时视为没有上传图片
    let result = match multipart {
        Ok(multipart) => compare(&state, multipart).await,
        Err(_) => Err(AppError::rejected(Rejection::Missing)),
    };
    metrics::inc_compare_count("compare", if result.is_ok() { "success" } else { "error" });
    result.map(Json)
}

async fn compare(state: &AppState, mut multipart: Multipart) -> Result<CompareResponse> {
    let mut uploads = HashMap::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| multipart_error(state, e))? {
        let name = field.name().unwrap_or_default().to_string();
        if name != "image1" && name != "image2" {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(|e| multipart_error(state, e))?;
        uploads.insert(name, Upload { filename, data });
    }

    let (image1, image2) = (uploads.remove("image1"), uploads.remove("image2"));
    state
        .policy
        .check(&[
            image1.as_ref().map(|u| (u.filename.as_str(), u.data.len())),
            image2.as_ref().map(|u| (u.filename.as_str(), u.data.len())),
        ])
        .map_err(AppError::rejected)?;
    let (Some(image1), Some(image2)) = (image1, image2) else {
        return Err(AppError::rejected(Rejection::Missing));
    };

    let (image1_url, image2_url) = match &state.store {
        Some(store) => {
            let name1 = store.save(&image1.filename, &image1.data).await?;
            let name2 = store.save(&image2.filename, &image2.data).await?;
            (Some(format!("/uploads/{name1}")), Some(format!("/uploads/{name2}")))
        }
        None => (None, None),
    };

    let engine = state.engine.get().await?;
    let model = engine.model_name().to_string();

    let start = Instant::now();
    let result = spawn_blocking(move || engine.compare(&image1.data, &image2.data)).await??;
    let elapsed = start.elapsed();

    metrics::observe_compare_duration("compare", &model, elapsed.as_secs_f64());
    metrics::observe_compare_score(&model, result.similarity_score);
    info!("比较完成: {}%", result.similarity_score);

    Ok(CompareResponse {
        status: "success".to_string(),
        result,
        time: elapsed.as_millis() as u64,
        image1_url,
        image2_url,
    })
}

/// 将一张参考图片与多张图片比较
#[utoipa::path(
    post,
    path = "/batch",
    request_body(content = BatchForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = BatchResponse),
        (status = 400, body = ErrorResponse),
        (status = 413, body = ErrorResponse),
    )
)]
pub async fn batch_handler(
    State(state): State<Arc<AppState>>,
    data: std::result::Result<TypedMultipart<BatchRequest>, TypedMultipartError>,
) -> Result<Json<BatchResponse>> {
    let result = match data {
        Ok(TypedMultipart(data)) => batch(&state, data).await,
        Err(e) => Err(typed_multipart_error(&state, e)),
    };
    metrics::inc_compare_count("batch", if result.is_ok() { "success" } else { "error" });
    result.map(Json)
}

async fn batch(state: &AppState, data: BatchRequest) -> Result<BatchResponse> {
    if data.candidates.is_empty() {
        return Err(AppError::BadRequest("At least one candidate image is required".to_string()));
    }

    let files = std::iter::once(&data.reference)
        .chain(&data.candidates)
        .map(|f| Some((f.metadata.file_name.as_deref().unwrap_or_default(), f.contents.len())))
        .collect::<Vec<_>>();
    state.policy.check(&files).map_err(AppError::rejected)?;

    info!("批量比较 {} 张图片", data.candidates.len());

    let engine = state.engine.get().await?;
    let model = engine.model_name().to_string();
    let reference = data.reference.contents;
    let candidates = data
        .candidates
        .into_iter()
        .map(|f| (f.metadata.file_name.unwrap_or_default(), f.contents.to_vec()))
        .collect::<Vec<_>>();

    let start = Instant::now();
    let result = spawn_blocking(move || engine.batch_compare(&reference, &candidates)).await??;
    let elapsed = start.elapsed();
    metrics::observe_compare_duration("batch", &model, elapsed.as_secs_f64());

    Ok(BatchResponse { status: "success".to_string(), time: elapsed.as_millis() as u64, result })
}

/// 健康检查
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, body = HealthResponse),
    )
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy".to_string(), timestamp: Local::now().to_rfc3339() })
}

/// prometheus 指标
pub async fn metrics_handler() -> Result<Response> {
    let text = metrics::gather_text()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response())
}

pub async fn not_found_handler() -> AppError {
    AppError::NotFound
}
