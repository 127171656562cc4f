mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::handler::HandlerWithoutStateExt;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::error::AppError;
pub use self::state::*;
pub use self::types::*;

#[derive(OpenApi)]
#[openapi(
    paths(api::compare_handler, api::batch_handler, api::health_handler),
    components(schemas(
        types::CompareForm,
        types::CompareResponse,
        types::BatchForm,
        types::BatchResponse,
        types::HealthResponse,
        types::ErrorResponse,
    ))
)]
pub struct ApiDoc;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    let limit = state.max_request_size;
    let mut app = Router::new()
        .route("/", get(api::index_handler))
        .route("/compare", post(api::compare_handler))
        .route("/batch", post(api::batch_handler))
        .route("/health", get(api::health_handler))
        .route("/metrics", get(api::metrics_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // 已上传的图片，找不到或路径非法时同样返回 JSON 404
    if let Some(store) = &state.store {
        let uploads = ServeDir::new(store.dir())
            .append_index_html_on_directories(false)
            .not_found_service(api::not_found_handler.into_service());
        app = app.nest_service("/uploads", uploads);
    }

    app.fallback(api::not_found_handler)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(limit))
        // 必须在最外层，才能改写限制层直接返回的 413
        .layer(middleware::map_response_with_state(state.clone(), error::payload_too_large))
        .with_state(state)
}
