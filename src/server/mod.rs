mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::state::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::query_handler,
        api::validate_handler,
        api::explain_handler,
        api::reload_handler,
        api::metrics_handler,
    ),
    components(schemas(
        types::QueryRequest,
        types::QueryResponse,
        types::TextRequest,
        types::ValidateResponse,
        types::ExplainResponse,
    ))
)]
pub struct ApiDoc;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/query", post(api::query_handler))
        .route("/validate", post(api::validate_handler))
        .route("/explain", post(api::explain_handler))
        .route("/reload", post(api::reload_handler))
        .route("/metrics", get(api::metrics_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // 查询请求限制：64K
        .layer(RequestBodyLimitLayer::new(1024 * 64))
        .with_state(state)
}
