use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use log::info;
use tokio::task::spawn_blocking;

use super::error::Result;
use super::state::AppState;
use super::types::*;
use crate::metrics;
use crate::query::CancelToken;

/// 请求结束时取消查询，客户端断开后不再继续计算
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// 执行一条查询
#[utoipa::path(
    post,
    path = "/query",
    request_body = QueryRequest,
    responses(
        (status = 200, body = QueryResponse),
        (status = 400, description = "查询语法或语义错误"),
    )
)]
pub async fn query_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    let start = Instant::now();
    let count = data.count.unwrap_or(state.options.count);

    info!("正在执行查询: {}", data.query);

    let cancel = CancelToken::new();
    let _guard = CancelOnDrop(cancel.clone());
    let output = {
        let state = state.clone();
        spawn_blocking(move || state.library.compile_and_run(&data.query, &cancel)).await??
    };

    let total = output.images.len();
    let mut images = output.images;
    if count > 0 {
        images.truncate(count);
    }

    Ok(Json(QueryResponse {
        time: start.elapsed().as_millis() as u32,
        total,
        images,
        warnings: output.warnings.iter().map(ToString::to_string).collect(),
    }))
}

/// 检查查询是否合法，不执行
#[utoipa::path(
    post,
    path = "/validate",
    request_body = TextRequest,
    responses(
        (status = 200, body = ValidateResponse),
        (status = 400, description = "查询语法或语义错误"),
    )
)]
pub async fn validate_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<TextRequest>,
) -> Result<Json<ValidateResponse>> {
    let warnings = state.library.validate(&data.query)?;
    Ok(Json(ValidateResponse { warnings: warnings.iter().map(ToString::to_string).collect() }))
}

/// 返回展开并化简后的查询
#[utoipa::path(
    post,
    path = "/explain",
    request_body = TextRequest,
    responses(
        (status = 200, body = ExplainResponse),
        (status = 400, description = "查询语法或语义错误"),
    )
)]
pub async fn explain_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<TextRequest>,
) -> Result<Json<ExplainResponse>> {
    let expr = state.library.explain(&data.query)?;
    Ok(Json(ExplainResponse { expr }))
}

/// 从数据库重新加载标签和图片
#[utoipa::path(post, path = "/reload")]
pub async fn reload_handler(State(state): State<Arc<AppState>>) -> Result<()> {
    state.library.reload().await?;
    Ok(())
}

/// prometheus 指标
#[utoipa::path(
    get,
    path = "/metrics",
    responses(
        (status = 200, body = String, content_type = "text/plain"),
    )
)]
pub async fn metrics_handler() -> Result<String> {
    Ok(metrics::gather_text()?)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use rstest::*;

    use super::*;
    use crate::config::QueryOptions;
    use crate::hamming::SimilarityConfig;
    use crate::library::{Library, Snapshot};

    #[fixture]
    fn state() -> Arc<AppState> {
        let library = Library::new(Snapshot::default(), SimilarityConfig::default());
        library.create_tag("cat", None, None).unwrap();
        library.create_tag("dog", None, None).unwrap();
        library.create_tag("pets", None, Some("cat + dog".into())).unwrap();
        for (path, label) in [("a.jpg", "cat"), ("b.jpg", "dog"), ("c.jpg", "cat")] {
            let id = library.register_image(path, None).unwrap();
            library.tag_image(id, label).unwrap();
        }
        AppState::new(library, QueryOptions { threshold: 10, count: 0 })
    }

    fn request(query: &str, count: Option<usize>) -> Json<QueryRequest> {
        Json(QueryRequest { query: query.to_string(), count })
    }

    #[rstest]
    #[tokio::test]
    async fn test_query(state: Arc<AppState>) {
        let Json(response) = query_handler(State(state), request("pets -dog", None)).await.unwrap();
        let paths = response.images.iter().map(|i| i.path.as_str()).collect::<Vec<_>>();
        assert_eq!(paths, vec!["a.jpg", "c.jpg"]);
        assert_eq!(response.total, 2);
        assert!(response.warnings.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn test_query_count(state: Arc<AppState>) {
        let Json(response) = query_handler(State(state), request("pets", Some(1))).await.unwrap();
        assert_eq!(response.images.len(), 1);
        assert_eq!(response.total, 3);
    }

    #[rstest]
    #[tokio::test]
    async fn test_query_warning(state: Arc<AppState>) {
        let Json(response) = query_handler(State(state), request("cat + kat", None)).await.unwrap();
        assert_eq!(response.total, 2);
        assert_eq!(response.warnings, vec!["unknown tag 'kat'".to_string()]);
    }

    #[rstest]
    #[case("(cat")]
    #[case("cat +")]
    #[case("name:/[/")]
    #[tokio::test]
    async fn test_bad_query(state: Arc<AppState>, #[case] query: &str) {
        let err = query_handler(State(state), request(query, None)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[rstest]
    #[tokio::test]
    async fn test_validate_and_explain(state: Arc<AppState>) {
        let text = |query: &str| Json(TextRequest { query: query.to_string() });

        let Json(response) = validate_handler(State(state.clone()), text("pets")).await.unwrap();
        assert!(response.warnings.is_empty());

        let Json(response) = explain_handler(State(state.clone()), text("-pets")).await.unwrap();
        assert_eq!(response.expr, "-cat -dog");

        let err = validate_handler(State(state), text("")).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[rstest]
    #[tokio::test]
    async fn test_reload_without_db(state: Arc<AppState>) {
        reload_handler(State(state.clone())).await.unwrap();
        assert_eq!(state.library.snapshot().index.len(), 3);
    }

    #[tokio::test]
    async fn test_metrics() {
        metrics::inc_query_count("ok");
        let text = metrics_handler().await.unwrap();
        assert!(text.contains("imtag_query_count"));
    }
}
