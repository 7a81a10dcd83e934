use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::{LibraryError, QueryError};

/// API错误类型
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

pub type Result<T, E = AppError> = std::result::Result<T, E>;

impl AppError {
    /// 查询本身的错误由调用方负责，返回 400
    fn status(&self) -> StatusCode {
        if self.0.is::<QueryError>() || self.0.is::<LibraryError>() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::BAD_REQUEST {
            (status, self.0.to_string()).into_response()
        } else {
            (status, format!("Something went wrong: {}", self.0)).into_response()
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyntaxError;

    #[test]
    fn test_status() {
        let err = AppError::from(QueryError::from(SyntaxError::new(0, "empty query")));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = AppError::from(anyhow::anyhow!("disk on fire"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
