use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Everything a handler can fail with. Upstream causes are logged where they
/// happen; only the message below reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Upstream(String),
}

impl ApiError {
    pub fn unauthenticated() -> Self {
        Self::Unauthorized("Unauthorized. Please authenticate first.".to_string())
    }

    /// Log the gateway error and replace it with a caller-facing message.
    pub fn upstream(context: &str, err: anyhow::Error, message: &str) -> Self {
        tracing::error!("{}: {:#}", context, err);
        Self::Upstream(message.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "message": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn errors_render_as_message_objects() {
        let (status, body) = body_of(ApiError::NotFound("Execution not found.".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "message": "Execution not found." }));

        let (status, _) = body_of(ApiError::unauthenticated()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn upstream_errors_hide_their_cause() {
        let err = ApiError::upstream(
            "start run",
            anyhow::anyhow!("connection reset by 10.0.0.7"),
            "Failed to execute actor.",
        );
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Failed to execute actor.");
        assert!(!body.to_string().contains("10.0.0.7"));
    }
}
