use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AppState;
use super::error::ApiError;

/// Session gate for every route except authentication itself. A resolved
/// session is handed to the handler through request extensions.
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&req) else {
        return ApiError::unauthenticated().into_response();
    };

    match state.sessions.resolve(&token).await {
        Some(session) => {
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        None => ApiError::unauthenticated().into_response(),
    }
}

fn bearer_token(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
