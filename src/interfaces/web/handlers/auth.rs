use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::interfaces::web::AppState;
use crate::interfaces::web::error::{ApiError, ApiResult};

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Exchange an API key for a session. Nothing is stored until the key has
/// been verified and the actor listing has come back.
pub async fn validate_api_key(
    State(state): State<AppState>,
    payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let api_key = payload
        .api_key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::BadRequest("API key is required.".to_string()))?;

    let remote_user = match state.gateway.validate_credential(&api_key).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!("Rejected API key during authentication");
            return Err(ApiError::Unauthorized(
                "Invalid API key. Please check your Apify API key and try again.".to_string(),
            ));
        }
        Err(e) => {
            return Err(ApiError::upstream(
                "Credential validation failed",
                e,
                "Failed to validate API key.",
            ));
        }
    };

    let listed = state
        .gateway
        .list_actors(&api_key)
        .await
        .map_err(|e| ApiError::upstream("Actor listing failed", e, "Failed to fetch actors."))?;

    let user = state.catalog.find_or_create_user(&remote_user.username).await;
    let actors = state.catalog.save_actors(&user.id, &listed).await;
    let session = state.sessions.create(&api_key, &user.id).await;

    info!(
        "User '{}' authenticated with {} actor(s), {} active session(s)",
        user.username,
        actors.len(),
        state.sessions.len().await
    );

    Ok(Json(json!({
        "success": true,
        "sessionId": session.token,
        "user": { "id": user.id, "username": user.username },
        "actors": actors,
    })))
}
