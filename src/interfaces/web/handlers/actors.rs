use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::core::form::{InputForm, NO_PARAMETERS_MESSAGE};
use crate::core::session::Session;
use crate::interfaces::web::AppState;
use crate::interfaces::web::error::{ApiError, ApiResult};

const SCHEMA_FAILED: &str =
    "Failed to fetch actor schema. The actor may not exist or be accessible.";

pub async fn list_actors(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Json<Value> {
    let actors = state.catalog.actors_for_user(&session.user_id).await;
    Json(json!({ "actors": actors }))
}

/// Fetch the schema from the platform and keep a copy on the catalog row.
async fn fetch_schema(state: &AppState, session: &Session, actor_id: &str) -> ApiResult<Value> {
    let schema = state
        .gateway
        .input_schema(&session.credential, actor_id)
        .await
        .map_err(|e| {
            ApiError::upstream(
                &format!("Schema fetch for actor {} failed", actor_id),
                e,
                SCHEMA_FAILED,
            )
        })?;
    state
        .catalog
        .cache_input_schema(&session.user_id, actor_id, &schema)
        .await;
    Ok(schema)
}

pub async fn get_actor_schema(
    Path(actor_id): Path<String>,
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<Value>> {
    let schema = fetch_schema(&state, &session, &actor_id).await?;
    Ok(Json(json!({ "schema": schema })))
}

pub async fn get_actor_form(
    Path(actor_id): Path<String>,
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<Value>> {
    let schema = fetch_schema(&state, &session, &actor_id).await?;
    let form = InputForm::from_schema(&schema);

    let mut body = json!({
        "actorId": actor_id,
        "fields": form.fields(),
        "empty": form.is_empty(),
    });
    if form.is_empty() {
        body["message"] = json!(NO_PARAMETERS_MESSAGE);
    }
    Ok(Json(body))
}

pub async fn select_actor(
    Path(actor_id): Path<String>,
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Json<Value> {
    state.catalog.select(&session.user_id, &actor_id).await;
    match state.catalog.selected(&session.user_id).await {
        Some(actor) => info!("Actor {} ({}) selected", actor.external_actor_id, actor.name),
        None => warn!("Actor {} is not in the catalog; selection cleared", actor_id),
    }
    Json(json!({ "success": true }))
}
