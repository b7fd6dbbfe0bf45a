use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::header,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::core::executions::{ExecutionStatus, StatusView};
use crate::core::session::Session;
use crate::interfaces::web::AppState;
use crate::interfaces::web::error::{ApiError, ApiResult};

fn execution_not_found() -> ApiError {
    ApiError::NotFound("Execution not found.".to_string())
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(default)]
    pub actor_id: String,
    #[serde(default)]
    pub inputs: Option<Value>,
}

/// Trigger a run, then record it. A rejected trigger leaves no record.
pub async fn execute_actor(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let actor_id = payload.actor_id.trim().to_string();
    if actor_id.is_empty() {
        return Err(ApiError::BadRequest("Actor ID is required.".to_string()));
    }
    let inputs = match payload.inputs {
        None | Some(Value::Null) => json!({}),
        Some(inputs) => inputs,
    };

    let run = state
        .gateway
        .start_run(&session.credential, &actor_id, &inputs)
        .await
        .map_err(|e| {
            ApiError::upstream(
                &format!("Run trigger for actor {} failed", actor_id),
                e,
                "Failed to execute actor. Please check your inputs and try again.",
            )
        })?;

    let record = state
        .executions
        .create_running(&session.user_id, &actor_id, &run.id, inputs)
        .await;
    state.catalog.record_run(&session.user_id, &actor_id).await;

    info!(
        "Execution {} started for actor {} (run {})",
        record.id, actor_id, run.id
    );

    Ok(Json(json!({
        "success": true,
        "executionId": record.id,
        "runId": run.id,
        "status": record.status,
    })))
}

pub async fn list_executions(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Json<Value> {
    let executions = state.executions.list_for_user(&session.user_id).await;
    Json(json!({ "executions": executions }))
}

/// Refresh a running execution from the platform. Finished executions are
/// answered from the store without touching the platform.
pub async fn get_execution_status(
    Path(execution_id): Path<String>,
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<StatusView>> {
    let record = state
        .executions
        .get_owned(&execution_id, &session.user_id)
        .await
        .ok_or_else(execution_not_found)?;

    let run_id = match (&record.external_run_id, record.status.is_terminal()) {
        (Some(run_id), false) => run_id.clone(),
        _ => return Ok(Json(StatusView::from(&record))),
    };

    let run = state
        .gateway
        .run_status(&session.credential, &run_id)
        .await
        .map_err(|e| {
            ApiError::upstream(
                &format!("Status fetch for run {} failed", run_id),
                e,
                "Failed to fetch execution status.",
            )
        })?;

    let applied = state
        .executions
        .apply_snapshot(&record.id, run.snapshot())
        .await
        .ok_or_else(execution_not_found)?;
    let mut updated = applied.record;

    // Only the request that observed the move into SUCCEEDED fetches results.
    if applied.finished_now && updated.status == ExecutionStatus::Succeeded {
        let results = match state
            .gateway
            .run_results(&session.credential, &run_id)
            .await
        {
            Ok(items) => items,
            Err(e) => {
                warn!("Results fetch for run {} failed: {:#}", run_id, e);
                Vec::new()
            }
        };
        info!(
            "Execution {} succeeded with {} result item(s)",
            updated.id,
            results.len()
        );
        if let Some(with_results) = state.executions.attach_results(&updated.id, results).await {
            updated = with_results;
        }
    }

    Ok(Json(StatusView::from(&updated)))
}

/// Stored results as a downloadable JSON file.
pub async fn download_results(
    Path(execution_id): Path<String>,
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> ApiResult<Response> {
    let record = state
        .executions
        .get_owned(&execution_id, &session.user_id)
        .await
        .ok_or_else(execution_not_found)?;

    let results = record.results.unwrap_or_default();
    let body = serde_json::to_string_pretty(&results).map_err(|e| {
        ApiError::upstream(
            "Results serialization failed",
            e.into(),
            "Failed to download results.",
        )
    })?;
    let disposition = format!("attachment; filename=\"actor-results-{}.json\"", record.id);

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
