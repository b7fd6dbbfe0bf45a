use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::AppState;
use super::auth;
use super::handlers::{self, actors, executions};

fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", api_port),
        format!("http://localhost:{}", api_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    // Authentication itself and the health probe carry no session
    let public_routes = Router::new()
        .route("/api/auth/validate", post(handlers::auth::validate_api_key))
        .route("/health", get(handlers::health))
        .with_state(state.clone());

    let authed_routes = Router::new()
        .route("/api/actors", get(actors::list_actors))
        .route("/api/actors/execute", post(executions::execute_actor))
        .route("/api/actors/{actor_id}/schema", get(actors::get_actor_schema))
        .route("/api/actors/{actor_id}/form", get(actors::get_actor_form))
        .route("/api/actors/{actor_id}/select", post(actors::select_actor))
        .route("/api/executions", get(executions::list_executions))
        .route(
            "/api/executions/{execution_id}/status",
            get(executions::get_execution_status),
        )
        .route(
            "/api/executions/{execution_id}/results",
            get(executions::download_results),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ))
        .with_state(state.clone());

    public_routes
        .merge(authed_routes)
        .layer(middleware::from_fn(security_headers))
        .layer(build_localhost_cors(state.api_port))
        .layer(TraceLayer::new_for_http())
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    response
}
