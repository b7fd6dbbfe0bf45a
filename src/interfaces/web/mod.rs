pub(crate) mod auth;
pub(crate) mod error;
mod handlers;
mod router;
#[cfg(test)]
pub(crate) mod testing;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::core::catalog::CatalogStore;
use crate::core::executions::ExecutionStore;
use crate::core::gateway::ActorGateway;
use crate::core::ids::{Clock, IdGenerator};
use crate::core::session::SessionStore;

pub use router::build_api_router;

pub struct ApiServer {
    api_host: String,
    api_port: u16,
    state: AppState,
}

pub struct ApiServerConfig {
    pub gateway: Arc<dyn ActorGateway>,
    pub ids: Arc<dyn IdGenerator>,
    pub clock: Arc<dyn Clock>,
    pub session_ttl: Option<chrono::Duration>,
    pub api_host: String,
    pub api_port: u16,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) gateway: Arc<dyn ActorGateway>,
    pub(crate) sessions: SessionStore,
    pub(crate) catalog: CatalogStore,
    pub(crate) executions: ExecutionStore,
    pub(crate) api_port: u16,
}

impl AppState {
    pub(crate) fn new(
        gateway: Arc<dyn ActorGateway>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        session_ttl: Option<chrono::Duration>,
        api_port: u16,
    ) -> Self {
        Self {
            gateway,
            sessions: SessionStore::new(ids.clone(), clock.clone(), session_ttl),
            catalog: CatalogStore::new(ids.clone(), clock.clone()),
            executions: ExecutionStore::new(ids, clock),
            api_port,
        }
    }
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        let state = AppState::new(
            config.gateway,
            config.ids,
            config.clock,
            config.session_ttl,
            config.api_port,
        );
        Self {
            api_host: config.api_host,
            api_port: config.api_port,
            state,
        }
    }

    /// Bind and serve until Ctrl+C.
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.api_host, self.api_port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind API server to {}", addr))?;
        let app = router::build_api_router(self.state);

        info!("API Server running at http://{addr}");
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("API Server shutting down...");
            })
            .await
            .context("API server crashed")?;
        Ok(())
    }
}
