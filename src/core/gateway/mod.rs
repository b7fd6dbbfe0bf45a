pub mod apify;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::executions::{ExecutionStatus, RunSnapshot};

/// Identity behind a valid credential.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteUser {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteActor {
    pub id: String,
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub total_runs: u64,
    pub last_run_started_at: Option<DateTime<Utc>>,
}

impl RemoteActor {
    pub fn display_name(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRun {
    pub id: String,
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stats: Option<Value>,
}

impl RemoteRun {
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            status: self.status,
            stats: self.stats.clone(),
            finished_at: self.finished_at,
        }
    }
}

/// Calls into the actor platform. Every call carries the caller's credential;
/// the gateway itself holds no per-user state.
#[async_trait]
pub trait ActorGateway: Send + Sync {
    /// `Ok(None)` means the platform rejected the credential.
    async fn validate_credential(&self, api_key: &str) -> Result<Option<RemoteUser>>;

    async fn list_actors(&self, api_key: &str) -> Result<Vec<RemoteActor>>;

    /// The actor's input schema, `{}` when it declares none.
    async fn input_schema(&self, api_key: &str, actor_id: &str) -> Result<Value>;

    async fn start_run(&self, api_key: &str, actor_id: &str, inputs: &Value) -> Result<RemoteRun>;

    async fn run_status(&self, api_key: &str, run_id: &str) -> Result<RemoteRun>;

    async fn run_results(&self, api_key: &str, run_id: &str) -> Result<Vec<Value>>;
}

/// Collapse the platform's run states onto the local four. Unknown states
/// count as still running so the poller keeps asking.
pub fn map_remote_status(raw: &str) -> ExecutionStatus {
    match raw {
        "READY" => ExecutionStatus::Ready,
        "RUNNING" | "TIMING-OUT" | "ABORTING" => ExecutionStatus::Running,
        "SUCCEEDED" => ExecutionStatus::Succeeded,
        "FAILED" | "TIMED-OUT" | "ABORTED" => ExecutionStatus::Failed,
        other => {
            tracing::debug!("Unknown run status '{}', treating as RUNNING", other);
            ExecutionStatus::Running
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_states_collapse_to_local_ones() {
        assert_eq!(map_remote_status("READY"), ExecutionStatus::Ready);
        assert_eq!(map_remote_status("RUNNING"), ExecutionStatus::Running);
        assert_eq!(map_remote_status("TIMING-OUT"), ExecutionStatus::Running);
        assert_eq!(map_remote_status("ABORTING"), ExecutionStatus::Running);
        assert_eq!(map_remote_status("SUCCEEDED"), ExecutionStatus::Succeeded);
        assert_eq!(map_remote_status("FAILED"), ExecutionStatus::Failed);
        assert_eq!(map_remote_status("TIMED-OUT"), ExecutionStatus::Failed);
        assert_eq!(map_remote_status("ABORTED"), ExecutionStatus::Failed);
        assert_eq!(map_remote_status("SOMETHING-NEW"), ExecutionStatus::Running);
    }

    #[test]
    fn display_name_prefers_title() {
        let mut actor = RemoteActor {
            id: "a".into(),
            name: "web-scraper".into(),
            title: Some("Web Scraper".into()),
            description: None,
            total_runs: 0,
            last_run_started_at: None,
        };
        assert_eq!(actor.display_name(), "Web Scraper");
        actor.title = Some(String::new());
        assert_eq!(actor.display_name(), "web-scraper");
        actor.title = None;
        assert_eq!(actor.display_name(), "web-scraper");
    }
}
