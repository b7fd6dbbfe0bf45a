//! In-memory gateway double and state builder shared by the web tests.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::AppState;
use crate::core::executions::ExecutionStatus;
use crate::core::gateway::{ActorGateway, RemoteActor, RemoteRun, RemoteUser};
use crate::core::ids::testing::{ManualClock, SequentialIds};

pub const GOOD_KEY: &str = "apify_api_good";

#[derive(Default)]
pub struct CallCounts {
    pub validate: AtomicUsize,
    pub list: AtomicUsize,
    pub schema: AtomicUsize,
    pub start: AtomicUsize,
    pub status: AtomicUsize,
    pub results: AtomicUsize,
}

impl CallCounts {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Scripted platform. Only `GOOD_KEY` authenticates; run states are handed
/// out in order and the last one repeats.
pub struct FakeGateway {
    pub actors: Vec<RemoteActor>,
    pub schemas: HashMap<String, Value>,
    pub run_states: Mutex<VecDeque<ExecutionStatus>>,
    pub results: Vec<Value>,
    pub fail_list: bool,
    pub fail_start: bool,
    pub fail_results: bool,
    /// Delay before answering run status and results calls.
    pub latency: Option<Duration>,
    pub started: Mutex<Vec<(String, Value)>>,
    pub calls: CallCounts,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            actors: vec![remote_actor("act-x", "Web Scraper"), remote_actor("act-y", "Crawler")],
            schemas: HashMap::from([(
                "act-x".to_string(),
                json!({
                    "type": "object",
                    "properties": {
                        "startUrls": { "type": "array", "title": "Start URLs" },
                        "maxPages": { "type": "integer", "minimum": 1, "maximum": 5 },
                        "verbose": { "type": "boolean" }
                    },
                    "required": ["startUrls"]
                }),
            )]),
            run_states: Mutex::new(VecDeque::from([ExecutionStatus::Running])),
            results: vec![json!({ "url": "https://example.com", "title": "Example" })],
            fail_list: false,
            fail_start: false,
            fail_results: false,
            latency: None,
            started: Mutex::new(Vec::new()),
            calls: CallCounts::default(),
        }
    }
}

impl FakeGateway {
    pub fn with_run_states(states: &[ExecutionStatus]) -> Self {
        Self {
            run_states: Mutex::new(states.iter().copied().collect()),
            ..Self::default()
        }
    }

    fn next_state(&self) -> ExecutionStatus {
        let mut states = self
            .run_states
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if states.len() > 1 {
            states.pop_front().unwrap_or(ExecutionStatus::Running)
        } else {
            states.front().copied().unwrap_or(ExecutionStatus::Running)
        }
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn run(&self, status: ExecutionStatus) -> RemoteRun {
        RemoteRun {
            id: "run-1".to_string(),
            status,
            started_at: Some(Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()),
            finished_at: status
                .is_terminal()
                .then(|| Utc.with_ymd_and_hms(2025, 1, 1, 12, 5, 0).unwrap()),
            stats: Some(json!({ "requestsFinished": 3 })),
        }
    }
}

pub fn remote_actor(id: &str, title: &str) -> RemoteActor {
    RemoteActor {
        id: id.to_string(),
        name: format!("{}-name", id),
        title: Some(title.to_string()),
        description: None,
        total_runs: 2,
        last_run_started_at: None,
    }
}

#[async_trait]
impl ActorGateway for FakeGateway {
    async fn validate_credential(&self, api_key: &str) -> Result<Option<RemoteUser>> {
        self.calls.validate.fetch_add(1, Ordering::SeqCst);
        Ok((api_key == GOOD_KEY).then(|| RemoteUser {
            id: "remote-user-1".to_string(),
            username: "alice".to_string(),
        }))
    }

    async fn list_actors(&self, _api_key: &str) -> Result<Vec<RemoteActor>> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        if self.fail_list {
            return Err(anyhow!("rate limited"));
        }
        Ok(self.actors.clone())
    }

    async fn input_schema(&self, _api_key: &str, actor_id: &str) -> Result<Value> {
        self.calls.schema.fetch_add(1, Ordering::SeqCst);
        if !self.actors.iter().any(|a| a.id == actor_id) {
            return Err(anyhow!("actor {} not found", actor_id));
        }
        Ok(self.schemas.get(actor_id).cloned().unwrap_or_else(|| json!({})))
    }

    async fn start_run(&self, _api_key: &str, actor_id: &str, inputs: &Value) -> Result<RemoteRun> {
        self.calls.start.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(anyhow!("invalid input"));
        }
        self.started
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((actor_id.to_string(), inputs.clone()));
        Ok(self.run(ExecutionStatus::Running))
    }

    async fn run_status(&self, _api_key: &str, _run_id: &str) -> Result<RemoteRun> {
        self.calls.status.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(self.run(self.next_state()))
    }

    async fn run_results(&self, _api_key: &str, _run_id: &str) -> Result<Vec<Value>> {
        self.calls.results.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_results {
            return Err(anyhow!("dataset unavailable"));
        }
        Ok(self.results.clone())
    }
}

pub fn test_state(gateway: FakeGateway) -> (AppState, Arc<FakeGateway>) {
    let gateway = Arc::new(gateway);
    let state = AppState::new(
        gateway.clone(),
        Arc::new(SequentialIds::new("id")),
        Arc::new(ManualClock::new(Utc::now())),
        None,
        17900,
    );
    (state, gateway)
}
