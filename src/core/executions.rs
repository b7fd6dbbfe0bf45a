use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::ids::{Clock, IdGenerator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Ready,
    Running,
    Succeeded,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Legal moves are READY -> RUNNING -> {SUCCEEDED, FAILED}. Staying put
    /// is always allowed.
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        match (self, next) {
            (a, b) if a == b => true,
            (Ready, Running) => true,
            (Running, Succeeded | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: String,
    #[serde(rename = "userId")]
    pub owner_user_id: String,
    #[serde(rename = "actorId")]
    pub external_actor_id: String,
    #[serde(rename = "runId")]
    pub external_run_id: Option<String>,
    pub status: ExecutionStatus,
    pub inputs: Option<Value>,
    pub results: Option<Vec<Value>>,
    pub stats: Option<Value>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Body of the status endpoint, shared by the server and the poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub id: String,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<Value>>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&ExecutionRecord> for StatusView {
    fn from(record: &ExecutionRecord) -> Self {
        StatusView {
            id: record.id.clone(),
            status: record.status,
            stats: record.stats.clone(),
            results: record.results.clone(),
            started_at: record.started_at,
            finished_at: record.finished_at,
        }
    }
}

/// What a single remote status fetch reported.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSnapshot {
    pub status: ExecutionStatus,
    pub stats: Option<Value>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Result of [`ExecutionStore::apply_snapshot`].
#[derive(Debug, Clone)]
pub struct AppliedSnapshot {
    pub record: ExecutionRecord,
    pub finished_now: bool,
}

/// One record per accepted run, owned by the user who triggered it.
#[derive(Clone)]
pub struct ExecutionStore {
    records: Arc<Mutex<HashMap<String, ExecutionRecord>>>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl ExecutionStore {
    pub fn new(ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            ids,
            clock,
        }
    }

    /// Record a run the remote side has already accepted. Called only after
    /// the trigger succeeds, so a failed trigger leaves nothing behind.
    pub async fn create_running(
        &self,
        owner_user_id: &str,
        external_actor_id: &str,
        external_run_id: &str,
        inputs: Value,
    ) -> ExecutionRecord {
        let record = ExecutionRecord {
            id: self.ids.next_id(),
            owner_user_id: owner_user_id.to_string(),
            external_actor_id: external_actor_id.to_string(),
            external_run_id: Some(external_run_id.to_string()),
            status: ExecutionStatus::Running,
            inputs: Some(inputs),
            results: None,
            stats: None,
            started_at: self.clock.now(),
            finished_at: None,
        };
        self.records
            .lock()
            .await
            .insert(record.id.clone(), record.clone());
        record
    }

    /// Lookup that hides records belonging to someone else.
    pub async fn get_owned(&self, id: &str, user_id: &str) -> Option<ExecutionRecord> {
        self.records
            .lock()
            .await
            .get(id)
            .filter(|r| r.owner_user_id == user_id)
            .cloned()
    }

    pub async fn list_for_user(&self, user_id: &str) -> Vec<ExecutionRecord> {
        let mut records: Vec<ExecutionRecord> = self
            .records
            .lock()
            .await
            .values()
            .filter(|r| r.owner_user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        records
    }

    /// Overwrite status and stats from a remote fetch. Moves that would go
    /// backwards (terminal -> anything, RUNNING -> READY) keep the current
    /// status. `finished_now` is set only for the one call that moved the
    /// record into a terminal state.
    pub async fn apply_snapshot(&self, id: &str, snapshot: RunSnapshot) -> Option<AppliedSnapshot> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(id)?;

        if record.status.is_terminal() {
            debug!("Ignoring status update for finished execution {}", id);
            return Some(AppliedSnapshot {
                record: record.clone(),
                finished_now: false,
            });
        }

        if record.status.can_transition_to(snapshot.status) {
            record.status = snapshot.status;
        } else {
            debug!(
                "Execution {}: keeping {} over remote {}",
                id, record.status, snapshot.status
            );
        }
        record.stats = snapshot.stats;
        let finished_now = record.status.is_terminal();
        if finished_now {
            record.finished_at = snapshot.finished_at.or_else(|| Some(self.clock.now()));
        }
        Some(AppliedSnapshot {
            record: record.clone(),
            finished_now,
        })
    }

    pub async fn attach_results(&self, id: &str, results: Vec<Value>) -> Option<ExecutionRecord> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(id)?;
        record.results = Some(results);
        Some(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::testing::{ManualClock, SequentialIds};
    use serde_json::json;

    fn store() -> (ExecutionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (
            ExecutionStore::new(Arc::new(SequentialIds::new("exec")), clock.clone()),
            clock,
        )
    }

    fn snapshot(status: ExecutionStatus) -> RunSnapshot {
        RunSnapshot {
            status,
            stats: Some(json!({ "requestsFinished": 1 })),
            finished_at: None,
        }
    }

    #[test]
    fn transition_table() {
        use ExecutionStatus::*;
        assert!(Ready.can_transition_to(Running));
        assert!(!Ready.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));
        assert!(Running.can_transition_to(Running));
        assert!(!Running.can_transition_to(Ready));
        assert!(!Succeeded.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Succeeded.can_transition_to(Failed));
    }

    #[test]
    fn status_uses_upper_case_on_the_wire() {
        assert_eq!(
            serde_json::to_value(ExecutionStatus::Succeeded).unwrap(),
            json!("SUCCEEDED")
        );
        let parsed: ExecutionStatus = serde_json::from_value(json!("FAILED")).unwrap();
        assert_eq!(parsed, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn new_records_start_running_with_inputs() {
        let (store, _) = store();
        let record = store
            .create_running("u1", "actor", "run-1", json!({ "q": "rust" }))
            .await;
        assert_eq!(record.status, ExecutionStatus::Running);
        assert_eq!(record.external_run_id.as_deref(), Some("run-1"));
        assert_eq!(record.inputs, Some(json!({ "q": "rust" })));
        assert!(record.results.is_none());
    }

    #[tokio::test]
    async fn records_are_only_visible_to_their_owner() {
        let (store, _) = store();
        let record = store.create_running("u1", "a", "r", json!({})).await;
        assert!(store.get_owned(&record.id, "u1").await.is_some());
        assert!(store.get_owned(&record.id, "u2").await.is_none());
        assert!(store.get_owned("missing", "u1").await.is_none());
    }

    #[tokio::test]
    async fn terminal_records_never_return_to_running() {
        let (store, _) = store();
        let record = store.create_running("u1", "a", "r", json!({})).await;

        let done = store
            .apply_snapshot(&record.id, snapshot(ExecutionStatus::Succeeded))
            .await
            .unwrap();
        assert!(done.finished_now);
        assert_eq!(done.record.status, ExecutionStatus::Succeeded);
        assert!(done.record.finished_at.is_some());

        let after = store
            .apply_snapshot(&record.id, snapshot(ExecutionStatus::Running))
            .await
            .unwrap();
        assert!(!after.finished_now);
        assert_eq!(after.record.status, ExecutionStatus::Succeeded);
    }

    #[tokio::test]
    async fn remote_ready_does_not_regress_a_running_record() {
        let (store, _) = store();
        let record = store.create_running("u1", "a", "r", json!({})).await;
        let applied = store
            .apply_snapshot(&record.id, snapshot(ExecutionStatus::Ready))
            .await
            .unwrap();
        assert!(!applied.finished_now);
        let updated = applied.record;
        assert_eq!(updated.status, ExecutionStatus::Running);
        assert_eq!(updated.stats, Some(json!({ "requestsFinished": 1 })));
        assert!(updated.finished_at.is_none());
    }

    #[tokio::test]
    async fn only_one_concurrent_snapshot_finishes_a_record() {
        let (store, _) = store();
        let record = store.create_running("u1", "a", "r", json!({})).await;

        let (a, b) = tokio::join!(
            store.apply_snapshot(&record.id, snapshot(ExecutionStatus::Succeeded)),
            store.apply_snapshot(&record.id, snapshot(ExecutionStatus::Succeeded)),
        );
        let finishers = [a.unwrap(), b.unwrap()]
            .iter()
            .filter(|applied| applied.finished_now)
            .count();
        assert_eq!(finishers, 1);
    }

    #[tokio::test]
    async fn results_are_attached_verbatim() {
        let (store, _) = store();
        let record = store.create_running("u1", "a", "r", json!({})).await;
        let items = vec![json!({ "title": "one" }), json!({ "title": "two" })];
        let updated = store
            .attach_results(&record.id, items.clone())
            .await
            .unwrap();
        assert_eq!(updated.results, Some(items));
    }

    #[tokio::test]
    async fn listing_is_newest_first() {
        let (store, clock) = store();
        let first = store.create_running("u1", "a", "r1", json!({})).await;
        clock.advance(chrono::Duration::seconds(5));
        let second = store.create_running("u1", "a", "r2", json!({})).await;
        store.create_running("u2", "a", "r3", json!({})).await;

        let ids: Vec<String> = store
            .list_for_user("u1")
            .await
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }
}
