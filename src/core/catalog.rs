use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::gateway::RemoteActor;
use super::ids::{Clock, IdGenerator};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    #[serde(rename = "userId")]
    pub owner_user_id: String,
    #[serde(rename = "actorId")]
    pub external_actor_id: String,
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<Value>,
    #[serde(rename = "lastRun")]
    pub last_run_at: Option<DateTime<Utc>>,
    pub run_count: String,
    pub is_selected: bool,
}

#[derive(Default)]
struct CatalogInner {
    users: HashMap<String, User>,
    /// Insertion order is the listing order.
    actors: Vec<Actor>,
}

/// Users and the actors visible to each of them.
#[derive(Clone)]
pub struct CatalogStore {
    inner: Arc<Mutex<CatalogInner>>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl CatalogStore {
    pub fn new(ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CatalogInner::default())),
            ids,
            clock,
        }
    }

    /// Users are created on first sight of a username and never change.
    pub async fn find_or_create_user(&self, username: &str) -> User {
        let mut inner = self.inner.lock().await;
        if let Some(user) = inner.users.values().find(|u| u.username == username) {
            return user.clone();
        }
        let user = User {
            id: self.ids.next_id(),
            username: username.to_string(),
        };
        debug!("Created user {} ({})", user.username, user.id);
        inner.users.insert(user.id.clone(), user.clone());
        user
    }

    #[cfg(test)]
    pub async fn user_count(&self) -> usize {
        self.inner.lock().await.users.len()
    }

    /// Upsert the remote listing for `user_id`. Rows are keyed by
    /// (user, external actor id); existing rows keep their id, selection and
    /// cached schema.
    pub async fn save_actors(&self, user_id: &str, remote: &[RemoteActor]) -> Vec<Actor> {
        let mut inner = self.inner.lock().await;
        let mut saved = Vec::with_capacity(remote.len());
        for listed in remote {
            let existing = inner
                .actors
                .iter_mut()
                .find(|a| a.owner_user_id == user_id && a.external_actor_id == listed.id);
            let row = match existing {
                Some(actor) => {
                    actor.name = listed.display_name().to_string();
                    actor.description = Some(listed.description.clone().unwrap_or_default());
                    actor.last_run_at = listed.last_run_started_at;
                    actor.run_count = listed.total_runs.to_string();
                    actor.clone()
                }
                None => {
                    let actor = Actor {
                        id: self.ids.next_id(),
                        owner_user_id: user_id.to_string(),
                        external_actor_id: listed.id.clone(),
                        name: listed.display_name().to_string(),
                        description: Some(listed.description.clone().unwrap_or_default()),
                        input_schema: None,
                        last_run_at: listed.last_run_started_at,
                        run_count: listed.total_runs.to_string(),
                        is_selected: false,
                    };
                    inner.actors.push(actor.clone());
                    actor
                }
            };
            saved.push(row);
        }
        saved
    }

    pub async fn actors_for_user(&self, user_id: &str) -> Vec<Actor> {
        self.inner
            .lock()
            .await
            .actors
            .iter()
            .filter(|a| a.owner_user_id == user_id)
            .cloned()
            .collect()
    }

    /// Mark `external_actor_id` as the only selected actor of `user_id`.
    /// Clearing and setting happen under one lock, so no reader ever sees
    /// zero or two selected rows mid-update.
    pub async fn select(&self, user_id: &str, external_actor_id: &str) {
        let mut inner = self.inner.lock().await;
        for actor in inner
            .actors
            .iter_mut()
            .filter(|a| a.owner_user_id == user_id)
        {
            actor.is_selected = actor.external_actor_id == external_actor_id;
        }
    }

    pub async fn selected(&self, user_id: &str) -> Option<Actor> {
        self.inner
            .lock()
            .await
            .actors
            .iter()
            .find(|a| a.owner_user_id == user_id && a.is_selected)
            .cloned()
    }

    pub async fn cache_input_schema(&self, user_id: &str, external_actor_id: &str, schema: &Value) {
        let mut inner = self.inner.lock().await;
        if let Some(actor) = inner
            .actors
            .iter_mut()
            .find(|a| a.owner_user_id == user_id && a.external_actor_id == external_actor_id)
        {
            actor.input_schema = Some(schema.clone());
        }
    }

    /// Bump the run counter and last-run stamp after a run was accepted.
    pub async fn record_run(&self, user_id: &str, external_actor_id: &str) {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        if let Some(actor) = inner
            .actors
            .iter_mut()
            .find(|a| a.owner_user_id == user_id && a.external_actor_id == external_actor_id)
        {
            let count: u64 = actor.run_count.parse().unwrap_or(0);
            actor.run_count = (count + 1).to_string();
            actor.last_run_at = Some(now);
        }
    }
}
