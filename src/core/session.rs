use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::ids::{Clock, IdGenerator};

/// A validated credential standing behind an opaque bearer token.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub credential: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// Token -> session map. Sessions are never destroyed explicitly; they only
/// lapse when a TTL is configured.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    ttl: Option<Duration>,
}

impl SessionStore {
    pub fn new(ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>, ttl: Option<Duration>) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ids,
            clock,
            ttl,
        }
    }

    /// Mint a fresh token for `user_id`.
    pub async fn create(&self, credential: &str, user_id: &str) -> Session {
        let session = Session {
            token: format!("session_{}", self.ids.next_id()),
            credential: credential.to_string(),
            user_id: user_id.to_string(),
            created_at: self.clock.now(),
        };
        self.sessions
            .lock()
            .await
            .insert(session.token.clone(), session.clone());
        session
    }

    pub async fn resolve(&self, token: &str) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get(token)?;
        if let Some(ttl) = self.ttl
            && self.clock.now() - session.created_at >= ttl
        {
            sessions.remove(token);
            return None;
        }
        Some(session.clone())
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::testing::{ManualClock, SequentialIds};

    fn store(ttl: Option<Duration>) -> (SessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = SessionStore::new(Arc::new(SequentialIds::new("tok")), clock.clone(), ttl);
        (store, clock)
    }

    #[tokio::test]
    async fn created_session_resolves_to_its_credential() {
        let (store, _) = store(None);
        let session = store.create("apify_api_key", "user-1").await;
        assert_eq!(session.token, "session_tok-1");

        let resolved = store.resolve(&session.token).await.unwrap();
        assert_eq!(resolved.credential, "apify_api_key");
        assert_eq!(resolved.user_id, "user-1");
    }

    #[tokio::test]
    async fn unknown_token_does_not_resolve() {
        let (store, _) = store(None);
        store.create("key", "user-1").await;
        assert!(store.resolve("session_forged").await.is_none());
    }

    #[tokio::test]
    async fn each_authentication_mints_a_new_token() {
        let (store, _) = store(None);
        let a = store.create("key", "user-1").await;
        let b = store.create("key", "user-1").await;
        assert_ne!(a.token, b.token);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn sessions_never_lapse_without_ttl() {
        let (store, clock) = store(None);
        let session = store.create("key", "user-1").await;
        clock.advance(Duration::days(365));
        assert!(store.resolve(&session.token).await.is_some());
    }

    #[tokio::test]
    async fn configured_ttl_expires_sessions() {
        let (store, clock) = store(Some(Duration::minutes(30)));
        let session = store.create("key", "user-1").await;

        clock.advance(Duration::minutes(29));
        assert!(store.resolve(&session.token).await.is_some());

        clock.advance(Duration::minutes(1));
        assert!(store.resolve(&session.token).await.is_none());
        assert_eq!(store.len().await, 0);
    }
}
