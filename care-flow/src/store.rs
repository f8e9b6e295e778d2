use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CareError, Result};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    /// Intermediate specialist output kept for later documentation, not
    /// shown as a reply of its own.
    HandlerInternal,
}

/// One message in a conversation. Immutable once appended; insertion order
/// is the only ordering guarantee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    /// Originating handler name for turns produced by delegation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            author: None,
            timestamp: Utc::now(),
            payload: None,
        }
    }

    pub fn assistant(content: impl Into<String>, author: Option<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            author,
            timestamp: Utc::now(),
            payload: None,
        }
    }

    pub fn handler_internal(
        author: impl Into<String>,
        content: impl Into<String>,
        payload: Option<serde_json::Value>,
    ) -> Self {
        Self {
            role: TurnRole::HandlerInternal,
            content: content.into(),
            author: Some(author.into()),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Conversation state for one (user, session) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub turns: Vec<Turn>,
}

impl Session {
    fn new(user_id: String, session_id: String) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            session_id,
            created_at: now,
            last_active: now,
            turns: Vec::new(),
        }
    }
}

/// Trait for storing and retrieving conversation sessions.
///
/// All mutation goes through `append_turn(s)` and `delete_session`; appends
/// for one session serialize behind the store so a concurrent reader never
/// observes a partially appended turn.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session, generating identifiers when the caller does not
    /// provide them. Fails `Validation` if the pair already exists.
    async fn create_session(
        &self,
        user_id: Option<String>,
        session_id: Option<String>,
    ) -> Result<(String, String)>;

    /// Append one turn. Fails `SessionNotFound` if the session is absent.
    async fn append_turn(&self, user_id: &str, session_id: &str, turn: Turn) -> Result<()>;

    /// Append several turns as one atomic extension of the history.
    async fn append_turns(&self, user_id: &str, session_id: &str, turns: Vec<Turn>) -> Result<()>;

    /// Turns in insertion order. An existing session with no turns yet
    /// returns an empty vector, distinct from `SessionNotFound`.
    async fn get_history(&self, user_id: &str, session_id: &str) -> Result<Vec<Turn>>;

    /// Full snapshot for the state endpoint.
    async fn get_session(&self, user_id: &str, session_id: &str) -> Result<Option<Session>>;

    /// Idempotent unless `strict`, in which case a missing session fails
    /// `SessionNotFound`.
    async fn delete_session(&self, user_id: &str, session_id: &str, strict: bool) -> Result<()>;
}

fn short_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &hex[..8])
}

fn session_key(user_id: &str, session_id: &str) -> (String, String) {
    (user_id.to_string(), session_id.to_string())
}

fn not_found(user_id: &str, session_id: &str) -> CareError {
    CareError::SessionNotFound(format!("{user_id}/{session_id}"))
}

/// In-memory implementation of `SessionStore`.
pub struct InMemorySessionStore {
    sessions: DashMap<(String, String), Session>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(
        &self,
        user_id: Option<String>,
        session_id: Option<String>,
    ) -> Result<(String, String)> {
        let user_id = user_id.unwrap_or_else(|| short_id("user"));
        let session_id = session_id.unwrap_or_else(|| short_id("session"));

        match self.sessions.entry(session_key(&user_id, &session_id)) {
            Entry::Occupied(_) => Err(CareError::Validation(format!(
                "session already exists: {user_id}/{session_id}"
            ))),
            Entry::Vacant(entry) => {
                entry.insert(Session::new(user_id.clone(), session_id.clone()));
                Ok((user_id, session_id))
            }
        }
    }

    async fn append_turn(&self, user_id: &str, session_id: &str, turn: Turn) -> Result<()> {
        self.append_turns(user_id, session_id, vec![turn]).await
    }

    async fn append_turns(&self, user_id: &str, session_id: &str, turns: Vec<Turn>) -> Result<()> {
        let mut session = self
            .sessions
            .get_mut(&session_key(user_id, session_id))
            .ok_or_else(|| not_found(user_id, session_id))?;
        session.turns.extend(turns);
        session.last_active = Utc::now();
        Ok(())
    }

    async fn get_history(&self, user_id: &str, session_id: &str) -> Result<Vec<Turn>> {
        self.sessions
            .get(&session_key(user_id, session_id))
            .map(|session| session.turns.clone())
            .ok_or_else(|| not_found(user_id, session_id))
    }

    async fn get_session(&self, user_id: &str, session_id: &str) -> Result<Option<Session>> {
        Ok(self
            .sessions
            .get(&session_key(user_id, session_id))
            .map(|session| session.clone()))
    }

    async fn delete_session(&self, user_id: &str, session_id: &str, strict: bool) -> Result<()> {
        let removed = self
            .sessions
            .remove(&session_key(user_id, session_id))
            .is_some();
        if strict && !removed {
            return Err(not_found(user_id, session_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn create_generates_distinct_ids() {
        let store = InMemorySessionStore::new();
        let (u1, s1) = store.create_session(None, None).await.unwrap();
        let (u2, s2) = store.create_session(None, None).await.unwrap();
        assert!(u1.starts_with("user_"));
        assert!(s1.starts_with("session_"));
        assert!((u1.clone(), s1) != (u2, s2));
        assert!(u1.len() > "user_".len());
    }

    #[tokio::test]
    async fn create_rejects_existing_pair() {
        let store = InMemorySessionStore::new();
        store
            .create_session(Some("u".into()), Some("s".into()))
            .await
            .unwrap();
        let err = store
            .create_session(Some("u".into()), Some("s".into()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[tokio::test]
    async fn append_preserves_insertion_order() {
        let store = InMemorySessionStore::new();
        let (user, session) = store.create_session(None, None).await.unwrap();
        for i in 0..50 {
            store
                .append_turn(&user, &session, Turn::user(format!("turn {i}")))
                .await
                .unwrap();
        }
        let history = store.get_history(&user, &session).await.unwrap();
        assert_eq!(history.len(), 50);
        for (i, turn) in history.iter().enumerate() {
            assert_eq!(turn.content, format!("turn {i}"));
        }
    }

    #[tokio::test]
    async fn concurrent_appends_to_different_sessions_do_not_interfere() {
        let store = Arc::new(InMemorySessionStore::new());
        let mut keys = Vec::new();
        for _ in 0..8 {
            keys.push(store.create_session(None, None).await.unwrap());
        }

        let mut tasks = Vec::new();
        for (user, session) in keys.clone() {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..25 {
                    store
                        .append_turn(&user, &session, Turn::user(format!("m{i}")))
                        .await
                        .unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        for (user, session) in keys {
            let history = store.get_history(&user, &session).await.unwrap();
            assert_eq!(history.len(), 25);
            for (i, turn) in history.iter().enumerate() {
                assert_eq!(turn.content, format!("m{i}"));
            }
        }
    }

    #[tokio::test]
    async fn empty_history_is_distinct_from_not_found() {
        let store = InMemorySessionStore::new();
        let (user, session) = store.create_session(None, None).await.unwrap();
        assert!(store.get_history(&user, &session).await.unwrap().is_empty());
        let err = store.get_history(&user, "nope").await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn append_to_missing_session_fails() {
        let store = InMemorySessionStore::new();
        let err = store
            .append_turn("u", "s", Turn::user("hello"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn delete_is_idempotent_unless_strict() {
        let store = InMemorySessionStore::new();
        let (user, session) = store.create_session(None, None).await.unwrap();
        store.delete_session(&user, &session, false).await.unwrap();
        store.delete_session(&user, &session, false).await.unwrap();
        let err = store
            .delete_session(&user, &session, true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
