//! Per-session conversation history.
//!
//! Maps client-chosen session identifiers to a bounded list of turns.
//! Sessions are created lazily on first use and only removed by an
//! explicit [`SessionStore::clear`]; there is no expiry.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Default cap on stored turns (ten exchanges).
pub const DEFAULT_MAX_TURNS: usize = 20;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// One stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Bounded, ordered turn list for a single session.
#[derive(Debug, Clone)]
pub struct History {
    turns: Vec<Turn>,
    max_turns: usize,
}

impl History {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: Vec::new(),
            max_turns,
        }
    }

    /// Append a user turn then a model turn, dropping the oldest turns
    /// until the cap holds.
    pub fn push_exchange(&mut self, user_text: impl Into<String>, model_text: impl Into<String>) {
        self.turns.push(Turn::user(user_text));
        self.turns.push(Turn::model(model_text));

        if self.turns.len() > self.max_turns {
            let excess = self.turns.len() - self.max_turns;
            self.turns.drain(..excess);
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Exclusive access to one session's history for the length of an exchange.
pub type SessionGuard = OwnedMutexGuard<History>;

/// Process-wide session map.
///
/// Each session's history sits behind its own async mutex so that two
/// exchanges on the same identifier run one after the other while other
/// sessions proceed independently.
pub struct SessionStore {
    sessions: DashMap<String, Arc<Mutex<History>>>,
    max_turns: usize,
}

impl SessionStore {
    /// Create a store with the default cap.
    pub fn new() -> Self {
        Self::with_max_turns(DEFAULT_MAX_TURNS)
    }

    /// Create a store with a custom cap.
    pub fn with_max_turns(max_turns: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_turns,
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Shared handle to a session's history, registering an empty one if absent.
    fn entry(&self, session_id: &str) -> Arc<Mutex<History>> {
        if let Some(existing) = self.sessions.get(session_id) {
            return Arc::clone(existing.value());
        }

        let max_turns = self.max_turns;
        Arc::clone(
            self.sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(History::new(max_turns))))
                .value(),
        )
    }

    /// Lock a session for a full read-call-append exchange.
    ///
    /// Creates the session if it does not exist yet. The guard must be
    /// dropped before calling [`SessionStore::append`] for the same session.
    pub async fn lock(&self, session_id: &str) -> SessionGuard {
        self.entry(session_id).lock_owned().await
    }

    /// Current history for a session, creating an empty one if absent.
    pub async fn get_or_create(&self, session_id: &str) -> Vec<Turn> {
        self.entry(session_id).lock().await.turns().to_vec()
    }

    /// Record one exchange, creating the session if it went missing.
    pub async fn append(&self, session_id: &str, user_text: &str, model_text: &str) {
        self.entry(session_id)
            .lock()
            .await
            .push_exchange(user_text, model_text);
    }

    /// Remove a session. Returns whether it existed.
    pub fn clear(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_registers_empty_session() {
        let store = SessionStore::new();
        assert!(store.is_empty());

        let history = store.get_or_create("s1").await;
        assert!(history.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn append_adds_user_then_model() {
        let store = SessionStore::new();
        store.get_or_create("s1").await;
        store.append("s1", "Hello", "Hi there").await;

        let history = store.get_or_create("s1").await;
        assert_eq!(history, vec![Turn::user("Hello"), Turn::model("Hi there")]);
    }

    #[tokio::test]
    async fn append_to_missing_session_creates_it() {
        let store = SessionStore::new();
        store.append("ghost", "q", "a").await;
        assert_eq!(store.get_or_create("ghost").await.len(), 2);
    }

    #[tokio::test]
    async fn history_length_is_min_of_twice_exchanges_and_cap() {
        for n in 0..15 {
            let store = SessionStore::new();
            for i in 0..n {
                store.append("s", &format!("q{i}"), &format!("a{i}")).await;
            }
            assert_eq!(store.get_or_create("s").await.len(), (2 * n).min(20));
        }
    }

    #[tokio::test]
    async fn trimming_keeps_most_recent_turns_in_order() {
        let store = SessionStore::new();
        for i in 1..=11 {
            store.append("s", &format!("q{i}"), &format!("a{i}")).await;
        }

        let history = store.get_or_create("s").await;
        assert_eq!(history.len(), 20);
        assert_eq!(history[0], Turn::user("q2"));
        assert_eq!(history[1], Turn::model("a2"));
        assert_eq!(history[19], Turn::model("a11"));
        assert!(!history.iter().any(|t| t.text == "q1" || t.text == "a1"));
    }

    #[tokio::test]
    async fn custom_cap_is_honored() {
        let store = SessionStore::with_max_turns(4);
        for i in 0..5 {
            store.append("s", &format!("q{i}"), &format!("a{i}")).await;
        }
        let history = store.get_or_create("s").await;
        assert_eq!(
            history,
            vec![
                Turn::user("q3"),
                Turn::model("a3"),
                Turn::user("q4"),
                Turn::model("a4"),
            ]
        );
    }

    #[tokio::test]
    async fn clear_then_get_yields_empty() {
        let store = SessionStore::new();
        store.append("s", "q", "a").await;

        assert!(store.clear("s"));
        assert!(store.get_or_create("s").await.is_empty());
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let store = SessionStore::new();
        assert!(!store.clear("never-seen"));
        assert!(!store.clear("never-seen"));
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = SessionStore::new();
        store.append("a", "qa", "aa").await;
        store.append("b", "qb", "ab").await;

        store.clear("a");
        assert!(store.get_or_create("a").await.is_empty());
        assert_eq!(store.get_or_create("b").await.len(), 2);
    }

    #[tokio::test]
    async fn lock_guard_pushes_into_stored_history() {
        let store = SessionStore::new();
        {
            let mut guard = store.lock("s").await;
            guard.push_exchange("q", "a");
        }
        assert_eq!(store.get_or_create("s").await.len(), 2);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Turn::model("ok")).unwrap();
        assert_eq!(json, r#"{"role":"model","text":"ok"}"#);
        assert_eq!(Role::User.as_str(), "user");
    }
}
