//! # Session Module
//!
//! Process-wide session state keyed by the opaque id delivered in the
//! [`SESSION_COOKIE`] cookie.
//!
//! The store is created once at startup and handed to the dispatcher by `Arc`.
//! Map-level exclusion comes from `DashMap`'s sharded locks; each session carries its
//! own mutex so a handler holding one session never blocks lookups of another.
//! Sessions are created lazily on a client's first request and refreshed on every
//! later one. Expiry is left to the caller via [`SessionStore::remove`].

use crate::ids::SessionId;
use dashmap::DashMap;
use may::sync::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::time::SystemTime;
use tracing::debug;

/// Cookie that carries the session id
pub const SESSION_COOKIE: &str = "BRRTSESSIONID";

/// Server-side state for one client
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    created_at: SystemTime,
    last_accessed: SystemTime,
    attributes: HashMap<String, Value>,
}

impl Session {
    fn new(id: String) -> Self {
        let now = SystemTime::now();
        Self {
            id,
            created_at: now,
            last_accessed: now,
            attributes: HashMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    #[must_use]
    pub fn last_accessed(&self) -> SystemTime {
        self.last_accessed
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    #[must_use]
    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }

    fn touch(&mut self) {
        // SystemTime is not monotonic; never move last access backwards.
        let now = SystemTime::now();
        if now > self.last_accessed {
            self.last_accessed = now;
        }
    }
}

/// Shared handle to a live session
pub type SessionHandle = Arc<Mutex<Session>>;

/// Concurrent id → session map
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, SessionHandle>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh id and store an empty session under it.
    pub fn create(&self) -> (String, SessionHandle) {
        let id = SessionId::generate().to_string();
        let handle = Arc::new(Mutex::new(Session::new(id.clone())));
        self.sessions.insert(id.clone(), Arc::clone(&handle));
        debug!(session_id = %id, total_sessions = self.sessions.len(), "Session created");
        (id, handle)
    }

    #[must_use]
    pub fn lookup(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Update last-accessed time; `false` when the id is unknown.
    pub fn refresh(&self, id: &str) -> bool {
        match self.sessions.get(id) {
            Some(entry) => {
                entry
                    .value()
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .touch();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.remove(id).map(|(_, handle)| handle)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
