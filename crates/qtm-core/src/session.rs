//! Session log contract.
//!
//! A session is the persistent record of what a rollout deployed,
//! keyed by session ID. The engine mutates it as apps succeed or are
//! reversed; the standalone rollback command replays it in reverse.
//!
//! Apps are keyed by `name` alone while suite identity is
//! `(name, group)` — two same-named apps in different groups shadow
//! each other in the log. Known limitation, kept deliberately.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::suite::SuiteItem;

/// Everything recorded under one session ID.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionData {
    pub session_id: String,
    pub username: String,
    pub apps: HashMap<String, AppData>,
    pub endpoints: HashMap<String, String>,
    pub config_changes: Vec<ConfigChange>,
}

/// Per-app record: added on deployment success, removed on rollback
/// success.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppData {
    pub version: String,
    pub rollout_phase: i64,
    pub is_deployed: bool,
}

/// Append-only record of a configuration adjustment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigChange {
    pub app: String,
    pub filename: String,
    pub data: String,
    pub timestamp: String,
}

/// How the command layer wants its session resolved.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Explicit session ID; wins when non-empty.
    pub session: String,
    /// Force a fresh session instead of prompting.
    pub new_session: bool,
}

/// Errors from session managers.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no active session selected")]
    NoActiveSession,

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("no app found for {0}")]
    AppNotFound(String),

    #[error("failed to encode session record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("session store error: {0}")]
    Store(String),
}

/// The session log as the engine and commands see it.
///
/// Mutating operations target the active session selected with
/// `set_session_id`. Implementations serialize internal state so the
/// engine may call them from concurrent deployment units.
pub trait SessionManager: Send + Sync {
    /// List persisted session IDs.
    fn get_sessions(&self) -> Result<Vec<String>, SessionError>;

    /// Produce a fresh unique session ID (not yet persisted).
    fn create_session_id(&self) -> Result<String, SessionError>;

    /// Select the active session for subsequent mutations.
    fn set_session_id(&self, session_id: &str);

    /// Persist an empty session under `session_id` and add it to the
    /// session list; also selects it as active.
    fn register_new_session(&self, session_id: &str) -> Result<(), SessionError>;

    /// Delete everything under the active session and drop it from
    /// the session list.
    fn remove_session(&self) -> Result<(), SessionError>;

    /// Whether the active session exists in the store.
    fn validate_session(&self) -> Result<bool, SessionError>;

    /// Upsert an app record, keyed by `item.name`.
    fn add_app(&self, item: &SuiteItem, version: &str) -> Result<(), SessionError>;

    /// Remove an app record. Removing an absent app is not an error.
    fn remove_app(&self, name: &str) -> Result<(), SessionError>;

    fn add_endpoint(&self, name: &str, address: &str) -> Result<(), SessionError>;

    fn add_config_adjustment(
        &self,
        app: &str,
        filename: &str,
        data: &str,
    ) -> Result<(), SessionError>;

    /// True iff the active session records no apps.
    fn is_empty(&self) -> Result<bool, SessionError>;

    fn get_app_version(&self, name: &str) -> Result<String, SessionError>;
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ── In-memory manager ──────────────────────────────────────────────

struct MemoryInner {
    session_id: String,
    sessions: HashMap<String, SessionData>,
}

/// Session manager with no persistence. Backs `--local` runs and
/// tests; the store-backed manager lives in `qtm-store`.
pub struct MemorySessionManager {
    username: String,
    inner: Mutex<MemoryInner>,
}

impl MemorySessionManager {
    pub fn new(username: &str) -> Self {
        Self {
            username: username.to_string(),
            inner: Mutex::new(MemoryInner {
                session_id: String::new(),
                sessions: HashMap::new(),
            }),
        }
    }

    /// Snapshot of the active session, for assertions in tests.
    pub fn active_session(&self) -> Option<SessionData> {
        let inner = self.inner.lock().unwrap();
        inner.sessions.get(&inner.session_id).cloned()
    }
}

impl SessionManager for MemorySessionManager {
    fn get_sessions(&self) -> Result<Vec<String>, SessionError> {
        let inner = self.inner.lock().unwrap();
        let mut ids: Vec<String> = inner.sessions.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn create_session_id(&self) -> Result<String, SessionError> {
        Ok(uuid::Uuid::new_v4().to_string())
    }

    fn set_session_id(&self, session_id: &str) {
        debug!(session = session_id, "selecting session");
        self.inner.lock().unwrap().session_id = session_id.to_string();
    }

    fn register_new_session(&self, session_id: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().unwrap();
        inner.session_id = session_id.to_string();
        inner
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionData {
                session_id: session_id.to_string(),
                username: self.username.clone(),
                ..SessionData::default()
            });
        Ok(())
    }

    fn remove_session(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.session_id.clone();
        inner.sessions.remove(&id);
        Ok(())
    }

    fn validate_session(&self) -> Result<bool, SessionError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.sessions.contains_key(&inner.session_id))
    }

    fn add_app(&self, item: &SuiteItem, version: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.session_id.clone();
        let session = inner
            .sessions
            .get_mut(&id)
            .ok_or(SessionError::NoActiveSession)?;
        session.apps.insert(
            item.name.clone(),
            AppData {
                version: version.to_string(),
                rollout_phase: item.rollout_phase,
                is_deployed: true,
            },
        );
        Ok(())
    }

    fn remove_app(&self, name: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.session_id.clone();
        let session = inner
            .sessions
            .get_mut(&id)
            .ok_or(SessionError::NoActiveSession)?;
        session.apps.remove(name);
        Ok(())
    }

    fn add_endpoint(&self, name: &str, address: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.session_id.clone();
        let session = inner
            .sessions
            .get_mut(&id)
            .ok_or(SessionError::NoActiveSession)?;
        session
            .endpoints
            .insert(name.to_string(), address.to_string());
        Ok(())
    }

    fn add_config_adjustment(
        &self,
        app: &str,
        filename: &str,
        data: &str,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.session_id.clone();
        let session = inner
            .sessions
            .get_mut(&id)
            .ok_or(SessionError::NoActiveSession)?;
        session.config_changes.push(ConfigChange {
            app: app.to_string(),
            filename: filename.to_string(),
            data: data.to_string(),
            timestamp: epoch_secs().to_string(),
        });
        Ok(())
    }

    fn is_empty(&self) -> Result<bool, SessionError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sessions
            .get(&inner.session_id)
            .map(|s| s.apps.is_empty())
            .unwrap_or(true))
    }

    fn get_app_version(&self, name: &str) -> Result<String, SessionError> {
        let inner = self.inner.lock().unwrap();
        inner
            .sessions
            .get(&inner.session_id)
            .and_then(|s| s.apps.get(name))
            .map(|a| a.version.clone())
            .ok_or_else(|| SessionError::AppNotFound(name.to_string()))
    }
}
