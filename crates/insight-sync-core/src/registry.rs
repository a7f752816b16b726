//! Session registry for routing package records to remote sessions.
//!
//! The registry maps a routing key (the manifest path) to a [`Session`]. A
//! session installed under the wildcard key [`GLOBAL_SESSION_KEY`] takes
//! precedence over every keyed entry, so global and per-manifest modes share one
//! lookup path.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::service::InsightClient;

/// Routing key of the global session.
pub const GLOBAL_SESSION_KEY: &str = "*";

/// A remote session and the client bound to it.
#[derive(Clone)]
pub struct Session {
    session_id: String,
    client: InsightClient,
}

impl Session {
    pub fn new(session_id: impl Into<String>, client: InsightClient) -> Self {
        Self { session_id: session_id.into(), client }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn client(&self) -> &InsightClient {
        &self.client
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("session_id", &self.session_id).finish_non_exhaustive()
    }
}

/// Registry of remote sessions keyed by routing key.
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("session_count", &self.sessions.try_read().map(|s| s.len()).unwrap_or(0))
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { sessions: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Installs the global session. Every later lookup resolves to it.
    pub async fn add_global(&self, session_id: impl Into<String>, client: InsightClient) {
        self.insert(GLOBAL_SESSION_KEY.to_string(), Session::new(session_id, client)).await;
    }

    /// Installs a session for one routing key. The last write for a key wins.
    pub async fn add_keyed(
        &self,
        key: impl Into<String>,
        session_id: impl Into<String>,
        client: InsightClient,
    ) {
        self.insert(key.into(), Session::new(session_id, client)).await;
    }

    async fn insert(&self, key: String, session: Session) {
        debug!(key = %key, session_id = %session.session_id, "Registering session");

        let mut sessions = self.sessions.write().await;
        if let Some(previous) = sessions.insert(key.clone(), session) {
            warn!(key = %key, session_id = %previous.session_id, "Session replaced in registry");
        }
    }

    /// Resolves the session for a routing key.
    ///
    /// # Errors
    /// Returns `SessionNotFound` when neither a global nor a keyed session exists.
    pub async fn lookup(&self, key: &str) -> Result<Session> {
        let sessions = self.sessions.read().await;
        sessions
            .get(GLOBAL_SESSION_KEY)
            .or_else(|| sessions.get(key))
            .cloned()
            .ok_or_else(|| SyncError::SessionNotFound { key: key.to_string() })
    }

    /// Returns `true` if `key` resolves to a session.
    pub async fn contains(&self, key: &str) -> bool {
        let sessions = self.sessions.read().await;
        sessions.contains_key(GLOBAL_SESSION_KEY) || sessions.contains_key(key)
    }

    /// Calls `visitor` once per registered key.
    ///
    /// A session installed under several keys is visited once for each of them.
    /// The read lock is held for the duration of the walk, so the visitor must not
    /// call back into the registry.
    pub async fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&str, &Session),
    {
        let sessions = self.sessions.read().await;
        for (key, session) in sessions.iter() {
            visitor(key, session);
        }
    }

    /// Number of registered keys.
    pub async fn count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
