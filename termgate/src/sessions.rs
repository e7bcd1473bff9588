//! Session registry: process-wide map of active proxied sessions.
//!
//! Sessions are registered on the accept path before the remote dial
//! starts, so a connecting session is already observable through the
//! diagnostics endpoints. The teardown path removes entries exactly once;
//! removal of an already-removed session is the idempotent no-op case.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info, warn};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::watch;

/// Lifecycle state of one session.
///
/// `Initiating → ShellOpen → Closing → Closed`; an error while initiating
/// skips straight to `Closing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered; remote dial/negotiation in flight.
    Initiating,

    /// Shell is live, relay running.
    ShellOpen,

    /// Teardown in progress.
    Closing,

    /// Both sub-resources finished their close sequences.
    Closed,
}

impl SessionState {
    /// Whether the session is actively relaying.
    pub fn is_active(self) -> bool {
        self == SessionState::ShellOpen
    }
}

/// Registry entry for one live session.
#[derive(Debug)]
struct SessionEntry {
    target: String,
    state: SessionState,
    started_at: OffsetDateTime,
    close_tx: watch::Sender<bool>,
}

/// Snapshot of one session for the diagnostics listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub target: String,
    pub is_active: bool,
    pub start_time: String,
}

/// Process-wide registry of active sessions.
///
/// Supports concurrent insert/remove/snapshot from many session tasks; the
/// inner map is the only cross-session shared mutable state in the crate.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    counter: AtomicU64,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session bound to `target`.
    ///
    /// Returns the freshly generated session identifier and the close
    /// signal the session task must watch for shutdown. Identifiers are
    /// never reused within the process lifetime.
    pub fn register(&self, target: &str) -> (String, watch::Receiver<bool>) {
        let session_id = self.next_session_id();
        let (close_tx, close_rx) = watch::channel(false);

        let entry = SessionEntry {
            target: target.to_string(),
            state: SessionState::Initiating,
            started_at: OffsetDateTime::now_utc(),
            close_tx,
        };

        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(session_id.clone(), entry);
        debug!("registered {session_id} ({} active)", sessions.len());

        (session_id, close_rx)
    }

    /// Update a session's lifecycle state. No-op if the session is gone.
    pub fn set_state(&self, session_id: &str, state: SessionState) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.state = state;
        }
    }

    /// Remove a session. Returns whether an entry was actually present,
    /// so callers can treat repeated cleanup as a no-op.
    pub fn remove(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap();
        let removed = sessions.remove(session_id).is_some();
        if removed {
            debug!("removed {session_id} ({} active)", sessions.len());
        }
        removed
    }

    /// Number of registered sessions.
    pub fn count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Snapshot of all registered sessions for diagnostics.
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .iter()
            .map(|(id, entry)| SessionSnapshot {
                session_id: id.clone(),
                target: entry.target.clone(),
                is_active: entry.state.is_active(),
                start_time: entry
                    .started_at
                    .format(&Rfc3339)
                    .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z")),
            })
            .collect()
    }

    /// Signal every session to clean up and clear the registry.
    ///
    /// Completes even when individual sessions fail to acknowledge; a
    /// session that later tries to remove itself finds nothing, which is
    /// fine.
    pub fn shutdown(&self) {
        let mut sessions = self.sessions.lock().unwrap();
        info!("shutting down {} active session(s)", sessions.len());
        for (id, entry) in sessions.iter() {
            if entry.close_tx.send(true).is_err() {
                warn!("session {id} was already gone at shutdown");
            }
        }
        sessions.clear();
    }

    fn next_session_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let millis = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as u64;
        format!("sess-{n}-{millis:x}")
    }
}
