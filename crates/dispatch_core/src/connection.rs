//! Connection Registry: participant id → live session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dispatch_contracts::{ContractError, SessionMessage};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

/// Outbound half of a participant session. Text frames pushed here are
/// written to the participant by whatever transport owns the session.
pub type SessionSender = mpsc::UnboundedSender<String>;

/// Identifies one registration of a participant, so a stale session's
/// teardown can tell whether it still owns the registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("participant {0} is not connected")]
    NotConnected(String),
    #[error(transparent)]
    Encode(#[from] ContractError),
}

/// One live participant session.
#[derive(Debug, Clone)]
pub struct ParticipantConnection {
    pub participant_id: String,
    pub session_id: SessionId,
    pub registered_at: DateTime<Utc>,
    sender: SessionSender,
}

impl ParticipantConnection {
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Thread-safe participant → session map. Clones share the same map.
///
/// At most one session is registered per participant; [`ConnectionRegistry::add`]
/// replaces an existing entry and hands the evicted one back to the caller.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<Mutex<HashMap<String, ParticipantConnection>>>,
    next_session: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sender` as the live session of `participant_id`.
    ///
    /// Returns the new session id and the connection it replaced, if any. The
    /// replaced session is not closed here.
    pub fn add(
        &self,
        participant_id: &str,
        sender: SessionSender,
    ) -> (SessionId, Option<ParticipantConnection>) {
        let session_id = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        let connection = ParticipantConnection {
            participant_id: participant_id.to_string(),
            session_id,
            registered_at: Utc::now(),
            sender,
        };
        let evicted = self
            .connections
            .lock()
            .insert(participant_id.to_string(), connection);
        if evicted.is_some() {
            tracing::warn!(participant_id, "replaced an existing session");
        }
        (session_id, evicted)
    }

    pub fn remove(&self, participant_id: &str) -> Option<ParticipantConnection> {
        self.connections.lock().remove(participant_id)
    }

    /// Remove the entry only if it still belongs to `session_id`.
    pub fn remove_session(&self, participant_id: &str, session_id: SessionId) -> bool {
        let mut connections = self.connections.lock();
        let owns_entry = connections
            .get(participant_id)
            .is_some_and(|connection| connection.session_id == session_id);
        if owns_entry {
            connections.remove(participant_id);
        }
        owns_entry
    }

    /// Unicast a session message to `participant_id`.
    pub fn send(
        &self,
        participant_id: &str,
        message: &SessionMessage,
    ) -> Result<(), ConnectionError> {
        let text = message.to_text()?;
        self.send_text(participant_id, text)
    }

    pub fn send_text(&self, participant_id: &str, text: String) -> Result<(), ConnectionError> {
        let sender = self
            .connections
            .lock()
            .get(participant_id)
            .map(|connection| connection.sender.clone())
            .ok_or_else(|| ConnectionError::NotConnected(participant_id.to_string()))?;
        sender
            .send(text)
            .map_err(|_| ConnectionError::NotConnected(participant_id.to_string()))
    }

    pub fn is_connected(&self, participant_id: &str) -> bool {
        self.connections
            .lock()
            .get(participant_id)
            .is_some_and(|connection| !connection.is_closed())
    }

    pub fn get(&self, participant_id: &str) -> Option<ParticipantConnection> {
        self.connections.lock().get(participant_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
