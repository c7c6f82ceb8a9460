//! Persistence Seams
//!
//! Two collaborator traits the server consumes off the hot path:
//!
//! - [`SnapshotStore`]: durable JSON snapshots of finished or saved
//!   sessions, upsert-by-id.
//! - [`ActiveSessionStore`]: an ephemeral player-to-session pointer
//!   used only as a reconnect hint. It must degrade to a no-op when
//!   the backing store is unavailable; correctness never depends on
//!   it.
//!
//! The in-memory implementations back tests and single-node deploys;
//! a database-backed implementation can be swapped in behind the same
//! traits.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde_json::Value;
use thiserror::Error;

use crate::game::PlayerId;
use crate::network::session::SessionId;

/// Storage failures.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store rejected or lost the operation.
    #[error("storage backend error: {0}")]
    Backend(String),
    /// Snapshot payload could not be encoded or decoded.
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable session snapshots, upsert-by-id.
pub trait SnapshotStore: Send + Sync {
    /// Save (or overwrite) a session snapshot.
    fn save(&self, session_id: SessionId, snapshot: Value) -> Result<(), StorageError>;

    /// Load a snapshot, if one was saved.
    fn load(&self, session_id: SessionId) -> Result<Option<Value>, StorageError>;
}

/// Ephemeral player-to-session pointer, reconnect hint only.
pub trait ActiveSessionStore: Send + Sync {
    /// Point a player at a session, or clear the pointer with `None`.
    fn set_active_session(&self, player: PlayerId, session: Option<SessionId>);

    /// The session a player was last pointed at, if any.
    fn get_active_session(&self, player: PlayerId) -> Option<SessionId>;
}

/// In-memory snapshot store.
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<BTreeMap<SessionId, Value>>,
}

impl MemorySnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, session_id: SessionId, snapshot: Value) -> Result<(), StorageError> {
        let mut snapshots = self
            .snapshots
            .write()
            .map_err(|_| StorageError::Backend("snapshot lock poisoned".into()))?;
        snapshots.insert(session_id, snapshot);
        Ok(())
    }

    fn load(&self, session_id: SessionId) -> Result<Option<Value>, StorageError> {
        let snapshots = self
            .snapshots
            .read()
            .map_err(|_| StorageError::Backend("snapshot lock poisoned".into()))?;
        Ok(snapshots.get(&session_id).cloned())
    }
}

/// In-memory active-session pointer store.
#[derive(Default)]
pub struct MemoryActiveSessionStore {
    pointers: RwLock<BTreeMap<PlayerId, SessionId>>,
}

impl MemoryActiveSessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActiveSessionStore for MemoryActiveSessionStore {
    fn set_active_session(&self, player: PlayerId, session: Option<SessionId>) {
        // A poisoned lock degrades to a no-op, like a lost backend.
        let Ok(mut pointers) = self.pointers.write() else {
            return;
        };
        match session {
            Some(id) => {
                pointers.insert(player, id);
            }
            None => {
                pointers.remove(&player);
            }
        }
    }

    fn get_active_session(&self, player: PlayerId) -> Option<SessionId> {
        self.pointers.read().ok()?.get(&player).copied()
    }
}

/// Pointer store that remembers nothing. Stands in when no ephemeral
/// backend is configured.
#[derive(Default)]
pub struct NoopActiveSessionStore;

impl ActiveSessionStore for NoopActiveSessionStore {
    fn set_active_session(&self, _player: PlayerId, _session: Option<SessionId>) {}

    fn get_active_session(&self, _player: PlayerId) -> Option<SessionId> {
        None
    }
}
