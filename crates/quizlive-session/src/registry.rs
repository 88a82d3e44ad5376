//! Session registry: the set of rooms with a running game, keyed by PIN.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use quizlive_protocol::RoomPin;

use crate::{RoomSession, SessionError};

/// Concurrent map from PIN to the live session of that room.
///
/// A PIN is present iff its room is running. Different PINs never contend
/// with each other beyond the map's shard locks.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<RoomPin, Arc<RoomSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a session under its PIN.
    ///
    /// # Errors
    /// [`SessionError::AlreadyRegistered`] if the PIN already has a session.
    pub fn register(&self, session: Arc<RoomSession>) -> Result<(), SessionError> {
        match self.sessions.entry(session.pin().clone()) {
            Entry::Occupied(entry) => Err(SessionError::AlreadyRegistered(entry.key().clone())),
            Entry::Vacant(entry) => {
                tracing::debug!(pin = %session.pin(), "session registered");
                entry.insert(session);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, pin: &RoomPin) -> Option<Arc<RoomSession>> {
        self.sessions.get(pin).map(|entry| Arc::clone(entry.value()))
    }

    /// Removes the entry only if it still points at `session`.
    ///
    /// Late callbacks of a finished game must not evict a newer session
    /// registered under the same PIN.
    pub fn deregister_if_same(&self, session: &Arc<RoomSession>) -> bool {
        self.sessions
            .remove_if(session.pin(), |_, current| Arc::ptr_eq(current, session))
            .is_some()
    }

    pub fn contains(&self, pin: &RoomPin) -> bool {
        self.sessions.contains_key(pin)
    }

    /// Snapshot of every registered PIN.
    pub fn pins(&self) -> HashSet<RoomPin> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Snapshot of every registered session.
    pub fn sessions(&self) -> Vec<Arc<RoomSession>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
