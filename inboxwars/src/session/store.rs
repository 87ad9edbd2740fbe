//! Session storage port.
//!
//! The engine never holds a session across calls; every operation looks its
//! room up again and mutates it inside one synchronous [`update`] closure,
//! so two operations on the same room cannot interleave mid-mutation.
//!
//! [`update`]: SessionStoreExt::update

use dashmap::DashMap;

use super::Session;

/// Synchronous keyed storage for sessions.
pub trait SessionStore: Send + Sync {
    /// Returns a snapshot of the session for `room`.
    fn get(&self, room: &str) -> Option<Session>;

    /// Inserts or replaces a session.
    fn insert(&self, session: Session);

    /// Removes a session, returning it.
    fn remove(&self, room: &str) -> Option<Session>;

    /// Runs `f` against the stored session under exclusive access.
    ///
    /// Returns `false` when the room does not exist.
    fn with_session(&self, room: &str, f: &mut dyn FnMut(&mut Session)) -> bool;

    /// Identifiers of all stored rooms.
    fn rooms(&self) -> Vec<String>;
}

/// Typed helpers over [`SessionStore`].
pub trait SessionStoreExt: SessionStore {
    /// Runs `f` against the session and returns its result, or `None` when
    /// the room does not exist.
    fn update<R>(&self, room: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut f = Some(f);
        let mut out = None;
        self.with_session(room, &mut |session| {
            if let Some(f) = f.take() {
                out = Some(f(session));
            }
        });
        out
    }

    /// Reads from the session without cloning it.
    fn read<R>(&self, room: &str, f: impl FnOnce(&Session) -> R) -> Option<R> {
        self.update(room, |session| f(session))
    }
}

impl<T: SessionStore + ?Sized> SessionStoreExt for T {}

/// In-process store backed by a sharded concurrent map.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, Session>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, room: &str) -> Option<Session> {
        self.sessions.get(room).map(|s| s.value().clone())
    }

    fn insert(&self, session: Session) {
        self.sessions.insert(session.room_id.clone(), session);
    }

    fn remove(&self, room: &str) -> Option<Session> {
        self.sessions.remove(room).map(|(_, s)| s)
    }

    fn with_session(&self, room: &str, f: &mut dyn FnMut(&mut Session)) -> bool {
        match self.sessions.get_mut(room) {
            Some(mut entry) => {
                f(entry.value_mut());
                true
            }
            None => false,
        }
    }

    fn rooms(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }
}
