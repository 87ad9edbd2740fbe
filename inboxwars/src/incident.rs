//! Incident port.
//!
//! Incident cards and their effects live outside the round engine. The
//! engine only schedules the one incident every game is guaranteed to see:
//! the mandatory policy change announced when planning begins in the
//! configured round.

use tracing::debug;

use crate::session::Session;

/// Receives scheduled incidents.
pub trait IncidentHook: Send + Sync {
    /// Applies the mandatory policy incident to the session.
    ///
    /// Called at most once per game, while the session is held exclusively.
    fn mandatory_policy(&self, session: &mut Session);
}

/// Hook that ignores every incident.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopIncidentHook;

impl IncidentHook for NoopIncidentHook {
    fn mandatory_policy(&self, session: &mut Session) {
        debug!(room = %session.room_id, round = session.round, "no incident handler installed");
    }
}
