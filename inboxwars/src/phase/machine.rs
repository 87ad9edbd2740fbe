//! Phase state machine.
//!
//! ```text
//! lobby -> resource_allocation -> planning -> resolution -> consequences
//!                                    ^                          |
//!                                    +--------------------------+--> finished
//! ```
//!
//! Any edge not in [`TRANSITIONS`] is rejected and the session is left as it
//! was.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PhaseError;
use crate::incident::IncidentHook;
use crate::session::Session;

/// Phase of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    /// Players are joining
    #[default]
    Lobby,
    /// Teams receive their starting resources
    ResourceAllocation,
    /// Teams make decisions against the clock
    Planning,
    /// The engine computes the round outcome
    Resolution,
    /// Teams review the outcome
    Consequences,
    /// The game is over
    Finished,
}

impl GamePhase {
    /// Wire name of the phase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lobby => "lobby",
            Self::ResourceAllocation => "resource_allocation",
            Self::Planning => "planning",
            Self::Resolution => "resolution",
            Self::Consequences => "consequences",
            Self::Finished => "finished",
        }
    }
}

impl std::fmt::Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every allowed edge.
pub const TRANSITIONS: &[(GamePhase, GamePhase)] = &[
    (GamePhase::Lobby, GamePhase::ResourceAllocation),
    (GamePhase::ResourceAllocation, GamePhase::Planning),
    (GamePhase::Planning, GamePhase::Resolution),
    (GamePhase::Resolution, GamePhase::Consequences),
    (GamePhase::Consequences, GamePhase::Planning),
    (GamePhase::Consequences, GamePhase::Finished),
];

/// Whether `from -> to` is in the transition table.
#[must_use]
pub fn can_transition(from: GamePhase, to: GamePhase) -> bool {
    TRANSITIONS.iter().any(|&(f, t)| f == from && t == to)
}

/// Record of a performed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseChange {
    /// Phase left
    pub from: GamePhase,
    /// Phase entered
    pub to: GamePhase,
    /// Round after the transition
    pub round: u32,
    /// Whether the mandatory policy incident fired on this transition
    pub mandatory_policy_fired: bool,
}

impl PhaseChange {
    /// Whether a new planning phase began.
    #[must_use]
    pub fn entered_planning(&self) -> bool {
        self.to == GamePhase::Planning
    }

    /// Player-facing summary of the transition.
    #[must_use]
    pub fn message(&self) -> String {
        match self.to {
            GamePhase::Lobby => "Waiting for players".to_string(),
            GamePhase::ResourceAllocation => "Allocating starting resources".to_string(),
            GamePhase::Planning => format!("Round {} planning has started", self.round),
            GamePhase::Resolution => format!("Resolving round {}", self.round),
            GamePhase::Consequences => format!("Round {} results are in", self.round),
            GamePhase::Finished => "The game is over".to_string(),
        }
    }
}

/// Validates and performs phase transitions.
pub struct PhaseMachine {
    mandatory_policy_round: Option<u32>,
    incidents: Arc<dyn IncidentHook>,
}

impl PhaseMachine {
    /// Creates a machine that fires the mandatory policy incident when
    /// planning begins in `mandatory_policy_round`.
    #[must_use]
    pub fn new(mandatory_policy_round: Option<u32>, incidents: Arc<dyn IncidentHook>) -> Self {
        Self {
            mandatory_policy_round,
            incidents,
        }
    }

    /// Moves `session` into `to`.
    ///
    /// Entering planning bumps the round (the first entry sets round 1) and
    /// clears every lock-in flag. Entering resolution or finished stops the
    /// timer as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::InvalidTransition`] when the edge is not allowed;
    /// the session is not modified.
    pub fn transition(
        &self,
        session: &mut Session,
        to: GamePhase,
        now: DateTime<Utc>,
    ) -> Result<PhaseChange, PhaseError> {
        let from = session.phase;
        if !can_transition(from, to) {
            debug!(room = %session.room_id, %from, %to, "rejected phase transition");
            return Err(PhaseError::InvalidTransition { from, to });
        }

        session.phase = to;
        let mut fired = false;

        match to {
            GamePhase::Planning => {
                session.round = if session.round == 0 { 1 } else { session.round + 1 };
                session.clear_locks();
                session.timer = None;
                fired = self.maybe_fire_mandatory_policy(session);
            }
            GamePhase::Resolution | GamePhase::Finished => {
                if let Some(timer) = session.timer.as_mut() {
                    timer.stop(now);
                }
            }
            _ => {}
        }

        info!(room = %session.room_id, %from, %to, round = session.round, "phase transition");
        crate::observability::metrics::record_phase_transition(to);

        Ok(PhaseChange {
            from,
            to,
            round: session.round,
            mandatory_policy_fired: fired,
        })
    }

    /// Phase that follows consequences: planning, or finished once the last
    /// round has been played.
    #[must_use]
    pub const fn next_after_consequences(session: &Session) -> GamePhase {
        if session.round >= session.total_rounds {
            GamePhase::Finished
        } else {
            GamePhase::Planning
        }
    }

    fn maybe_fire_mandatory_policy(&self, session: &mut Session) -> bool {
        if session.mandatory_policy_fired || self.mandatory_policy_round != Some(session.round) {
            return false;
        }
        session.mandatory_policy_fired = true;
        info!(room = %session.room_id, round = session.round, "mandatory policy incident fired");
        self.incidents.mandatory_policy(session);
        true
    }
}

impl std::fmt::Debug for PhaseMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseMachine")
            .field("mandatory_policy_round", &self.mandatory_policy_round)
            .finish_non_exhaustive()
    }
}
