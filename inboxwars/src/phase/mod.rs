//! Round phases and the planning timer.
//!
//! # Architecture
//!
//! - [`GamePhase`] / [`PhaseMachine`]: transition table, round counter, per-round resets
//! - [`RoundTimer`]: authoritative countdown recomputed from its start time
//! - [`TimerTracker`]: per-room markers that make the warning and the
//!   auto-lock fire at most once per planning phase

pub mod machine;
pub mod timer;

pub use machine::{GamePhase, PhaseChange, PhaseMachine};
pub use timer::{RoundTimer, TimerAction, TimerMarkers, TimerTracker};
