//! Planning countdown.
//!
//! The timer stores only its duration and start time. Remaining time is
//! recomputed from the clock on every check, so delayed or skipped ticks
//! cannot drift it and a stale cached value is never trusted. The markers
//! in [`TimerTracker`] make the warning and the expiry actions fire at most
//! once per planning phase even if expiry is observed repeatedly.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::session::Session;

use super::machine::GamePhase;

/// Authoritative countdown for one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundTimer {
    /// Length of the countdown in seconds
    pub duration_secs: u64,
    /// When the countdown started
    pub started_at: DateTime<Utc>,
    /// Whether the countdown is live
    pub is_running: bool,
    /// Remaining seconds captured when the timer was stopped
    frozen_remaining: Option<u64>,
}

impl RoundTimer {
    /// Starts a countdown at `now`.
    #[must_use]
    pub const fn start(duration_secs: u64, now: DateTime<Utc>) -> Self {
        Self {
            duration_secs,
            started_at: now,
            is_running: true,
            frozen_remaining: None,
        }
    }

    /// Seconds left: `duration - floor(elapsed_ms / 1000)`, never negative.
    ///
    /// A stopped timer reports the value frozen when it was stopped.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> u64 {
        if !self.is_running {
            return self.frozen_remaining.unwrap_or(0);
        }
        let elapsed_ms = (now - self.started_at).num_milliseconds().max(0);
        let elapsed_secs = u64::try_from(elapsed_ms / 1000).unwrap_or(u64::MAX);
        self.duration_secs.saturating_sub(elapsed_secs)
    }

    /// Whether a running countdown has reached zero.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_running && self.remaining(now) == 0
    }

    /// Freezes the remaining time and stops the countdown. Idempotent.
    pub fn stop(&mut self, now: DateTime<Utc>) {
        if self.is_running {
            self.frozen_remaining = Some(self.remaining(now));
            self.is_running = false;
        }
    }
}

/// Per-room record of which timer actions already fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerMarkers {
    /// Phase the markers belong to
    pub phase: GamePhase,
    /// Round the markers belong to
    pub round: u32,
    /// Whether the auto-lock warning was broadcast
    pub warning_sent: bool,
    /// Whether expiry (auto-lock and resolution) was claimed
    pub expiry_claimed: bool,
}

impl TimerMarkers {
    const fn fresh(phase: GamePhase, round: u32) -> Self {
        Self {
            phase,
            round,
            warning_sent: false,
            expiry_claimed: false,
        }
    }
}

/// What a tick should do for a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAction {
    /// Nothing due
    Idle,
    /// Broadcast the auto-lock warning
    Warn {
        /// Seconds left on the clock
        seconds_remaining: u64,
    },
    /// Auto-lock everyone and resolve the round
    Expire,
}

/// Owns the per-room markers.
#[derive(Debug)]
pub struct TimerTracker {
    markers: DashMap<String, TimerMarkers>,
    warning_threshold_secs: u64,
}

impl TimerTracker {
    /// Creates a tracker that warns at `warning_threshold_secs` remaining.
    #[must_use]
    pub fn new(warning_threshold_secs: u64) -> Self {
        Self {
            markers: DashMap::new(),
            warning_threshold_secs,
        }
    }

    /// Resets the markers for a phase that just began.
    pub fn reset(&self, room: &str, phase: GamePhase, round: u32) {
        debug!(room, %phase, round, "timer markers reset");
        self.markers
            .insert(room.to_string(), TimerMarkers::fresh(phase, round));
    }

    /// Forgets a room entirely.
    pub fn forget(&self, room: &str) {
        self.markers.remove(room);
    }

    /// Current markers for a room.
    #[must_use]
    pub fn markers(&self, room: &str) -> Option<TimerMarkers> {
        self.markers.get(room).map(|m| *m)
    }

    /// Decides what a tick should do and records it so it is not repeated.
    #[must_use]
    pub fn evaluate(&self, session: &Session, now: DateTime<Utc>) -> TimerAction {
        if session.phase != GamePhase::Planning {
            return TimerAction::Idle;
        }
        let Some(timer) = session.timer.as_ref().filter(|t| t.is_running) else {
            return TimerAction::Idle;
        };
        let remaining = timer.remaining(now);

        let mut entry = self
            .markers
            .entry(session.room_id.clone())
            .or_insert_with(|| TimerMarkers::fresh(session.phase, session.round));
        if entry.phase != session.phase || entry.round != session.round {
            *entry = TimerMarkers::fresh(session.phase, session.round);
        }

        if remaining == 0 {
            if entry.expiry_claimed {
                return TimerAction::Idle;
            }
            entry.expiry_claimed = true;
            entry.warning_sent = true;
            return TimerAction::Expire;
        }

        if remaining <= self.warning_threshold_secs && !entry.warning_sent {
            entry.warning_sent = true;
            return TimerAction::Warn {
                seconds_remaining: remaining,
            };
        }

        TimerAction::Idle
    }

    /// Claims expiry for the room's current planning phase without waiting
    /// for the clock. Returns `false` if it was already claimed.
    pub fn claim_expiry(&self, session: &Session) -> bool {
        let mut entry = self
            .markers
            .entry(session.room_id.clone())
            .or_insert_with(|| TimerMarkers::fresh(session.phase, session.round));
        if entry.phase != session.phase || entry.round != session.round {
            *entry = TimerMarkers::fresh(session.phase, session.round);
        }
        if entry.expiry_claimed {
            return false;
        }
        entry.expiry_claimed = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn planning_session(duration: u64, now: DateTime<Utc>) -> Session {
        let mut session = Session::new("room", 4);
        session.phase = GamePhase::Planning;
        session.round = 1;
        session.timer = Some(RoundTimer::start(duration, now));
        session
    }

    #[test]
    fn remaining_floors_elapsed_seconds() {
        let t0 = Utc::now();
        let timer = RoundTimer::start(60, t0);
        assert_eq!(timer.remaining(t0), 60);
        assert_eq!(timer.remaining(t0 + TimeDelta::milliseconds(999)), 60);
        assert_eq!(timer.remaining(t0 + TimeDelta::milliseconds(1000)), 59);
        assert_eq!(timer.remaining(t0 + TimeDelta::seconds(75)), 0);
    }

    #[test]
    fn remaining_ignores_clock_going_backwards() {
        let t0 = Utc::now();
        let timer = RoundTimer::start(60, t0);
        assert_eq!(timer.remaining(t0 - TimeDelta::seconds(30)), 60);
    }

    #[test]
    fn stop_freezes_remaining() {
        let t0 = Utc::now();
        let mut timer = RoundTimer::start(60, t0);
        timer.stop(t0 + TimeDelta::seconds(20));
        assert!(!timer.is_running);
        assert_eq!(timer.remaining(t0 + TimeDelta::seconds(500)), 40);
        assert!(!timer.is_expired(t0 + TimeDelta::seconds(500)));
        timer.stop(t0 + TimeDelta::seconds(50));
        assert_eq!(timer.remaining(t0), 40);
    }

    #[test]
    fn warning_fires_once_then_expiry_once() {
        let t0 = Utc::now();
        let tracker = TimerTracker::new(15);
        let session = planning_session(30, t0);

        assert_eq!(tracker.evaluate(&session, t0), TimerAction::Idle);
        assert_eq!(
            tracker.evaluate(&session, t0 + TimeDelta::seconds(16)),
            TimerAction::Warn {
                seconds_remaining: 14
            }
        );
        assert_eq!(
            tracker.evaluate(&session, t0 + TimeDelta::seconds(17)),
            TimerAction::Idle
        );
        assert_eq!(
            tracker.evaluate(&session, t0 + TimeDelta::seconds(30)),
            TimerAction::Expire
        );
        assert_eq!(
            tracker.evaluate(&session, t0 + TimeDelta::seconds(31)),
            TimerAction::Idle
        );
    }

    #[test]
    fn stopped_timer_never_expires() {
        let t0 = Utc::now();
        let tracker = TimerTracker::new(15);
        let mut session = planning_session(30, t0);
        session.timer.as_mut().unwrap().stop(t0 + TimeDelta::seconds(5));
        assert_eq!(
            tracker.evaluate(&session, t0 + TimeDelta::seconds(90)),
            TimerAction::Idle
        );
    }

    #[test]
    fn idle_outside_planning() {
        let t0 = Utc::now();
        let tracker = TimerTracker::new(15);
        let mut session = planning_session(30, t0);
        session.phase = GamePhase::Resolution;
        assert_eq!(
            tracker.evaluate(&session, t0 + TimeDelta::seconds(90)),
            TimerAction::Idle
        );
    }

    #[test]
    fn markers_reset_for_new_round() {
        let t0 = Utc::now();
        let tracker = TimerTracker::new(15);
        let mut session = planning_session(10, t0);
        assert_eq!(
            tracker.evaluate(&session, t0 + TimeDelta::seconds(10)),
            TimerAction::Expire
        );

        session.round = 2;
        session.timer = Some(RoundTimer::start(10, t0));
        tracker.reset("room", GamePhase::Planning, 2);
        assert_eq!(
            tracker.evaluate(&session, t0 + TimeDelta::seconds(10)),
            TimerAction::Expire
        );
    }

    #[test]
    fn claim_expiry_blocks_timer_expiry() {
        let t0 = Utc::now();
        let tracker = TimerTracker::new(15);
        let session = planning_session(10, t0);
        assert!(tracker.claim_expiry(&session));
        assert!(!tracker.claim_expiry(&session));
        assert_eq!(
            tracker.evaluate(&session, t0 + TimeDelta::seconds(10)),
            TimerAction::Idle
        );
    }
}
