//! Round engine.
//!
//! [`RoundEngine`] drives every room through its rounds: phase
//! transitions, the planning countdown and auto-lock, lock-ins, and the
//! resolution pipeline (calculate, record, apply, report, review). Each
//! operation looks the room up again and performs its mutation inside a
//! single store update; broadcasts go out after the update returns.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use inboxwars_core::config::{FilteringLevel, GameConfig};

use crate::broadcast::{BroadcastMessage, Broadcaster, EspMetrics};
use crate::clock::Clock;
use crate::error::{ActionError, ApplyError, PhaseError, ResolutionError};
use crate::incident::{IncidentHook, NoopIncidentHook};
use crate::investigation;
use crate::lockin::{self, LockInReceipt};
use crate::observability::metrics;
use crate::phase::{GamePhase, PhaseChange, PhaseMachine, RoundTimer, TimerAction, TimerTracker};
use crate::resolution::{ApplySummary, ResolutionResult, apply, calculate};
use crate::session::{
    HistoryEntry, OnboardingChoice, Session, SessionStore, SessionStoreExt,
};

/// Interval between timer checks.
const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// What [`RoundEngine::resolve_round`] did.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    /// Round resolved
    pub round: u32,
    /// Whether a new history entry was written
    pub recorded: bool,
    /// Result on record for the round
    pub result: ResolutionResult,
    /// Totals applied to the session
    pub applied: Option<ApplySummary>,
    /// First failure while applying, if any
    pub apply_error: Option<ApplyError>,
}

struct Resolved {
    outcome: RoundOutcome,
    dashboards: Vec<BroadcastMessage>,
}

/// Drives rooms through the round lifecycle.
pub struct RoundEngine {
    config: Arc<GameConfig>,
    store: Arc<dyn SessionStore>,
    broadcaster: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
    machine: PhaseMachine,
    timers: TimerTracker,
    cancel: CancellationToken,
}

impl RoundEngine {
    /// Creates an engine over `store` that reports to `broadcaster`.
    #[must_use]
    pub fn new(
        config: Arc<GameConfig>,
        store: Arc<dyn SessionStore>,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let machine = PhaseMachine::new(
            config.rounds.mandatory_policy_round,
            Arc::new(NoopIncidentHook),
        );
        let timers = TimerTracker::new(config.rounds.warning_threshold_secs);
        Self {
            config,
            store,
            broadcaster,
            clock,
            machine,
            timers,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the incident hook.
    #[must_use]
    pub fn with_incident_hook(mut self, hook: Arc<dyn IncidentHook>) -> Self {
        self.machine = PhaseMachine::new(self.config.rounds.mandatory_policy_round, hook);
        self
    }

    /// Game configuration.
    #[must_use]
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Timer markers.
    #[must_use]
    pub const fn timers(&self) -> &TimerTracker {
        &self.timers
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Stores a new session, replacing any with the same room id.
    pub fn create_session(&self, session: Session) {
        info!(room = %session.room_id, teams = session.esp_teams.len(), destinations = session.destinations.len(), "session created");
        self.timers.forget(&session.room_id);
        self.store.insert(session);
        metrics::set_sessions_active(self.store.rooms().len());
    }

    /// Removes a session.
    pub fn remove_session(&self, room: &str) -> Option<Session> {
        self.timers.forget(room);
        let removed = self.store.remove(room);
        metrics::set_sessions_active(self.store.rooms().len());
        removed
    }

    /// Copy of a session.
    #[must_use]
    pub fn snapshot(&self, room: &str) -> Option<Session> {
        self.store.get(room)
    }

    // ------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------

    /// Moves a room to `to` and broadcasts the transition.
    ///
    /// Entering planning resets the room's timer markers.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError`] for unknown rooms and disallowed edges.
    pub fn transition(&self, room: &str, to: GamePhase) -> Result<PhaseChange, PhaseError> {
        let now = self.clock.now();
        let (change, history, latest) = self
            .store
            .update(room, |session| {
                self.machine.transition(session, to, now).map(|change| {
                    (
                        change,
                        session.history.clone().unwrap_or_default(),
                        session.latest_result().cloned(),
                    )
                })
            })
            .ok_or_else(|| PhaseError::RoomNotFound(room.to_string()))??;

        if change.entered_planning() {
            self.timers.reset(room, GamePhase::Planning, change.round);
        }
        self.broadcaster.broadcast(
            room,
            &BroadcastMessage::PhaseTransition {
                phase: change.to,
                round: change.round,
                message: change.message(),
                history,
                latest,
            },
        );
        Ok(change)
    }

    /// Leaves the lobby.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError`] unless the room is in the lobby.
    pub fn begin_game(&self, room: &str) -> Result<PhaseChange, PhaseError> {
        self.transition(room, GamePhase::ResourceAllocation)
    }

    /// Starts a planning phase with the configured countdown.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError`] unless the room is in resource allocation or
    /// consequences.
    pub fn begin_planning(&self, room: &str) -> Result<PhaseChange, PhaseError> {
        let change = self.transition(room, GamePhase::Planning)?;
        if let Err(err) = self.start_timer(room, self.config.rounds.planning_duration_secs) {
            warn!(room, error = %err, "planning began without a countdown");
        }
        Ok(change)
    }

    /// Leaves consequences: the next planning phase, or finished after the
    /// last round.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError`] unless the room is in consequences.
    pub fn advance_from_consequences(&self, room: &str) -> Result<PhaseChange, PhaseError> {
        let next = self
            .store
            .read(room, PhaseMachine::next_after_consequences)
            .ok_or_else(|| PhaseError::RoomNotFound(room.to_string()))?;
        if next == GamePhase::Planning {
            self.begin_planning(room)
        } else {
            self.transition(room, next)
        }
    }

    // ------------------------------------------------------------------
    // Timer
    // ------------------------------------------------------------------

    /// Starts the planning countdown.
    ///
    /// # Errors
    ///
    /// Rejects durations outside `1..=max_timer_secs` and rooms not in
    /// planning.
    pub fn start_timer(&self, room: &str, duration_secs: u64) -> Result<(), ActionError> {
        let max = self.config.rounds.max_timer_secs;
        if duration_secs == 0 || duration_secs > max {
            return Err(ActionError::InvalidTimerDuration {
                requested: duration_secs,
                max,
            });
        }
        let round = self.act(room, |session, now| {
            session.require_phase(GamePhase::Planning)?;
            session.timer = Some(RoundTimer::start(duration_secs, now));
            Ok(session.round)
        })?;
        // Markers belong to the planning phase, not to one countdown.
        info!(room, round, duration_secs, "planning timer started");
        Ok(())
    }

    /// Stops the countdown, freezing the remaining time.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::RoomNotFound`] for unknown rooms.
    pub fn stop_timer(&self, room: &str) -> Result<(), ActionError> {
        self.act(room, |session, now| {
            if let Some(timer) = session.timer.as_mut() {
                timer.stop(now);
            }
            Ok(())
        })?;
        debug!(room, "planning timer stopped");
        Ok(())
    }

    /// Checks one room's countdown: warns once near the end and auto-locks
    /// once at zero.
    pub fn tick(self: &Arc<Self>, room: &str) {
        let now = self.clock.now();
        let action = self
            .store
            .read(room, |session| self.timers.evaluate(session, now))
            .unwrap_or(TimerAction::Idle);
        match action {
            TimerAction::Idle => {}
            TimerAction::Warn { seconds_remaining } => {
                info!(room, seconds_remaining, "auto-lock warning");
                self.broadcaster.broadcast(
                    room,
                    &BroadcastMessage::AutoLockWarning { seconds_remaining },
                );
            }
            TimerAction::Expire => {
                info!(room, "planning timer expired");
                self.expire(room, now);
            }
        }
    }

    /// Ticks every stored room.
    pub fn tick_all(self: &Arc<Self>) {
        for room in self.store.rooms() {
            self.tick(&room);
        }
    }

    /// Ends planning now as if the countdown had run out.
    ///
    /// Returns `false` when the room is not in planning or the round was
    /// already closed.
    pub fn force_expiry(self: &Arc<Self>, room: &str) -> bool {
        let claimed = self.claim_close(room);
        if claimed {
            self.expire(room, self.clock.now());
        }
        claimed
    }

    /// Spawns the background task that ticks every room until
    /// [`shutdown`](Self::shutdown).
    pub fn start_timer_task(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                tokio::select! {
                    () = engine.cancel.cancelled() => {
                        debug!("timer task cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        engine.tick_all();
                    }
                }
            }
        })
    }

    /// Stops the timer task and any pending review transitions.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn claim_close(&self, room: &str) -> bool {
        self.store
            .read(room, |session| {
                session.phase == GamePhase::Planning && self.timers.claim_expiry(session)
            })
            .unwrap_or(false)
    }

    fn expire(self: &Arc<Self>, room: &str, now: DateTime<Utc>) {
        let receipts = self
            .store
            .update(room, |session| lockin::auto_lock_all(session, &self.config, now))
            .unwrap_or_default();
        metrics::record_auto_locks(receipts.len());
        for receipt in &receipts {
            metrics::record_auto_corrections(receipt.corrections.len());
            self.announce_lock(room, receipt);
        }
        self.close_planning(room);
    }

    fn close_planning(self: &Arc<Self>, room: &str) {
        match self.transition(room, GamePhase::Resolution) {
            Ok(_) => {
                if let Err(err) = self.handle_resolution(room) {
                    debug!(room, error = %err, "round left in resolution");
                }
            }
            Err(err) => warn!(room, error = %err, "could not enter resolution"),
        }
    }

    // ------------------------------------------------------------------
    // Player actions
    // ------------------------------------------------------------------

    fn act<R>(
        &self,
        room: &str,
        f: impl FnOnce(&mut Session, DateTime<Utc>) -> Result<R, ActionError>,
    ) -> Result<R, ActionError> {
        let now = self.clock.now();
        self.store
            .update(room, |session| f(session, now))
            .ok_or_else(|| ActionError::RoomNotFound(room.to_string()))?
    }

    /// Chooses onboarding add-ons for a client.
    ///
    /// # Errors
    ///
    /// See [`lockin::set_onboarding`].
    pub fn set_onboarding(
        &self,
        room: &str,
        team: &str,
        client: &str,
        choice: OnboardingChoice,
    ) -> Result<(), ActionError> {
        self.act(room, |s, _| lockin::set_onboarding(s, team, client, choice))
    }

    /// Acquires a catalog client.
    ///
    /// # Errors
    ///
    /// See [`lockin::acquire_client`].
    pub fn acquire_client(&self, room: &str, team: &str, client: &str) -> Result<(), ActionError> {
        self.act(room, |s, _| lockin::acquire_client(s, team, client, &self.config))
    }

    /// Pauses a client.
    ///
    /// # Errors
    ///
    /// See [`lockin::pause_client`].
    pub fn pause_client(&self, room: &str, team: &str, client: &str) -> Result<(), ActionError> {
        self.act(room, |s, _| lockin::pause_client(s, team, client))
    }

    /// Resumes a paused client.
    ///
    /// # Errors
    ///
    /// See [`lockin::resume_client`].
    pub fn resume_client(&self, room: &str, team: &str, client: &str) -> Result<(), ActionError> {
        self.act(room, |s, _| lockin::resume_client(s, team, client))
    }

    /// Sets a destination's filtering for one ESP.
    ///
    /// # Errors
    ///
    /// See [`lockin::set_filtering`].
    pub fn set_filtering(
        &self,
        room: &str,
        destination: &str,
        esp: &str,
        level: FilteringLevel,
    ) -> Result<(), ActionError> {
        self.act(room, |s, _| {
            lockin::set_filtering(s, destination, esp, level, &self.config)
        })
    }

    /// Buys a spam-trap network.
    ///
    /// # Errors
    ///
    /// See [`lockin::purchase_spam_trap`].
    pub fn purchase_spam_trap(
        &self,
        room: &str,
        destination: &str,
        announced: bool,
    ) -> Result<(), ActionError> {
        self.act(room, |s, _| {
            lockin::purchase_spam_trap(s, destination, announced, &self.config)
        })
    }

    /// Casts or replaces an investigation vote.
    ///
    /// # Errors
    ///
    /// See [`investigation::cast_vote`].
    pub fn cast_vote(&self, room: &str, destination: &str, target: &str) -> Result<(), ActionError> {
        self.act(room, |s, now| {
            investigation::cast_vote(s, destination, target, &self.config, now)
        })
    }

    /// Withdraws an investigation vote; returns whether one existed.
    ///
    /// # Errors
    ///
    /// See [`investigation::remove_vote`].
    pub fn remove_vote(&self, room: &str, destination: &str) -> Result<bool, ActionError> {
        self.act(room, |s, _| investigation::remove_vote(s, destination))
    }

    /// Locks an ESP team in. The last lock-in of the round closes planning
    /// and resolves the round.
    ///
    /// # Errors
    ///
    /// See [`lockin::lock_in_team`].
    pub fn lock_in_team(self: &Arc<Self>, room: &str, team: &str) -> Result<LockInReceipt, ActionError> {
        let receipt = self.act(room, |s, now| lockin::lock_in_team(s, team, &self.config, now))?;
        metrics::record_auto_corrections(receipt.corrections.len());
        self.after_lock(room, &receipt);
        Ok(receipt)
    }

    /// Locks a destination in. The last lock-in of the round closes
    /// planning and resolves the round.
    ///
    /// # Errors
    ///
    /// See [`lockin::lock_in_destination`].
    pub fn lock_in_destination(
        self: &Arc<Self>,
        room: &str,
        destination: &str,
    ) -> Result<LockInReceipt, ActionError> {
        let receipt = self.act(room, |s, now| {
            lockin::lock_in_destination(s, destination, &self.config, now)
        })?;
        self.after_lock(room, &receipt);
        Ok(receipt)
    }

    fn after_lock(self: &Arc<Self>, room: &str, receipt: &LockInReceipt) {
        self.announce_lock(room, receipt);
        if receipt.all_locked() && self.claim_close(room) {
            info!(room, "all participants locked in");
            self.close_planning(room);
        }
    }

    fn announce_lock(&self, room: &str, receipt: &LockInReceipt) {
        self.broadcaster.broadcast(
            room,
            &BroadcastMessage::LockConfirmed {
                participant: receipt.participant.clone(),
                side: receipt.side,
                locked_at: receipt.locked_at,
                automatic: receipt.automatic,
            },
        );
        self.broadcaster.broadcast(
            room,
            &BroadcastMessage::RemainingPlayers {
                remaining: receipt.remaining,
                total: receipt.total,
                all_locked: receipt.all_locked(),
            },
        );
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Resolves the room's current round and schedules the move into
    /// consequences.
    ///
    /// # Errors
    ///
    /// Returns the [`ResolutionError`] from [`resolve_round`](Self::resolve_round);
    /// the room then stays in resolution.
    pub fn handle_resolution(self: &Arc<Self>, room: &str) -> Result<RoundOutcome, ResolutionError> {
        let outcome = self.resolve_round(room)?;
        if outcome.recorded {
            self.schedule_review(room);
        }
        Ok(outcome)
    }

    /// Re-runs a round whose calculation failed.
    ///
    /// # Errors
    ///
    /// Returns the [`ResolutionError`] if the calculation fails again.
    pub fn retry_resolution(self: &Arc<Self>, room: &str) -> Result<RoundOutcome, ResolutionError> {
        info!(room, "retrying round resolution");
        self.handle_resolution(room)
    }

    /// Calculates, records and applies the current round.
    ///
    /// A round already in history is not recalculated. A failed
    /// calculation writes nothing. A failed application is logged; the
    /// history entry stays and dashboards are not sent.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`] for unknown rooms, rooms outside
    /// resolution and calculation faults.
    pub fn resolve_round(&self, room: &str) -> Result<RoundOutcome, ResolutionError> {
        let now = self.clock.now();
        let started = Instant::now();
        let resolved = self
            .store
            .update(room, |session| self.resolve_locked(session, now))
            .ok_or_else(|| ResolutionError::RoomNotFound(room.to_string()))?;

        let Resolved {
            outcome,
            dashboards,
        } = match resolved {
            Ok(resolved) => resolved,
            Err(err) => {
                error!(room, error = %err, "round calculation failed, round not advanced");
                metrics::record_resolution_failure();
                return Err(err);
            }
        };

        if !outcome.recorded {
            debug!(room, round = outcome.round, "round already recorded");
            return Ok(outcome);
        }

        metrics::record_round_resolved(started.elapsed());
        let hits = outcome
            .result
            .esp_results
            .values()
            .map(|r| r.spam_trap.hit_destinations.len())
            .sum();
        metrics::record_spam_trap_hits(hits);
        if let Some(report) = &outcome.result.investigation {
            metrics::record_investigation(report.suspended.is_some());
        }
        if let Some(err) = &outcome.apply_error {
            warn!(room, round = outcome.round, error = %err, "round result partly applied, dashboards skipped");
            metrics::record_apply_failure();
        }
        for message in &dashboards {
            self.broadcaster.broadcast(room, message);
        }

        info!(room, round = outcome.round, "round resolved");
        Ok(outcome)
    }

    fn resolve_locked(
        &self,
        session: &mut Session,
        now: DateTime<Utc>,
    ) -> Result<Resolved, ResolutionError> {
        if session.phase != GamePhase::Resolution {
            return Err(ResolutionError::WrongPhase(session.phase));
        }
        let round = session.round;
        if let Some(existing) = session
            .history
            .as_ref()
            .and_then(|h| h.iter().find(|e| e.round == round))
        {
            return Ok(Resolved {
                outcome: RoundOutcome {
                    round,
                    recorded: false,
                    result: existing.result.clone(),
                    applied: None,
                    apply_error: None,
                },
                dashboards: Vec::new(),
            });
        }

        let result = calculate(session, &self.config)?;
        Ok(self.record_and_apply(session, result, now))
    }

    fn record_and_apply(
        &self,
        session: &mut Session,
        result: ResolutionResult,
        now: DateTime<Utc>,
    ) -> Resolved {
        let round = result.round;
        session.append_history(HistoryEntry {
            round,
            result: result.clone(),
            recorded_at: now,
        });

        let (applied, apply_error, dashboards) = match apply(session, &result, &self.config) {
            Ok(summary) => (Some(summary), None, self.dashboards(session, &result)),
            Err(err) => (None, Some(err), Vec::new()),
        };

        Resolved {
            outcome: RoundOutcome {
                round,
                recorded: true,
                result,
                applied,
                apply_error,
            },
            dashboards,
        }
    }

    fn dashboards(&self, session: &Session, result: &ResolutionResult) -> Vec<BroadcastMessage> {
        let baseline = self.config.reputation.neutral_baseline;
        let mut messages: Vec<BroadcastMessage> = session
            .esp_teams
            .iter()
            .map(|team| BroadcastMessage::EspDashboard {
                team: team.name.clone(),
                credits: team.credits,
                reputation: team.reputation.clone(),
            })
            .collect();

        for destination in &session.destinations {
            let esp_metrics: IndexMap<String, EspMetrics> = session
                .esp_teams
                .iter()
                .map(|team| {
                    let esp = result.esp_results.get(&team.name);
                    let volume = esp
                        .and_then(|r| r.volume.per_destination.get(&destination.name))
                        .copied()
                        .unwrap_or(0);
                    let delivery_rate = esp
                        .and_then(|r| r.deliveries.get(&destination.name))
                        .map_or(0.0, |d| d.final_rate);
                    (
                        team.name.clone(),
                        EspMetrics {
                            volume,
                            delivery_rate,
                            reputation: team.reputation_at(&destination.name, baseline),
                            spam_trap_hit: result.spam_trap_hit(&team.name, &destination.name),
                        },
                    )
                })
                .collect();
            messages.push(BroadcastMessage::DestinationDashboard {
                destination: destination.name.clone(),
                budget: destination.budget,
                owned_tools: destination.owned_tools.clone(),
                esp_metrics,
            });
        }
        messages
    }

    fn schedule_review(self: &Arc<Self>, room: &str) {
        let delay = self.config.rounds.review_delay_ms;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) if delay > 0 => {
                let engine = Arc::clone(self);
                let room = room.to_string();
                handle.spawn(async move {
                    tokio::select! {
                        () = engine.cancel.cancelled() => {
                            debug!(room = %room, "review transition cancelled");
                        }
                        () = tokio::time::sleep(Duration::from_millis(delay)) => {
                            engine.complete_review(&room);
                        }
                    }
                });
            }
            _ => {
                self.complete_review(room);
            }
        }
    }

    /// Moves a resolved room into consequences.
    ///
    /// Returns `None` and logs when the room has already left resolution.
    pub fn complete_review(&self, room: &str) -> Option<PhaseChange> {
        match self.transition(room, GamePhase::Consequences) {
            Ok(change) => Some(change),
            Err(err) => {
                warn!(room, error = %err, "review transition rejected");
                None
            }
        }
    }
}
