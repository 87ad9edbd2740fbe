//! Scenario playback.
//!
//! Turns a [`ScenarioConfig`] into a seeded [`Session`] and replays its
//! per-round scripts through a [`RoundEngine`]: decisions are submitted as
//! player actions, every participant with players locks in, and anyone
//! left over is auto-locked as if the countdown had run out.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use inboxwars_core::config::{GameConfig, RoundScript, ScenarioConfig};

use crate::engine::RoundEngine;
use crate::error::{ActionError, ConfigError, InboxWarsError, ResolutionError};
use crate::lockin::SPAM_TRAP_TOOL;
use crate::phase::GamePhase;
use crate::session::{
    Destination, EspTeam, FilteringPolicy, OnboardingChoice, Session, SpamTrapNetwork,
};

/// Interval between checks while waiting for the review transition.
const REVIEW_POLL: Duration = Duration::from_millis(20);

/// Extra time allowed past the review delay before giving up.
const REVIEW_GRACE: Duration = Duration::from_secs(5);

/// Builds the starting session for a scenario.
///
/// Starting clients are owned but not yet onboarded; their onboarding is
/// committed at the team's first lock-in.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] when a team starts with a client
/// missing from the catalog.
pub fn build_session(scenario: &ScenarioConfig, config: &GameConfig) -> Result<Session, ConfigError> {
    let total_rounds = scenario
        .total_rounds
        .unwrap_or(config.rounds.total_rounds);
    let mut session = Session::new(scenario.room.clone(), total_rounds);
    session.rng_seed = scenario.seed;

    for setup in &scenario.esp_teams {
        let mut team = EspTeam::new(setup.name.clone(), setup.credits);
        team.players.clone_from(&setup.players);
        for client in &setup.clients {
            if config.client(client).is_none() {
                return Err(ConfigError::InvalidValue {
                    field: format!("esp_teams.{}.clients", setup.name),
                    value: client.clone(),
                    expected: "a client id from the catalog".to_string(),
                });
            }
            team.add_client(client.clone());
        }
        team.reputation = setup
            .reputation
            .iter()
            .map(|(dest, score)| (dest.clone(), (*score).min(100)))
            .collect();
        session.esp_teams.push(team);
    }

    for setup in &scenario.destinations {
        let mut destination = Destination::new(setup.name.clone(), setup.budget);
        destination.players.clone_from(&setup.players);
        destination.filtering = setup
            .filtering
            .iter()
            .map(|(esp, level)| (esp.clone(), FilteringPolicy::from_level(*level, config)))
            .collect();
        if let Some(trap) = setup.spam_trap {
            destination.spam_trap = Some(SpamTrapNetwork {
                purchased_round: trap.purchased_round,
                announced: trap.announced,
            });
            destination.owned_tools.push(SPAM_TRAP_TOOL.to_string());
        }
        session.destinations.push(destination);
    }

    Ok(session)
}

/// A scripted action the engine refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Round the script belongs to
    pub round: u32,
    /// Short description of the action
    pub action: String,
    /// Why it was refused
    pub error: ActionError,
}

/// Submits one round's scripted decisions.
///
/// Actions run in a fixed order: acquisitions, onboarding, filtering,
/// spam-trap purchases, then investigation votes. A refused action is
/// collected and the rest of the script still runs.
pub fn apply_script(engine: &RoundEngine, room: &str, script: &RoundScript) -> Vec<Rejection> {
    let mut rejected = Vec::new();
    let mut record = |action: String, result: Result<(), ActionError>| {
        if let Err(error) = result {
            warn!(room, round = script.round, action = %action, error = %error, "scripted action rejected");
            rejected.push(Rejection {
                round: script.round,
                action,
                error,
            });
        }
    };

    for (team, clients) in &script.acquire {
        for client in clients {
            record(
                format!("{team} acquires {client}"),
                engine.acquire_client(room, team, client),
            );
        }
    }
    for (team, choices) in &script.onboarding {
        for (client, raw) in choices {
            let action = format!("{team} onboards {client} with {raw}");
            match raw.parse::<OnboardingChoice>() {
                Ok(choice) => record(action, engine.set_onboarding(room, team, client, choice)),
                Err(reason) => warn!(room, action = %action, reason = %reason, "unparseable onboarding choice"),
            }
        }
    }
    for (destination, levels) in &script.filtering {
        for (esp, level) in levels {
            record(
                format!("{destination} sets {level} filtering on {esp}"),
                engine.set_filtering(room, destination, esp, *level),
            );
        }
    }
    for (destination, announced) in &script.spam_traps {
        record(
            format!("{destination} buys a spam-trap network"),
            engine.purchase_spam_trap(room, destination, *announced),
        );
    }
    for (destination, target) in &script.votes {
        record(
            format!("{destination} votes to investigate {target}"),
            engine.cast_vote(room, destination, target),
        );
    }
    rejected
}

/// Result of playing a scenario to the end.
#[derive(Debug, Clone)]
pub struct PlaybackReport {
    /// Rounds resolved
    pub rounds_played: u32,
    /// Actions the engine refused
    pub rejections: Vec<Rejection>,
    /// Final session state
    pub session: Session,
}

/// Plays a scenario through an engine from the lobby to the end.
pub struct ScenarioRunner {
    engine: Arc<RoundEngine>,
    scenario: Arc<ScenarioConfig>,
}

impl ScenarioRunner {
    /// Creates a runner for `scenario` on `engine`.
    #[must_use]
    pub const fn new(engine: Arc<RoundEngine>, scenario: Arc<ScenarioConfig>) -> Self {
        Self { engine, scenario }
    }

    /// Seeds the room and plays every round.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be built, a phase change is
    /// refused, or a round fails to calculate twice in a row.
    pub async fn run(&self) -> Result<PlaybackReport, InboxWarsError> {
        let room = self.scenario.room.clone();
        let session = build_session(&self.scenario, self.engine.config())?;
        self.engine.create_session(session);

        self.engine.begin_game(&room)?;
        self.engine.begin_planning(&room)?;

        let mut rejections = Vec::new();
        let mut rounds_played = 0;
        loop {
            let round = self.current(&room)?.round;
            info!(room = %room, round, "playing round");
            if let Some(script) = self.scenario.rounds.iter().find(|s| s.round == round) {
                rejections.extend(apply_script(&self.engine, &room, script));
            }
            self.lock_everyone(&room)?;
            self.await_review(&room, round).await?;
            rounds_played += 1;

            let change = self.engine.advance_from_consequences(&room)?;
            if change.to == GamePhase::Finished {
                break;
            }
        }

        let session = self.current(&room)?;
        info!(room = %room, rounds_played, rejected = rejections.len(), "scenario finished");
        Ok(PlaybackReport {
            rounds_played,
            rejections,
            session,
        })
    }

    fn current(&self, room: &str) -> Result<Session, InboxWarsError> {
        self.engine
            .snapshot(room)
            .ok_or_else(|| ActionError::RoomNotFound(room.to_string()).into())
    }

    fn lock_everyone(&self, room: &str) -> Result<(), InboxWarsError> {
        let session = self.current(room)?;
        for team in session.esp_teams.iter().filter(|t| t.has_players()) {
            self.engine.lock_in_team(room, &team.name)?;
        }
        for destination in session.destinations.iter().filter(|d| d.has_players()) {
            self.engine.lock_in_destination(room, &destination.name)?;
        }
        // Participants without players never lock in on their own.
        self.engine.force_expiry(room);
        Ok(())
    }

    async fn await_review(&self, room: &str, round: u32) -> Result<(), InboxWarsError> {
        let delay = Duration::from_millis(self.engine.config().rounds.review_delay_ms);
        let wait = async {
            loop {
                let session = self.current(room)?;
                match session.phase {
                    GamePhase::Consequences => return Ok::<(), InboxWarsError>(()),
                    GamePhase::Resolution if !session.has_history_for(round) => {
                        warn!(room, round, "round did not resolve, retrying once");
                        self.engine.retry_resolution(room)?;
                    }
                    GamePhase::Resolution => {}
                    other => {
                        return Err(ResolutionError::WrongPhase(other).into());
                    }
                }
                tokio::time::sleep(REVIEW_POLL).await;
            }
        };
        tokio::time::timeout(delay + REVIEW_GRACE, wait)
            .await
            .map_err(|_| {
                InboxWarsError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("room {room} stayed in resolution for round {round}"),
                ))
            })?
    }
}
