//! Shared integration-test helpers: fixture paths, an in-process engine
//! harness driven by a manual clock, and a runner for the CLI binary.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;

use inboxwars::broadcast::RecordingBroadcaster;
use inboxwars::clock::ManualClock;
use inboxwars::config::{ConfigLoader, GameConfig, ScenarioConfig};
use inboxwars::engine::RoundEngine;
use inboxwars::incident::IncidentHook;
use inboxwars::scenario::build_session;
use inboxwars::session::{InMemorySessionStore, Session};

/// Room id used by `scenario.yaml`.
pub const ROOM: &str = "DEMO01";

/// Absolute path of a file under `tests/fixtures`.
pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Loads `game.yaml`.
pub fn game_config() -> GameConfig {
    let loaded = ConfigLoader::with_defaults()
        .load_game_config(&fixture_path("game.yaml"))
        .expect("game fixture should load");
    (*loaded.config).clone()
}

/// Loads `scenario.yaml` against `game`.
pub fn scenario(game: &GameConfig) -> ScenarioConfig {
    let loaded = ConfigLoader::with_defaults()
        .load_scenario(&fixture_path("scenario.yaml"), game)
        .expect("scenario fixture should load");
    (*loaded.config).clone()
}

/// An engine over the fixture game, with a manual clock and a recording
/// broadcaster.
pub struct Harness {
    pub engine: Arc<RoundEngine>,
    pub broadcasts: Arc<RecordingBroadcaster>,
    pub clock: Arc<ManualClock>,
    pub scenario: ScenarioConfig,
}

impl Harness {
    /// Harness with the fixture game, `tune` applied to its configuration.
    pub fn new(tune: impl FnOnce(&mut GameConfig)) -> Self {
        Self::build(tune, None)
    }

    /// Harness whose engine reports incidents to `hook`.
    pub fn with_hook(tune: impl FnOnce(&mut GameConfig), hook: Arc<dyn IncidentHook>) -> Self {
        Self::build(tune, Some(hook))
    }

    fn build(tune: impl FnOnce(&mut GameConfig), hook: Option<Arc<dyn IncidentHook>>) -> Self {
        let mut game = game_config();
        tune(&mut game);
        let scenario = scenario(&game);
        let session = build_session(&scenario, &game).expect("scenario should build");

        let broadcasts = Arc::new(RecordingBroadcaster::new());
        let clock = Arc::new(ManualClock::default());
        let mut engine = RoundEngine::new(
            Arc::new(game),
            Arc::new(InMemorySessionStore::new()),
            broadcasts.clone(),
            clock.clone(),
        );
        if let Some(hook) = hook {
            engine = engine.with_incident_hook(hook);
        }
        engine.create_session(session);

        Self {
            engine: Arc::new(engine),
            broadcasts,
            clock,
            scenario,
        }
    }

    /// Current session.
    pub fn session(&self) -> Session {
        self.engine.snapshot(ROOM).expect("room should exist")
    }

    /// Lobby to round 1 planning.
    pub fn start(&self) {
        self.engine.begin_game(ROOM).expect("lobby -> allocation");
        self.engine.begin_planning(ROOM).expect("allocation -> planning");
    }

    /// Locks in every participant, teams first.
    pub fn lock_all(&self) {
        let session = self.session();
        for team in &session.esp_teams {
            self.engine
                .lock_in_team(ROOM, &team.name)
                .expect("team lock-in");
        }
        for destination in &session.destinations {
            self.engine
                .lock_in_destination(ROOM, &destination.name)
                .expect("destination lock-in");
        }
    }
}

/// Runs the `inboxwars` binary with `args` and waits for it to exit.
pub fn run_cli(args: &[&str]) -> Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_inboxwars"))
        .args(args)
        .env_remove("INBOXWARS_LOG_LEVEL")
        .output()
        .expect("failed to run inboxwars")
}
