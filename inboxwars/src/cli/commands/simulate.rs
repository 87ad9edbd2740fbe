//! `simulate` command.
//!
//! Loads a game configuration and a scenario, plays the scenario through
//! a [`RoundEngine`] and prints the final standings.

use std::sync::Arc;

use serde::Serialize;

use crate::broadcast::{Broadcaster, JsonlBroadcaster, NoopBroadcaster};
use crate::cli::args::{OutputFormat, SimulateArgs};
use crate::clock::SystemClock;
use crate::config::ConfigLoader;
use crate::engine::RoundEngine;
use crate::error::InboxWarsError;
use crate::observability::init_metrics;
use crate::scenario::{PlaybackReport, ScenarioRunner};
use crate::session::InMemorySessionStore;

/// Plays a scenario to the end.
///
/// # Errors
///
/// Returns an error when either file fails to load, the event file cannot
/// be created, metrics cannot be installed, or a round cannot be played.
pub async fn run(args: &SimulateArgs) -> Result<(), InboxWarsError> {
    let loader = ConfigLoader::with_defaults();
    let game = loader.load_game_config(&args.config)?.config;
    let game = match args.review_delay_ms {
        Some(delay) => {
            let mut tuned = (*game).clone();
            tuned.rounds.review_delay_ms = delay;
            Arc::new(tuned)
        }
        None => game,
    };

    let scenario = loader.load_scenario(&args.scenario, &game)?.config;
    let scenario = match args.seed {
        Some(seed) => {
            let mut seeded = (*scenario).clone();
            seeded.seed = seed;
            Arc::new(seeded)
        }
        None => scenario,
    };

    if args.metrics_port.is_some() {
        init_metrics(args.metrics_port)?;
    }

    let broadcaster: Arc<dyn Broadcaster> = match &args.events_file {
        Some(path) if path.as_os_str() == "-" => Arc::new(JsonlBroadcaster::stdout()),
        Some(path) => Arc::new(JsonlBroadcaster::from_file(path)?),
        None => Arc::new(NoopBroadcaster),
    };

    let engine = Arc::new(RoundEngine::new(
        game,
        Arc::new(InMemorySessionStore::new()),
        broadcaster,
        Arc::new(SystemClock),
    ));
    let ticker = engine.start_timer_task();

    tracing::info!(room = %scenario.room, seed = scenario.seed, "starting simulation");
    let result = ScenarioRunner::new(Arc::clone(&engine), scenario).run().await;

    engine.shutdown();
    let _ = ticker.await;

    let report = result?;
    print_standings(&report, args.format)?;
    Ok(())
}

#[derive(Serialize)]
struct Standings<'a> {
    room: &'a str,
    rounds_played: u32,
    rejected_actions: usize,
    esp_teams: Vec<TeamStanding<'a>>,
    destinations: Vec<DestinationStanding<'a>>,
}

#[derive(Serialize)]
struct TeamStanding<'a> {
    name: &'a str,
    credits: u64,
    reputation: &'a indexmap::IndexMap<String, u8>,
    clients: usize,
}

#[derive(Serialize)]
struct DestinationStanding<'a> {
    name: &'a str,
    budget: u64,
    owned_tools: &'a [String],
}

fn standings(report: &PlaybackReport) -> Standings<'_> {
    let session = &report.session;
    Standings {
        room: &session.room_id,
        rounds_played: report.rounds_played,
        rejected_actions: report.rejections.len(),
        esp_teams: session
            .esp_teams
            .iter()
            .map(|t| TeamStanding {
                name: &t.name,
                credits: t.credits,
                reputation: &t.reputation,
                clients: t.active_clients.len(),
            })
            .collect(),
        destinations: session
            .destinations
            .iter()
            .map(|d| DestinationStanding {
                name: &d.name,
                budget: d.budget,
                owned_tools: &d.owned_tools,
            })
            .collect(),
    }
}

fn print_standings(report: &PlaybackReport, format: OutputFormat) -> Result<(), InboxWarsError> {
    let standings = standings(report);
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&standings)?);
        }
        OutputFormat::Human => {
            println!(
                "Room {} finished after {} round(s)",
                standings.room, standings.rounds_played
            );
            for team in &standings.esp_teams {
                let reputation = team
                    .reputation
                    .iter()
                    .map(|(dest, score)| format!("{dest}={score}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!(
                    "  ESP {:<16} credits {:>7}  clients {:>2}  {reputation}",
                    team.name, team.credits, team.clients
                );
            }
            for dest in &standings.destinations {
                println!(
                    "  DST {:<16} budget  {:>7}  tools {}",
                    dest.name,
                    dest.budget,
                    dest.owned_tools.join(", ")
                );
            }
            for rejection in &report.rejections {
                println!(
                    "  round {}: {} refused ({})",
                    rejection.round, rejection.action, rejection.error
                );
            }
        }
    }
    Ok(())
}
