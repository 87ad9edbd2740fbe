//! Spam-trap checks.
//!
//! Every destination with an active network rolls once per ESP that sent
//! it mail. The roll uses a [`StdRng`] seeded from the session seed, the
//! round and the team's position, so replaying a round reproduces the same
//! hits.

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use inboxwars_core::config::GameConfig;

use super::{SpamTrapOutcome, VolumeBreakdown};
use crate::session::{EspTeam, Session};

/// Deterministic RNG for one team's rolls in one round.
#[must_use]
pub fn team_rng(session_seed: u64, round: u32, team_index: usize) -> StdRng {
    let mixed = session_seed
        ^ u64::from(round).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (team_index as u64 + 1).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    StdRng::seed_from_u64(mixed)
}

/// Probability that at least one of the independent risks fires.
#[must_use]
pub fn combined_risk(risks: impl IntoIterator<Item = f64>) -> f64 {
    1.0 - risks
        .into_iter()
        .map(|r| 1.0 - r.clamp(0.0, 1.0))
        .product::<f64>()
}

/// Rolls `team`'s spam-trap checks for the round.
pub fn check_team(
    team: &EspTeam,
    volume: &VolumeBreakdown,
    session: &Session,
    config: &GameConfig,
    rng: &mut impl Rng,
) -> SpamTrapOutcome {
    let round = session.round;
    let network_multiplier = config.spam_traps.network_multiplier;
    let mut outcome = SpamTrapOutcome {
        risk: IndexMap::new(),
        hit_destinations: Vec::new(),
        penalty_per_hit: config.reputation.spam_trap_penalty,
    };

    for destination in &session.destinations {
        let active = destination
            .spam_trap
            .is_some_and(|network| network.is_active(round));
        let sent = volume
            .per_destination
            .get(&destination.name)
            .copied()
            .unwrap_or(0);
        if !active || sent == 0 {
            continue;
        }

        let risks = volume
            .per_client_destination
            .iter()
            .filter(|(_, split)| split.get(&destination.name).copied().unwrap_or(0) > 0)
            .filter_map(|(client_id, _)| {
                let profile = config.client(client_id)?;
                let state = team.client_states.get(client_id)?;
                Some(
                    (profile.spam_trap_risk
                        * state.spam_trap_multiplier(round)
                        * network_multiplier)
                        .min(1.0),
                )
            });
        let risk = combined_risk(risks);

        let hit = risk >= 1.0 || (risk > 0.0 && rng.random::<f64>() < risk);
        if hit {
            outcome.hit_destinations.push(destination.name.clone());
        }
        outcome.risk.insert(destination.name.clone(), risk);
    }

    outcome
}
