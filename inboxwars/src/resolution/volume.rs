//! Adjusted client volume and the per-destination split.

use indexmap::IndexMap;

use inboxwars_core::config::GameConfig;

use super::VolumeBreakdown;
use crate::error::ResolutionError;
use crate::session::{EspTeam, Session};

const DISTRIBUTION_TOLERANCE: f64 = 0.01;

/// Whether a client sends in `round`: active status and committed
/// onboarding no later than `round`.
fn sends_in(first_active_round: Option<u32>, round: u32) -> bool {
    first_active_round.is_some_and(|r| r <= round)
}

/// Computes the volume one team sends this round.
///
/// Paused and suspended clients send nothing. Clients whose onboarding was
/// never committed are skipped as well.
///
/// # Errors
///
/// Fails on catalog misses, non-finite multipliers and distributions that
/// do not add up to 100 percent.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn team_volume(
    team: &EspTeam,
    session: &Session,
    config: &GameConfig,
) -> Result<VolumeBreakdown, ResolutionError> {
    let round = session.round;
    let mut out = VolumeBreakdown {
        per_destination: session
            .destinations
            .iter()
            .map(|d| (d.name.clone(), 0))
            .collect(),
        ..VolumeBreakdown::default()
    };

    for (client_id, state) in team.sending_clients() {
        if !sends_in(state.first_active_round, round) {
            continue;
        }
        let profile = config
            .client(client_id)
            .ok_or_else(|| ResolutionError::UnknownClient {
                team: team.name.clone(),
                client: client_id.to_string(),
            })?;
        check_distribution(client_id, &profile.destination_distribution)?;

        let adjusted = profile.volume as f64 * state.volume_multiplier(round);
        if !adjusted.is_finite() || adjusted < 0.0 {
            return Err(ResolutionError::NonFinite {
                team: team.name.clone(),
                what: "client volume",
            });
        }
        let adjusted = adjusted.round() as u64;

        let mut split = IndexMap::new();
        for destination in &session.destinations {
            let pct = profile
                .destination_distribution
                .get(&destination.name)
                .copied()
                .unwrap_or(0.0);
            let sent = (adjusted as f64 * pct / 100.0).round() as u64;
            split.insert(destination.name.clone(), sent);
            *out.per_destination
                .entry(destination.name.clone())
                .or_insert(0) += sent;
            out.total += sent;
        }

        out.per_client.insert(client_id.to_string(), adjusted);
        out.per_client_destination
            .insert(client_id.to_string(), split);
    }

    Ok(out)
}

fn check_distribution(
    client: &str,
    distribution: &IndexMap<String, f64>,
) -> Result<(), ResolutionError> {
    let invalid = |reason: String| ResolutionError::InvalidDistribution {
        client: client.to_string(),
        reason,
    };
    if let Some((dest, pct)) = distribution
        .iter()
        .find(|(_, p)| !p.is_finite() || **p < 0.0)
    {
        return Err(invalid(format!("{dest} share is {pct}")));
    }
    let sum: f64 = distribution.values().sum();
    if (sum - 100.0).abs() > DISTRIBUTION_TOLERANCE {
        return Err(invalid(format!("shares add up to {sum}, not 100")));
    }
    Ok(())
}
