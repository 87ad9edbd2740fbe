//! Full-round calculation.

use indexmap::IndexMap;
use rand::Rng;
use tracing::{debug, instrument};

use inboxwars_core::config::GameConfig;

use super::delivery::{aggregate_rate, scaled_revenue, team_deliveries, weighted_bps};
use super::reputation::team_deltas;
use super::spam_trap::{check_team, team_rng};
use super::volume::team_volume;
use super::{EspResolution, ResolutionResult, RevenueBreakdown};
use crate::error::ResolutionError;
use crate::investigation::{evaluate_consensus, run_investigation};
use crate::session::{EspTeam, Session};

/// Computes the outcome of the session's current round.
///
/// Never modifies the session. Spam-trap rolls are seeded from the session
/// so the same snapshot always yields the same result.
///
/// # Errors
///
/// Returns the first [`ResolutionError`] hit while resolving any team.
#[instrument(skip_all, fields(room = %session.room_id, round = session.round))]
pub fn calculate(
    session: &Session,
    config: &GameConfig,
) -> Result<ResolutionResult, ResolutionError> {
    let mut esp_results = IndexMap::new();
    for (index, team) in session.esp_teams.iter().enumerate() {
        let mut rng = team_rng(session.rng_seed, session.round, index);
        let resolution = resolve_team(team, session, config, &mut rng)?;
        debug!(
            team = %team.name,
            volume = resolution.volume.total,
            rate = resolution.aggregate_delivery_rate,
            revenue = resolution.revenue.actual,
            "team resolved"
        );
        esp_results.insert(team.name.clone(), resolution);
    }

    let destination_earnings = destination_earnings(&esp_results, session, config)?;
    let investigation =
        evaluate_consensus(session, config).map(|c| run_investigation(session, c, config));

    Ok(ResolutionResult {
        round: session.round,
        esp_results,
        destination_earnings,
        investigation,
    })
}

fn resolve_team(
    team: &EspTeam,
    session: &Session,
    config: &GameConfig,
    rng: &mut impl Rng,
) -> Result<EspResolution, ResolutionError> {
    let volume = team_volume(team, session, config)?;
    let deliveries = team_deliveries(team, session, config)?;

    let weighted = weighted_bps(&volume.per_destination, &deliveries);
    let aggregate_delivery_rate = aggregate_rate(weighted, volume.total);
    if !aggregate_delivery_rate.is_finite() {
        return Err(ResolutionError::NonFinite {
            team: team.name.clone(),
            what: "aggregate delivery rate",
        });
    }

    let mut revenue = RevenueBreakdown::default();
    for (client_id, split) in &volume.per_client_destination {
        let client_revenue = config.client(client_id).map_or(0, |c| c.revenue);
        let sent: u64 = split.values().sum();
        revenue.base += client_revenue;
        revenue.per_client.insert(
            client_id.clone(),
            scaled_revenue(client_revenue, weighted_bps(split, &deliveries), sent),
        );
    }
    revenue.actual = scaled_revenue(revenue.base, weighted, volume.total);

    let spam_trap = check_team(team, &volume, session, config, rng);
    let reputation_deltas = team_deltas(&volume, &spam_trap, config);

    Ok(EspResolution {
        volume,
        deliveries,
        aggregate_delivery_rate,
        revenue,
        reputation_deltas,
        spam_trap,
    })
}

/// Each destination earns a share of every ESP's actual revenue in
/// proportion to the volume it carried.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn destination_earnings(
    esp_results: &IndexMap<String, EspResolution>,
    session: &Session,
    config: &GameConfig,
) -> Result<IndexMap<String, u64>, ResolutionError> {
    let share = config.economy.destination_revenue_share;
    let mut earnings: IndexMap<String, u64> = session
        .destinations
        .iter()
        .map(|d| (d.name.clone(), 0))
        .collect();

    for (team, result) in esp_results {
        if result.volume.total == 0 {
            continue;
        }
        for (destination, &sent) in &result.volume.per_destination {
            let earned = result.revenue.actual as f64 * sent as f64
                / result.volume.total as f64
                * share;
            if !earned.is_finite() || earned < 0.0 {
                return Err(ResolutionError::NonFinite {
                    team: team.clone(),
                    what: "destination earnings",
                });
            }
            *earnings.entry(destination.clone()).or_insert(0) += earned.round() as u64;
        }
    }
    Ok(earnings)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::phase::GamePhase;
    use crate::session::{ClientStatus, Destination};
    use inboxwars_core::config::{ClientProfile, RiskTier};

    pub(crate) fn profile(
        id: &str,
        volume: u64,
        revenue: u64,
        distribution: &[(&str, f64)],
    ) -> ClientProfile {
        ClientProfile {
            id: id.to_string(),
            name: id.to_string(),
            cost: 100,
            revenue,
            volume,
            spam_rate: 0.5,
            spam_trap_risk: 0.0,
            risk: RiskTier::Low,
            destination_distribution: distribution
                .iter()
                .map(|(d, p)| ((*d).to_string(), *p))
                .collect(),
            available_from_round: 1,
        }
    }

    /// One ESP (`SendWave`) owning `clients`, all committed in round 1, and
    /// three staffed destinations.
    pub(crate) fn session_with(clients: &[&str], round: u32) -> Session {
        let mut session = Session::new("ROOM1", 4);
        session.round = round;
        session.phase = GamePhase::Resolution;

        let mut team = EspTeam::new("SendWave", 1_000);
        team.players.push("alice".into());
        for id in clients {
            team.add_client(*id);
            team.client_states[*id].first_active_round = Some(1);
        }
        session.esp_teams.push(team);

        for name in ["Gmail", "Outlook", "Yahoo"] {
            let mut destination = Destination::new(name, 500);
            destination.players.push(format!("{name}-player"));
            session.destinations.push(destination);
        }
        session
    }

    #[test]
    fn good_zone_revenue_example() {
        let config = GameConfig {
            clients: vec![
                profile("a", 6_000, 200, &[("Gmail", 100.0)]),
                profile("b", 4_000, 150, &[("Gmail", 100.0)]),
            ],
            ..GameConfig::default()
        };
        let mut session = session_with(&["a", "b"], 1);
        session.esp_teams[0].reputation.insert("Gmail".into(), 75);

        let result = calculate(&session, &config).unwrap();
        let esp = &result.esp_results["SendWave"];
        assert_eq!(esp.deliveries["Gmail"].zone, "good");
        assert!((esp.aggregate_delivery_rate - 0.85).abs() < 1e-12);
        assert_eq!(esp.revenue.base, 350);
        assert_eq!(esp.revenue.actual, 298);
    }

    #[test]
    fn poor_zone_revenue_example() {
        let config = GameConfig {
            clients: vec![profile("a", 10_000, 530, &[("Gmail", 50.0), ("Yahoo", 50.0)])],
            ..GameConfig::default()
        };
        let mut session = session_with(&["a"], 1);
        session.esp_teams[0].reputation.insert("Gmail".into(), 40);
        session.esp_teams[0].reputation.insert("Yahoo".into(), 40);

        let result = calculate(&session, &config).unwrap();
        let esp = &result.esp_results["SendWave"];
        assert!((esp.aggregate_delivery_rate - 0.50).abs() < 1e-12);
        assert_eq!(esp.revenue.actual, 265);
    }

    #[test]
    fn zone_follows_reputation_regardless_of_volume_split() {
        let config = GameConfig {
            clients: vec![
                profile("g", 1_000, 100, &[("Gmail", 100.0)]),
                profile("y", 9_000, 100, &[("Yahoo", 100.0)]),
            ],
            ..GameConfig::default()
        };
        let mut session = session_with(&["g", "y"], 1);
        session.esp_teams[0].reputation.insert("Gmail".into(), 95);
        session.esp_teams[0].reputation.insert("Yahoo".into(), 95);

        let result = calculate(&session, &config).unwrap();
        let esp = &result.esp_results["SendWave"];
        assert_eq!(esp.deliveries["Gmail"].zone, "excellent");
        assert_eq!(esp.deliveries["Yahoo"].zone, "excellent");
        assert_eq!(esp.deliveries["Outlook"].zone, "good");
    }

    #[test]
    fn paused_and_suspended_clients_add_nothing() {
        let config = GameConfig {
            clients: vec![
                profile("a", 1_000, 100, &[("Gmail", 100.0)]),
                profile("b", 1_000, 900, &[("Gmail", 100.0)]),
                profile("c", 1_000, 900, &[("Gmail", 100.0)]),
            ],
            ..GameConfig::default()
        };
        let mut session = session_with(&["a", "b", "c"], 1);
        session.esp_teams[0].client_states["b"].status = ClientStatus::Paused;
        session.esp_teams[0].client_states["c"].status = ClientStatus::Suspended;

        let esp = &calculate(&session, &config).unwrap().esp_results["SendWave"];
        assert_eq!(esp.volume.total, 1_000);
        assert_eq!(esp.revenue.base, 100);
        assert!(!esp.revenue.per_client.contains_key("b"));
        assert!(!esp.revenue.per_client.contains_key("c"));
    }

    #[test]
    fn destinations_earn_by_volume_share() {
        let config = GameConfig {
            clients: vec![profile("a", 10_000, 1_000, &[("Gmail", 60.0), ("Outlook", 40.0)])],
            ..GameConfig::default()
        };
        let mut session = session_with(&["a"], 1);
        session.esp_teams[0].reputation.insert("Gmail".into(), 95);
        session.esp_teams[0].reputation.insert("Outlook".into(), 95);

        let result = calculate(&session, &config).unwrap();
        assert_eq!(result.esp_results["SendWave"].revenue.actual, 950);
        assert_eq!(result.destination_earnings["Gmail"], 57);
        assert_eq!(result.destination_earnings["Outlook"], 38);
        assert_eq!(result.destination_earnings["Yahoo"], 0);
    }

    #[test]
    fn calculation_does_not_mutate_session() {
        let config = GameConfig {
            clients: vec![profile("a", 1_000, 100, &[("Gmail", 100.0)])],
            ..GameConfig::default()
        };
        let session = session_with(&["a"], 1);
        let before = serde_json::to_value(&session).unwrap();
        let _ = calculate(&session, &config).unwrap();
        assert_eq!(serde_json::to_value(&session).unwrap(), before);
    }

    #[test]
    fn repeated_calculation_is_identical() {
        let mut risky = profile("a", 1_000, 100, &[("Gmail", 100.0)]);
        risky.spam_trap_risk = 0.2;
        let config = GameConfig {
            clients: vec![risky],
            ..GameConfig::default()
        };
        let mut session = session_with(&["a"], 1);
        session.rng_seed = 7;
        session.destinations[0].spam_trap = Some(crate::session::SpamTrapNetwork {
            purchased_round: 1,
            announced: false,
        });
        assert_eq!(
            calculate(&session, &config).unwrap(),
            calculate(&session, &config).unwrap()
        );
    }

    #[test]
    fn team_without_clients_resolves_to_zero() {
        let session = session_with(&[], 1);
        let esp = &calculate(&session, &GameConfig::default()).unwrap().esp_results["SendWave"];
        assert_eq!(esp.volume.total, 0);
        assert!(esp.aggregate_delivery_rate.abs() < f64::EPSILON);
        assert_eq!(esp.revenue.actual, 0);
        assert!(esp.reputation_deltas.values().all(|d| *d == 0));
    }
}
