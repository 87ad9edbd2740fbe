//! Inbox rates.
//!
//! The zone comes from the ESP's reputation at each destination
//! independently; the destination's filtering policy then takes its
//! false-positive percentage off the zone rate. Rates are carried in basis
//! points so the revenue arithmetic stays exact.

use indexmap::IndexMap;

use inboxwars_core::config::{GameConfig, to_basis_points};

use super::{DeliveryDetail, div_round};
use crate::error::ResolutionError;
use crate::session::{EspTeam, Session};

/// Delivery details for `team` at every destination in the session.
///
/// # Errors
///
/// Returns [`ResolutionError::NoZone`] when no zone covers a reputation.
pub fn team_deliveries(
    team: &EspTeam,
    session: &Session,
    config: &GameConfig,
) -> Result<IndexMap<String, DeliveryDetail>, ResolutionError> {
    let baseline = config.reputation.neutral_baseline;
    session
        .destinations
        .iter()
        .map(|destination| {
            let reputation = team.reputation_at(&destination.name, baseline);
            let zone = config
                .delivery
                .zone_for(reputation)
                .ok_or(ResolutionError::NoZone(reputation))?;
            let policy = destination.filtering_for(&team.name);

            let base_bps = to_basis_points(zone.base_rate);
            let penalty_bps = to_basis_points(policy.false_positive_pct / 100.0);
            let final_bps = base_bps.saturating_sub(penalty_bps);

            Ok((
                destination.name.clone(),
                DeliveryDetail {
                    reputation,
                    zone: zone.name.clone(),
                    base_rate: bps_to_rate(base_bps),
                    filtering: policy.level,
                    filtering_penalty: bps_to_rate(penalty_bps),
                    final_rate: bps_to_rate(final_bps),
                    final_rate_bps: final_bps,
                },
            ))
        })
        .collect()
}

/// Volume-weighted sum of basis points, `Σ volume × final_bps`.
#[must_use]
pub fn weighted_bps(
    per_destination: &IndexMap<String, u64>,
    deliveries: &IndexMap<String, DeliveryDetail>,
) -> u128 {
    per_destination
        .iter()
        .map(|(dest, &volume)| {
            let bps = deliveries.get(dest).map_or(0, |d| d.final_rate_bps);
            u128::from(volume) * u128::from(bps)
        })
        .sum()
}

/// Volume-weighted inbox rate, zero when nothing was sent.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn aggregate_rate(weighted: u128, total_volume: u64) -> f64 {
    if total_volume == 0 {
        return 0.0;
    }
    weighted as f64 / total_volume as f64 / 10_000.0
}

/// `base × weighted / (total × 10000)`, rounded half up.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn scaled_revenue(base: u64, weighted: u128, total_volume: u64) -> u64 {
    if total_volume == 0 {
        return 0;
    }
    let den = u128::from(total_volume) * 10_000;
    let value = div_round(u128::from(base) * weighted, den);
    u64::try_from(value).unwrap_or(u64::MAX)
}

fn bps_to_rate(bps: u32) -> f64 {
    f64::from(bps) / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::calculator::tests::session_with;
    use crate::session::FilteringPolicy;
    use inboxwars_core::config::FilteringLevel;

    fn volumes(pairs: &[(&str, u64)]) -> IndexMap<String, u64> {
        pairs.iter().map(|(d, v)| ((*d).to_string(), *v)).collect()
    }

    #[test]
    fn zone_is_picked_per_destination() {
        let config = GameConfig::default();
        let mut session = session_with(&[], 1);
        let team = &mut session.esp_teams[0];
        team.reputation.insert("Gmail".into(), 80);
        team.reputation.insert("Outlook".into(), 70);
        team.reputation.insert("Yahoo".into(), 60);

        let deliveries = team_deliveries(&session.esp_teams[0], &session, &config).unwrap();
        assert_eq!(deliveries["Gmail"].zone, "good");
        assert_eq!(deliveries["Outlook"].zone, "good");
        assert_eq!(deliveries["Yahoo"].zone, "warning");
        assert_eq!(deliveries["Yahoo"].final_rate_bps, 7_000);
    }

    #[test]
    fn rate_depends_only_on_the_zone() {
        let config = GameConfig::default();
        let mut session = session_with(&[], 1);
        session.destinations[0].filtering.insert(
            "SendWave".into(),
            FilteringPolicy::from_level(FilteringLevel::Strict, &config),
        );

        let mut rates: IndexMap<String, (u32, u32)> = IndexMap::new();
        for reputation in 0..=100u8 {
            let team = &mut session.esp_teams[0];
            team.reputation.insert("Gmail".into(), reputation);
            team.reputation.insert("Outlook".into(), reputation);
            let zone = config.delivery.zone_for(reputation).unwrap().name.clone();

            let deliveries = team_deliveries(&session.esp_teams[0], &session, &config).unwrap();
            let filtered = deliveries["Gmail"].final_rate_bps;
            let unfiltered = deliveries["Outlook"].final_rate_bps;
            assert_eq!(deliveries["Gmail"].zone, zone);

            let seen = *rates.entry(zone.clone()).or_insert((filtered, unfiltered));
            assert_eq!(seen, (filtered, unfiltered), "rate moved inside zone {zone} at {reputation}");
        }
        assert_eq!(rates.len(), config.delivery.zones.len());
    }

    #[test]
    fn weighted_aggregate_across_zones() {
        let config = GameConfig::default();
        let mut session = session_with(&[], 1);
        let team = &mut session.esp_teams[0];
        team.reputation.insert("Gmail".into(), 80);
        team.reputation.insert("Outlook".into(), 70);
        team.reputation.insert("Yahoo".into(), 60);

        let deliveries = team_deliveries(&session.esp_teams[0], &session, &config).unwrap();
        let per_dest = volumes(&[("Gmail", 15_000), ("Outlook", 9_000), ("Yahoo", 6_000)]);
        let weighted = weighted_bps(&per_dest, &deliveries);
        assert!((aggregate_rate(weighted, 30_000) - 0.82).abs() < 1e-9);
    }

    #[test]
    fn filtering_applies_only_where_set() {
        let config = GameConfig::default();
        let mut session = session_with(&[], 1);
        session.esp_teams[0].reputation.insert("Gmail".into(), 75);
        session.esp_teams[0].reputation.insert("Outlook".into(), 75);
        session.destinations[0].filtering.insert(
            "SendWave".into(),
            FilteringPolicy::from_level(FilteringLevel::Strict, &config),
        );

        let deliveries = team_deliveries(&session.esp_teams[0], &session, &config).unwrap();
        assert_eq!(deliveries["Gmail"].final_rate_bps, 7_700);
        assert!((deliveries["Gmail"].final_rate - 0.77).abs() < 1e-12);
        assert_eq!(deliveries["Outlook"].final_rate_bps, 8_500);
    }

    #[test]
    fn filtering_never_goes_negative() {
        let mut config = GameConfig::default();
        config.delivery.filtering.maximum = 50.0;
        let mut session = session_with(&[], 1);
        session.esp_teams[0].reputation.insert("Gmail".into(), 10);
        session.destinations[0].filtering.insert(
            "SendWave".into(),
            FilteringPolicy::from_level(FilteringLevel::Maximum, &config),
        );
        let deliveries = team_deliveries(&session.esp_teams[0], &session, &config).unwrap();
        assert_eq!(deliveries["Gmail"].final_rate_bps, 0);
    }

    #[test]
    fn revenue_rounds_half_up() {
        let per_dest = volumes(&[("Gmail", 1_000)]);
        let mut deliveries = IndexMap::new();
        deliveries.insert(
            "Gmail".to_string(),
            DeliveryDetail {
                reputation: 75,
                zone: "good".into(),
                base_rate: 0.85,
                filtering: FilteringLevel::Permissive,
                filtering_penalty: 0.0,
                final_rate: 0.85,
                final_rate_bps: 8_500,
            },
        );
        let weighted = weighted_bps(&per_dest, &deliveries);
        assert_eq!(scaled_revenue(350, weighted, 1_000), 298);
        assert_eq!(scaled_revenue(350, weighted, 0), 0);
    }

    #[test]
    fn uncovered_reputation_is_a_fault() {
        let mut config = GameConfig::default();
        config.delivery.zones.retain(|z| z.min_reputation > 0);
        let mut session = session_with(&[], 1);
        session.esp_teams[0].reputation.insert("Gmail".into(), 5);
        let err = team_deliveries(&session.esp_teams[0], &session, &config).unwrap_err();
        assert_eq!(err, ResolutionError::NoZone(5));
    }
}
