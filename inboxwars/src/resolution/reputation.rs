//! Reputation deltas.

use indexmap::IndexMap;

use inboxwars_core::config::{GameConfig, ReputationSettings};

use super::{SpamTrapOutcome, VolumeBreakdown};

/// Volume-weighted spam rate (percent) of the mail sent to `destination`.
///
/// `None` when nothing was sent there.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn weighted_spam_rate(
    volume: &VolumeBreakdown,
    destination: &str,
    config: &GameConfig,
) -> Option<f64> {
    let mut sent = 0u64;
    let mut weighted = 0.0;
    for (client_id, split) in &volume.per_client_destination {
        let count = split.get(destination).copied().unwrap_or(0);
        if count == 0 {
            continue;
        }
        let rate = config.client(client_id).map_or(0.0, |c| c.spam_rate);
        sent += count;
        weighted += count as f64 * rate;
    }
    (sent > 0).then(|| weighted / sent as f64)
}

/// Delta earned by a weighted spam rate.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn performance_delta(spam_rate: f64, settings: &ReputationSettings) -> i32 {
    if spam_rate <= settings.clean_threshold_pct {
        return settings.clean_bonus;
    }
    let raw = ((spam_rate - settings.clean_threshold_pct) * settings.spam_rate_weight).round();
    let capped = raw.min(f64::from(settings.max_performance_penalty));
    -(capped as i32)
}

/// Reputation change at every destination in `volume.per_destination`.
///
/// Destinations that received no mail are left at zero unless a trap there
/// was hit.
#[must_use]
pub fn team_deltas(
    volume: &VolumeBreakdown,
    spam_trap: &SpamTrapOutcome,
    config: &GameConfig,
) -> IndexMap<String, i32> {
    volume
        .per_destination
        .keys()
        .map(|destination| {
            let mut delta = weighted_spam_rate(volume, destination, config)
                .map_or(0, |rate| performance_delta(rate, &config.reputation));
            if spam_trap.hit_destinations.iter().any(|d| d == destination) {
                delta -= spam_trap.penalty_per_hit;
            }
            (destination.clone(), delta)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breakdown(clients: &[(&str, &[(&str, u64)])]) -> VolumeBreakdown {
        let mut out = VolumeBreakdown::default();
        for (client, split) in clients {
            let split: IndexMap<String, u64> =
                split.iter().map(|(d, v)| ((*d).to_string(), *v)).collect();
            for (d, v) in &split {
                *out.per_destination.entry(d.clone()).or_insert(0) += v;
                out.total += v;
            }
            out.per_client
                .insert((*client).to_string(), split.values().sum());
            out.per_client_destination
                .insert((*client).to_string(), split);
        }
        out
    }

    fn config_with_rates(rates: &[(&str, f64)]) -> GameConfig {
        use crate::resolution::calculator::tests::profile;
        GameConfig {
            clients: rates
                .iter()
                .map(|(id, rate)| {
                    let mut p = profile(id, 100, 10, &[("Gmail", 100.0)]);
                    p.spam_rate = *rate;
                    p
                })
                .collect(),
            ..GameConfig::default()
        }
    }

    #[test]
    fn clean_sending_earns_the_bonus() {
        let settings = ReputationSettings::default();
        assert_eq!(performance_delta(0.5, &settings), 2);
        assert_eq!(performance_delta(1.0, &settings), 2);
    }

    #[test]
    fn penalty_scales_and_caps() {
        let settings = ReputationSettings::default();
        assert_eq!(performance_delta(2.0, &settings), -4);
        assert_eq!(performance_delta(2.5, &settings), -6);
        assert_eq!(performance_delta(9.0, &settings), -10);
    }

    #[test]
    fn spam_rate_is_weighted_by_volume() {
        let config = config_with_rates(&[("clean", 0.0), ("dirty", 4.0)]);
        let volume = breakdown(&[("clean", &[("Gmail", 3_000)]), ("dirty", &[("Gmail", 1_000)])]);
        let rate = weighted_spam_rate(&volume, "Gmail", &config).unwrap();
        assert!((rate - 1.0).abs() < 1e-12);
        assert!(weighted_spam_rate(&volume, "Yahoo", &config).is_none());
    }

    #[test]
    fn trap_hit_stacks_with_performance() {
        let config = config_with_rates(&[("dirty", 3.0)]);
        let mut volume = breakdown(&[("dirty", &[("Gmail", 1_000)])]);
        volume.per_destination.insert("Yahoo".into(), 0);
        let trap = SpamTrapOutcome {
            hit_destinations: vec!["Gmail".into()],
            penalty_per_hit: 10,
            ..SpamTrapOutcome::default()
        };
        let deltas = team_deltas(&volume, &trap, &config);
        assert_eq!(deltas["Gmail"], -18);
        assert_eq!(deltas["Yahoo"], 0);
    }
}
