//! Committing onboarding at lock-in.

use tracing::{debug, info, warn};

use inboxwars_core::config::GameConfig;

use crate::error::ActionError;
use crate::session::{
    Applicability, EspTeam, Modifier, ModifierSource, OnboardingChoice,
};

/// What a commit did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Clients activated this round
    pub activated: Vec<String>,
    /// Credits deducted
    pub charged: u64,
    /// Credits owed but not available
    pub shortfall: u64,
}

/// Activates every owned client whose onboarding is still open.
///
/// Warm-up adds a first-round volume modifier; list hygiene adds permanent
/// volume and spam-trap modifiers sized by the client's risk tier. The
/// earmarked spend plus add-on costs are deducted, saturating at zero. The
/// pending choices and the earmarked spend are cleared afterwards.
///
/// # Errors
///
/// Returns [`ActionError::UnknownClient`] if an owned client is missing
/// from the catalog; nothing is changed in that case.
pub fn commit_onboarding(
    team: &mut EspTeam,
    round: u32,
    config: &GameConfig,
) -> Result<CommitSummary, ActionError> {
    let opening: Vec<String> = team
        .active_clients
        .iter()
        .filter(|id| {
            team.client_states
                .get(*id)
                .is_none_or(|s| s.first_active_round.is_none())
        })
        .cloned()
        .collect();
    if let Some(missing) = opening.iter().find(|id| config.client(id).is_none()) {
        return Err(ActionError::UnknownClient(missing.clone()));
    }

    let onboarding = &config.onboarding;
    let mut add_on_cost = 0u64;

    for client_id in &opening {
        let Some(profile) = config.client(client_id) else {
            continue;
        };
        let choice = team
            .pending_onboarding
            .get(client_id)
            .copied()
            .unwrap_or(OnboardingChoice::None);
        add_on_cost += choice.cost(onboarding);

        let state = team.client_states.entry(client_id.clone()).or_default();
        if choice.warmup() {
            state.volume_modifiers.push(Modifier {
                source: ModifierSource::Warmup,
                multiplier: onboarding.warmup.volume_multiplier,
                applicability: Applicability::FirstRoundOnly,
                description: "Warm-up throttles first-round volume".to_string(),
            });
        }
        if choice.hygiene() {
            let effect = onboarding.list_hygiene.for_tier(profile.risk);
            state.volume_modifiers.push(Modifier {
                source: ModifierSource::ListHygiene,
                multiplier: effect.volume_multiplier,
                applicability: Applicability::AllRounds,
                description: format!("List hygiene ({} risk) trims volume", profile.risk),
            });
            state.spam_trap_modifiers.push(Modifier {
                source: ModifierSource::ListHygiene,
                multiplier: effect.spam_trap_multiplier,
                applicability: Applicability::AllRounds,
                description: format!("List hygiene ({} risk) cuts spam-trap risk", profile.risk),
            });
        }
        state.first_active_round = Some(round);
        debug!(team = %team.name, client = %client_id, ?choice, round, "client activated");
    }

    let owed = team.committed_spend.saturating_add(add_on_cost);
    let charged = owed.min(team.credits);
    let shortfall = owed - charged;
    if shortfall > 0 {
        warn!(
            team = %team.name,
            owed,
            credits = team.credits,
            shortfall,
            "commit exceeds credits, balance floored at zero"
        );
    }
    team.credits -= charged;
    team.pending_onboarding.clear();
    team.committed_spend = 0;

    info!(
        team = %team.name,
        round,
        activated = opening.len(),
        charged,
        credits = team.credits,
        "onboarding committed"
    );

    Ok(CommitSummary {
        activated: opening,
        charged,
        shortfall,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::calculator::tests::profile;
    use inboxwars_core::config::RiskTier;

    fn config() -> GameConfig {
        let mut risky = profile("risky", 1_000, 100, &[("Gmail", 100.0)]);
        risky.risk = RiskTier::High;
        GameConfig {
            clients: vec![profile("shop", 1_000, 100, &[("Gmail", 100.0)]), risky],
            ..GameConfig::default()
        }
    }

    #[test]
    fn commit_applies_modifiers_and_charges() {
        let config = config();
        let mut team = EspTeam::new("SendWave", 1_000);
        team.add_client("shop");
        team.add_client("risky");
        team.pending_onboarding.insert("shop".into(), OnboardingChoice::WarmupOnly);
        team.pending_onboarding.insert("risky".into(), OnboardingChoice::Both);
        team.committed_spend = 100;

        let summary = commit_onboarding(&mut team, 2, &config).unwrap();
        assert_eq!(summary.activated, vec!["shop", "risky"]);
        assert_eq!(summary.charged, 100 + 150 + 230);
        assert_eq!(team.credits, 1_000 - 480);
        assert!(team.pending_onboarding.is_empty());
        assert_eq!(team.committed_spend, 0);

        let shop = &team.client_states["shop"];
        assert_eq!(shop.first_active_round, Some(2));
        assert!((shop.volume_multiplier(2) - 0.5).abs() < 1e-12);
        assert!((shop.volume_multiplier(3) - 1.0).abs() < 1e-12);

        let risky = &team.client_states["risky"];
        assert!((risky.volume_multiplier(3) - 0.85).abs() < 1e-12);
        assert!((risky.spam_trap_multiplier(3) - 0.4).abs() < 1e-12);
        assert!(risky.has_warmup() && risky.has_hygiene());
    }

    #[test]
    fn client_without_choice_activates_bare() {
        let config = config();
        let mut team = EspTeam::new("SendWave", 0);
        team.add_client("shop");
        let summary = commit_onboarding(&mut team, 1, &config).unwrap();
        assert_eq!(summary.charged, 0);
        let shop = &team.client_states["shop"];
        assert_eq!(shop.first_active_round, Some(1));
        assert!(shop.volume_modifiers.is_empty());
    }

    #[test]
    fn activated_clients_are_not_recommitted() {
        let config = config();
        let mut team = EspTeam::new("SendWave", 1_000);
        team.add_client("shop");
        team.pending_onboarding.insert("shop".into(), OnboardingChoice::WarmupOnly);
        commit_onboarding(&mut team, 1, &config).unwrap();

        team.pending_onboarding.insert("shop".into(), OnboardingChoice::Both);
        let summary = commit_onboarding(&mut team, 2, &config).unwrap();
        assert!(summary.activated.is_empty());
        assert_eq!(summary.charged, 0);
        assert_eq!(team.client_states["shop"].first_active_round, Some(1));
        assert_eq!(team.client_states["shop"].volume_modifiers.len(), 1);
    }

    #[test]
    fn deduction_saturates_at_zero() {
        let config = config();
        let mut team = EspTeam::new("SendWave", 100);
        team.add_client("shop");
        team.committed_spend = 300;
        let summary = commit_onboarding(&mut team, 1, &config).unwrap();
        assert_eq!(team.credits, 0);
        assert_eq!(summary.charged, 100);
        assert_eq!(summary.shortfall, 200);
    }

    #[test]
    fn unknown_client_leaves_team_untouched() {
        let config = config();
        let mut team = EspTeam::new("SendWave", 100);
        team.add_client("ghost");
        team.committed_spend = 50;
        let err = commit_onboarding(&mut team, 1, &config).unwrap_err();
        assert_eq!(err, ActionError::UnknownClient("ghost".into()));
        assert_eq!(team.credits, 100);
        assert_eq!(team.committed_spend, 50);
    }
}
