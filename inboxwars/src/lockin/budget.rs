//! Budget validation and greedy auto-correction.
//!
//! A team's exposure is what it already earmarked this round plus the cost
//! of every pending add-on on a client that has not been activated. When
//! exposure exceeds credits at lock-in, add-ons are stripped one at a time,
//! most expensive type first, until the team fits or nothing is left.

use serde::Serialize;
use tracing::{info, warn};

use inboxwars_core::config::GameConfig;

use crate::session::{AddOn, EspTeam};

/// Budget position of one team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetCheck {
    /// Cost of pending add-ons on not-yet-activated clients
    pub pending_cost: u64,
    /// Spend earmarked earlier this round
    pub committed_spend: u64,
    /// `pending_cost + committed_spend`
    pub exposure: u64,
    /// Credits on hand
    pub available: u64,
}

impl BudgetCheck {
    /// Whether exposure fits within credits.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.exposure <= self.available
    }

    /// Credits missing, zero when valid.
    #[must_use]
    pub const fn overage(&self) -> u64 {
        self.exposure.saturating_sub(self.available)
    }
}

/// One add-on removed by auto-correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Correction {
    /// Client the add-on was removed from
    pub client_id: String,
    /// Add-on removed
    pub removed: AddOn,
    /// Credits freed
    pub credits_saved: u64,
}

/// Result of [`auto_correct`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrectionReport {
    /// Removals in the order they were made
    pub corrections: Vec<Correction>,
    /// Budget position after correcting
    pub check: BudgetCheck,
}

impl CorrectionReport {
    /// Whether the team fits its budget after correcting.
    #[must_use]
    pub const fn resolved(&self) -> bool {
        self.check.is_valid()
    }
}

fn is_pending(team: &EspTeam, client_id: &str) -> bool {
    team.owns(client_id)
        && team
            .client_states
            .get(client_id)
            .is_none_or(|s| s.first_active_round.is_none())
}

/// Computes the team's budget position.
#[must_use]
pub fn validate_budget(team: &EspTeam, config: &GameConfig) -> BudgetCheck {
    let pending_cost = team
        .pending_onboarding
        .iter()
        .filter(|(client_id, _)| is_pending(team, client_id))
        .map(|(_, choice)| choice.cost(&config.onboarding))
        .sum::<u64>();
    let committed_spend = team.committed_spend;
    BudgetCheck {
        pending_cost,
        committed_spend,
        exposure: pending_cost.saturating_add(committed_spend),
        available: team.credits,
    }
}

/// Add-on types ordered by cost, most expensive first; warm-up wins ties.
fn removal_order(config: &GameConfig) -> [AddOn; 2] {
    let onboarding = &config.onboarding;
    if AddOn::ListHygiene.cost(onboarding) > AddOn::Warmup.cost(onboarding) {
        [AddOn::ListHygiene, AddOn::Warmup]
    } else {
        [AddOn::Warmup, AddOn::ListHygiene]
    }
}

/// Strips pending add-ons until the team's exposure fits its credits.
///
/// Each step removes one add-on of the most expensive type still present,
/// from the first pending client carrying it, then re-checks. A team that
/// is already valid is left untouched. If every pending add-on is gone and
/// the team is still over budget, the shortfall is logged and left for
/// commit to absorb.
pub fn auto_correct(team: &mut EspTeam, config: &GameConfig) -> CorrectionReport {
    let mut corrections = Vec::new();
    let mut check = validate_budget(team, config);

    for add_on in removal_order(config) {
        while !check.is_valid() {
            let target = team
                .pending_onboarding
                .iter()
                .find(|(id, choice)| choice.includes(add_on) && is_pending(team, id))
                .map(|(id, _)| id.clone());
            let Some(client_id) = target else {
                break;
            };
            if let Some(choice) = team.pending_onboarding.get_mut(&client_id) {
                *choice = choice.without(add_on);
            }
            let credits_saved = add_on.cost(&config.onboarding);
            info!(
                team = %team.name,
                client = %client_id,
                removed = %add_on,
                credits_saved,
                "onboarding add-on removed to fit budget"
            );
            corrections.push(Correction {
                client_id,
                removed: add_on,
                credits_saved,
            });
            check = validate_budget(team, config);
        }
    }

    if !check.is_valid() {
        warn!(
            team = %team.name,
            exposure = check.exposure,
            available = check.available,
            overage = check.overage(),
            "team is still over budget with no add-ons left to remove"
        );
    }

    CorrectionReport { corrections, check }
}
