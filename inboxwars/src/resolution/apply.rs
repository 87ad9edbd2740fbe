//! Writes a resolution result back into the session.
//!
//! Application is best effort: a reference to a team or destination the
//! session no longer has is logged and skipped, the rest of the result is
//! still applied, and the first failure is returned.

use tracing::{info, warn};

use inboxwars_core::config::GameConfig;

use super::ResolutionResult;
use crate::error::ApplyError;
use crate::session::{ClientStatus, Session};

/// Totals written by [`apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// Credits added across ESP teams
    pub credits_added: u64,
    /// Budget added across destinations
    pub earnings_added: u64,
    /// Reputation scores changed
    pub reputation_updates: usize,
    /// Destinations charged for an investigation
    pub voters_charged: usize,
    /// Client suspended by an investigation
    pub suspended: Option<String>,
}

/// Applies `result` to `session`.
///
/// Credits grow by actual revenue, reputation moves by the computed delta
/// clamped to 0–100 (unset scores start from the neutral baseline),
/// destinations collect their earnings, investigation voters pay the cost
/// and the chosen client is suspended. Pending votes are cleared.
///
/// # Errors
///
/// Returns the first [`ApplyError`] encountered after applying everything
/// that could be applied.
pub fn apply(
    session: &mut Session,
    result: &ResolutionResult,
    config: &GameConfig,
) -> Result<ApplySummary, ApplyError> {
    let mut summary = ApplySummary::default();
    let mut first_error: Option<ApplyError> = None;
    let mut fail = |err: ApplyError, room: &str| {
        warn!(room, error = %err, "could not apply part of the round result");
        first_error.get_or_insert(err);
    };
    let room = session.room_id.clone();
    let baseline = config.reputation.neutral_baseline;

    for (name, esp) in &result.esp_results {
        let Some(team) = session.team_mut(name) else {
            fail(ApplyError::UnknownTeam(name.clone()), &room);
            continue;
        };
        team.credits = team.credits.saturating_add(esp.revenue.actual);
        summary.credits_added += esp.revenue.actual;

        for (destination, delta) in &esp.reputation_deltas {
            let current = team.reputation_at(destination, baseline);
            let updated = (i32::from(current) + delta).clamp(0, 100);
            let updated = u8::try_from(updated).unwrap_or(100);
            team.reputation.insert(destination.clone(), updated);
            summary.reputation_updates += 1;
        }
        info!(
            room = %room,
            team = %name,
            revenue = esp.revenue.actual,
            credits = team.credits,
            "revenue applied"
        );
    }

    for (name, earned) in &result.destination_earnings {
        let Some(destination) = session.destination_mut(name) else {
            fail(ApplyError::UnknownDestination(name.clone()), &room);
            continue;
        };
        destination.budget = destination.budget.saturating_add(*earned);
        summary.earnings_added += earned;
    }

    if let Some(report) = &result.investigation {
        for voter in &report.voters {
            let Some(destination) = session.destination_mut(voter) else {
                fail(ApplyError::UnknownDestination(voter.clone()), &room);
                continue;
            };
            if destination.budget < report.cost_per_voter {
                warn!(
                    room = %room,
                    destination = %voter,
                    budget = destination.budget,
                    cost = report.cost_per_voter,
                    "investigation cost exceeds budget, charging what is left"
                );
            }
            destination.budget = destination.budget.saturating_sub(report.cost_per_voter);
            summary.voters_charged += 1;
        }

        if let Some(client) = &report.suspended {
            match session.team_mut(&report.target_esp) {
                Some(team) => {
                    if let Some(state) = team.client_states.get_mut(client) {
                        state.status = ClientStatus::Suspended;
                        summary.suspended = Some(client.clone());
                        info!(room = %room, team = %report.target_esp, client = %client, "client suspended");
                    }
                }
                None => fail(ApplyError::UnknownTeam(report.target_esp.clone()), &room),
            }
        }
    }

    for destination in &mut session.destinations {
        destination.pending_vote = None;
    }

    first_error.map_or(Ok(summary), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::investigation::InvestigationReport;
    use crate::resolution::calculate;
    use crate::resolution::calculator::tests::{profile, session_with};
    use crate::session::InvestigationVote;
    use chrono::Utc;

    fn config() -> GameConfig {
        GameConfig {
            clients: vec![profile("a", 10_000, 1_000, &[("Gmail", 100.0)])],
            ..GameConfig::default()
        }
    }

    #[test]
    fn revenue_and_reputation_are_applied() {
        let config = config();
        let mut session = session_with(&["a"], 1);
        let result = calculate(&session, &config).unwrap();

        let summary = apply(&mut session, &result, &config).unwrap();
        let team = session.team("SendWave").unwrap();
        assert_eq!(team.credits, 1_000 + 850);
        assert_eq!(summary.credits_added, 850);
        assert_eq!(team.reputation["Gmail"], 72);
        assert_eq!(team.reputation["Yahoo"], 70);
        assert_eq!(session.destination("Gmail").unwrap().budget, 500 + 85);
    }

    #[test]
    fn reputation_is_clamped() {
        let config = config();
        let mut session = session_with(&["a"], 1);
        session.esp_teams[0].reputation.insert("Gmail".into(), 99);
        let mut result = calculate(&session, &config).unwrap();
        result.esp_results["SendWave"]
            .reputation_deltas
            .insert("Outlook".into(), -500);

        apply(&mut session, &result, &config).unwrap();
        let team = session.team("SendWave").unwrap();
        assert_eq!(team.reputation["Gmail"], 100);
        assert_eq!(team.reputation["Outlook"], 0);
    }

    #[test]
    fn unknown_team_is_reported_but_rest_is_applied() {
        let config = config();
        let mut session = session_with(&["a"], 1);
        let mut result = calculate(&session, &config).unwrap();
        let ghost = result.esp_results["SendWave"].clone();
        result.esp_results.insert("Ghost".into(), ghost);

        let err = apply(&mut session, &result, &config).unwrap_err();
        assert_eq!(err, ApplyError::UnknownTeam("Ghost".into()));
        assert_eq!(session.team("SendWave").unwrap().credits, 1_850);
        assert_eq!(session.destination("Gmail").unwrap().budget, 585);
    }

    #[test]
    fn investigation_charges_voters_and_suspends() {
        let config = config();
        let mut session = session_with(&["a"], 1);
        session.destinations[1].budget = 20;
        for destination in &mut session.destinations {
            destination.pending_vote = Some(InvestigationVote {
                target_esp: "SendWave".into(),
                cast_at: Utc::now(),
            });
        }
        let mut result = calculate(&session, &config).unwrap();
        result.investigation = Some(InvestigationReport {
            target_esp: "SendWave".into(),
            voters: vec!["Gmail".into(), "Outlook".into()],
            votes: 2,
            required: 2,
            violations: Vec::new(),
            suspended: Some("a".into()),
            cost_per_voter: 50,
        });

        let summary = apply(&mut session, &result, &config).unwrap();
        assert_eq!(summary.voters_charged, 2);
        assert_eq!(summary.suspended.as_deref(), Some("a"));
        assert_eq!(session.destination("Gmail").unwrap().budget, 500 + 85 - 50);
        assert_eq!(session.destination("Outlook").unwrap().budget, 0);
        assert_eq!(session.destination("Yahoo").unwrap().budget, 500);
        assert_eq!(
            session.team("SendWave").unwrap().client_states["a"].status,
            ClientStatus::Suspended
        );
        assert!(session.destinations.iter().all(|d| d.pending_vote.is_none()));
    }
}
