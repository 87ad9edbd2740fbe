//! Investigation votes and consensus.
//!
//! A destination reserves the investigation cost by voting against an ESP.
//! At resolution the votes are grouped by target; the largest group wins
//! if it reaches the consensus fraction of destinations with players.
//! The investigated ESP's active high-risk clients lacking warm-up or list
//! hygiene are violations, and the worst offender by spam rate is
//! suspended.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use inboxwars_core::config::{GameConfig, RiskTier};

use crate::error::ActionError;
use crate::phase::GamePhase;
use crate::session::{ClientStatus, EspTeam, InvestigationVote, Session};

/// An unprotected high-risk client found by an investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Client id
    pub client_id: String,
    /// Client complaint rate in percent
    pub spam_rate: f64,
    /// Whether warm-up was missing
    pub missing_warmup: bool,
    /// Whether list hygiene was missing
    pub missing_hygiene: bool,
}

/// Outcome of a triggered investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationReport {
    /// Investigated ESP
    pub target_esp: String,
    /// Destinations whose vote supported the investigation
    pub voters: Vec<String>,
    /// Supporting votes
    pub votes: usize,
    /// Votes needed
    pub required: usize,
    /// Violations found
    pub violations: Vec<Violation>,
    /// Client suspended, if any violation was found
    pub suspended: Option<String>,
    /// Budget charged to each voter
    pub cost_per_voter: u64,
}

/// Largest vote group, if it reaches consensus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consensus {
    /// Target ESP
    pub target_esp: String,
    /// Destinations voting for the target
    pub voters: Vec<String>,
    /// Votes needed
    pub required: usize,
}

/// Records `destination`'s vote against `target_esp`, replacing any
/// earlier vote.
///
/// # Errors
///
/// Rejected outside planning, after the destination locked in, for
/// unknown voters or targets, and when the budget does not cover the
/// investigation cost.
pub fn cast_vote(
    session: &mut Session,
    destination: &str,
    target_esp: &str,
    config: &GameConfig,
    now: DateTime<Utc>,
) -> Result<(), ActionError> {
    session.require_phase(GamePhase::Planning)?;
    if session.team(target_esp).is_none() {
        return Err(ActionError::InvalidVoteTarget(target_esp.to_string()));
    }
    let cost = config.investigation.cost;
    let voter = session
        .destination_mut(destination)
        .ok_or_else(|| ActionError::DestinationNotFound(destination.to_string()))?;
    if voter.locked_in {
        return Err(ActionError::AlreadyLocked(destination.to_string()));
    }
    if voter.budget < cost {
        return Err(ActionError::InsufficientBudget {
            required: cost,
            available: voter.budget,
        });
    }
    voter.pending_vote = Some(InvestigationVote {
        target_esp: target_esp.to_string(),
        cast_at: now,
    });
    debug!(destination, target = target_esp, "investigation vote cast");
    Ok(())
}

/// Withdraws `destination`'s vote. Returns whether a vote was removed.
///
/// Removing a vote that does not exist succeeds.
///
/// # Errors
///
/// Rejected outside planning, after the destination locked in, and for
/// unknown destinations.
pub fn remove_vote(session: &mut Session, destination: &str) -> Result<bool, ActionError> {
    session.require_phase(GamePhase::Planning)?;
    let voter = session
        .destination_mut(destination)
        .ok_or_else(|| ActionError::DestinationNotFound(destination.to_string()))?;
    if voter.locked_in {
        return Err(ActionError::AlreadyLocked(destination.to_string()));
    }
    let removed = voter.pending_vote.take().is_some();
    debug!(destination, removed, "investigation vote withdrawn");
    Ok(removed)
}

/// Groups pending votes by target and returns the largest group when it
/// reaches consensus. Ties go to the target voted for first.
///
/// Only destinations with players vote, matching the threshold.
#[must_use]
pub fn evaluate_consensus(session: &Session, config: &GameConfig) -> Option<Consensus> {
    let participants = session.active_destination_count();
    let required = config.investigation.required_votes(participants);
    if required == 0 {
        return None;
    }

    let mut groups: IndexMap<&str, Vec<String>> = IndexMap::new();
    for destination in session.destinations.iter().filter(|d| d.has_players()) {
        if let Some(vote) = &destination.pending_vote {
            groups
                .entry(vote.target_esp.as_str())
                .or_default()
                .push(destination.name.clone());
        }
    }

    let (target, voters) = groups
        .into_iter()
        .reduce(|best, next| if next.1.len() > best.1.len() { next } else { best })?;
    (voters.len() >= required).then(|| Consensus {
        target_esp: target.to_string(),
        voters,
        required,
    })
}

/// Unprotected high-risk clients among `team`'s active clients.
#[must_use]
pub fn find_violations(team: &EspTeam, config: &GameConfig) -> Vec<Violation> {
    team.active_clients
        .iter()
        .filter_map(|id| {
            let state = team.client_states.get(id)?;
            if state.status != ClientStatus::Active {
                return None;
            }
            let profile = config.client(id)?;
            if profile.risk != RiskTier::High {
                return None;
            }
            let missing_warmup = !state.has_warmup();
            let missing_hygiene = !state.has_hygiene();
            (missing_warmup || missing_hygiene).then(|| Violation {
                client_id: id.clone(),
                spam_rate: profile.spam_rate,
                missing_warmup,
                missing_hygiene,
            })
        })
        .collect()
}

/// Runs the investigation backed by `consensus`. Pure; the suspension and
/// voter charges are applied with the rest of the round.
#[must_use]
pub fn run_investigation(
    session: &Session,
    consensus: Consensus,
    config: &GameConfig,
) -> InvestigationReport {
    let violations = session
        .team(&consensus.target_esp)
        .map(|team| find_violations(team, config))
        .unwrap_or_default();
    let suspended = violations
        .iter()
        .reduce(|worst, v| if v.spam_rate > worst.spam_rate { v } else { worst })
        .map(|v| v.client_id.clone());

    info!(
        room = %session.room_id,
        target = %consensus.target_esp,
        votes = consensus.voters.len(),
        violations = violations.len(),
        suspended = suspended.as_deref().unwrap_or("none"),
        "investigation triggered"
    );

    InvestigationReport {
        votes: consensus.voters.len(),
        target_esp: consensus.target_esp,
        voters: consensus.voters,
        required: consensus.required,
        violations,
        suspended,
        cost_per_voter: config.investigation.cost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::calculator::tests::{profile, session_with};
    use crate::session::{Applicability, Modifier, ModifierSource};

    fn planning_session() -> Session {
        let mut session = session_with(&[], 1);
        session.phase = GamePhase::Planning;
        session
    }

    fn config() -> GameConfig {
        GameConfig::default()
    }

    #[test]
    fn vote_replaces_previous_vote() {
        let mut session = planning_session();
        let mut rival = crate::session::EspTeam::new("MailMax", 0);
        rival.players.push("erin".into());
        session.esp_teams.push(rival);

        cast_vote(&mut session, "Gmail", "SendWave", &config(), Utc::now()).unwrap();
        cast_vote(&mut session, "Gmail", "MailMax", &config(), Utc::now()).unwrap();
        let vote = session.destination("Gmail").unwrap().pending_vote.clone().unwrap();
        assert_eq!(vote.target_esp, "MailMax");
    }

    #[test]
    fn vote_needs_budget_for_the_cost() {
        let mut session = planning_session();
        session.destinations[0].budget = 49;
        let err = cast_vote(&mut session, "Gmail", "SendWave", &config(), Utc::now()).unwrap_err();
        assert_eq!(
            err,
            ActionError::InsufficientBudget {
                required: 50,
                available: 49
            }
        );
    }

    #[test]
    fn vote_rejects_unknown_target_and_locked_voter() {
        let mut session = planning_session();
        assert_eq!(
            cast_vote(&mut session, "Gmail", "Nobody", &config(), Utc::now()),
            Err(ActionError::InvalidVoteTarget("Nobody".into()))
        );
        session.destinations[0].locked_in = true;
        assert_eq!(
            cast_vote(&mut session, "Gmail", "SendWave", &config(), Utc::now()),
            Err(ActionError::AlreadyLocked("Gmail".into()))
        );
    }

    #[test]
    fn vote_rejected_outside_planning() {
        let mut session = session_with(&[], 1);
        let err = cast_vote(&mut session, "Gmail", "SendWave", &config(), Utc::now()).unwrap_err();
        assert!(matches!(err, ActionError::WrongPhase { .. }));
    }

    #[test]
    fn removing_a_vote_twice_succeeds() {
        let mut session = planning_session();
        cast_vote(&mut session, "Gmail", "SendWave", &config(), Utc::now()).unwrap();
        assert_eq!(remove_vote(&mut session, "Gmail"), Ok(true));
        assert_eq!(remove_vote(&mut session, "Gmail"), Ok(false));
    }

    #[test]
    fn consensus_needs_two_thirds_rounded_up() {
        let mut session = planning_session();
        cast_vote(&mut session, "Gmail", "SendWave", &config(), Utc::now()).unwrap();
        assert!(evaluate_consensus(&session, &config()).is_none());

        cast_vote(&mut session, "Outlook", "SendWave", &config(), Utc::now()).unwrap();
        let consensus = evaluate_consensus(&session, &config()).unwrap();
        assert_eq!(consensus.target_esp, "SendWave");
        assert_eq!(consensus.voters, vec!["Gmail", "Outlook"]);
        assert_eq!(consensus.required, 2);
    }

    #[test]
    fn destinations_without_players_do_not_count() {
        let mut session = planning_session();
        session.destinations[2].players.clear();
        cast_vote(&mut session, "Gmail", "SendWave", &config(), Utc::now()).unwrap();
        assert!(evaluate_consensus(&session, &config()).is_none());
        cast_vote(&mut session, "Outlook", "SendWave", &config(), Utc::now()).unwrap();
        assert!(evaluate_consensus(&session, &config()).is_some());
    }

    #[test]
    fn votes_from_destinations_without_players_are_ignored() {
        let mut session = planning_session();
        session.destinations[2].players.clear();
        session.destinations[2].pending_vote = Some(InvestigationVote {
            target_esp: "SendWave".into(),
            cast_at: Utc::now(),
        });
        cast_vote(&mut session, "Gmail", "SendWave", &config(), Utc::now()).unwrap();
        assert!(evaluate_consensus(&session, &config()).is_none());

        cast_vote(&mut session, "Outlook", "SendWave", &config(), Utc::now()).unwrap();
        let consensus = evaluate_consensus(&session, &config()).unwrap();
        assert_eq!(consensus.voters, vec!["Gmail", "Outlook"]);
    }

    #[test]
    fn worst_unprotected_high_risk_client_is_suspended() {
        let mut quiet = profile("quiet", 100, 10, &[("Gmail", 100.0)]);
        quiet.risk = RiskTier::High;
        quiet.spam_rate = 2.0;
        let mut loud = profile("loud", 100, 10, &[("Gmail", 100.0)]);
        loud.risk = RiskTier::High;
        loud.spam_rate = 6.0;
        let mut covered = profile("covered", 100, 10, &[("Gmail", 100.0)]);
        covered.risk = RiskTier::High;
        covered.spam_rate = 9.0;
        let safe = profile("safe", 100, 10, &[("Gmail", 100.0)]);
        let config = GameConfig {
            clients: vec![quiet, loud, covered, safe],
            ..GameConfig::default()
        };

        let mut session = planning_session();
        let team = &mut session.esp_teams[0];
        for id in ["quiet", "loud", "covered", "safe"] {
            team.add_client(id);
        }
        let state = &mut team.client_states["covered"];
        for source in [ModifierSource::Warmup, ModifierSource::ListHygiene] {
            state.volume_modifiers.push(Modifier {
                source,
                multiplier: 1.0,
                applicability: Applicability::AllRounds,
                description: String::new(),
            });
        }

        let consensus = Consensus {
            target_esp: "SendWave".into(),
            voters: vec!["Gmail".into(), "Outlook".into()],
            required: 2,
        };
        let report = run_investigation(&session, consensus, &config);
        let ids: Vec<&str> = report.violations.iter().map(|v| v.client_id.as_str()).collect();
        assert_eq!(ids, vec!["quiet", "loud"]);
        assert_eq!(report.suspended.as_deref(), Some("loud"));
        assert_eq!(report.votes, 2);
        assert_eq!(report.cost_per_voter, 50);
    }

    #[test]
    fn clean_target_is_not_suspended() {
        let session = planning_session();
        let consensus = Consensus {
            target_esp: "SendWave".into(),
            voters: vec!["Gmail".into(), "Outlook".into()],
            required: 2,
        };
        let report = run_investigation(&session, consensus, &config());
        assert!(report.violations.is_empty());
        assert!(report.suspended.is_none());
    }
}
