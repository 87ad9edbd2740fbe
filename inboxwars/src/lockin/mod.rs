//! Lock-in and budget reconciliation.
//!
//! Locking in ends a participant's planning phase. ESP teams are
//! reconciled first: the budget is checked, over-budget add-ons are
//! stripped and the surviving onboarding is committed and charged.
//! Destinations keep a pending investigation vote only if they can still
//! pay for it. All functions here operate on a session already held
//! exclusively by the caller.

pub mod budget;
pub mod commit;
pub mod decisions;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use inboxwars_core::config::GameConfig;

use crate::broadcast::Side;
use crate::error::ActionError;
use crate::phase::GamePhase;
use crate::session::Session;

pub use budget::{BudgetCheck, Correction, CorrectionReport, auto_correct, validate_budget};
pub use commit::{CommitSummary, commit_onboarding};
pub use decisions::{
    SPAM_TRAP_TOOL, acquire_client, pause_client, purchase_spam_trap, resume_client,
    set_filtering, set_onboarding,
};

/// Outcome of one lock-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInReceipt {
    /// Team or destination that locked in
    pub participant: String,
    /// Which side it plays
    pub side: Side,
    /// When the lock was recorded
    pub locked_at: DateTime<Utc>,
    /// Whether the timer forced the lock
    pub automatic: bool,
    /// Participants still deciding after this lock
    pub remaining: usize,
    /// Participants with players
    pub total: usize,
    /// Add-ons stripped to fit the budget
    pub corrections: Vec<Correction>,
    /// Onboarding committed at lock-in
    pub commit: Option<CommitSummary>,
    /// Whether a vote was dropped for lack of budget
    pub vote_dropped: bool,
}

impl LockInReceipt {
    /// Whether every participant has now locked in.
    #[must_use]
    pub const fn all_locked(&self) -> bool {
        self.remaining == 0
    }

    fn new(session: &Session, participant: &str, side: Side, now: DateTime<Utc>) -> Self {
        let (remaining, total) = session.lock_counts();
        Self {
            participant: participant.to_string(),
            side,
            locked_at: now,
            automatic: false,
            remaining,
            total,
            corrections: Vec::new(),
            commit: None,
            vote_dropped: false,
        }
    }
}

/// Locks an ESP team in, reconciling its budget and committing onboarding.
///
/// Reconciliation runs on a copy of the team that replaces the original
/// only when the commit succeeds.
///
/// # Errors
///
/// Rejected outside planning, for unknown or already-locked teams, and
/// when an owned client is missing from the catalog.
pub fn lock_in_team(
    session: &mut Session,
    team: &str,
    config: &GameConfig,
    now: DateTime<Utc>,
) -> Result<LockInReceipt, ActionError> {
    session.require_phase(GamePhase::Planning)?;
    let round = session.round;
    let esp = session
        .team_mut(team)
        .ok_or_else(|| ActionError::TeamNotFound(team.to_string()))?;
    if esp.locked_in {
        return Err(ActionError::AlreadyLocked(team.to_string()));
    }

    let mut staged = esp.clone();
    let report = auto_correct(&mut staged, config);
    let commit = commit_onboarding(&mut staged, round, config)?;
    staged.locked_in = true;
    staged.locked_in_at = Some(now);
    *esp = staged;

    let mut receipt = LockInReceipt::new(session, team, Side::Esp, now);
    receipt.corrections = report.corrections;
    receipt.commit = Some(commit);
    info!(
        room = %session.room_id,
        team,
        round,
        corrections = receipt.corrections.len(),
        remaining = receipt.remaining,
        "team locked in"
    );
    Ok(receipt)
}

/// Locks a destination in, dropping its vote if the budget no longer
/// covers the investigation cost.
///
/// # Errors
///
/// Rejected outside planning and for unknown or already-locked
/// destinations.
pub fn lock_in_destination(
    session: &mut Session,
    destination: &str,
    config: &GameConfig,
    now: DateTime<Utc>,
) -> Result<LockInReceipt, ActionError> {
    session.require_phase(GamePhase::Planning)?;
    let cost = config.investigation.cost;
    let dest = session
        .destination_mut(destination)
        .ok_or_else(|| ActionError::DestinationNotFound(destination.to_string()))?;
    if dest.locked_in {
        return Err(ActionError::AlreadyLocked(destination.to_string()));
    }

    let vote_dropped = dest.pending_vote.is_some() && dest.budget < cost;
    if vote_dropped {
        dest.pending_vote = None;
        info!(destination, budget = dest.budget, cost, "vote dropped, budget below investigation cost");
    }
    dest.locked_in = true;
    dest.locked_in_at = Some(now);

    let mut receipt = LockInReceipt::new(session, destination, Side::Destination, now);
    receipt.vote_dropped = vote_dropped;
    info!(
        room = %session.room_id,
        destination,
        round = session.round,
        remaining = receipt.remaining,
        "destination locked in"
    );
    Ok(receipt)
}

/// Locks in every participant with players that has not locked in yet.
///
/// A team whose commit fails is still locked, without committing, so the
/// round can proceed.
pub fn auto_lock_all(
    session: &mut Session,
    config: &GameConfig,
    now: DateTime<Utc>,
) -> Vec<LockInReceipt> {
    let teams: Vec<String> = session
        .esp_teams
        .iter()
        .filter(|t| t.has_players() && !t.locked_in)
        .map(|t| t.name.clone())
        .collect();
    let destinations: Vec<String> = session
        .destinations
        .iter()
        .filter(|d| d.has_players() && !d.locked_in)
        .map(|d| d.name.clone())
        .collect();

    let mut receipts = Vec::with_capacity(teams.len() + destinations.len());
    for team in &teams {
        let receipt = match lock_in_team(session, team, config, now) {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(room = %session.room_id, team = %team, error = %err, "auto-lock could not commit onboarding, locking as is");
                if let Some(esp) = session.team_mut(team) {
                    esp.locked_in = true;
                    esp.locked_in_at = Some(now);
                }
                LockInReceipt::new(session, team, Side::Esp, now)
            }
        };
        receipts.push(LockInReceipt {
            automatic: true,
            ..receipt
        });
    }
    for destination in &destinations {
        match lock_in_destination(session, destination, config, now) {
            Ok(receipt) => receipts.push(LockInReceipt {
                automatic: true,
                ..receipt
            }),
            Err(err) => {
                warn!(room = %session.room_id, destination = %destination, error = %err, "auto-lock failed");
            }
        }
    }

    info!(room = %session.room_id, round = session.round, locked = receipts.len(), "auto-lock complete");
    receipts
}
