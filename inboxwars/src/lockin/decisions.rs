//! Planning-phase decisions short of locking in.
//!
//! Every decision is rejected outside planning and after the deciding side
//! has locked in. Costs are earmarked, not charged; the charge happens at
//! lock-in.

use tracing::{debug, info};

use inboxwars_core::config::{FilteringLevel, GameConfig};

use super::budget::validate_budget;
use crate::error::ActionError;
use crate::phase::GamePhase;
use crate::session::{
    ClientStatus, Destination, EspTeam, FilteringPolicy, OnboardingChoice, Session,
    SpamTrapNetwork,
};

/// Tool name recorded when a destination buys a spam-trap network.
pub const SPAM_TRAP_TOOL: &str = "spam_trap_network";

fn open_team<'a>(session: &'a mut Session, team: &str) -> Result<&'a mut EspTeam, ActionError> {
    session.require_phase(GamePhase::Planning)?;
    let esp = session
        .team_mut(team)
        .ok_or_else(|| ActionError::TeamNotFound(team.to_string()))?;
    if esp.locked_in {
        return Err(ActionError::AlreadyLocked(team.to_string()));
    }
    Ok(esp)
}

fn open_destination<'a>(
    session: &'a mut Session,
    destination: &str,
) -> Result<&'a mut Destination, ActionError> {
    session.require_phase(GamePhase::Planning)?;
    let dest = session
        .destination_mut(destination)
        .ok_or_else(|| ActionError::DestinationNotFound(destination.to_string()))?;
    if dest.locked_in {
        return Err(ActionError::AlreadyLocked(destination.to_string()));
    }
    Ok(dest)
}

/// Chooses the onboarding add-ons for a client that has not been
/// activated. The choice can be changed until the team locks in.
///
/// # Errors
///
/// Rejected for clients the team does not own and for clients whose
/// onboarding was already committed.
pub fn set_onboarding(
    session: &mut Session,
    team: &str,
    client: &str,
    choice: OnboardingChoice,
) -> Result<(), ActionError> {
    let esp = open_team(session, team)?;
    if !esp.owns(client) {
        return Err(ActionError::ClientNotOwned {
            team: team.to_string(),
            client: client.to_string(),
        });
    }
    if esp
        .client_states
        .get(client)
        .is_some_and(|s| s.first_active_round.is_some())
    {
        return Err(ActionError::OnboardingAlreadyCommitted(client.to_string()));
    }
    esp.pending_onboarding.insert(client.to_string(), choice);
    debug!(team, client, ?choice, "onboarding selected");
    Ok(())
}

/// Acquires a catalog client, earmarking its cost.
///
/// # Errors
///
/// Rejected for unknown or not-yet-available clients, clients the team
/// already owns, and when the earmarked total would exceed credits.
pub fn acquire_client(
    session: &mut Session,
    team: &str,
    client: &str,
    config: &GameConfig,
) -> Result<(), ActionError> {
    let round = session.round;
    let profile = config
        .client(client)
        .ok_or_else(|| ActionError::UnknownClient(client.to_string()))?;
    let esp = open_team(session, team)?;
    if profile.available_from_round > round {
        return Err(ActionError::ClientNotYetAvailable {
            client: client.to_string(),
            available_from: profile.available_from_round,
        });
    }
    if esp.owns(client) {
        return Err(ActionError::ClientAlreadyOwned {
            team: team.to_string(),
            client: client.to_string(),
        });
    }
    let check = validate_budget(esp, config);
    let required = check.exposure.saturating_add(profile.cost);
    if required > esp.credits {
        return Err(ActionError::InsufficientBudget {
            required,
            available: esp.credits,
        });
    }

    esp.add_client(client);
    esp.committed_spend += profile.cost;
    info!(team, client, cost = profile.cost, round, "client acquired");
    Ok(())
}

fn set_status(
    session: &mut Session,
    team: &str,
    client: &str,
    status: ClientStatus,
) -> Result<(), ActionError> {
    let esp = open_team(session, team)?;
    let not_owned = || ActionError::ClientNotOwned {
        team: team.to_string(),
        client: client.to_string(),
    };
    if !esp.owns(client) {
        return Err(not_owned());
    }
    let state = esp.client_states.get_mut(client).ok_or_else(not_owned)?;
    if state.status == ClientStatus::Suspended {
        return Err(ActionError::ClientSuspended(client.to_string()));
    }
    state.status = status;
    debug!(team, client, ?status, "client status changed");
    Ok(())
}

/// Stops a client from sending until it is resumed.
///
/// # Errors
///
/// Rejected for clients the team does not own and for suspended clients.
pub fn pause_client(session: &mut Session, team: &str, client: &str) -> Result<(), ActionError> {
    set_status(session, team, client, ClientStatus::Paused)
}

/// Lets a paused client send again.
///
/// # Errors
///
/// Rejected for clients the team does not own and for suspended clients.
pub fn resume_client(session: &mut Session, team: &str, client: &str) -> Result<(), ActionError> {
    set_status(session, team, client, ClientStatus::Active)
}

/// Sets the filtering a destination applies to one ESP.
///
/// # Errors
///
/// Rejected for unknown ESPs.
pub fn set_filtering(
    session: &mut Session,
    destination: &str,
    esp: &str,
    level: FilteringLevel,
    config: &GameConfig,
) -> Result<(), ActionError> {
    if session.team(esp).is_none() {
        return Err(ActionError::TeamNotFound(esp.to_string()));
    }
    let dest = open_destination(session, destination)?;
    dest.filtering
        .insert(esp.to_string(), FilteringPolicy::from_level(level, config));
    debug!(destination, esp, %level, "filtering changed");
    Ok(())
}

/// Buys a spam-trap network, optionally announcing it to the ESPs.
///
/// Secret networks catch mail from this round; announced ones from the
/// next.
///
/// # Errors
///
/// Rejected when the destination already owns a network or cannot afford
/// one.
pub fn purchase_spam_trap(
    session: &mut Session,
    destination: &str,
    announced: bool,
    config: &GameConfig,
) -> Result<(), ActionError> {
    let round = session.round;
    let cost = config.spam_traps.network_cost;
    let dest = open_destination(session, destination)?;
    if dest.spam_trap.is_some() {
        return Err(ActionError::ToolAlreadyOwned {
            destination: destination.to_string(),
            tool: SPAM_TRAP_TOOL.to_string(),
        });
    }
    if dest.budget < cost {
        return Err(ActionError::InsufficientBudget {
            required: cost,
            available: dest.budget,
        });
    }
    dest.budget -= cost;
    dest.spam_trap = Some(SpamTrapNetwork {
        purchased_round: round,
        announced,
    });
    dest.owned_tools.push(SPAM_TRAP_TOOL.to_string());
    info!(destination, round, announced, cost, "spam-trap network purchased");
    Ok(())
}
