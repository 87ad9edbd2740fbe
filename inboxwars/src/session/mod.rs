//! Session model.
//!
//! A [`Session`] is the root aggregate for one room: round counter, current
//! phase, both sides' teams, the round timer and the append-only resolution
//! history. The engine owns sessions exclusively through a
//! [`SessionStore`](store::SessionStore).

pub mod store;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use inboxwars_core::config::{FilteringLevel, GameConfig, OnboardingSettings};

use crate::error::ActionError;
use crate::phase::GamePhase;
use crate::phase::timer::RoundTimer;
use crate::resolution::ResolutionResult;

pub use store::{InMemorySessionStore, SessionStore, SessionStoreExt};

// ============================================================================
// Modifiers
// ============================================================================

/// Rounds a modifier applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Applicability {
    /// Only the client's first active round
    FirstRoundOnly,
    /// Every round
    AllRounds,
}

impl Applicability {
    /// Whether a modifier with this applicability is in effect for `round`.
    #[must_use]
    pub fn applies(self, round: u32, first_active_round: Option<u32>) -> bool {
        match self {
            Self::FirstRoundOnly => first_active_round == Some(round),
            Self::AllRounds => true,
        }
    }
}

/// Where a modifier came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierSource {
    /// Warm-up onboarding add-on
    Warmup,
    /// List hygiene onboarding add-on
    ListHygiene,
    /// Incident card effect
    Incident(String),
}

/// Multiplicative adjustment to a client's volume or spam-trap risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modifier {
    /// Origin of the modifier
    pub source: ModifierSource,
    /// Factor applied while in effect
    pub multiplier: f64,
    /// Rounds the modifier is in effect
    pub applicability: Applicability,
    /// Player-facing description
    pub description: String,
}

fn combined_multiplier(modifiers: &[Modifier], round: u32, first_active: Option<u32>) -> f64 {
    modifiers
        .iter()
        .filter(|m| m.applicability.applies(round, first_active))
        .map(|m| m.multiplier)
        .product()
}

// ============================================================================
// Clients
// ============================================================================

/// Lifecycle status of an owned client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    /// Sending this round
    #[default]
    Active,
    /// Paused by the team
    Paused,
    /// Suspended by an investigation
    Suspended,
}

/// Mutable per-team record for one owned client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientState {
    /// Current status
    pub status: ClientStatus,
    /// Round the client's onboarding was committed, if it has been
    pub first_active_round: Option<u32>,
    /// Volume modifiers, applied in order
    pub volume_modifiers: Vec<Modifier>,
    /// Spam-trap risk modifiers, applied in order
    pub spam_trap_modifiers: Vec<Modifier>,
}

impl ClientState {
    /// Product of the volume modifiers in effect for `round`.
    #[must_use]
    pub fn volume_multiplier(&self, round: u32) -> f64 {
        combined_multiplier(&self.volume_modifiers, round, self.first_active_round)
    }

    /// Product of the spam-trap modifiers in effect for `round`.
    #[must_use]
    pub fn spam_trap_multiplier(&self, round: u32) -> f64 {
        combined_multiplier(&self.spam_trap_modifiers, round, self.first_active_round)
    }

    /// Whether the client was onboarded with warm-up.
    #[must_use]
    pub fn has_warmup(&self) -> bool {
        self.volume_modifiers
            .iter()
            .any(|m| m.source == ModifierSource::Warmup)
    }

    /// Whether the client was onboarded with list hygiene.
    #[must_use]
    pub fn has_hygiene(&self) -> bool {
        self.volume_modifiers
            .iter()
            .chain(&self.spam_trap_modifiers)
            .any(|m| m.source == ModifierSource::ListHygiene)
    }
}

/// A purchasable onboarding add-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOn {
    /// First-round volume throttle
    Warmup,
    /// Permanent volume and trap-risk reduction
    ListHygiene,
}

impl AddOn {
    /// Credit cost of the add-on.
    #[must_use]
    pub const fn cost(self, settings: &OnboardingSettings) -> u64 {
        match self {
            Self::Warmup => settings.warmup.cost,
            Self::ListHygiene => settings.list_hygiene.cost,
        }
    }
}

impl std::fmt::Display for AddOn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warmup => f.write_str("warm-up"),
            Self::ListHygiene => f.write_str("list hygiene"),
        }
    }
}

/// Add-ons chosen for a client that has not been activated yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingChoice {
    /// No add-ons
    #[default]
    None,
    /// Warm-up only
    WarmupOnly,
    /// List hygiene only
    HygieneOnly,
    /// Warm-up and list hygiene
    Both,
}

impl OnboardingChoice {
    /// Builds a choice from the two add-on selections.
    #[must_use]
    pub const fn from_flags(warmup: bool, hygiene: bool) -> Self {
        match (warmup, hygiene) {
            (false, false) => Self::None,
            (true, false) => Self::WarmupOnly,
            (false, true) => Self::HygieneOnly,
            (true, true) => Self::Both,
        }
    }

    /// Whether warm-up is selected.
    #[must_use]
    pub const fn warmup(self) -> bool {
        matches!(self, Self::WarmupOnly | Self::Both)
    }

    /// Whether list hygiene is selected.
    #[must_use]
    pub const fn hygiene(self) -> bool {
        matches!(self, Self::HygieneOnly | Self::Both)
    }

    /// Whether the add-on is part of this choice.
    #[must_use]
    pub const fn includes(self, add_on: AddOn) -> bool {
        match add_on {
            AddOn::Warmup => self.warmup(),
            AddOn::ListHygiene => self.hygiene(),
        }
    }

    /// The same choice with one add-on dropped.
    #[must_use]
    pub const fn without(self, add_on: AddOn) -> Self {
        match add_on {
            AddOn::Warmup => Self::from_flags(false, self.hygiene()),
            AddOn::ListHygiene => Self::from_flags(self.warmup(), false),
        }
    }

    /// Total credit cost of the selected add-ons.
    #[must_use]
    pub const fn cost(self, settings: &OnboardingSettings) -> u64 {
        let mut total = 0;
        if self.warmup() {
            total += settings.warmup.cost;
        }
        if self.hygiene() {
            total += settings.list_hygiene.cost;
        }
        total
    }
}

impl FromStr for OnboardingChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "warmup" | "warm-up" | "warmup_only" => Ok(Self::WarmupOnly),
            "hygiene" | "list_hygiene" | "hygiene_only" => Ok(Self::HygieneOnly),
            "both" => Ok(Self::Both),
            other => Err(format!(
                "unknown onboarding choice '{other}' (expected none, warmup, hygiene or both)"
            )),
        }
    }
}

// ============================================================================
// ESP teams
// ============================================================================

/// A team playing an email-sending service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EspTeam {
    /// Team name
    pub name: String,
    /// Credit balance
    pub credits: u64,
    /// Reputation per destination, 0–100
    pub reputation: IndexMap<String, u8>,
    /// Owned client ids
    pub active_clients: Vec<String>,
    /// Per-client state, keyed by client id
    pub client_states: IndexMap<String, ClientState>,
    /// Onboarding choices not yet committed
    pub pending_onboarding: IndexMap<String, OnboardingChoice>,
    /// Spend already earmarked this round, charged at commit
    pub committed_spend: u64,
    /// Player names
    pub players: Vec<String>,
    /// Whether the team has locked in this round
    pub locked_in: bool,
    /// When the team locked in
    pub locked_in_at: Option<DateTime<Utc>>,
}

impl EspTeam {
    /// Creates a team with a starting balance and no clients.
    #[must_use]
    pub fn new(name: impl Into<String>, credits: u64) -> Self {
        Self {
            name: name.into(),
            credits,
            ..Self::default()
        }
    }

    /// Reputation at `destination`, or `baseline` when unset.
    #[must_use]
    pub fn reputation_at(&self, destination: &str, baseline: u8) -> u8 {
        self.reputation
            .get(destination)
            .copied()
            .unwrap_or(baseline)
            .min(100)
    }

    /// Whether any player is assigned to the team.
    #[must_use]
    pub fn has_players(&self) -> bool {
        !self.players.is_empty()
    }

    /// Whether the team owns `client_id`.
    #[must_use]
    pub fn owns(&self, client_id: &str) -> bool {
        self.active_clients.iter().any(|c| c == client_id)
    }

    /// Adds a client with a fresh state. Returns `false` if already owned.
    pub fn add_client(&mut self, client_id: impl Into<String>) -> bool {
        let client_id = client_id.into();
        if self.owns(&client_id) {
            return false;
        }
        self.client_states
            .insert(client_id.clone(), ClientState::default());
        self.active_clients.push(client_id);
        true
    }

    /// Owned clients whose status is [`ClientStatus::Active`].
    pub fn sending_clients(&self) -> impl Iterator<Item = (&str, &ClientState)> {
        self.active_clients.iter().filter_map(|id| {
            self.client_states
                .get(id)
                .filter(|s| s.status == ClientStatus::Active)
                .map(|s| (id.as_str(), s))
        })
    }

    fn clear_lock(&mut self) {
        self.locked_in = false;
        self.locked_in_at = None;
    }
}

// ============================================================================
// Destinations
// ============================================================================

/// Filtering a destination applies to one ESP.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FilteringPolicy {
    /// Strictness level
    pub level: FilteringLevel,
    /// Percentage points removed from the inbox rate
    pub false_positive_pct: f64,
}

impl FilteringPolicy {
    /// Policy for a level using the configured penalties.
    #[must_use]
    pub const fn from_level(level: FilteringLevel, config: &GameConfig) -> Self {
        Self {
            level,
            false_positive_pct: config.delivery.filtering.for_level(level),
        }
    }
}

/// A purchased spam-trap network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpamTrapNetwork {
    /// Round of purchase
    pub purchased_round: u32,
    /// Whether the ESPs were told about the purchase
    pub announced: bool,
}

impl SpamTrapNetwork {
    /// Whether the network catches mail in `round`.
    ///
    /// Secret networks work from the purchase round; announced networks
    /// start one round later.
    #[must_use]
    pub const fn is_active(&self, round: u32) -> bool {
        if self.announced {
            self.purchased_round < round
        } else {
            self.purchased_round <= round
        }
    }
}

/// A destination's standing vote to investigate an ESP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigationVote {
    /// ESP under suspicion
    pub target_esp: String,
    /// When the vote was cast
    pub cast_at: DateTime<Utc>,
}

/// A team playing a mailbox provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Destination {
    /// Destination name
    pub name: String,
    /// Budget balance
    pub budget: u64,
    /// Filtering per ESP; missing entries are permissive
    pub filtering: IndexMap<String, FilteringPolicy>,
    /// Spam-trap network, if purchased
    pub spam_trap: Option<SpamTrapNetwork>,
    /// Tools bought from the tool shop
    pub owned_tools: Vec<String>,
    /// Player names
    pub players: Vec<String>,
    /// Whether the destination has locked in this round
    pub locked_in: bool,
    /// When the destination locked in
    pub locked_in_at: Option<DateTime<Utc>>,
    /// Standing investigation vote
    pub pending_vote: Option<InvestigationVote>,
}

impl Destination {
    /// Creates a destination with a starting budget.
    #[must_use]
    pub fn new(name: impl Into<String>, budget: u64) -> Self {
        Self {
            name: name.into(),
            budget,
            ..Self::default()
        }
    }

    /// Filtering applied to `esp`.
    #[must_use]
    pub fn filtering_for(&self, esp: &str) -> FilteringPolicy {
        self.filtering.get(esp).copied().unwrap_or_default()
    }

    /// Whether any player is assigned.
    #[must_use]
    pub fn has_players(&self) -> bool {
        !self.players.is_empty()
    }

    fn clear_lock(&mut self) {
        self.locked_in = false;
        self.locked_in_at = None;
    }
}

// ============================================================================
// History
// ============================================================================

/// One resolved round, immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Round number
    pub round: u32,
    /// Computed outcome
    pub result: ResolutionResult,
    /// When the entry was appended
    pub recorded_at: DateTime<Utc>,
}

// ============================================================================
// Session
// ============================================================================

/// Root aggregate for one room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Room identifier
    pub room_id: String,
    /// Current round, 0 before the first planning phase
    pub round: u32,
    /// Current phase
    pub phase: GamePhase,
    /// ESP teams
    pub esp_teams: Vec<EspTeam>,
    /// Destination teams
    pub destinations: Vec<Destination>,
    /// Round timer
    pub timer: Option<RoundTimer>,
    /// Resolved rounds, created on first append
    pub history: Option<Vec<HistoryEntry>>,
    /// Seed for spam-trap rolls
    pub rng_seed: u64,
    /// Whether the mandatory policy incident has fired
    pub mandatory_policy_fired: bool,
    /// Rounds before the game finishes
    pub total_rounds: u32,
}

impl Session {
    /// Creates an empty session in the lobby.
    #[must_use]
    pub fn new(room_id: impl Into<String>, total_rounds: u32) -> Self {
        Self {
            room_id: room_id.into(),
            round: 0,
            phase: GamePhase::Lobby,
            esp_teams: Vec::new(),
            destinations: Vec::new(),
            timer: None,
            history: None,
            rng_seed: 0,
            mandatory_policy_fired: false,
            total_rounds,
        }
    }

    /// Fails unless the session is in `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::WrongPhase`] naming both phases.
    pub fn require_phase(&self, expected: GamePhase) -> Result<(), ActionError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(ActionError::WrongPhase {
                expected,
                actual: self.phase,
            })
        }
    }

    /// Looks up an ESP team.
    #[must_use]
    pub fn team(&self, name: &str) -> Option<&EspTeam> {
        self.esp_teams.iter().find(|t| t.name == name)
    }

    /// Looks up an ESP team mutably.
    pub fn team_mut(&mut self, name: &str) -> Option<&mut EspTeam> {
        self.esp_teams.iter_mut().find(|t| t.name == name)
    }

    /// Looks up a destination.
    #[must_use]
    pub fn destination(&self, name: &str) -> Option<&Destination> {
        self.destinations.iter().find(|d| d.name == name)
    }

    /// Looks up a destination mutably.
    pub fn destination_mut(&mut self, name: &str) -> Option<&mut Destination> {
        self.destinations.iter_mut().find(|d| d.name == name)
    }

    /// Whether history already holds an entry for `round`.
    #[must_use]
    pub fn has_history_for(&self, round: u32) -> bool {
        self.history
            .as_ref()
            .is_some_and(|h| h.iter().any(|e| e.round == round))
    }

    /// Appends a history entry unless its round is already recorded.
    ///
    /// Returns `false` when an entry for the round exists.
    pub fn append_history(&mut self, entry: HistoryEntry) -> bool {
        if self.has_history_for(entry.round) {
            return false;
        }
        self.history.get_or_insert_with(Vec::new).push(entry);
        true
    }

    /// Most recent resolution result.
    #[must_use]
    pub fn latest_result(&self) -> Option<&ResolutionResult> {
        self.history
            .as_ref()
            .and_then(|h| h.last())
            .map(|e| &e.result)
    }

    /// Participants with players that have not locked in, and the total
    /// number of participants with players.
    #[must_use]
    pub fn lock_counts(&self) -> (usize, usize) {
        let teams = self.esp_teams.iter().filter(|t| t.has_players());
        let dests = self.destinations.iter().filter(|d| d.has_players());
        let total = teams.clone().count() + dests.clone().count();
        let remaining = teams.filter(|t| !t.locked_in).count()
            + dests.filter(|d| !d.locked_in).count();
        (remaining, total)
    }

    /// Number of destinations with at least one player.
    #[must_use]
    pub fn active_destination_count(&self) -> usize {
        self.destinations.iter().filter(|d| d.has_players()).count()
    }

    /// Clears lock-in flags and timestamps on both sides.
    pub fn clear_locks(&mut self) {
        self.esp_teams.iter_mut().for_each(EspTeam::clear_lock);
        self.destinations.iter_mut().for_each(Destination::clear_lock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modifier(source: ModifierSource, multiplier: f64, applicability: Applicability) -> Modifier {
        Modifier {
            source,
            multiplier,
            applicability,
            description: String::new(),
        }
    }

    #[test]
    fn first_round_only_applies_on_activation_round() {
        assert!(Applicability::FirstRoundOnly.applies(2, Some(2)));
        assert!(!Applicability::FirstRoundOnly.applies(3, Some(2)));
        assert!(!Applicability::FirstRoundOnly.applies(2, None));
        assert!(Applicability::AllRounds.applies(7, None));
    }

    #[test]
    fn volume_multiplier_multiplies_applicable_modifiers() {
        let state = ClientState {
            first_active_round: Some(1),
            volume_modifiers: vec![
                modifier(ModifierSource::Warmup, 0.5, Applicability::FirstRoundOnly),
                modifier(ModifierSource::ListHygiene, 0.9, Applicability::AllRounds),
            ],
            ..ClientState::default()
        };
        assert!((state.volume_multiplier(1) - 0.45).abs() < 1e-12);
        assert!((state.volume_multiplier(2) - 0.9).abs() < 1e-12);
        assert!(state.has_warmup());
        assert!(state.has_hygiene());
    }

    #[test]
    fn onboarding_choice_flags_round_trip() {
        for choice in [
            OnboardingChoice::None,
            OnboardingChoice::WarmupOnly,
            OnboardingChoice::HygieneOnly,
            OnboardingChoice::Both,
        ] {
            assert_eq!(
                OnboardingChoice::from_flags(choice.warmup(), choice.hygiene()),
                choice
            );
        }
        assert_eq!(
            OnboardingChoice::Both.without(AddOn::Warmup),
            OnboardingChoice::HygieneOnly
        );
        assert_eq!(
            OnboardingChoice::HygieneOnly.without(AddOn::ListHygiene),
            OnboardingChoice::None
        );
    }

    #[test]
    fn onboarding_choice_cost() {
        let settings = OnboardingSettings::default();
        assert_eq!(OnboardingChoice::None.cost(&settings), 0);
        assert_eq!(OnboardingChoice::WarmupOnly.cost(&settings), 150);
        assert_eq!(OnboardingChoice::HygieneOnly.cost(&settings), 80);
        assert_eq!(OnboardingChoice::Both.cost(&settings), 230);
    }

    #[test]
    fn onboarding_choice_parses() {
        assert_eq!("both".parse(), Ok(OnboardingChoice::Both));
        assert_eq!("Warmup".parse(), Ok(OnboardingChoice::WarmupOnly));
        assert_eq!("hygiene".parse(), Ok(OnboardingChoice::HygieneOnly));
        assert!("turbo".parse::<OnboardingChoice>().is_err());
    }

    #[test]
    fn spam_trap_activation_delay() {
        let secret = SpamTrapNetwork {
            purchased_round: 2,
            announced: false,
        };
        assert!(!secret.is_active(1));
        assert!(secret.is_active(2));
        assert!(secret.is_active(4));

        let announced = SpamTrapNetwork {
            purchased_round: 2,
            announced: true,
        };
        assert!(!announced.is_active(2));
        assert!(announced.is_active(3));
        assert!(announced.is_active(4));
    }

    #[test]
    fn sending_clients_skips_paused_and_suspended() {
        let mut team = EspTeam::new("SendWave", 100);
        team.add_client("a");
        team.add_client("b");
        team.add_client("c");
        team.client_states["b"].status = ClientStatus::Paused;
        team.client_states["c"].status = ClientStatus::Suspended;
        let ids: Vec<&str> = team.sending_clients().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a"]);
        assert!(!team.add_client("a"));
    }

    #[test]
    fn lock_counts_ignore_participants_without_players() {
        let mut session = Session::new("room", 4);
        let mut team = EspTeam::new("SendWave", 100);
        team.players.push("alice".into());
        session.esp_teams.push(team);
        session.esp_teams.push(EspTeam::new("Idle", 100));
        let mut gmail = Destination::new("Gmail", 100);
        gmail.players.push("dana".into());
        gmail.locked_in = true;
        session.destinations.push(gmail);

        assert_eq!(session.lock_counts(), (1, 2));
        session.clear_locks();
        assert_eq!(session.lock_counts(), (2, 2));
    }

    #[test]
    fn unset_reputation_uses_baseline() {
        let mut team = EspTeam::new("SendWave", 0);
        team.reputation.insert("Gmail".into(), 40);
        assert_eq!(team.reputation_at("Gmail", 70), 40);
        assert_eq!(team.reputation_at("Yahoo", 70), 70);
    }
}
