//! Static game configuration schema.
//!
//! Every value the round engine treats as a read-only input lives here:
//! onboarding add-on costs, the client catalog, reputation zones, filtering
//! penalties, investigation cost and consensus fraction. All sections are
//! defaulted so a configuration file only needs to list what it changes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Converts a fractional rate (`0.85`) into basis points (`8500`).
///
/// Rates are carried as integer basis points inside the engine so that
/// per-destination arithmetic is exact.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn to_basis_points(rate: f64) -> u32 {
    (rate.clamp(0.0, 1.0) * 10_000.0).round() as u32
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration for a game.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct GameConfig {
    /// Round pacing and scheduling
    pub rounds: RoundSettings,

    /// Mailbox providers taking part in every game
    pub destinations: Vec<String>,

    /// Onboarding add-on costs and effects
    pub onboarding: OnboardingSettings,

    /// Reputation zones and filtering penalties
    pub delivery: DeliverySettings,

    /// Reputation delta rules
    pub reputation: ReputationSettings,

    /// Spam-trap network tuning
    pub spam_traps: SpamTrapSettings,

    /// Investigation cost and consensus fraction
    pub investigation: InvestigationSettings,

    /// Revenue sharing with destinations
    pub economy: EconomySettings,

    /// Client catalog
    pub clients: Vec<ClientProfile>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            rounds: RoundSettings::default(),
            destinations: ["Gmail", "Outlook", "Yahoo"]
                .into_iter()
                .map(String::from)
                .collect(),
            onboarding: OnboardingSettings::default(),
            delivery: DeliverySettings::default(),
            reputation: ReputationSettings::default(),
            spam_traps: SpamTrapSettings::default(),
            investigation: InvestigationSettings::default(),
            economy: EconomySettings::default(),
            clients: Vec::new(),
        }
    }
}

impl GameConfig {
    /// Looks up a client profile by id.
    #[must_use]
    pub fn client(&self, id: &str) -> Option<&ClientProfile> {
        self.clients.iter().find(|c| c.id == id)
    }
}

// ============================================================================
// Rounds
// ============================================================================

/// Round pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct RoundSettings {
    /// Number of rounds before the game finishes
    pub total_rounds: u32,
    /// Planning phase countdown in seconds
    pub planning_duration_secs: u64,
    /// Longest countdown a host may start
    pub max_timer_secs: u64,
    /// Remaining seconds at which the auto-lock warning is broadcast
    pub warning_threshold_secs: u64,
    /// Delay between a resolved round and the move into consequences
    pub review_delay_ms: u64,
    /// Round whose planning phase fires the mandatory policy incident
    pub mandatory_policy_round: Option<u32>,
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self {
            total_rounds: 4,
            planning_duration_secs: 300,
            max_timer_secs: 3600,
            warning_threshold_secs: 15,
            review_delay_ms: 2000,
            mandatory_policy_round: Some(3),
        }
    }
}

// ============================================================================
// Onboarding add-ons
// ============================================================================

/// Onboarding add-on costs and effects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct OnboardingSettings {
    /// Warm-up add-on
    pub warmup: WarmupSettings,
    /// List hygiene add-on
    pub list_hygiene: HygieneTable,
}

/// Warm-up throttles a new client's volume during its first active round.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct WarmupSettings {
    /// Credit cost per client
    pub cost: u64,
    /// Volume multiplier applied in the first active round only
    pub volume_multiplier: f64,
}

impl Default for WarmupSettings {
    fn default() -> Self {
        Self {
            cost: 150,
            volume_multiplier: 0.5,
        }
    }
}

/// List hygiene permanently trims volume and spam-trap exposure, sized by
/// the client's risk tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct HygieneTable {
    /// Credit cost per client
    pub cost: u64,
    /// Effect on low-risk clients
    pub low: HygieneEffect,
    /// Effect on medium-risk clients
    pub medium: HygieneEffect,
    /// Effect on high-risk clients
    pub high: HygieneEffect,
}

impl HygieneTable {
    /// Returns the effect for the given risk tier.
    #[must_use]
    pub const fn for_tier(&self, tier: RiskTier) -> &HygieneEffect {
        match tier {
            RiskTier::Low => &self.low,
            RiskTier::Medium => &self.medium,
            RiskTier::High => &self.high,
        }
    }
}

impl Default for HygieneTable {
    fn default() -> Self {
        Self {
            cost: 80,
            low: HygieneEffect {
                volume_multiplier: 0.95,
                spam_trap_multiplier: 0.6,
            },
            medium: HygieneEffect {
                volume_multiplier: 0.90,
                spam_trap_multiplier: 0.5,
            },
            high: HygieneEffect {
                volume_multiplier: 0.85,
                spam_trap_multiplier: 0.4,
            },
        }
    }
}

/// Multipliers applied by list hygiene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HygieneEffect {
    /// Permanent volume multiplier
    pub volume_multiplier: f64,
    /// Permanent spam-trap risk multiplier
    pub spam_trap_multiplier: f64,
}

// ============================================================================
// Delivery
// ============================================================================

/// Reputation zones and filtering penalties.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct DeliverySettings {
    /// Zones, matched highest `min_reputation` first
    pub zones: Vec<ReputationZone>,
    /// False-positive percentage per filtering level
    pub filtering: FilteringPenalties,
}

impl DeliverySettings {
    /// Returns the zone a reputation score falls into.
    ///
    /// Zones are matched by the highest `min_reputation` not above the
    /// score, regardless of their order in the file.
    #[must_use]
    pub fn zone_for(&self, reputation: u8) -> Option<&ReputationZone> {
        self.zones
            .iter()
            .filter(|z| z.min_reputation <= reputation)
            .max_by_key(|z| z.min_reputation)
    }
}

impl Default for DeliverySettings {
    fn default() -> Self {
        let zone = |name: &str, min_reputation: u8, base_rate: f64| ReputationZone {
            name: name.to_string(),
            min_reputation,
            base_rate,
        };
        Self {
            zones: vec![
                zone("excellent", 90, 0.95),
                zone("good", 70, 0.85),
                zone("warning", 50, 0.70),
                zone("poor", 30, 0.50),
                zone("blacklist", 0, 0.05),
            ],
            filtering: FilteringPenalties::default(),
        }
    }
}

/// A reputation band and the inbox rate it earns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReputationZone {
    /// Zone name reported in delivery details
    pub name: String,
    /// Lowest reputation (inclusive) in this zone
    pub min_reputation: u8,
    /// Inbox rate before filtering, 0.0–1.0
    pub base_rate: f64,
}

/// Filtering strictness a destination applies to one ESP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilteringLevel {
    /// No false positives
    #[default]
    Permissive,
    /// Light filtering
    Moderate,
    /// Aggressive filtering
    Strict,
    /// Block-first filtering
    Maximum,
}

impl std::fmt::Display for FilteringLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Permissive => "permissive",
            Self::Moderate => "moderate",
            Self::Strict => "strict",
            Self::Maximum => "maximum",
        };
        f.write_str(s)
    }
}

/// False-positive percentage per filtering level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct FilteringPenalties {
    /// Permissive level penalty
    pub permissive: f64,
    /// Moderate level penalty
    pub moderate: f64,
    /// Strict level penalty
    pub strict: f64,
    /// Maximum level penalty
    pub maximum: f64,
}

impl FilteringPenalties {
    /// Returns the false-positive percentage for a level.
    #[must_use]
    pub const fn for_level(&self, level: FilteringLevel) -> f64 {
        match level {
            FilteringLevel::Permissive => self.permissive,
            FilteringLevel::Moderate => self.moderate,
            FilteringLevel::Strict => self.strict,
            FilteringLevel::Maximum => self.maximum,
        }
    }
}

impl Default for FilteringPenalties {
    fn default() -> Self {
        Self {
            permissive: 0.0,
            moderate: 3.0,
            strict: 8.0,
            maximum: 15.0,
        }
    }
}

// ============================================================================
// Reputation, spam traps, investigations, economy
// ============================================================================

/// Rules turning a round's sending into reputation deltas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ReputationSettings {
    /// Score assumed for a destination with no recorded reputation
    pub neutral_baseline: u8,
    /// Volume-weighted spam rate (percent) at or below which a bonus is earned
    pub clean_threshold_pct: f64,
    /// Bonus for staying at or under the clean threshold
    pub clean_bonus: i32,
    /// Points lost per percentage point above the clean threshold
    pub spam_rate_weight: f64,
    /// Cap on the points lost to spam rate in one round
    pub max_performance_penalty: i32,
    /// Points lost at a destination whose spam trap was hit
    pub spam_trap_penalty: i32,
}

impl Default for ReputationSettings {
    fn default() -> Self {
        Self {
            neutral_baseline: 70,
            clean_threshold_pct: 1.0,
            clean_bonus: 2,
            spam_rate_weight: 4.0,
            max_performance_penalty: 10,
            spam_trap_penalty: 10,
        }
    }
}

/// Spam-trap network tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct SpamTrapSettings {
    /// Factor applied to each client's trap risk while a network is active
    pub network_multiplier: f64,
    /// Budget a destination pays for a network
    pub network_cost: u64,
}

impl Default for SpamTrapSettings {
    fn default() -> Self {
        Self {
            network_multiplier: 3.0,
            network_cost: 100,
        }
    }
}

/// Investigation cost and consensus threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct InvestigationSettings {
    /// Budget reserved by a vote and charged when the investigation runs
    pub cost: u64,
    /// Consensus fraction numerator
    pub consensus_numerator: u32,
    /// Consensus fraction denominator
    pub consensus_denominator: u32,
}

impl InvestigationSettings {
    /// Votes needed for consensus among `participants` destinations,
    /// rounding up.
    #[must_use]
    pub const fn required_votes(&self, participants: usize) -> usize {
        let num = self.consensus_numerator as usize;
        let den = if self.consensus_denominator == 0 {
            1
        } else {
            self.consensus_denominator as usize
        };
        (participants * num).div_ceil(den)
    }
}

impl Default for InvestigationSettings {
    fn default() -> Self {
        Self {
            cost: 50,
            consensus_numerator: 2,
            consensus_denominator: 3,
        }
    }
}

/// Revenue sharing with destinations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct EconomySettings {
    /// Fraction of an ESP's actual revenue earned by destinations, split by
    /// volume share
    pub destination_revenue_share: f64,
}

impl Default for EconomySettings {
    fn default() -> Self {
        Self {
            destination_revenue_share: 0.10,
        }
    }
}

// ============================================================================
// Client catalog
// ============================================================================

/// Client risk tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// Low risk
    Low,
    /// Medium risk
    Medium,
    /// High risk
    High,
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

/// Immutable catalog entry for a client an ESP can acquire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClientProfile {
    /// Catalog identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Acquisition cost in credits
    pub cost: u64,
    /// Revenue per round in credits
    pub revenue: u64,
    /// Emails per round before modifiers
    pub volume: u64,
    /// Complaint rate in percent
    pub spam_rate: f64,
    /// Probability (0.0–1.0) of hitting an active spam trap
    #[serde(default)]
    pub spam_trap_risk: f64,
    /// Risk tier
    pub risk: RiskTier,
    /// Percentage of volume sent to each destination
    pub destination_distribution: IndexMap<String, f64>,
    /// First round in which the client can be acquired
    #[serde(default = "default_available_from")]
    pub available_from_round: u32,
}

const fn default_available_from() -> u32 {
    1
}
