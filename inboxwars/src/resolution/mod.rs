//! Round resolution.
//!
//! [`calculate`] turns a session snapshot into a [`ResolutionResult`]
//! without touching the session; [`apply`] writes a result back. Keeping
//! the two apart lets the engine record history from a pure calculation
//! and still advance the round when write-back partially fails.

pub mod apply;
pub mod calculator;
pub mod delivery;
pub mod reputation;
pub mod spam_trap;
pub mod volume;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use inboxwars_core::config::FilteringLevel;

use crate::investigation::InvestigationReport;

pub use apply::{ApplySummary, apply};
pub use calculator::calculate;

/// Outcome of one round for every team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    /// Round the result belongs to
    pub round: u32,
    /// Per-ESP outcome, in session order
    pub esp_results: IndexMap<String, EspResolution>,
    /// Credits each destination earns, in session order
    pub destination_earnings: IndexMap<String, u64>,
    /// Investigation triggered by destination consensus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investigation: Option<InvestigationReport>,
}

impl ResolutionResult {
    /// Whether any ESP hit a spam trap at `destination`.
    #[must_use]
    pub fn spam_trap_hit(&self, team: &str, destination: &str) -> bool {
        self.esp_results
            .get(team)
            .is_some_and(|r| r.spam_trap.hit_destinations.iter().any(|d| d == destination))
    }
}

/// Outcome of one round for one ESP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EspResolution {
    /// Emails sent
    pub volume: VolumeBreakdown,
    /// Inbox rate per destination
    pub deliveries: IndexMap<String, DeliveryDetail>,
    /// Volume-weighted inbox rate
    pub aggregate_delivery_rate: f64,
    /// Revenue earned
    pub revenue: RevenueBreakdown,
    /// Reputation change per destination
    pub reputation_deltas: IndexMap<String, i32>,
    /// Spam-trap checks
    pub spam_trap: SpamTrapOutcome,
}

/// Emails sent by one ESP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeBreakdown {
    /// Adjusted volume per sending client
    pub per_client: IndexMap<String, u64>,
    /// Volume per client, split per destination
    pub per_client_destination: IndexMap<String, IndexMap<String, u64>>,
    /// Volume per destination across clients
    pub per_destination: IndexMap<String, u64>,
    /// Volume across destinations
    pub total: u64,
}

/// Delivery at one destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryDetail {
    /// Reputation the zone was picked from
    pub reputation: u8,
    /// Zone name
    pub zone: String,
    /// Zone inbox rate
    pub base_rate: f64,
    /// Filtering level applied
    pub filtering: FilteringLevel,
    /// Rate removed by filtering
    pub filtering_penalty: f64,
    /// Inbox rate after filtering, floored at zero
    pub final_rate: f64,
    /// `final_rate` in basis points
    pub final_rate_bps: u32,
}

/// Revenue earned by one ESP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueBreakdown {
    /// Revenue if every email reached the inbox
    pub base: u64,
    /// `base` scaled by the aggregate inbox rate
    pub actual: u64,
    /// Per-client revenue, each rounded on its own
    pub per_client: IndexMap<String, u64>,
}

/// Spam-trap checks for one ESP.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpamTrapOutcome {
    /// Combined hit probability per checked destination
    pub risk: IndexMap<String, f64>,
    /// Destinations whose trap caught the ESP
    pub hit_destinations: Vec<String>,
    /// Reputation lost per hit
    pub penalty_per_hit: i32,
}

impl SpamTrapOutcome {
    /// Whether any trap caught the ESP.
    #[must_use]
    pub fn any_hit(&self) -> bool {
        !self.hit_destinations.is_empty()
    }
}

/// Rounds `num / den` half away from zero. `den` must be non-zero.
pub(crate) const fn div_round(num: u128, den: u128) -> u128 {
    (2 * num + den) / (2 * den)
}
