//! Scenario files for headless games.
//!
//! A scenario seeds one room with ESP teams and destinations and scripts
//! the decisions each side makes per round. The CLI replays a scenario
//! through the round engine; tests use the same files as fixtures.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::schema::FilteringLevel;

/// Root of a scenario file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScenarioConfig {
    /// Room identifier
    pub room: String,

    /// Seed for spam-trap rolls
    #[serde(default)]
    pub seed: u64,

    /// Overrides `rounds.total_rounds` from the game configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rounds: Option<u32>,

    /// ESP teams
    pub esp_teams: Vec<EspTeamSetup>,

    /// Destination teams
    pub destinations: Vec<DestinationSetup>,

    /// Scripted decisions, one entry per round that has any
    #[serde(default)]
    pub rounds: Vec<RoundScript>,
}

/// Initial state of an ESP team.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EspTeamSetup {
    /// Team name
    pub name: String,
    /// Starting credits
    pub credits: u64,
    /// Player names
    #[serde(default)]
    pub players: Vec<String>,
    /// Clients owned from the start, by catalog id
    #[serde(default)]
    pub clients: Vec<String>,
    /// Starting reputation per destination (unset uses the neutral baseline)
    #[serde(default)]
    pub reputation: IndexMap<String, u8>,
}

/// Initial state of a destination team.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DestinationSetup {
    /// Destination name
    pub name: String,
    /// Starting budget
    pub budget: u64,
    /// Player names
    #[serde(default)]
    pub players: Vec<String>,
    /// Filtering level per ESP
    #[serde(default)]
    pub filtering: IndexMap<String, FilteringLevel>,
    /// Spam-trap network owned from the start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spam_trap: Option<SpamTrapSetup>,
}

/// A spam-trap network purchase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SpamTrapSetup {
    /// Round of purchase
    pub purchased_round: u32,
    /// Whether the purchase was announced to the ESPs
    #[serde(default)]
    pub announced: bool,
}

/// Decisions made during one round's planning phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct RoundScript {
    /// Round the decisions apply to
    pub round: u32,
    /// Clients acquired this round, per team
    pub acquire: IndexMap<String, Vec<String>>,
    /// Onboarding add-ons per team, per client: `none`, `warmup`, `hygiene`, `both`
    pub onboarding: IndexMap<String, IndexMap<String, String>>,
    /// Investigation votes: destination -> target ESP
    pub votes: IndexMap<String, String>,
    /// Filtering changes: destination -> ESP -> level
    pub filtering: IndexMap<String, IndexMap<String, FilteringLevel>>,
    /// Spam-trap purchases made this round: destination -> announced
    pub spam_traps: IndexMap<String, bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_scenario_parses() {
        let yaml = r"
room: ABC123
esp_teams:
  - name: SendWave
    credits: 1000
    clients: [retail_low]
destinations:
  - name: Gmail
    budget: 500
    filtering:
      SendWave: strict
rounds:
  - round: 1
    onboarding:
      SendWave:
        retail_low: both
    votes:
      Gmail: SendWave
";
        let scenario: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(scenario.room, "ABC123");
        assert_eq!(scenario.seed, 0);
        assert_eq!(
            scenario.destinations[0].filtering["SendWave"],
            FilteringLevel::Strict
        );
        assert_eq!(scenario.rounds[0].onboarding["SendWave"]["retail_low"], "both");
        assert_eq!(scenario.rounds[0].votes["Gmail"], "SendWave");
        assert!(scenario.rounds[0].acquire.is_empty());
    }
}
