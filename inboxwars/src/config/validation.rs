//! Semantic validation for game configuration and scenario files.
//!
//! Validation runs on the fully deserialized types and collects every issue
//! instead of stopping at the first one, so a host fixing a file sees the
//! whole list at once.

use std::collections::HashSet;

use inboxwars_core::config::{ClientProfile, GameConfig, ScenarioConfig};

use crate::error::{Severity, ValidationIssue};
use crate::session::OnboardingChoice;

/// Tolerance on a destination distribution summing to 100.
const DISTRIBUTION_TOLERANCE: f64 = 0.01;

/// Largest edit distance still offered as a suggestion.
const MAX_SUGGESTION_DISTANCE: usize = 3;

// ============================================================================
// Public API
// ============================================================================

/// Result of validating one file.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Issues that prevent loading.
    pub errors: Vec<ValidationIssue>,

    /// Informational issues.
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `true` if validation passed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Collects validation issues for game configuration and scenarios.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a game configuration.
    pub fn validate_game_config(&mut self, config: &GameConfig) -> ValidationResult {
        self.reset();
        self.validate_rounds(config);
        self.validate_destinations(config);
        self.validate_delivery(config);
        self.validate_onboarding(config);
        self.validate_economy(config);
        self.validate_clients(config);
        self.finish()
    }

    /// Validates a scenario against the game configuration it will run with.
    pub fn validate_scenario(
        &mut self,
        scenario: &ScenarioConfig,
        game: &GameConfig,
    ) -> ValidationResult {
        self.reset();
        if scenario.room.trim().is_empty() {
            self.add_error("room", "room identifier is empty");
        }
        if scenario.total_rounds == Some(0) {
            self.add_error("total_rounds", "game needs at least one round");
        }
        let teams = self.validate_scenario_teams(scenario, game);
        let destinations = self.validate_scenario_destinations(scenario, game, &teams);
        self.validate_scripts(scenario, game, &teams, &destinations);
        self.finish()
    }

    // ========================================================================
    // Game configuration
    // ========================================================================

    fn validate_rounds(&mut self, config: &GameConfig) {
        let rounds = &config.rounds;
        if rounds.total_rounds == 0 {
            self.add_error("rounds.total_rounds", "game needs at least one round");
        }
        if rounds.max_timer_secs == 0 {
            self.add_error("rounds.max_timer_secs", "maximum timer must be positive");
        }
        if rounds.planning_duration_secs == 0
            || rounds.planning_duration_secs > rounds.max_timer_secs
        {
            self.add_error(
                "rounds.planning_duration_secs",
                &format!(
                    "planning duration {}s must be between 1 and {} seconds",
                    rounds.planning_duration_secs, rounds.max_timer_secs
                ),
            );
        }
        if rounds.warning_threshold_secs >= rounds.planning_duration_secs {
            self.add_warning(
                "rounds.warning_threshold_secs",
                "warning threshold is not below the planning duration; the warning fires immediately",
            );
        }
        if let Some(round) = rounds.mandatory_policy_round
            && (round == 0 || round > rounds.total_rounds)
        {
            self.add_warning(
                "rounds.mandatory_policy_round",
                &format!("round {round} never happens; the mandatory policy will not fire"),
            );
        }
    }

    fn validate_destinations(&mut self, config: &GameConfig) {
        if config.destinations.is_empty() {
            self.add_error("destinations", "at least one destination is required");
        }
        let mut seen = HashSet::new();
        for (i, name) in config.destinations.iter().enumerate() {
            if !seen.insert(name.as_str()) {
                self.add_error(
                    &format!("destinations[{i}]"),
                    &format!("duplicate destination '{name}'"),
                );
            }
        }
    }

    fn validate_delivery(&mut self, config: &GameConfig) {
        let delivery = &config.delivery;
        if delivery.zones.is_empty() {
            self.add_error("delivery.zones", "at least one reputation zone is required");
        } else if !delivery.zones.iter().any(|z| z.min_reputation == 0) {
            self.add_error(
                "delivery.zones",
                "no zone starts at reputation 0; low scores would have no delivery rate",
            );
        }

        let mut mins = HashSet::new();
        for (i, zone) in delivery.zones.iter().enumerate() {
            let path = format!("delivery.zones[{i}]");
            check_fraction(self, &format!("{path}.base_rate"), zone.base_rate);
            if zone.min_reputation > 100 {
                self.add_error(
                    &format!("{path}.min_reputation"),
                    "reputation thresholds must be between 0 and 100",
                );
            }
            if !mins.insert(zone.min_reputation) {
                self.add_warning(
                    &path,
                    &format!(
                        "zone '{}' shares threshold {} with another zone",
                        zone.name, zone.min_reputation
                    ),
                );
            }
        }

        let filtering = &delivery.filtering;
        for (level, pct) in [
            ("permissive", filtering.permissive),
            ("moderate", filtering.moderate),
            ("strict", filtering.strict),
            ("maximum", filtering.maximum),
        ] {
            if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
                self.add_error(
                    &format!("delivery.filtering.{level}"),
                    &format!("false-positive percentage {pct} must be between 0 and 100"),
                );
            }
        }

        if config.reputation.neutral_baseline > 100 {
            self.add_error(
                "reputation.neutral_baseline",
                "baseline must be between 0 and 100",
            );
        }
        if !config.reputation.spam_rate_weight.is_finite()
            || config.reputation.spam_rate_weight < 0.0
        {
            self.add_error(
                "reputation.spam_rate_weight",
                "weight must be a non-negative number",
            );
        }
        if config.reputation.max_performance_penalty < 0 {
            self.add_error(
                "reputation.max_performance_penalty",
                "penalty cap must not be negative",
            );
        }
    }

    fn validate_onboarding(&mut self, config: &GameConfig) {
        let onboarding = &config.onboarding;
        check_fraction(
            self,
            "onboarding.warmup.volume_multiplier",
            onboarding.warmup.volume_multiplier,
        );
        for (tier, effect) in [
            ("low", &onboarding.list_hygiene.low),
            ("medium", &onboarding.list_hygiene.medium),
            ("high", &onboarding.list_hygiene.high),
        ] {
            let path = format!("onboarding.list_hygiene.{tier}");
            check_fraction(self, &format!("{path}.volume_multiplier"), effect.volume_multiplier);
            check_fraction(
                self,
                &format!("{path}.spam_trap_multiplier"),
                effect.spam_trap_multiplier,
            );
        }
        let multiplier = config.spam_traps.network_multiplier;
        if !multiplier.is_finite() || multiplier < 0.0 {
            self.add_error(
                "spam_traps.network_multiplier",
                "multiplier must be a non-negative number",
            );
        }
    }

    fn validate_economy(&mut self, config: &GameConfig) {
        let investigation = &config.investigation;
        if investigation.consensus_denominator == 0 {
            self.add_error(
                "investigation.consensus_denominator",
                "consensus denominator must be positive",
            );
        } else if investigation.consensus_numerator > investigation.consensus_denominator {
            self.add_error(
                "investigation.consensus_numerator",
                "consensus fraction cannot exceed 1",
            );
        }
        if investigation.consensus_numerator == 0 {
            self.add_warning(
                "investigation.consensus_numerator",
                "a zero consensus fraction lets a single vote trigger an investigation",
            );
        }
        check_fraction(
            self,
            "economy.destination_revenue_share",
            config.economy.destination_revenue_share,
        );
    }

    fn validate_clients(&mut self, config: &GameConfig) {
        let mut ids = HashSet::new();
        for (i, client) in config.clients.iter().enumerate() {
            let path = format!("clients[{i}]");
            if client.id.trim().is_empty() {
                self.add_error(&format!("{path}.id"), "client id is empty");
            } else if !ids.insert(client.id.as_str()) {
                self.add_error(
                    &format!("{path}.id"),
                    &format!("duplicate client id '{}'", client.id),
                );
            }
            if !client.spam_rate.is_finite() || client.spam_rate < 0.0 {
                self.add_error(
                    &format!("{path}.spam_rate"),
                    "spam rate must be a non-negative percentage",
                );
            }
            check_fraction(self, &format!("{path}.spam_trap_risk"), client.spam_trap_risk);
            if client.available_from_round == 0 {
                self.add_error(
                    &format!("{path}.available_from_round"),
                    "rounds are numbered from 1",
                );
            } else if client.available_from_round > config.rounds.total_rounds {
                self.add_warning(
                    &format!("{path}.available_from_round"),
                    &format!(
                        "client '{}' only becomes available after the last round",
                        client.id
                    ),
                );
            }
            self.validate_distribution(&path, config, client);
        }
    }

    fn validate_distribution(
        &mut self,
        path: &str,
        config: &GameConfig,
        client: &ClientProfile,
    ) {
        let path = format!("{path}.destination_distribution");
        if client.destination_distribution.is_empty() {
            self.add_error(&path, "distribution lists no destinations");
            return;
        }
        let mut sum = 0.0;
        for (destination, pct) in &client.destination_distribution {
            if !pct.is_finite() || *pct < 0.0 {
                self.add_error(
                    &format!("{path}.{destination}"),
                    &format!("share {pct} must be a non-negative percentage"),
                );
            } else {
                sum += pct;
            }
            if !config.destinations.contains(destination) {
                let message = unknown_name("destination", destination, &config.destinations);
                self.add_error(&format!("{path}.{destination}"), &message);
            }
        }
        if (sum - 100.0).abs() > DISTRIBUTION_TOLERANCE {
            self.add_error(
                &path,
                &format!("distribution for '{}' sums to {sum}, expected 100", client.id),
            );
        }
    }

    // ========================================================================
    // Scenarios
    // ========================================================================

    fn validate_scenario_teams(
        &mut self,
        scenario: &ScenarioConfig,
        game: &GameConfig,
    ) -> Vec<String> {
        let catalog: Vec<String> = game.clients.iter().map(|c| c.id.clone()).collect();
        let mut names = Vec::new();
        for (i, team) in scenario.esp_teams.iter().enumerate() {
            let path = format!("esp_teams[{i}]");
            if team.name.trim().is_empty() {
                self.add_error(&format!("{path}.name"), "team name is empty");
            } else if names.contains(&team.name) {
                self.add_error(
                    &format!("{path}.name"),
                    &format!("duplicate team '{}'", team.name),
                );
            } else {
                names.push(team.name.clone());
            }
            for client in &team.clients {
                if !catalog.contains(client) {
                    let message = unknown_name("client", client, &catalog);
                    self.add_error(&format!("{path}.clients"), &message);
                }
            }
            for (destination, score) in &team.reputation {
                if !game.destinations.contains(destination) {
                    let message = unknown_name("destination", destination, &game.destinations);
                    self.add_error(&format!("{path}.reputation"), &message);
                }
                if *score > 100 {
                    self.add_error(
                        &format!("{path}.reputation.{destination}"),
                        "reputation must be between 0 and 100",
                    );
                }
            }
            if team.players.is_empty() {
                self.add_warning(
                    &format!("{path}.players"),
                    &format!("team '{}' has no players and will never lock in", team.name),
                );
            }
        }
        if names.is_empty() {
            self.add_error("esp_teams", "at least one ESP team is required");
        }
        names
    }

    fn validate_scenario_destinations(
        &mut self,
        scenario: &ScenarioConfig,
        game: &GameConfig,
        teams: &[String],
    ) -> Vec<String> {
        let mut names = Vec::new();
        for (i, destination) in scenario.destinations.iter().enumerate() {
            let path = format!("destinations[{i}]");
            if !game.destinations.contains(&destination.name) {
                let message = unknown_name("destination", &destination.name, &game.destinations);
                self.add_error(&format!("{path}.name"), &message);
            }
            if names.contains(&destination.name) {
                self.add_error(
                    &format!("{path}.name"),
                    &format!("duplicate destination '{}'", destination.name),
                );
            } else {
                names.push(destination.name.clone());
            }
            for esp in destination.filtering.keys() {
                if !teams.contains(esp) {
                    let message = unknown_name("ESP team", esp, teams);
                    self.add_error(&format!("{path}.filtering"), &message);
                }
            }
        }
        names
    }

    fn validate_scripts(
        &mut self,
        scenario: &ScenarioConfig,
        game: &GameConfig,
        teams: &[String],
        destinations: &[String],
    ) {
        let total = scenario.total_rounds.unwrap_or(game.rounds.total_rounds);
        let catalog: Vec<String> = game.clients.iter().map(|c| c.id.clone()).collect();
        let mut seen_rounds = HashSet::new();

        for (i, script) in scenario.rounds.iter().enumerate() {
            let path = format!("rounds[{i}]");
            if script.round == 0 || script.round > total {
                self.add_error(
                    &format!("{path}.round"),
                    &format!("round {} is outside 1..={total}", script.round),
                );
            }
            if !seen_rounds.insert(script.round) {
                self.add_error(
                    &format!("{path}.round"),
                    &format!("round {} is scripted twice", script.round),
                );
            }

            for (team, clients) in &script.acquire {
                self.check_member(&format!("{path}.acquire"), "ESP team", team, teams);
                for client in clients {
                    self.check_member(&format!("{path}.acquire.{team}"), "client", client, &catalog);
                }
            }
            for (team, choices) in &script.onboarding {
                self.check_member(&format!("{path}.onboarding"), "ESP team", team, teams);
                for (client, choice) in choices {
                    let client_path = format!("{path}.onboarding.{team}.{client}");
                    self.check_member(&client_path, "client", client, &catalog);
                    if let Err(reason) = choice.parse::<OnboardingChoice>() {
                        self.add_error(&client_path, &reason);
                    }
                }
            }
            for (destination, target) in &script.votes {
                self.check_member(&format!("{path}.votes"), "destination", destination, destinations);
                self.check_member(&format!("{path}.votes.{destination}"), "ESP team", target, teams);
            }
            for (destination, levels) in &script.filtering {
                self.check_member(&format!("{path}.filtering"), "destination", destination, destinations);
                for esp in levels.keys() {
                    self.check_member(
                        &format!("{path}.filtering.{destination}"),
                        "ESP team",
                        esp,
                        teams,
                    );
                }
            }
            for destination in script.spam_traps.keys() {
                self.check_member(&format!("{path}.spam_traps"), "destination", destination, destinations);
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn check_member(&mut self, path: &str, kind: &str, name: &str, known: &[String]) {
        if !known.iter().any(|k| k == name) {
            let message = unknown_name(kind, name, known);
            self.add_error(path, &message);
        }
    }

    fn reset(&mut self) {
        self.errors.clear();
        self.warnings.clear();
    }

    fn finish(&mut self) -> ValidationResult {
        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Error,
        });
    }

    fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
        });
    }
}

fn check_fraction(validator: &mut Validator, path: &str, value: f64) {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        validator.add_error(path, &format!("{value} must be between 0.0 and 1.0"));
    }
}

/// Closest known name within a small edit distance.
fn suggest(input: &str, known: &[String]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, strsim::damerau_levenshtein(input, k)))
        .filter(|(_, dist)| *dist <= MAX_SUGGESTION_DISTANCE)
        .min_by_key(|(_, dist)| *dist)
        .map(|(name, _)| name.clone())
}

fn unknown_name(kind: &str, name: &str, known: &[String]) -> String {
    suggest(name, known).map_or_else(
        || format!("unknown {kind} '{name}'"),
        |s| format!("unknown {kind} '{name}' (did you mean '{s}'?)"),
    )
}
