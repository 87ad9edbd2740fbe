//! Configuration types shared by the engine and the CLI.

pub mod scenario;
pub mod schema;

pub use scenario::{
    DestinationSetup, EspTeamSetup, RoundScript, ScenarioConfig, SpamTrapSetup,
};
pub use schema::{
    ClientProfile, DeliverySettings, EconomySettings, FilteringLevel, FilteringPenalties,
    GameConfig, HygieneEffect, HygieneTable, InvestigationSettings, OnboardingSettings,
    ReputationSettings, ReputationZone, RiskTier, RoundSettings, SpamTrapSettings, WarmupSettings,
    to_basis_points,
};
