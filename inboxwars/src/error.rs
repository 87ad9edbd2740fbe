//! Error types for `InboxWars`
//!
//! Player-facing validation failures ([`ActionError`]) are returned as
//! ordinary `Err` values carrying a human-readable reason and leave the
//! session untouched. Calculation faults ([`ResolutionError`]) stop the
//! round from advancing; application faults ([`ApplyError`]) are logged and
//! the round advances anyway.

use thiserror::Error;

pub use inboxwars_core::error::{ConfigError, Severity, ValidationIssue};

use crate::phase::GamePhase;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `InboxWars` CLI operations.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Phase or player action rejected while driving a game
    pub const GAME_ERROR: i32 = 5;

    /// Round calculation failed
    pub const RESOLUTION_ERROR: i32 = 6;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `InboxWars` operations.
#[derive(Debug, Error)]
pub enum InboxWarsError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Phase machine error
    #[error(transparent)]
    Phase(#[from] PhaseError),

    /// Player action rejected
    #[error(transparent)]
    Action(#[from] ActionError),

    /// Round calculation failed
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl InboxWarsError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Phase(_) | Self::Action(_) => ExitCode::GAME_ERROR,
            Self::Resolution(_) => ExitCode::RESOLUTION_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Phase Errors
// ============================================================================

/// Phase state machine errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PhaseError {
    /// The requested edge is not in the transition table
    #[error("invalid phase transition: cannot move from {from} to {to}")]
    InvalidTransition {
        /// Current phase
        from: GamePhase,
        /// Requested phase
        to: GamePhase,
    },

    /// The room does not exist
    #[error("room not found: {0}")]
    RoomNotFound(String),
}

// ============================================================================
// Player Action Errors
// ============================================================================

/// Rejected player or host action.
///
/// The display string is the reason shown to the player.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    /// The room does not exist
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// No ESP team with this name
    #[error("team not found: {0}")]
    TeamNotFound(String),

    /// No destination with this name
    #[error("destination not found: {0}")]
    DestinationNotFound(String),

    /// The action is only allowed in another phase
    #[error("action requires the {expected} phase (current phase: {actual})")]
    WrongPhase {
        /// Phase the action needs
        expected: GamePhase,
        /// Phase the room is in
        actual: GamePhase,
    },

    /// The participant has already locked in this round
    #[error("{0} has already locked in for this round")]
    AlreadyLocked(String),

    /// Timer duration outside `1..=max`
    #[error("invalid timer duration {requested}s (must be between 1 and {max} seconds)")]
    InvalidTimerDuration {
        /// Requested duration
        requested: u64,
        /// Configured maximum
        max: u64,
    },

    /// Not enough credits or budget
    #[error("insufficient budget: {required} required, {available} available")]
    InsufficientBudget {
        /// Amount needed
        required: u64,
        /// Amount on hand
        available: u64,
    },

    /// Investigation vote names an unknown ESP
    #[error("invalid investigation target: {0}")]
    InvalidVoteTarget(String),

    /// Client id is not in the catalog
    #[error("unknown client: {0}")]
    UnknownClient(String),

    /// The team does not own the client
    #[error("{team} does not own client {client}")]
    ClientNotOwned {
        /// Team name
        team: String,
        /// Client id
        client: String,
    },

    /// The team already owns the client
    #[error("{team} already owns client {client}")]
    ClientAlreadyOwned {
        /// Team name
        team: String,
        /// Client id
        client: String,
    },

    /// Client cannot be acquired before its eligibility round
    #[error("client {client} is not available until round {available_from}")]
    ClientNotYetAvailable {
        /// Client id
        client: String,
        /// Eligibility round
        available_from: u32,
    },

    /// Onboarding is fixed once a client has been activated
    #[error("onboarding for client {0} was already committed")]
    OnboardingAlreadyCommitted(String),

    /// Suspended clients cannot be paused or resumed
    #[error("client {0} is suspended")]
    ClientSuspended(String),

    /// The destination already owns the tool
    #[error("{destination} already owns {tool}")]
    ToolAlreadyOwned {
        /// Destination name
        destination: String,
        /// Tool name
        tool: String,
    },
}

// ============================================================================
// Resolution Errors
// ============================================================================

/// Unexpected fault while computing a round's outcome.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolutionError {
    /// The room does not exist
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// Resolution requested outside the resolution phase
    #[error("resolution requires the resolution phase (current phase: {0})")]
    WrongPhase(GamePhase),

    /// An owned client is missing from the catalog
    #[error("team {team} owns client {client} which is not in the catalog")]
    UnknownClient {
        /// Team name
        team: String,
        /// Client id
        client: String,
    },

    /// No reputation zone covers a score
    #[error("no reputation zone covers score {0}")]
    NoZone(u8),

    /// A client's destination split cannot be used
    #[error("client {client} has an invalid distribution: {reason}")]
    InvalidDistribution {
        /// Client id
        client: String,
        /// What is wrong with it
        reason: String,
    },

    /// A computed value was NaN or infinite
    #[error("non-finite {what} for team {team}")]
    NonFinite {
        /// Team name
        team: String,
        /// Quantity that went non-finite
        what: &'static str,
    },
}

// ============================================================================
// Application Errors
// ============================================================================

/// A computed result could not be fully written back into the session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApplyError {
    /// The room disappeared between calculation and application
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// Result references a team the session does not have
    #[error("result references unknown team {0}")]
    UnknownTeam(String),

    /// Result references a destination the session does not have
    #[error("result references unknown destination {0}")]
    UnknownDestination(String),
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `InboxWars` operations.
pub type Result<T> = std::result::Result<T, InboxWarsError>;
