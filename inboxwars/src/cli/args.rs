//! CLI argument definitions.
//!
//! All Clap derive structs for `InboxWars` command-line parsing.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::observability::LogFormat;

// ============================================================================
// Root CLI
// ============================================================================

/// Round lifecycle engine for the `InboxWars` deliverability game.
#[derive(Parser, Debug)]
#[command(name = "inboxwars", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "INBOXWARS_COLOR")]
    pub color: ColorChoice,

    /// Log line format.
    #[arg(long, default_value = "human", global = true, env = "INBOXWARS_LOG_FORMAT")]
    pub log_format: LogFormat,
}

// ============================================================================
// Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Play a scenario headlessly from the lobby to the last round.
    Simulate(SimulateArgs),

    /// Validate game configuration and scenario files.
    Validate(ValidateArgs),

    /// Display version information.
    Version(VersionArgs),
}

/// Arguments for `simulate`.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Game configuration (client catalog, costs, zones).
    #[arg(short, long, env = "INBOXWARS_CONFIG")]
    pub config: PathBuf,

    /// Scenario to play.
    #[arg(short, long)]
    pub scenario: PathBuf,

    /// Override the scenario's spam-trap seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write every broadcast as a JSON line to this file (`-` for stdout).
    #[arg(long, env = "INBOXWARS_EVENTS_FILE")]
    pub events_file: Option<PathBuf>,

    /// Serve Prometheus metrics on this port while the game runs.
    #[arg(long, env = "INBOXWARS_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Override the pause between a resolved round and consequences.
    #[arg(long)]
    pub review_delay_ms: Option<u64>,

    /// Output format for the final standings.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Game configuration files to validate.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Scenario files, checked against the first game configuration.
    #[arg(long = "scenario")]
    pub scenarios: Vec<PathBuf>,

    /// Treat warnings as errors.
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for `version`.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Output format for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simulate() {
        let cli = Cli::try_parse_from([
            "inboxwars",
            "-vv",
            "simulate",
            "--config",
            "game.yaml",
            "--scenario",
            "demo.yaml",
            "--seed",
            "9",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Simulate(args) => {
                assert_eq!(args.config, PathBuf::from("game.yaml"));
                assert_eq!(args.scenario, PathBuf::from("demo.yaml"));
                assert_eq!(args.seed, Some(9));
                assert_eq!(args.format, OutputFormat::Json);
                assert!(args.events_file.is_none());
            }
            other => panic!("expected simulate, got {other:?}"),
        }
    }

    #[test]
    fn validate_requires_files() {
        assert!(Cli::try_parse_from(["inboxwars", "validate"]).is_err());
        let cli = Cli::try_parse_from([
            "inboxwars",
            "validate",
            "game.yaml",
            "--scenario",
            "a.yaml",
            "--scenario",
            "b.yaml",
            "--strict",
        ])
        .unwrap();
        match cli.command {
            Commands::Validate(args) => {
                assert_eq!(args.files.len(), 1);
                assert_eq!(args.scenarios.len(), 2);
                assert!(args.strict);
            }
            other => panic!("expected validate, got {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "inboxwars",
            "version",
            "--quiet",
            "--color",
            "never",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.color, ColorChoice::Never);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
