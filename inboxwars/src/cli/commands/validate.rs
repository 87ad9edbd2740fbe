//! `validate` command.

use crate::cli::args::ValidateArgs;
use crate::config::ConfigLoader;
use crate::error::{ConfigError, InboxWarsError};

/// Validates game configuration files and scenarios.
///
/// Every file is checked even after a failure; the command fails if any
/// file has errors, or warnings under `--strict`.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationFailed`] with the number of failing
/// files, or an I/O error when a path does not exist.
pub fn run(args: &ValidateArgs) -> Result<(), InboxWarsError> {
    let loader = ConfigLoader::with_defaults();
    let mut failed = 0usize;
    let mut first_game = None;

    for path in &args.files {
        if !path.exists() {
            return Err(InboxWarsError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("file not found: {}", path.display()),
            )));
        }
        tracing::info!(file = %path.display(), "validating game configuration");
        match loader.load_game_config(path) {
            Ok(loaded) => {
                if args.strict && !loaded.warnings.is_empty() {
                    tracing::error!(file = %path.display(), warnings = loaded.warnings.len(), "warnings treated as errors");
                    failed += 1;
                } else {
                    tracing::info!(file = %path.display(), "configuration valid");
                }
                first_game.get_or_insert(loaded.config);
            }
            Err(e) => {
                report(path, &e);
                failed += 1;
            }
        }
    }

    if !args.scenarios.is_empty() {
        let Some(game) = first_game else {
            tracing::error!("scenarios need a valid game configuration to check against");
            return Err(ConfigError::ValidationFailed {
                count: failed + args.scenarios.len(),
            }
            .into());
        };
        for path in &args.scenarios {
            tracing::info!(file = %path.display(), "validating scenario");
            match loader.load_scenario(path, &game) {
                Ok(loaded) if args.strict && !loaded.warnings.is_empty() => {
                    tracing::error!(file = %path.display(), warnings = loaded.warnings.len(), "warnings treated as errors");
                    failed += 1;
                }
                Ok(_) => tracing::info!(file = %path.display(), "scenario valid"),
                Err(e) => {
                    report(path, &e);
                    failed += 1;
                }
            }
        }
    }

    if failed > 0 {
        return Err(ConfigError::ValidationFailed { count: failed }.into());
    }
    Ok(())
}

fn report(path: &std::path::Path, error: &ConfigError) {
    match error {
        ConfigError::ValidationError { errors, .. } => {
            for issue in errors {
                tracing::error!(file = %path.display(), location = %issue.path, "{}", issue.message);
            }
        }
        other => tracing::error!(file = %path.display(), "{other}"),
    }
}
