//! Configuration loading and validation.
//!
//! The schema types live in `inboxwars-core`; this module reads them from
//! disk, validates them and freezes them in an `Arc`.

pub mod loader;
pub mod validation;

pub use inboxwars_core::config::*;
pub use loader::{ConfigLimits, ConfigLoader, LoadResult};
pub use validation::{ValidationResult, Validator};
