//! `InboxWars` Core: shared configuration schema and error types
//!
//! This crate holds the static game configuration (client catalog, costs,
//! reputation zones) and scenario definitions shared by the engine and the
//! command-line driver in `inboxwars`.

pub mod config;
pub mod error;
