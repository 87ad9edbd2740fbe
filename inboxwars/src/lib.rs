//! `InboxWars` - round lifecycle engine for an email deliverability game
//!
//! ESP teams acquire and onboard clients, destination teams tune filtering
//! and vote on investigations, and the engine moves each room through
//! planning, resolution and consequences until the last round is played.

pub mod broadcast;
pub mod cli;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod incident;
pub mod investigation;
pub mod lockin;
pub mod observability;
pub mod phase;
pub mod resolution;
pub mod scenario;
pub mod session;
