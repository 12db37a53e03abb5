//! # chesslake common library
//!
//! Shared code for the chesslake pipeline:
//! - Error and result types
//! - Bootstrap configuration (TOML) and data root resolution
//! - Tracked players (YAML)
//! - Database initialization and migrations
//! - Timestamp and hashing helpers

pub mod config;
pub mod db;
pub mod error;
pub mod hash;
pub mod players;
pub mod time;

pub use error::{Error, Result};
pub use players::{player_key, Platform, TrackedPlayer, TrackedPlayers};
