//! # Hotlympics Common Library
//!
//! Shared code for the Hotlympics rating client including:
//! - Item and comparison data model (wire-compatible with the backend)
//! - Leaderboard boards as published by the backend
//! - Event types (RaterEvent enum) and the broadcast EventBus
//! - Configuration loading
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod events;
pub mod leaderboard;
pub mod models;
pub mod time;

pub use error::{Error, Result};
pub use leaderboard::{BoardKind, Leaderboard};
pub use models::{Cohort, ComparisonOutcome, Item, Pair};
