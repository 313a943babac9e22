//! Rivalry - Elo ratings for multi-sided games
//!
//! This crate tracks games between any number of sides inside communities,
//! rates individuals, per-community members, anonymous squads and named
//! collectives, and can replay history whenever a result changes.

pub mod config;
pub mod error;
pub mod game;
pub mod metrics;
pub mod rating;
pub mod roster;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{ConcurrencyError, EngineError, Result};
pub use types::*;

// Re-export key components
pub use game::{
    Board, BookStorage, GameService, JsonFileStorage, LeaderboardQuery, NewGame, NewSide,
    RatingBook,
};
pub use rating::{LedgerKind, RatingEngine};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
