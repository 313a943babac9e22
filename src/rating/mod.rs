//! Elo-style rating system for multi-sided games
//!
//! This module provides the win-probability calculator, the delta
//! calculator, the generic ledger and the engine that ties them together.

pub mod delta;
pub mod engine;
pub mod ledger;
pub mod probability;

// Re-export commonly used types
pub use delta::{DeltaCalculator, KFactorSchedule, RatingClass, UnderdogBoost};
pub use engine::{EntityRating, RatingEngine, SideInput, SideOutcome};
pub use ledger::{AppliedDelta, Ledger, LedgerEntry, LedgerKind};
pub use probability::{SideStrength, WinProbabilityCalculator};
