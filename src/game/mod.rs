//! Game lifecycle, rating application and the service around them
//!
//! The [`RatingBook`] holds all state. Its behaviour is split by concern:
//! lifecycle transitions, applying ratings, recalculation and read queries.
//! [`GameService`] wraps a book with locking, transactions and metrics.

pub mod book;
pub mod lifecycle;
pub mod locks;
pub mod queries;
mod ratings;
pub mod recalc;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use book::{RatingBook, RecalculationRequired};
pub use lifecycle::{DeclareOutcome, NewGame, NewSide};
pub use locks::{GameLockGuard, GameLocks};
pub use queries::{Board, LeaderboardQuery, LeaderboardRow, SideChance};
pub use recalc::RecalculationReport;
pub use service::{GameService, MutationPause, ServiceStats};
pub use storage::{BookStorage, InMemoryBookStorage, JsonFileStorage};
