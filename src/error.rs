//! Error types for the rating engine
//!
//! Engine operations return [`EngineError`] so callers can tell validation
//! failures from retryable contention. Binary, configuration and storage code
//! use anyhow, as elsewhere in the service.

use chrono::{DateTime, Utc};

use crate::types::GameId;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised by lifecycle and rating operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    #[error("Consistency check failed: {reason}")]
    Consistency { reason: String },

    #[error("Recalculation required for games completed since {since}")]
    RecalculationRequired { since: DateTime<Utc> },
}

/// Contention errors; always safe to retry once the holder finishes
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConcurrencyError {
    #[error("Game {game_id} is locked by another operation")]
    GameLocked { game_id: GameId },

    #[error("A rating recalculation is in progress")]
    RecalculationInProgress,
}

impl EngineError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn consistency(reason: impl Into<String>) -> Self {
        Self::Consistency {
            reason: reason.into(),
        }
    }

    /// Whether the same call may succeed if simply retried later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Concurrency(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_only_concurrency_errors_are_retryable() {
        let locked: EngineError = ConcurrencyError::GameLocked {
            game_id: Uuid::new_v4(),
        }
        .into();
        assert!(locked.is_retryable());
        assert!(EngineError::from(ConcurrencyError::RecalculationInProgress).is_retryable());

        assert!(!EngineError::validation("empty side").is_retryable());
        assert!(!EngineError::not_found("Game", "g1").is_retryable());
        assert!(!EngineError::consistency("never applied").is_retryable());
    }

    #[test]
    fn test_error_messages() {
        let err = EngineError::not_found("Member", "alice");
        assert_eq!(err.to_string(), "Member not found: alice");

        let err = EngineError::validation("side 2 has no members");
        assert_eq!(err.to_string(), "Validation failed: side 2 has no members");
    }
}
