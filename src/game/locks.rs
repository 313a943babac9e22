//! Advisory per-game locks
//!
//! A lock is held for the duration of one lifecycle call on a game. Callers
//! never wait: a second caller on the same game gets a retryable error.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::error::{ConcurrencyError, EngineError, Result};
use crate::types::GameId;

/// Set of games currently being mutated
#[derive(Debug, Clone, Default)]
pub struct GameLocks {
    held: Arc<Mutex<HashSet<GameId>>>,
}

/// Held lock; released on drop
#[derive(Debug)]
pub struct GameLockGuard {
    game_id: GameId,
    held: Arc<Mutex<HashSet<GameId>>>,
}

impl GameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for a game without waiting
    pub fn try_acquire(&self, game_id: GameId) -> Result<GameLockGuard> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| EngineError::consistency("Game lock table is poisoned"))?;

        if !held.insert(game_id) {
            debug!("Game {} is already locked", game_id);
            return Err(ConcurrencyError::GameLocked { game_id }.into());
        }

        Ok(GameLockGuard {
            game_id,
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_locked(&self, game_id: GameId) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(&game_id))
            .unwrap_or(false)
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().map(|held| held.len()).unwrap_or(0)
    }
}

impl GameLockGuard {
    pub fn game_id(&self) -> GameId {
        self.game_id
    }
}

impl Drop for GameLockGuard {
    fn drop(&mut self) {
        match self.held.lock() {
            Ok(mut held) => {
                held.remove(&self.game_id);
            }
            Err(_) => warn!("Could not release lock on game {}", self.game_id),
        }
    }
}
