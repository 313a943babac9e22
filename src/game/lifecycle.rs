//! Game lifecycle: Pending -> Started -> Completed -> Confirmed
//!
//! Games are either opened with fixed side sizes and filled by joins, or
//! created directly from full member lists. Ratings move only when a ranked
//! game reaches Confirmed; reversing a confirmed game subtracts its deltas
//! and leaves a marker that a recalculation must clear.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::game::book::{RatingBook, RecalculationRequired};
use crate::rating::engine::RatingEngine;
use crate::rating::ledger::LedgerKind;
use crate::types::{
    CollectiveId, ContextId, Game, GameId, GameStatus, LineupEntry, MemberId, Side, SideDeltas,
    SideId,
};
use crate::utils::{generate_game_id, generate_side_id};

/// Members and optional team of one side of a new game
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewSide {
    pub members: Vec<MemberId>,
    #[serde(default)]
    pub collective_id: Option<CollectiveId>,
}

impl NewSide {
    pub fn of<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<MemberId>,
    {
        Self {
            members: members.into_iter().map(Into::into).collect(),
            collective_id: None,
        }
    }

    pub fn with_collective(mut self, collective_id: impl Into<CollectiveId>) -> Self {
        self.collective_id = Some(collective_id.into());
        self
    }
}

/// A game created directly in the Started state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewGame {
    pub context_id: ContextId,
    pub ranked: bool,
    pub sides: Vec<NewSide>,
}

/// Result of a winner declaration
#[derive(Debug, Clone, PartialEq)]
pub struct DeclareOutcome {
    pub game_id: GameId,
    pub status: GameStatus,
    pub winner: SideId,
    /// Ledger deltas applied by this call, one per rated entity
    pub applied: Vec<(LedgerKind, i64)>,
}

impl DeclareOutcome {
    /// Whether the call changed nothing because the game was already confirmed
    pub fn is_noop(&self) -> bool {
        self.status == GameStatus::Confirmed && self.applied.is_empty()
    }
}

impl RatingBook {
    /// Create a Started game from full member lists
    pub fn create_game(&mut self, new_game: NewGame, now: DateTime<Utc>) -> Result<GameId> {
        self.context(&new_game.context_id)?;
        if new_game.sides.len() < 2 {
            return Err(EngineError::validation(format!(
                "A game needs at least two sides, got {}",
                new_game.sides.len()
            )));
        }

        let mut seen: HashSet<&MemberId> = HashSet::new();
        let mut collectives: HashSet<&CollectiveId> = HashSet::new();
        for (index, side) in new_game.sides.iter().enumerate() {
            if side.members.is_empty() {
                return Err(EngineError::validation(format!(
                    "Side {} has no members",
                    index + 1
                )));
            }
            for member_id in &side.members {
                self.member_in_context(member_id, &new_game.context_id)?;
                if !seen.insert(member_id) {
                    return Err(EngineError::validation(format!(
                        "Member '{member_id}' appears more than once in the game"
                    )));
                }
            }
            if let Some(collective_id) = &side.collective_id {
                let collective = self.collective(collective_id)?;
                if collective.context_id != new_game.context_id {
                    return Err(EngineError::validation(format!(
                        "Collective '{collective_id}' does not belong to context '{}'",
                        new_game.context_id
                    )));
                }
                if !collectives.insert(collective_id) {
                    return Err(EngineError::validation(format!(
                        "Collective '{collective_id}' appears on more than one side"
                    )));
                }
            }
        }

        let sides: Vec<Side> = new_game
            .sides
            .into_iter()
            .map(|side| Side {
                id: generate_side_id(),
                size: side.members.len(),
                members: side.members,
                collective_id: side.collective_id,
                squad_id: None,
                applied: SideDeltas::default(),
            })
            .collect();

        let mut game = self.new_game(new_game.context_id, new_game.ranked, sides, now);
        game.status = GameStatus::Started;
        game.lineup = lineup_of(&game.sides);
        self.resolve_side_squads(&mut game, now)?;

        let game_id = game.id;
        info!(
            "Created {} game {} in context '{}' with sides {:?}",
            if game.ranked { "ranked" } else { "unranked" },
            game_id,
            game.context_id,
            game.sides.iter().map(|s| s.size).collect::<Vec<_>>()
        );
        self.games.insert(game_id, game);
        Ok(game_id)
    }

    /// Open a Pending game with fixed side sizes
    pub fn open_game(
        &mut self,
        context_id: &str,
        sizes: &[usize],
        ranked: bool,
        now: DateTime<Utc>,
    ) -> Result<GameId> {
        self.context(context_id)?;
        if sizes.len() < 2 {
            return Err(EngineError::validation(format!(
                "A game needs at least two sides, got {}",
                sizes.len()
            )));
        }
        if sizes.iter().any(|&size| size == 0) {
            return Err(EngineError::validation("Side sizes must be at least 1"));
        }

        let sides = sizes
            .iter()
            .map(|&size| Side {
                id: generate_side_id(),
                size,
                members: Vec::with_capacity(size),
                collective_id: None,
                squad_id: None,
                applied: SideDeltas::default(),
            })
            .collect();
        let game = self.new_game(context_id.to_string(), ranked, sides, now);
        let game_id = game.id;

        info!(
            "Opened game {} in context '{}' with side sizes {:?}",
            game_id, context_id, sizes
        );
        self.games.insert(game_id, game);
        Ok(game_id)
    }

    /// Add a member to a side of a Pending game
    pub fn join_game(&mut self, game_id: GameId, side_id: SideId, member_id: &str) -> Result<()> {
        let game = self.game(game_id)?;
        require_status(game, GameStatus::Pending, "join")?;
        self.member_in_context(member_id, &game.context_id)?;
        if game.side_of(member_id).is_some() {
            return Err(EngineError::validation(format!(
                "Member '{member_id}' is already in game {game_id}"
            )));
        }

        let game = self.game_mut(game_id)?;
        let side = game.side_mut(side_id).ok_or_else(|| {
            EngineError::validation(format!("Side {side_id} is not part of game {game_id}"))
        })?;
        if side.is_full() {
            return Err(EngineError::validation(format!(
                "Side {side_id} is already full ({} members)",
                side.size
            )));
        }
        side.members.push(member_id.to_string());
        game.lineup.push(LineupEntry::new(member_id.to_string(), side_id));

        debug!("Member '{}' joined side {} of game {}", member_id, side_id, game_id);
        Ok(())
    }

    /// Remove a member from a Pending game
    pub fn leave_game(&mut self, game_id: GameId, member_id: &str) -> Result<()> {
        let game = self.game_mut(game_id)?;
        require_status(game, GameStatus::Pending, "leave")?;

        let side = game
            .sides
            .iter_mut()
            .find(|side| side.members.iter().any(|m| m == member_id))
            .ok_or_else(|| {
                EngineError::validation(format!("Member '{member_id}' is not in game {game_id}"))
            })?;
        side.members.retain(|m| m != member_id);
        game.lineup.retain(|entry| entry.member_id != member_id);

        debug!("Member '{}' left game {}", member_id, game_id);
        Ok(())
    }

    /// Move a full Pending game to Started
    pub fn start_game(&mut self, game_id: GameId, now: DateTime<Utc>) -> Result<()> {
        let mut game = self.game(game_id)?.clone();
        require_status(&game, GameStatus::Pending, "start")?;
        if let Some(side) = game.sides.iter().find(|side| !side.is_full()) {
            return Err(EngineError::validation(format!(
                "Side {} has {} of {} members",
                side.id,
                side.members.len(),
                side.size
            )));
        }

        self.resolve_side_squads(&mut game, now)?;
        game.status = GameStatus::Started;
        self.games.insert(game_id, game);

        info!("Started game {}", game_id);
        Ok(())
    }

    /// Record the winning side, optionally ratifying the result
    pub fn declare_winner(
        &mut self,
        engine: &RatingEngine,
        game_id: GameId,
        side_id: SideId,
        confirm: bool,
        now: DateTime<Utc>,
    ) -> Result<DeclareOutcome> {
        let game = self.game(game_id)?;

        match game.status {
            GameStatus::Pending => {
                return Err(EngineError::validation(format!(
                    "Game {game_id} has not started"
                )));
            }
            GameStatus::Confirmed => {
                return if game.winner == Some(side_id) {
                    debug!("Game {} already confirmed for side {}", game_id, side_id);
                    Ok(DeclareOutcome {
                        game_id,
                        status: GameStatus::Confirmed,
                        winner: side_id,
                        applied: Vec::new(),
                    })
                } else {
                    Err(EngineError::validation(format!(
                        "Game {game_id} is confirmed for another side; reverse it first"
                    )))
                };
            }
            GameStatus::Started | GameStatus::Completed => {}
        }

        if game.side(side_id).is_none() {
            return Err(EngineError::validation(format!(
                "Side {side_id} is not part of game {game_id}"
            )));
        }
        if let Some(side) = game
            .sides
            .iter()
            .find(|side| side.members.is_empty() || !side.is_full())
        {
            return Err(EngineError::validation(format!(
                "Side {} has {} of {} members",
                side.id,
                side.members.len(),
                side.size
            )));
        }
        if confirm && game.ranked {
            if let Some(since) = self.recalculation_required_since {
                return Err(EngineError::RecalculationRequired { since });
            }
        }

        let ranked = game.ranked;
        let game = self.game_mut(game_id)?;
        game.winner = Some(side_id);
        game.status = GameStatus::Completed;

        let mut applied = Vec::new();
        if confirm {
            game.status = GameStatus::Confirmed;
            game.completed_at.get_or_insert(now);
            if ranked {
                applied = self.apply_game_ratings(engine, game_id)?;
            }
            info!("Game {} confirmed with winner {}", game_id, side_id);
        } else {
            debug!("Game {} completed with winner {}", game_id, side_id);
        }

        Ok(DeclareOutcome {
            game_id,
            status: if confirm {
                GameStatus::Confirmed
            } else {
                GameStatus::Completed
            },
            winner: side_id,
            applied,
        })
    }

    /// Subtract a confirmed game's deltas and return it to Completed
    pub fn reverse_game(&mut self, game_id: GameId) -> Result<RecalculationRequired> {
        let game = self.game(game_id)?;
        if game.status != GameStatus::Confirmed {
            return Err(EngineError::validation(format!(
                "Game {game_id} is {} and cannot be reversed",
                game.status
            )));
        }
        if !game.ratings_applied {
            return Err(EngineError::consistency(format!(
                "Game {game_id} has no applied ratings to reverse"
            )));
        }
        let since = game.completed_at.ok_or_else(|| {
            EngineError::consistency(format!("Confirmed game {game_id} has no completion time"))
        })?;

        self.revert_game_ratings(game_id)?;
        let game = self.game_mut(game_id)?;
        game.status = GameStatus::Completed;
        game.completed_at = None;

        let marker = self.require_recalculation(since);
        warn!(
            "Reversed game {}; games completed since {} must be recalculated",
            game_id, marker.since
        );
        Ok(marker)
    }

    /// Remove a game, reversing its ratings first when they were applied
    pub fn delete_game(&mut self, game_id: GameId) -> Result<Option<RecalculationRequired>> {
        let marker = if self.game(game_id)?.ratings_applied {
            Some(self.reverse_game(game_id)?)
        } else {
            None
        };
        self.games.remove(&game_id);

        info!("Deleted game {}", game_id);
        Ok(marker)
    }

    fn new_game(
        &mut self,
        context_id: ContextId,
        ranked: bool,
        sides: Vec<Side>,
        now: DateTime<Utc>,
    ) -> Game {
        Game {
            id: generate_game_id(),
            context_id,
            ranked,
            status: GameStatus::Pending,
            sides,
            lineup: Vec::new(),
            winner: None,
            created_at: now,
            sequence: self.take_sequence(),
            completed_at: None,
            ratings_applied: false,
        }
    }

    /// Attach squads to every multi-member side
    pub(crate) fn resolve_side_squads(
        &mut self,
        game: &mut Game,
        now: DateTime<Utc>,
    ) -> Result<()> {
        for side in game.sides.iter_mut() {
            if side.squad_id.is_none() && side.size > 1 && side.is_full() {
                let members: BTreeSet<MemberId> = side.member_set();
                side.squad_id = Some(self.resolve_squad(&game.context_id, members, now)?);
            }
        }
        Ok(())
    }
}

fn lineup_of(sides: &[Side]) -> Vec<LineupEntry> {
    sides
        .iter()
        .flat_map(|side| {
            side.members
                .iter()
                .map(move |member_id| LineupEntry::new(member_id.clone(), side.id))
        })
        .collect()
}

fn require_status(game: &Game, expected: GameStatus, action: &str) -> Result<()> {
    if game.status != expected {
        return Err(EngineError::validation(format!(
            "Cannot {action} game {} while it is {}",
            game.id, game.status
        )));
    }
    Ok(())
}
