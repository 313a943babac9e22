//! Applying and reverting a confirmed game's ratings
//!
//! A game touches up to five ledgers. Each ledger computes its own deltas
//! from its own pre-game values; nothing read by one ledger is written by
//! another. Every applied delta is stored on the game so it can be
//! subtracted again later.

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::game::book::RatingBook;
use crate::rating::engine::{EntityRating, RatingEngine, SideInput};
use crate::rating::ledger::{Ledger, LedgerKind};
use crate::types::{CollectiveId, Game, GameId, MemberId, SquadId};

impl RatingBook {
    /// Apply a confirmed ranked game's deltas to every qualifying ledger
    pub(crate) fn apply_game_ratings(
        &mut self,
        engine: &RatingEngine,
        game_id: GameId,
    ) -> Result<Vec<(LedgerKind, i64)>> {
        let mut game = self.game(game_id)?.clone();
        if game.ratings_applied {
            return Err(EngineError::consistency(format!(
                "Ratings of game {game_id} are already applied"
            )));
        }
        let winner = winner_index(&game)?;
        let played_at = game.completed_at.ok_or_else(|| {
            EngineError::consistency(format!("Game {game_id} has no completion time"))
        })?;
        let context = self.context(&game.context_id)?.clone();

        let mut applied = Vec::new();

        if context.policy.updates_member {
            let keys: Vec<Vec<MemberId>> =
                game.sides.iter().map(|side| side.members.clone()).collect();
            let deltas = rate_entities(engine, &self.member_ledger, &game, &keys, winner)?;
            for (side_index, side_deltas) in deltas.into_iter().enumerate() {
                let won = side_index == winner;
                for (member_id, delta) in keys[side_index].iter().zip(side_deltas) {
                    let record = self.member_ledger.apply(member_id, delta, won, played_at);
                    let rating = record.rating_after();
                    if let Some(entry) = lineup_entry(&mut game, member_id) {
                        entry.member_delta = Some(record);
                        entry.rating_snapshot = Some(rating);
                    }
                    applied.push((LedgerKind::Member, delta));
                }
            }
        }

        if context.policy.updates_individual {
            let keys = game
                .sides
                .iter()
                .map(|side| {
                    side.members
                        .iter()
                        .map(|member_id| self.member(member_id).map(|m| m.individual_id.clone()))
                        .collect::<Result<Vec<_>>>()
                })
                .collect::<Result<Vec<_>>>()?;
            let deltas = rate_entities(engine, &self.individual_ledger, &game, &keys, winner)?;
            let member_keys: Vec<Vec<MemberId>> =
                game.sides.iter().map(|side| side.members.clone()).collect();
            for (side_index, side_deltas) in deltas.into_iter().enumerate() {
                let won = side_index == winner;
                for ((individual_id, member_id), delta) in keys[side_index]
                    .iter()
                    .zip(&member_keys[side_index])
                    .zip(side_deltas)
                {
                    let record = self
                        .individual_ledger
                        .apply(individual_id, delta, won, played_at);
                    let rating = record.rating_after();
                    if let Some(entry) = lineup_entry(&mut game, member_id) {
                        entry.individual_delta = Some(record);
                        entry.rating_snapshot.get_or_insert(rating);
                    }
                    applied.push((LedgerKind::Individual, delta));
                }
            }
        }

        let all_groups = game.sides.iter().all(|side| side.members.len() > 1);

        if all_groups {
            for side_index in 0..game.sides.len() {
                if game.sides[side_index].squad_id.is_none() {
                    let members = game.sides[side_index].member_set();
                    game.sides[side_index].squad_id =
                        Some(self.resolve_squad(&game.context_id, members, played_at)?);
                }
            }
            let keys: Vec<Vec<SquadId>> = game
                .sides
                .iter()
                .map(|side| side.squad_id.into_iter().collect())
                .collect();
            let deltas = rate_entities(engine, &self.squad_ledger, &game, &keys, winner)?;
            for (side_index, delta) in deltas.into_iter().map(single).enumerate() {
                let delta = delta?;
                let key = keys[side_index][0];
                let record = self
                    .squad_ledger
                    .apply(&key, delta, side_index == winner, played_at);
                game.sides[side_index].applied.squad = Some(record);
                applied.push((LedgerKind::Squad, delta));
            }
        }

        let collective_keys: Option<Vec<CollectiveId>> = game
            .sides
            .iter()
            .map(|side| side.collective_id.clone())
            .collect();
        if let (true, Some(collective_keys)) = (all_groups, collective_keys) {
            let keys: Vec<Vec<CollectiveId>> =
                collective_keys.into_iter().map(|id| vec![id]).collect();

            let in_season = context
                .season_started_at
                .map_or(true, |started| played_at >= started);
            if in_season {
                let deltas =
                    rate_entities(engine, &self.collective_season_ledger, &game, &keys, winner)?;
                for (side_index, delta) in deltas.into_iter().map(single).enumerate() {
                    let delta = delta?;
                    let record = self.collective_season_ledger.apply(
                        &keys[side_index][0],
                        delta,
                        side_index == winner,
                        played_at,
                    );
                    game.sides[side_index].applied.collective_season = Some(record);
                    applied.push((LedgerKind::CollectiveSeason, delta));
                }
            }

            let deltas =
                rate_entities(engine, &self.collective_all_time_ledger, &game, &keys, winner)?;
            for (side_index, delta) in deltas.into_iter().map(single).enumerate() {
                let delta = delta?;
                let record = self.collective_all_time_ledger.apply(
                    &keys[side_index][0],
                    delta,
                    side_index == winner,
                    played_at,
                );
                game.sides[side_index].applied.collective_all_time = Some(record);
                applied.push((LedgerKind::CollectiveAllTime, delta));
            }
        }

        game.ratings_applied = true;
        debug!(
            "Applied {} ledger deltas for game {} at {}",
            applied.len(),
            game_id,
            played_at
        );
        self.games.insert(game_id, game);
        Ok(applied)
    }

    /// Subtract every delta a game applied and clear its audit trail
    pub(crate) fn revert_game_ratings(&mut self, game_id: GameId) -> Result<()> {
        let mut game = self.game(game_id)?.clone();
        if !game.ratings_applied {
            return Err(EngineError::consistency(format!(
                "Game {game_id} has no applied ratings"
            )));
        }
        let winner = game.winner.ok_or_else(|| {
            EngineError::consistency(format!("Game {game_id} has ratings but no winner"))
        })?;

        for entry in game.lineup.iter_mut() {
            let won = entry.side_id == winner;
            if let Some(record) = &entry.member_delta {
                self.member_ledger.revert(&entry.member_id, record, won)?;
            }
            if let Some(record) = &entry.individual_delta {
                let individual_id = self.member(&entry.member_id)?.individual_id.clone();
                self.individual_ledger
                    .revert(&individual_id, record, won)?;
            }
            entry.clear_applied();
        }

        for side in game.sides.iter_mut() {
            let won = side.id == winner;
            if let (Some(record), Some(squad_id)) = (&side.applied.squad, side.squad_id) {
                self.squad_ledger.revert(&squad_id, record, won)?;
            }
            if let Some(collective_id) = &side.collective_id {
                if let Some(record) = &side.applied.collective_season {
                    self.collective_season_ledger
                        .revert(collective_id, record, won)?;
                }
                if let Some(record) = &side.applied.collective_all_time {
                    self.collective_all_time_ledger
                        .revert(collective_id, record, won)?;
                }
            }
            side.applied = Default::default();
        }

        game.ratings_applied = false;
        debug!("Reverted ledger deltas of game {}", game_id);
        self.games.insert(game_id, game);
        Ok(())
    }
}

/// Deltas per side for the given entity keys, computed from one ledger
fn rate_entities<K>(
    engine: &RatingEngine,
    ledger: &Ledger<K>,
    game: &Game,
    keys: &[Vec<K>],
    winner: usize,
) -> Result<Vec<Vec<i64>>>
where
    K: Clone + Eq + std::hash::Hash + Ord,
{
    let sides: Vec<SideInput> = game
        .sides
        .iter()
        .zip(keys)
        .map(|(side, keys)| SideInput {
            size: side.size,
            entities: keys
                .iter()
                .map(|key| EntityRating {
                    rating: ledger.rating(key),
                    prior_games: ledger.games(key),
                })
                .collect(),
        })
        .collect();

    Ok(engine
        .outcomes(ledger.kind(), &sides, winner)?
        .into_iter()
        .map(|outcome| outcome.deltas)
        .collect())
}

fn single(deltas: Vec<i64>) -> Result<i64> {
    match deltas.as_slice() {
        [delta] => Ok(*delta),
        _ => Err(EngineError::consistency(format!(
            "Expected one group delta per side, got {}",
            deltas.len()
        ))),
    }
}

fn winner_index(game: &Game) -> Result<usize> {
    let winner = game.winner.ok_or_else(|| {
        EngineError::validation(format!("Game {} has no declared winner", game.id))
    })?;
    game.sides
        .iter()
        .position(|side| side.id == winner)
        .ok_or_else(|| {
            EngineError::consistency(format!(
                "Winner {winner} is not a side of game {}",
                game.id
            ))
        })
}

fn lineup_entry<'a>(
    game: &'a mut Game,
    member_id: &str,
) -> Option<&'a mut crate::types::LineupEntry> {
    game.lineup
        .iter_mut()
        .find(|entry| entry.member_id == member_id)
}
