//! Replay-based recalculation
//!
//! Confirmed ranked games are unwound newest first, which returns every
//! ledger to its state at the cutoff, and then confirmed again oldest first
//! in (completion time, creation sequence) order. Completion timestamps are
//! kept, so a replay produces the same history as the original run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::game::book::RatingBook;
use crate::rating::engine::RatingEngine;
use crate::types::{GameId, GameStatus};

/// Summary of one recalculation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecalculationReport {
    /// Cutoff of the run; `None` for a full recalculation
    pub since: Option<DateTime<Utc>>,
    pub unwound: usize,
    pub replayed: usize,
}

impl RatingBook {
    /// Recompute every confirmed ranked game completed at or after `since`
    pub fn recalculate_since(
        &mut self,
        engine: &RatingEngine,
        since: DateTime<Utc>,
    ) -> Result<RecalculationReport> {
        if let Some(required) = self.recalculation_required_since {
            if since > required {
                return Err(EngineError::RecalculationRequired { since: required });
            }
        }

        let order = self.replay_order(|completed_at| completed_at >= since);
        info!(
            "Recalculating {} games completed since {}",
            order.len(),
            since
        );

        for &game_id in order.iter().rev() {
            if self.game(game_id)?.ratings_applied {
                self.revert_game_ratings(game_id)?;
            }
            self.game_mut(game_id)?.status = GameStatus::Started;
        }
        self.recalculation_required_since = None;

        let replayed = self.replay(engine, &order)?;
        Ok(RecalculationReport {
            since: Some(since),
            unwound: order.len(),
            replayed,
        })
    }

    /// Reset every ledger and replay the full confirmed ranked history
    pub fn recalculate_all(&mut self, engine: &RatingEngine) -> Result<RecalculationReport> {
        let order = self.replay_order(|_| true);
        info!("Recalculating all {} confirmed ranked games", order.len());

        self.individual_ledger.reset();
        self.member_ledger.reset();
        self.collective_season_ledger.reset();
        self.collective_all_time_ledger.reset();
        self.squad_ledger.reset();

        for game in self.games.values_mut() {
            for entry in game.lineup.iter_mut() {
                entry.clear_applied();
            }
            for side in game.sides.iter_mut() {
                side.applied = Default::default();
            }
            game.ratings_applied = false;
        }
        for &game_id in &order {
            self.game_mut(game_id)?.status = GameStatus::Started;
        }
        self.recalculation_required_since = None;

        let replayed = self.replay(engine, &order)?;
        Ok(RecalculationReport {
            since: None,
            unwound: order.len(),
            replayed,
        })
    }

    /// Confirmed ranked games whose completion time passes the filter, oldest first
    fn replay_order(&self, include: impl Fn(DateTime<Utc>) -> bool) -> Vec<GameId> {
        let mut games: Vec<_> = self
            .games
            .values()
            .filter(|game| game.is_replayable())
            .filter(|game| game.completed_at.is_some_and(&include))
            .map(|game| (game.replay_key(), game.id))
            .collect();
        games.sort();
        games.into_iter().map(|(_, id)| id).collect()
    }

    fn replay(&mut self, engine: &RatingEngine, order: &[GameId]) -> Result<usize> {
        for (index, &game_id) in order.iter().enumerate() {
            let game = self.game(game_id)?;
            let winner = game.winner.ok_or_else(|| {
                EngineError::consistency(format!("Game {game_id} has no winner to replay"))
            })?;
            let completed_at = game.completed_at.ok_or_else(|| {
                EngineError::consistency(format!("Game {game_id} has no completion time"))
            })?;

            self.declare_winner(engine, game_id, winner, true, completed_at)?;
            debug!("Replayed game {} ({}/{})", game_id, index + 1, order.len());
        }
        Ok(order.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::lifecycle::{NewGame, NewSide};
    use crate::types::ContextPolicy;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap()
    }

    fn book() -> RatingBook {
        let mut book = RatingBook::new(1000);
        book.register_context("guild", ContextPolicy::default())
            .unwrap();
        for id in ["a", "b", "c"] {
            book.register_member(id, id, "guild", base()).unwrap();
        }
        book
    }

    fn play(
        book: &mut RatingBook,
        engine: &RatingEngine,
        winner: &str,
        loser: &str,
        at: DateTime<Utc>,
    ) -> GameId {
        let game_id = book
            .create_game(
                NewGame {
                    context_id: "guild".to_string(),
                    ranked: true,
                    sides: vec![NewSide::of([winner]), NewSide::of([loser])],
                },
                at,
            )
            .unwrap();
        let side = book.game(game_id).unwrap().sides[0].id;
        book.declare_winner(engine, game_id, side, true, at).unwrap();
        game_id
    }

    fn ratings(book: &RatingBook) -> Vec<i64> {
        ["a", "b", "c"]
            .iter()
            .map(|id| book.member_ledger().rating(&id.to_string()))
            .collect()
    }

    #[test]
    fn test_recalculate_all_is_stable() {
        let engine = RatingEngine::default();
        let mut book = book();
        play(&mut book, &engine, "a", "b", base());
        play(&mut book, &engine, "b", "c", base() + Duration::hours(1));
        play(&mut book, &engine, "a", "c", base() + Duration::hours(2));
        let original = ratings(&book);

        let report = book.recalculate_all(&engine).unwrap();
        assert_eq!(report.replayed, 3);
        assert_eq!(ratings(&book), original);

        book.recalculate_all(&engine).unwrap();
        assert_eq!(ratings(&book), original);
    }

    #[test]
    fn test_reverse_then_recalculate_drops_the_game() {
        let engine = RatingEngine::default();
        let mut book = book();
        let first = play(&mut book, &engine, "a", "b", base());
        play(&mut book, &engine, "b", "c", base() + Duration::hours(1));

        // Same history without the first game
        let mut expected = self::book();
        play(&mut expected, &engine, "b", "c", base() + Duration::hours(1));

        let marker = book.reverse_game(first).unwrap();
        assert_eq!(marker.since, base());

        let report = book.recalculate_since(&engine, marker.since).unwrap();
        assert_eq!(report.unwound, 1);
        assert_eq!(ratings(&book), ratings(&expected));
        assert_eq!(book.recalculation_required_since(), None);
    }

    #[test]
    fn test_recalculate_after_marker_is_refused() {
        let engine = RatingEngine::default();
        let mut book = book();
        let first = play(&mut book, &engine, "a", "b", base());
        let marker = book.reverse_game(first).unwrap();

        let result = book.recalculate_since(&engine, marker.since + Duration::minutes(5));
        assert_eq!(
            result.unwrap_err(),
            EngineError::RecalculationRequired {
                since: marker.since
            }
        );
        assert!(book.recalculate_all(&engine).is_ok());
        assert_eq!(book.recalculation_required_since(), None);
    }

    fn collective_book() -> RatingBook {
        let mut book = book();
        book.register_member("d", "d", "guild", base()).unwrap();
        let pairs = [("red", ["a", "b"]), ("blue", ["c", "d"])];
        for (id, members) in pairs {
            let members: Vec<String> = members.iter().map(|m| m.to_string()).collect();
            book.register_collective(id, "guild", id, &members, base())
                .unwrap();
        }
        book
    }

    fn play_collectives(
        book: &mut RatingBook,
        engine: &RatingEngine,
        at: DateTime<Utc>,
    ) -> GameId {
        let game_id = book
            .create_game(
                NewGame {
                    context_id: "guild".to_string(),
                    ranked: true,
                    sides: vec![
                        NewSide::of(["a", "b"]).with_collective("red"),
                        NewSide::of(["c", "d"]).with_collective("blue"),
                    ],
                },
                at,
            )
            .unwrap();
        let side = book.game(game_id).unwrap().sides[0].id;
        book.declare_winner(engine, game_id, side, true, at).unwrap();
        game_id
    }

    #[test]
    fn test_pre_season_game_reverses_after_rollover() {
        let engine = RatingEngine::default();
        let mut book = collective_book();
        let red = "red".to_string();

        let old = play_collectives(&mut book, &engine, base());
        book.start_new_season("guild", base() + Duration::days(1))
            .unwrap();
        assert!(book
            .game(old)
            .unwrap()
            .sides
            .iter()
            .all(|side| side.applied.collective_season.is_none()));

        play_collectives(&mut book, &engine, base() + Duration::days(2));
        let season_rating = book.collective_season_ledger().rating(&red);
        assert!(season_rating > 1000);

        // The season track keeps only the in-season game
        let marker = book.reverse_game(old).unwrap();
        assert_eq!(book.collective_season_ledger().rating(&red), season_rating);
        assert_eq!(book.collective_season_ledger().games(&red), 1);
        assert_eq!(book.collective_all_time_ledger().games(&red), 1);

        let report = book.recalculate_since(&engine, marker.since).unwrap();
        assert_eq!(report.replayed, 1);
        assert_eq!(book.collective_season_ledger().games(&red), 1);
        assert_eq!(book.collective_all_time_ledger().games(&red), 1);
        assert_eq!(book.recalculation_required_since(), None);
    }

    #[test]
    fn test_recalculate_across_season_start() {
        let engine = RatingEngine::default();
        let mut book = collective_book();
        let red = "red".to_string();

        play_collectives(&mut book, &engine, base());
        book.start_new_season("guild", base() + Duration::days(1))
            .unwrap();
        play_collectives(&mut book, &engine, base() + Duration::days(2));
        let season = book.collective_season_ledger().entry(&red).cloned();
        let all_time = book.collective_all_time_ledger().entry(&red).cloned();

        let report = book.recalculate_since(&engine, base()).unwrap();
        assert_eq!(report.unwound, 2);
        assert_eq!(book.collective_season_ledger().entry(&red).cloned(), season);
        assert_eq!(book.collective_all_time_ledger().entry(&red).cloned(), all_time);
    }

    #[test]
    fn test_recalculate_since_only_touches_later_games() {
        let engine = RatingEngine::default();
        let mut book = book();
        play(&mut book, &engine, "a", "b", base());
        play(&mut book, &engine, "c", "a", base() + Duration::hours(3));
        let original = ratings(&book);

        let report = book
            .recalculate_since(&engine, base() + Duration::hours(1))
            .unwrap();
        assert_eq!(report.unwound, 1);
        assert_eq!(report.replayed, 1);
        assert_eq!(ratings(&book), original);
    }
}
