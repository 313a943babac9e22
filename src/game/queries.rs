//! Read accessors over the rating book

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::game::book::RatingBook;
use crate::rating::engine::{EntityRating, RatingEngine, SideInput};
use crate::rating::ledger::{Ledger, LedgerEntry, LedgerKind};
use crate::roster::draft::{draft_order, DraftPick, DraftSide};
use crate::types::{ContextId, EntityRef, Game, GameId, MemberId, SideId, Squad, WinLossRecord};

/// Which ranking to read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Board {
    /// Individuals across every context
    Global,
    /// Members of one context
    Context(ContextId),
    CollectiveSeason(ContextId),
    CollectiveAllTime(ContextId),
    Squads(ContextId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardQuery {
    pub board: Board,
    /// Only entities that played within this window
    pub active_within: Option<Duration>,
    pub limit: Option<usize>,
}

impl LeaderboardQuery {
    pub fn new(board: Board) -> Self {
        Self {
            board,
            active_within: None,
            limit: None,
        }
    }

    pub fn active_within(mut self, window: Duration) -> Self {
        self.active_within = Some(window);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub entity: EntityRef,
    pub rating: i64,
    pub peak: i64,
    pub games: u32,
    pub wins: u32,
    pub losses: u32,
}

/// Win chance of one side of a game
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SideChance {
    pub side_id: SideId,
    pub win_chance: f64,
}

impl RatingBook {
    /// Wins and losses over every confirmed game, ranked or not
    pub fn record(&self, entity: &EntityRef) -> Result<WinLossRecord> {
        self.require_entity(entity)?;

        let mut record = WinLossRecord::default();
        for game in self.games.values().filter(|game| game.is_confirmed()) {
            let Some(winner) = game.winner else { continue };
            for side in &game.sides {
                if self.side_includes(side, entity) {
                    if side.id == winner {
                        record.wins += 1;
                    } else {
                        record.losses += 1;
                    }
                }
            }
        }
        Ok(record)
    }

    /// Ledger state of an entity in one track
    pub fn ledger_entry(
        &self,
        kind: LedgerKind,
        entity: &EntityRef,
    ) -> Result<Option<&LedgerEntry>> {
        match (kind, entity) {
            (LedgerKind::Individual, EntityRef::Individual(id)) => {
                Ok(self.individual_ledger.entry(id))
            }
            (LedgerKind::Member, EntityRef::Member(id)) => Ok(self.member_ledger.entry(id)),
            (LedgerKind::CollectiveSeason, EntityRef::Collective(id)) => {
                Ok(self.collective_season_ledger.entry(id))
            }
            (LedgerKind::CollectiveAllTime, EntityRef::Collective(id)) => {
                Ok(self.collective_all_time_ledger.entry(id))
            }
            (LedgerKind::Squad, EntityRef::Squad(id)) => Ok(self.squad_ledger.entry(id)),
            _ => Err(EngineError::validation(format!(
                "The {kind} ledger does not rate {entity}"
            ))),
        }
    }

    /// Ranked entities of one board, best first
    pub fn leaderboard(
        &self,
        query: &LeaderboardQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<LeaderboardRow>> {
        let cutoff = query.active_within.map(|window| now - window);

        let rows = match &query.board {
            Board::Global => standings(&self.individual_ledger, cutoff, |_| true, |id| {
                EntityRef::Individual(id.clone())
            }),
            Board::Context(context_id) => {
                self.context(context_id)?;
                standings(
                    &self.member_ledger,
                    cutoff,
                    |id| {
                        self.members
                            .get(id)
                            .is_some_and(|m| &m.context_id == context_id)
                    },
                    |id| EntityRef::Member(id.clone()),
                )
            }
            Board::CollectiveSeason(context_id) | Board::CollectiveAllTime(context_id) => {
                self.context(context_id)?;
                let ledger = if matches!(query.board, Board::CollectiveSeason(_)) {
                    &self.collective_season_ledger
                } else {
                    &self.collective_all_time_ledger
                };
                standings(
                    ledger,
                    cutoff,
                    |id| {
                        self.collectives
                            .get(id)
                            .is_some_and(|c| &c.context_id == context_id)
                    },
                    |id| EntityRef::Collective(id.clone()),
                )
            }
            Board::Squads(context_id) => {
                self.context(context_id)?;
                standings(
                    &self.squad_ledger,
                    cutoff,
                    |id| {
                        self.squads
                            .get(id)
                            .is_some_and(|s| &s.context_id == context_id)
                    },
                    |id| EntityRef::Squad(*id),
                )
            }
        };

        Ok(match query.limit {
            Some(limit) => rows.into_iter().take(limit).collect(),
            None => rows,
        })
    }

    /// Squad registered for exactly this member set
    pub fn squad_for(&self, members: &[MemberId]) -> Option<&Squad> {
        self.squads.find(members)
    }

    /// Current win chances of a full game's sides
    pub fn win_probabilities(
        &self,
        engine: &RatingEngine,
        game_id: GameId,
    ) -> Result<Vec<SideChance>> {
        let game = self.game(game_id)?;
        require_full(game)?;
        let policy = self.context(&game.context_id)?.policy;

        let sides = game
            .sides
            .iter()
            .map(|side| {
                let entities = side
                    .members
                    .iter()
                    .map(|member_id| {
                        if policy.updates_member || !policy.updates_individual {
                            Ok(entity_rating(&self.member_ledger, member_id))
                        } else {
                            let individual_id = &self.member(member_id)?.individual_id;
                            Ok(entity_rating(&self.individual_ledger, individual_id))
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(SideInput {
                    size: side.size,
                    entities,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let chances = engine.win_probabilities(&sides)?;
        Ok(game
            .sides
            .iter()
            .zip(chances)
            .map(|(side, win_chance)| SideChance {
                side_id: side.id,
                win_chance,
            })
            .collect())
    }

    /// Pick order for a full game's roster
    pub fn draft_order(&self, game_id: GameId) -> Result<Vec<DraftPick>> {
        let game = self.game(game_id)?;
        draft_order(&DraftSide::from_game(game))
    }

    fn require_entity(&self, entity: &EntityRef) -> Result<()> {
        let known = match entity {
            EntityRef::Individual(id) => self.individuals.contains_key(id),
            EntityRef::Member(id) => self.members.contains_key(id),
            EntityRef::Collective(id) => self.collectives.contains_key(id),
            EntityRef::Squad(id) => self.squads.get(id).is_some(),
        };
        if known {
            Ok(())
        } else {
            Err(EngineError::not_found("Entity", entity))
        }
    }

    fn side_includes(&self, side: &crate::types::Side, entity: &EntityRef) -> bool {
        match entity {
            EntityRef::Member(id) => side.members.iter().any(|m| m == id),
            EntityRef::Individual(id) => side.members.iter().any(|m| {
                self.members
                    .get(m)
                    .is_some_and(|member| &member.individual_id == id)
            }),
            EntityRef::Collective(id) => side.collective_id.as_ref() == Some(id),
            EntityRef::Squad(id) => side.squad_id == Some(*id),
        }
    }
}

fn entity_rating<K>(ledger: &Ledger<K>, key: &K) -> EntityRating
where
    K: Clone + Eq + std::hash::Hash + Ord,
{
    EntityRating {
        rating: ledger.rating(key),
        prior_games: ledger.games(key),
    }
}

fn require_full(game: &Game) -> Result<()> {
    match game.sides.iter().find(|side| !side.is_full()) {
        Some(side) => Err(EngineError::validation(format!(
            "Side {} has {} of {} members",
            side.id,
            side.members.len(),
            side.size
        ))),
        None => Ok(()),
    }
}

fn standings<K>(
    ledger: &Ledger<K>,
    cutoff: Option<DateTime<Utc>>,
    include: impl Fn(&K) -> bool,
    to_ref: impl Fn(&K) -> EntityRef,
) -> Vec<LeaderboardRow>
where
    K: Clone + Eq + std::hash::Hash + Ord,
{
    ledger
        .standings()
        .into_iter()
        .filter(|(key, entry)| {
            entry.games > 0
                && include(key)
                && cutoff.map_or(true, |cutoff| entry.is_active_since(cutoff))
        })
        .enumerate()
        .map(|(index, (key, entry))| LeaderboardRow {
            rank: index + 1,
            entity: to_ref(key),
            rating: entry.rating,
            peak: entry.peak,
            games: entry.games,
            wins: entry.wins,
            losses: entry.losses,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::lifecycle::{NewGame, NewSide};
    use crate::types::ContextPolicy;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, day, 12, 0, 0).unwrap()
    }

    fn seeded() -> (RatingBook, RatingEngine) {
        let engine = RatingEngine::default();
        let mut book = RatingBook::new(1000);
        book.register_context("guild", ContextPolicy::default())
            .unwrap();
        for id in ["a", "b", "c", "d"] {
            book.register_member(id, &format!("p-{id}"), "guild", at(1))
                .unwrap();
        }
        (book, engine)
    }

    fn play(
        book: &mut RatingBook,
        engine: &RatingEngine,
        sides: Vec<NewSide>,
        ranked: bool,
        day: u32,
    ) -> GameId {
        let game_id = book
            .create_game(
                NewGame {
                    context_id: "guild".to_string(),
                    ranked,
                    sides,
                },
                at(day),
            )
            .unwrap();
        let winner = book.game(game_id).unwrap().sides[0].id;
        book.declare_winner(engine, game_id, winner, true, at(day))
            .unwrap();
        game_id
    }

    #[test]
    fn test_record_counts_unranked_games() {
        let (mut book, engine) = seeded();
        play(&mut book, &engine, vec![NewSide::of(["a"]), NewSide::of(["b"])], true, 2);
        play(&mut book, &engine, vec![NewSide::of(["b"]), NewSide::of(["a"])], false, 3);

        let record = book.record(&EntityRef::Member("a".to_string())).unwrap();
        assert_eq!(record, WinLossRecord { wins: 1, losses: 1 });
        let record = book
            .record(&EntityRef::Individual("p-b".to_string()))
            .unwrap();
        assert_eq!(record.games(), 2);

        assert!(matches!(
            book.record(&EntityRef::Member("ghost".to_string())),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn test_leaderboard_filters_and_ranks() {
        let (mut book, engine) = seeded();
        play(&mut book, &engine, vec![NewSide::of(["a"]), NewSide::of(["b"])], true, 2);
        play(&mut book, &engine, vec![NewSide::of(["c"]), NewSide::of(["b"])], true, 20);

        let rows = book
            .leaderboard(&LeaderboardQuery::new(Board::Context("guild".to_string())), at(21))
            .unwrap();
        // d never played
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[2].entity, EntityRef::Member("b".to_string()));

        let recent = book
            .leaderboard(
                &LeaderboardQuery::new(Board::Context("guild".to_string()))
                    .active_within(Duration::days(7)),
                at(21),
            )
            .unwrap();
        let ids: Vec<_> = recent.iter().map(|row| row.entity.clone()).collect();
        assert!(!ids.contains(&EntityRef::Member("a".to_string())));
        assert_eq!(recent.len(), 2);

        let global = book
            .leaderboard(&LeaderboardQuery::new(Board::Global).limit(1), at(21))
            .unwrap();
        assert_eq!(global.len(), 1);
    }

    #[test]
    fn test_ledger_entry_kind_must_match() {
        let (book, _) = seeded();
        assert!(book
            .ledger_entry(LedgerKind::Member, &EntityRef::Member("a".to_string()))
            .unwrap()
            .is_some());
        assert!(book
            .ledger_entry(LedgerKind::Squad, &EntityRef::Member("a".to_string()))
            .is_err());
    }

    #[test]
    fn test_short_side_probability_is_lower() {
        let (mut book, engine) = seeded();
        let game_id = book
            .create_game(
                NewGame {
                    context_id: "guild".to_string(),
                    ranked: true,
                    sides: vec![NewSide::of(["a"]), NewSide::of(["b", "c"])],
                },
                at(2),
            )
            .unwrap();

        let chances = book.win_probabilities(&engine, game_id).unwrap();
        assert!(chances[0].win_chance < 0.4);
        assert!((chances[0].win_chance + chances[1].win_chance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_squad_lookup_and_draft() {
        let (mut book, engine) = seeded();
        let game_id = play(
            &mut book,
            &engine,
            vec![NewSide::of(["a", "b"]), NewSide::of(["c", "d"])],
            true,
            2,
        );

        let squad = book
            .squad_for(&["b".to_string(), "a".to_string()])
            .unwrap();
        assert_eq!(squad.members.len(), 2);
        assert!(book.squad_for(&["a".to_string(), "c".to_string()]).is_none());

        let picks = book.draft_order(game_id).unwrap();
        assert_eq!(picks.len(), 4);

        let squads = book
            .leaderboard(&LeaderboardQuery::new(Board::Squads("guild".to_string())), at(3))
            .unwrap();
        assert_eq!(squads.len(), 2);
        assert_eq!(squads[0].entity, EntityRef::Squad(squad.id));
    }
}
