//! Game service: the async front door of the rating engine
//!
//! Every mutation runs as one transaction: the book is cloned, the clone is
//! mutated and it replaces the live book only on success. Single-game calls
//! hold an advisory lock on the game and fail fast while a recalculation is
//! running.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::RatingConfig;
use crate::error::{ConcurrencyError, EngineError, Result};
use crate::game::book::{RatingBook, RecalculationRequired};
use crate::game::lifecycle::{DeclareOutcome, NewGame, NewSide};
use crate::game::locks::{GameLockGuard, GameLocks};
use crate::game::queries::{LeaderboardQuery, LeaderboardRow, SideChance};
use crate::game::recalc::RecalculationReport;
use crate::metrics::MetricsCollector;
use crate::rating::engine::RatingEngine;
use crate::rating::ledger::{LedgerEntry, LedgerKind};
use crate::roster::draft::DraftPick;
use crate::types::{
    Collective, Context, ContextPolicy, EntityRef, Game, GameId, GameStatus, Member, MemberId,
    SideId, Squad, WinLossRecord,
};
use crate::utils::{Clock, SystemClock};

/// Snapshot of the book for status endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    pub contexts: usize,
    pub members: usize,
    pub collectives: usize,
    pub squads: usize,
    pub games_pending: usize,
    pub games_started: usize,
    pub games_completed: usize,
    pub games_confirmed: usize,
    pub recalculation_required_since: Option<DateTime<Utc>>,
    pub recalculating: bool,
}

/// Held while mutations are suspended; resumes them on drop
#[derive(Debug)]
pub struct MutationPause<'a> {
    flag: &'a AtomicBool,
}

impl Drop for MutationPause<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

pub struct GameService {
    engine: RatingEngine,
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsCollector>,
    locks: GameLocks,
    recalculating: AtomicBool,
    book: Mutex<RatingBook>,
}

impl GameService {
    /// Create a service over an empty book
    pub fn new(
        engine: RatingEngine,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let book = RatingBook::new(engine.starting_rating());
        Self::from_book(engine, clock, metrics, book)
    }

    /// Create a service over a previously saved book
    pub fn from_book(
        engine: RatingEngine,
        clock: Arc<dyn Clock>,
        metrics: Arc<MetricsCollector>,
        mut book: RatingBook,
    ) -> Self {
        let configured = engine.starting_rating();
        if book.starting_rating() != configured {
            info!(
                "Rebasing rating book from starting rating {} to {}",
                book.starting_rating(),
                configured
            );
            book.rebase_starting_rating(configured);
        }
        metrics.update_book_gauges(book.games.len(), book.recalculation_required_since.is_some());
        Self {
            engine,
            clock,
            metrics,
            locks: GameLocks::new(),
            recalculating: AtomicBool::new(false),
            book: Mutex::new(book),
        }
    }

    /// Service on the wall clock with the given rating constants
    pub fn from_config(config: &RatingConfig, metrics: Arc<MetricsCollector>) -> Result<Self> {
        let engine = RatingEngine::new(config)?;
        Ok(Self::new(engine, Arc::new(SystemClock), metrics))
    }

    pub fn engine(&self) -> &RatingEngine {
        &self.engine
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub fn locks(&self) -> &GameLocks {
        &self.locks
    }

    pub fn is_recalculating(&self) -> bool {
        self.recalculating.load(Ordering::SeqCst)
    }

    /// Suspend every mutation until the returned guard is dropped
    pub fn pause_mutations(&self) -> Result<MutationPause<'_>> {
        if self
            .recalculating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ConcurrencyError::RecalculationInProgress.into());
        }
        Ok(MutationPause {
            flag: &self.recalculating,
        })
    }

    // Registration

    pub async fn register_context(
        &self,
        context_id: &str,
        policy: ContextPolicy,
    ) -> Result<Context> {
        self.ensure_mutable("register_context")?;
        self.transact("register_context", |book, _| {
            book.register_context(context_id, policy).cloned()
        })
        .await
    }

    pub async fn register_member(
        &self,
        member_id: &str,
        individual_id: &str,
        context_id: &str,
    ) -> Result<Member> {
        self.ensure_mutable("register_member")?;
        self.transact("register_member", |book, now| {
            book.register_member(member_id, individual_id, context_id, now)
                .cloned()
        })
        .await
    }

    pub async fn register_collective(
        &self,
        collective_id: &str,
        context_id: &str,
        name: &str,
        members: &[MemberId],
    ) -> Result<Collective> {
        self.ensure_mutable("register_collective")?;
        self.transact("register_collective", |book, now| {
            book.register_collective(collective_id, context_id, name, members, now)
                .cloned()
        })
        .await
    }

    // Lifecycle

    /// Create a Started game with one side per member list
    pub async fn create_game(
        &self,
        sides: Vec<Vec<MemberId>>,
        ranked: bool,
        context_id: &str,
    ) -> Result<Game> {
        self.create(NewGame {
            context_id: context_id.to_string(),
            ranked,
            sides: sides.into_iter().map(NewSide::of).collect(),
        })
        .await
    }

    /// Create a Started game, with optional collectives per side
    pub async fn create(&self, new_game: NewGame) -> Result<Game> {
        self.ensure_mutable("create_game")?;
        let game = self
            .transact("create_game", |book, now| {
                let game_id = book.create_game(new_game, now)?;
                book.game(game_id).cloned()
            })
            .await?;
        self.metrics.record_game_created("direct");
        Ok(game)
    }

    /// Open a Pending game with fixed side sizes
    pub async fn open_game(&self, context_id: &str, sizes: &[usize], ranked: bool) -> Result<Game> {
        self.ensure_mutable("open_game")?;
        let game = self
            .transact("open_game", |book, now| {
                let game_id = book.open_game(context_id, sizes, ranked, now)?;
                book.game(game_id).cloned()
            })
            .await?;
        self.metrics.record_game_created("open");
        Ok(game)
    }

    pub async fn join_game(
        &self,
        game_id: GameId,
        side_id: SideId,
        member_id: &str,
    ) -> Result<Game> {
        let _guard = self.lock_game("join_game", game_id)?;
        self.transact("join_game", |book, _| {
            book.join_game(game_id, side_id, member_id)?;
            book.game(game_id).cloned()
        })
        .await
    }

    pub async fn leave_game(&self, game_id: GameId, member_id: &str) -> Result<Game> {
        let _guard = self.lock_game("leave_game", game_id)?;
        self.transact("leave_game", |book, _| {
            book.leave_game(game_id, member_id)?;
            book.game(game_id).cloned()
        })
        .await
    }

    pub async fn start_game(&self, game_id: GameId) -> Result<Game> {
        let _guard = self.lock_game("start_game", game_id)?;
        self.transact("start_game", |book, now| {
            book.start_game(game_id, now)?;
            book.game(game_id).cloned()
        })
        .await
    }

    pub async fn declare_winner(
        &self,
        game_id: GameId,
        side_id: SideId,
        confirm: bool,
    ) -> Result<DeclareOutcome> {
        let _guard = self.lock_game("declare_winner", game_id)?;
        let outcome = self
            .transact("declare_winner", |book, now| {
                book.declare_winner(&self.engine, game_id, side_id, confirm, now)
            })
            .await?;

        if !outcome.is_noop() {
            self.metrics
                .record_winner_declared(confirm, &outcome.applied);
        }
        Ok(outcome)
    }

    /// Undo a confirmed game's ratings; a recalculation must follow
    pub async fn reverse_game(&self, game_id: GameId) -> Result<RecalculationRequired> {
        let _guard = self.lock_game("reverse_game", game_id)?;
        let marker = self
            .transact("reverse_game", |book, _| book.reverse_game(game_id))
            .await?;
        self.metrics.record_reversal();
        Ok(marker)
    }

    pub async fn delete_game(&self, game_id: GameId) -> Result<Option<RecalculationRequired>> {
        let _guard = self.lock_game("delete_game", game_id)?;
        let marker = self
            .transact("delete_game", |book, _| book.delete_game(game_id))
            .await?;
        if marker.is_some() {
            self.metrics.record_reversal();
        }
        self.metrics.record_deletion();
        Ok(marker)
    }

    pub async fn recalculate_since(&self, since: DateTime<Utc>) -> Result<RecalculationReport> {
        let _pause = self.pause_mutations().inspect_err(|e| {
            self.metrics.record_rejection("recalculate_since", e);
        })?;
        let timer = self.metrics.start_timer();

        let report = self
            .transact("recalculate_since", |book, _| {
                book.recalculate_since(&self.engine, since)
            })
            .await?;

        let elapsed = timer.stop();
        self.metrics
            .record_recalculation("since", report.replayed, elapsed);
        info!(
            "Recalculated {} games since {} in {:?}",
            report.replayed, since, elapsed
        );
        Ok(report)
    }

    pub async fn recalculate_all(&self) -> Result<RecalculationReport> {
        let _pause = self.pause_mutations().inspect_err(|e| {
            self.metrics.record_rejection("recalculate_all", e);
        })?;
        let timer = self.metrics.start_timer();

        let report = self
            .transact("recalculate_all", |book, _| {
                book.recalculate_all(&self.engine)
            })
            .await?;

        let elapsed = timer.stop();
        self.metrics
            .record_recalculation("all", report.replayed, elapsed);
        info!("Recalculated all {} games in {:?}", report.replayed, elapsed);
        Ok(report)
    }

    /// Reset the season track of a context's collectives
    pub async fn start_new_season(&self, context_id: &str) -> Result<()> {
        self.ensure_mutable("start_new_season")?;
        self.transact("start_new_season", |book, now| {
            book.start_new_season(context_id, now)
        })
        .await
    }

    // Reads

    pub async fn game(&self, game_id: GameId) -> Result<Game> {
        self.book.lock().await.game(game_id).cloned()
    }

    pub async fn record(&self, entity: &EntityRef) -> Result<WinLossRecord> {
        self.book.lock().await.record(entity)
    }

    pub async fn ledger_entry(
        &self,
        kind: LedgerKind,
        entity: &EntityRef,
    ) -> Result<Option<LedgerEntry>> {
        Ok(self
            .book
            .lock()
            .await
            .ledger_entry(kind, entity)?
            .cloned())
    }

    pub async fn leaderboard(&self, query: &LeaderboardQuery) -> Result<Vec<LeaderboardRow>> {
        let now = self.clock.now();
        self.book.lock().await.leaderboard(query, now)
    }

    pub async fn squad_for(&self, members: &[MemberId]) -> Option<Squad> {
        self.book.lock().await.squad_for(members).cloned()
    }

    pub async fn draft_order(&self, game_id: GameId) -> Result<Vec<DraftPick>> {
        self.book.lock().await.draft_order(game_id)
    }

    pub async fn win_probabilities(&self, game_id: GameId) -> Result<Vec<SideChance>> {
        self.book
            .lock()
            .await
            .win_probabilities(&self.engine, game_id)
    }

    /// Copy of the whole book for persistence
    pub async fn snapshot(&self) -> RatingBook {
        self.book.lock().await.clone()
    }

    pub async fn stats(&self) -> ServiceStats {
        let book = self.book.lock().await;
        let count = |status: GameStatus| book.games().filter(|g| g.status == status).count();

        ServiceStats {
            contexts: book.contexts.len(),
            members: book.members.len(),
            collectives: book.collectives.len(),
            squads: book.squads().len(),
            games_pending: count(GameStatus::Pending),
            games_started: count(GameStatus::Started),
            games_completed: count(GameStatus::Completed),
            games_confirmed: count(GameStatus::Confirmed),
            recalculation_required_since: book.recalculation_required_since(),
            recalculating: self.is_recalculating(),
        }
    }

    fn ensure_mutable(&self, operation: &'static str) -> Result<()> {
        if self.is_recalculating() {
            let err: EngineError = ConcurrencyError::RecalculationInProgress.into();
            debug!("Refusing {} during recalculation", operation);
            self.metrics.record_rejection(operation, &err);
            return Err(err);
        }
        Ok(())
    }

    fn lock_game(&self, operation: &'static str, game_id: GameId) -> Result<GameLockGuard> {
        self.ensure_mutable(operation)?;
        self.locks.try_acquire(game_id).inspect_err(|e| {
            if e.is_retryable() {
                warn!("{} refused: game {} is locked", operation, game_id);
                self.metrics.record_lock_conflict();
            }
            self.metrics.record_rejection(operation, e);
        })
    }

    /// Run a mutation on a working copy and keep it only on success
    async fn transact<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut RatingBook, DateTime<Utc>) -> Result<T>,
    ) -> Result<T> {
        let mut book = self.book.lock().await;
        let mut working = book.clone();
        let now = self.clock.now();

        match f(&mut working, now) {
            Ok(value) => {
                *book = working;
                self.metrics.update_book_gauges(
                    book.games.len(),
                    book.recalculation_required_since.is_some(),
                );
                Ok(value)
            }
            Err(e) => {
                debug!("{} failed: {}", operation, e);
                self.metrics.record_rejection(operation, &e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MockClock;
    use chrono::TimeZone;

    fn fixed_clock() -> Arc<dyn Clock> {
        let mut clock = MockClock::new();
        clock
            .expect_now()
            .return_const(Utc.with_ymd_and_hms(2024, 8, 1, 20, 0, 0).unwrap());
        Arc::new(clock)
    }

    async fn service() -> GameService {
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let service = GameService::new(RatingEngine::default(), fixed_clock(), metrics);
        service
            .register_context("guild", ContextPolicy::default())
            .await
            .unwrap();
        for id in ["a", "b"] {
            service.register_member(id, id, "guild").await.unwrap();
        }
        service
    }

    #[tokio::test]
    async fn test_failed_transaction_leaves_book_untouched() {
        let service = service().await;
        let before = service.stats().await;

        let result = service
            .create_game(vec![vec!["a".to_string()], vec!["ghost".to_string()]], true, "guild")
            .await;
        assert!(matches!(result, Err(EngineError::NotFound { .. })));
        assert_eq!(service.stats().await, before);
    }

    #[tokio::test]
    async fn test_declare_uses_clock_for_completion() {
        let service = service().await;
        let game = service
            .create_game(vec![vec!["a".to_string()], vec!["b".to_string()]], true, "guild")
            .await
            .unwrap();

        service
            .declare_winner(game.id, game.sides[0].id, true)
            .await
            .unwrap();
        let game = service.game(game.id).await.unwrap();
        assert_eq!(
            game.completed_at,
            Some(Utc.with_ymd_and_hms(2024, 8, 1, 20, 0, 0).unwrap())
        );
        assert_eq!(service.metrics().lifecycle().confirmations_total.get(), 1);
    }

    #[tokio::test]
    async fn test_restored_book_adopts_configured_starting_rating() {
        let service = service().await;
        let game = service
            .create_game(vec![vec!["a".to_string()], vec!["b".to_string()]], true, "guild")
            .await
            .unwrap();
        service
            .declare_winner(game.id, game.sides[0].id, true)
            .await
            .unwrap();
        service.register_member("c", "c", "guild").await.unwrap();

        let config = RatingConfig {
            starting_rating: 1200,
            ..Default::default()
        };
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let restored = GameService::from_book(
            RatingEngine::new(&config).unwrap(),
            fixed_clock(),
            metrics,
            service.snapshot().await,
        );

        let member = |id: &str| EntityRef::Member(id.to_string());
        let idle = restored
            .ledger_entry(LedgerKind::Member, &member("c"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(idle.rating, 1200);
        let winner = restored
            .ledger_entry(LedgerKind::Member, &member("a"))
            .await
            .unwrap()
            .unwrap();
        assert!(winner.rating > 1000 && winner.rating < 1200);

        restored.recalculate_all().await.unwrap();
        let winner = restored
            .ledger_entry(LedgerKind::Member, &member("a"))
            .await
            .unwrap()
            .unwrap();
        assert!(winner.rating > 1200);
        assert_eq!(restored.snapshot().await.starting_rating(), 1200);
    }

    #[tokio::test]
    async fn test_paused_service_refuses_mutations() {
        let service = service().await;
        let pause = service.pause_mutations().unwrap();

        let err = service
            .register_member("c", "c", "guild")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::Concurrency(ConcurrencyError::RecalculationInProgress)
        );
        assert!(service.recalculate_all().await.is_err());

        drop(pause);
        assert!(service.register_member("c", "c", "guild").await.is_ok());
        assert!(!service.is_recalculating());
    }
}
