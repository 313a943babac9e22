//! The rating book
//!
//! All persistent state of the engine lives in one serializable value:
//! contexts, participants, collectives, squads, games and the five rating
//! ledgers. Lifecycle, rating application and recalculation are implemented
//! as `impl RatingBook` blocks in their own modules; the service mutates a
//! working copy of the book and swaps it in only when an operation succeeds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::rating::ledger::{Ledger, LedgerKind};
use crate::roster::squad::SquadRegistry;
use crate::types::{
    Collective, CollectiveId, Context, ContextId, ContextPolicy, Game, GameId, Individual,
    IndividualId, Member, MemberId, SquadId,
};

/// Marker left behind by a reversal; ranked confirmations are refused until
/// a recalculation from at most `since` has run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalculationRequired {
    pub since: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingBook {
    pub(crate) contexts: HashMap<ContextId, Context>,
    pub(crate) individuals: HashMap<IndividualId, Individual>,
    pub(crate) members: HashMap<MemberId, Member>,
    pub(crate) collectives: HashMap<CollectiveId, Collective>,
    pub(crate) squads: SquadRegistry,
    pub(crate) games: HashMap<GameId, Game>,
    pub(crate) individual_ledger: Ledger<IndividualId>,
    pub(crate) member_ledger: Ledger<MemberId>,
    pub(crate) collective_season_ledger: Ledger<CollectiveId>,
    pub(crate) collective_all_time_ledger: Ledger<CollectiveId>,
    pub(crate) squad_ledger: Ledger<SquadId>,
    pub(crate) next_sequence: u64,
    pub(crate) recalculation_required_since: Option<DateTime<Utc>>,
}

impl Default for RatingBook {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl RatingBook {
    pub fn new(starting_rating: i64) -> Self {
        Self {
            contexts: HashMap::new(),
            individuals: HashMap::new(),
            members: HashMap::new(),
            collectives: HashMap::new(),
            squads: SquadRegistry::new(),
            games: HashMap::new(),
            individual_ledger: Ledger::new(LedgerKind::Individual, starting_rating),
            member_ledger: Ledger::new(LedgerKind::Member, starting_rating),
            collective_season_ledger: Ledger::new(LedgerKind::CollectiveSeason, starting_rating),
            collective_all_time_ledger: Ledger::new(
                LedgerKind::CollectiveAllTime,
                starting_rating,
            ),
            squad_ledger: Ledger::new(LedgerKind::Squad, starting_rating),
            next_sequence: 1,
            recalculation_required_since: None,
        }
    }

    /// Register a context, or update the policy of an existing one
    pub fn register_context(
        &mut self,
        context_id: &str,
        policy: ContextPolicy,
    ) -> Result<&Context> {
        if context_id.trim().is_empty() {
            return Err(EngineError::validation("Context id cannot be empty"));
        }

        let context = self
            .contexts
            .entry(context_id.to_string())
            .and_modify(|context| context.policy = policy)
            .or_insert_with(|| Context {
                id: context_id.to_string(),
                policy,
                season_started_at: None,
            });
        debug!("Registered context '{}' with {:?}", context_id, policy);
        Ok(context)
    }

    /// Register the member footprint of an individual inside a context
    pub fn register_member(
        &mut self,
        member_id: &str,
        individual_id: &str,
        context_id: &str,
        now: DateTime<Utc>,
    ) -> Result<&Member> {
        if member_id.trim().is_empty() || individual_id.trim().is_empty() {
            return Err(EngineError::validation(
                "Member and individual ids cannot be empty",
            ));
        }
        self.context(context_id)?;

        if let Some(existing) = self.members.get(member_id) {
            if existing.individual_id != individual_id || existing.context_id != context_id {
                return Err(EngineError::validation(format!(
                    "Member '{member_id}' is already registered to individual '{}' in context '{}'",
                    existing.individual_id, existing.context_id
                )));
            }
        } else if let Some(other) = self
            .members
            .values()
            .find(|m| m.individual_id == individual_id && m.context_id == context_id)
        {
            return Err(EngineError::validation(format!(
                "Individual '{individual_id}' already has member '{}' in context '{context_id}'",
                other.id
            )));
        }

        self.individuals
            .entry(individual_id.to_string())
            .or_insert_with(|| Individual {
                id: individual_id.to_string(),
                created_at: now,
            });
        self.individual_ledger.seed(individual_id.to_string());
        self.member_ledger.seed(member_id.to_string());

        let member = self
            .members
            .entry(member_id.to_string())
            .or_insert_with(|| Member {
                id: member_id.to_string(),
                individual_id: individual_id.to_string(),
                context_id: context_id.to_string(),
                joined_at: now,
            });
        Ok(member)
    }

    /// Register a persistent team in a context
    pub fn register_collective(
        &mut self,
        collective_id: &str,
        context_id: &str,
        name: &str,
        members: &[MemberId],
        now: DateTime<Utc>,
    ) -> Result<&Collective> {
        if collective_id.trim().is_empty() {
            return Err(EngineError::validation("Collective id cannot be empty"));
        }
        if self.collectives.contains_key(collective_id) {
            return Err(EngineError::validation(format!(
                "Collective '{collective_id}' already exists"
            )));
        }
        self.context(context_id)?;
        for member_id in members {
            self.member_in_context(member_id, context_id)?;
        }

        self.collective_season_ledger.seed(collective_id.to_string());
        self.collective_all_time_ledger
            .seed(collective_id.to_string());

        info!(
            "Registered collective '{}' ({}) in context '{}' with {} members",
            collective_id,
            name,
            context_id,
            members.len()
        );
        let collective = self
            .collectives
            .entry(collective_id.to_string())
            .or_insert_with(|| Collective {
                id: collective_id.to_string(),
                context_id: context_id.to_string(),
                name: name.to_string(),
                members: members.iter().cloned().collect(),
                created_at: now,
            });
        Ok(collective)
    }

    pub fn context(&self, context_id: &str) -> Result<&Context> {
        self.contexts
            .get(context_id)
            .ok_or_else(|| EngineError::not_found("Context", context_id))
    }

    pub fn member(&self, member_id: &str) -> Result<&Member> {
        self.members
            .get(member_id)
            .ok_or_else(|| EngineError::not_found("Member", member_id))
    }

    pub fn collective(&self, collective_id: &str) -> Result<&Collective> {
        self.collectives
            .get(collective_id)
            .ok_or_else(|| EngineError::not_found("Collective", collective_id))
    }

    pub fn game(&self, game_id: GameId) -> Result<&Game> {
        self.games
            .get(&game_id)
            .ok_or_else(|| EngineError::not_found("Game", game_id.to_string()))
    }

    pub(crate) fn game_mut(&mut self, game_id: GameId) -> Result<&mut Game> {
        self.games
            .get_mut(&game_id)
            .ok_or_else(|| EngineError::not_found("Game", game_id.to_string()))
    }

    pub fn starting_rating(&self) -> i64 {
        self.individual_ledger.starting_rating()
    }

    /// Adopt a new baseline on all five ledgers
    pub fn rebase_starting_rating(&mut self, starting_rating: i64) {
        self.individual_ledger.set_starting_rating(starting_rating);
        self.member_ledger.set_starting_rating(starting_rating);
        self.collective_season_ledger
            .set_starting_rating(starting_rating);
        self.collective_all_time_ledger
            .set_starting_rating(starting_rating);
        self.squad_ledger.set_starting_rating(starting_rating);
    }

    pub fn games(&self) -> impl Iterator<Item = &Game> {
        self.games.values()
    }

    pub fn squads(&self) -> &SquadRegistry {
        &self.squads
    }

    pub fn individual_ledger(&self) -> &Ledger<IndividualId> {
        &self.individual_ledger
    }

    pub fn member_ledger(&self) -> &Ledger<MemberId> {
        &self.member_ledger
    }

    pub fn collective_season_ledger(&self) -> &Ledger<CollectiveId> {
        &self.collective_season_ledger
    }

    pub fn collective_all_time_ledger(&self) -> &Ledger<CollectiveId> {
        &self.collective_all_time_ledger
    }

    pub fn squad_ledger(&self) -> &Ledger<SquadId> {
        &self.squad_ledger
    }

    pub fn recalculation_required_since(&self) -> Option<DateTime<Utc>> {
        self.recalculation_required_since
    }

    /// Member lookup that also checks context membership
    pub(crate) fn member_in_context(&self, member_id: &str, context_id: &str) -> Result<&Member> {
        let member = self.member(member_id)?;
        if member.context_id != context_id {
            return Err(EngineError::validation(format!(
                "Member '{member_id}' belongs to context '{}', not '{context_id}'",
                member.context_id
            )));
        }
        Ok(member)
    }

    pub(crate) fn take_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    /// Resolve a squad and make sure its ledger entry exists
    pub(crate) fn resolve_squad(
        &mut self,
        context_id: &ContextId,
        members: BTreeSet<MemberId>,
        now: DateTime<Utc>,
    ) -> Result<SquadId> {
        let resolution = self.squads.resolve(context_id, members, now)?;
        self.squad_ledger.seed(resolution.squad_id);
        Ok(resolution.squad_id)
    }

    /// Keep the earliest outstanding reversal timestamp
    pub(crate) fn require_recalculation(&mut self, since: DateTime<Utc>) -> RecalculationRequired {
        let earliest = self
            .recalculation_required_since
            .map_or(since, |existing| existing.min(since));
        self.recalculation_required_since = Some(earliest);
        RecalculationRequired { since: earliest }
    }

    /// Begin a new collective season in a context
    pub fn start_new_season(&mut self, context_id: &str, now: DateTime<Utc>) -> Result<()> {
        let context = self
            .contexts
            .get_mut(context_id)
            .ok_or_else(|| EngineError::not_found("Context", context_id))?;
        context.season_started_at = Some(now);

        let in_context: BTreeSet<CollectiveId> = self
            .collectives
            .values()
            .filter(|c| c.context_id == context_id)
            .map(|c| c.id.clone())
            .collect();
        self.collective_season_ledger
            .reset_where(|id| in_context.contains(id));

        // Earlier games no longer own any part of the season ratings
        let mut cleared = 0;
        for game in self
            .games
            .values_mut()
            .filter(|game| game.context_id == context_id)
        {
            for side in game.sides.iter_mut() {
                if side.applied.collective_season.take().is_some() {
                    cleared += 1;
                }
            }
        }

        info!(
            "Started season in '{}' at {}: {} collectives reset, {} season deltas retired",
            context_id,
            now,
            in_context.len(),
            cleared
        );
        Ok(())
    }
}
