//! Generic rating ledger
//!
//! Every rated entity kind (individuals, members, both collective tracks and
//! squads) keeps its ratings in a [`Ledger`]. Ledgers differ only in the
//! K-factor class and whether the underdog boost applies, both derived from
//! the [`LedgerKind`].

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{EngineError, Result};
use crate::rating::delta::RatingClass;

/// The five independent rating tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerKind {
    /// Cross-context individual rating
    Individual,
    /// Per-context member rating
    Member,
    CollectiveSeason,
    CollectiveAllTime,
    Squad,
}

impl LedgerKind {
    pub fn class(&self) -> RatingClass {
        match self {
            LedgerKind::Individual | LedgerKind::Member => RatingClass::Individual,
            LedgerKind::CollectiveSeason | LedgerKind::CollectiveAllTime | LedgerKind::Squad => {
                RatingClass::Group
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LedgerKind::Individual => "individual",
            LedgerKind::Member => "member",
            LedgerKind::CollectiveSeason => "collective_season",
            LedgerKind::CollectiveAllTime => "collective_all_time",
            LedgerKind::Squad => "squad",
        }
    }
}

impl std::fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Rating state of one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub rating: i64,
    /// High-water mark
    pub peak: i64,
    /// Ranked games played
    pub games: u32,
    pub wins: u32,
    pub losses: u32,
    pub last_played: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    pub fn new(starting_rating: i64) -> Self {
        Self {
            rating: starting_rating,
            peak: starting_rating,
            games: 0,
            wins: 0,
            losses: 0,
            last_played: None,
        }
    }

    /// Apply one game's delta, returning what is needed to undo it
    pub fn apply(&mut self, delta: i64, won: bool, at: DateTime<Utc>) -> AppliedDelta {
        let applied = AppliedDelta {
            delta,
            rating_before: self.rating,
            peak_before: self.peak,
            last_played_before: self.last_played,
            played_at: at,
        };

        self.rating += delta;
        self.peak = self.peak.max(self.rating);
        self.games += 1;
        if won {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        self.last_played = Some(at);

        applied
    }

    /// Subtract a previously applied delta from the current values
    pub fn revert(&mut self, applied: &AppliedDelta, won: bool) -> Result<()> {
        let tally = if won { self.wins } else { self.losses };
        if self.games == 0 || tally == 0 {
            return Err(EngineError::consistency(
                "Ledger entry has no recorded game to revert",
            ));
        }

        let rating_after = applied.rating_after();
        self.rating -= applied.delta;
        self.games -= 1;
        if won {
            self.wins -= 1;
        } else {
            self.losses -= 1;
        }

        // Only undo the high-water mark when this game set it and nothing later moved it
        if self.peak == rating_after && applied.peak_before < rating_after {
            self.peak = applied.peak_before.max(self.rating);
        }
        if self.last_played == Some(applied.played_at) {
            self.last_played = applied.last_played_before;
        }

        Ok(())
    }

    pub fn is_active_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_played.is_some_and(|played| played >= cutoff)
    }
}

/// Audit record of a delta applied to a ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDelta {
    pub delta: i64,
    pub rating_before: i64,
    pub peak_before: i64,
    pub last_played_before: Option<DateTime<Utc>>,
    pub played_at: DateTime<Utc>,
}

impl AppliedDelta {
    pub fn rating_after(&self) -> i64 {
        self.rating_before + self.delta
    }
}

/// Ratings of every entity of one kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Serialize + Eq + Hash",
    deserialize = "K: DeserializeOwned + Eq + Hash"
))]
pub struct Ledger<K> {
    kind: LedgerKind,
    starting_rating: i64,
    entries: HashMap<K, LedgerEntry>,
}

impl<K> Ledger<K>
where
    K: Clone + Eq + Hash + Ord,
{
    pub fn new(kind: LedgerKind, starting_rating: i64) -> Self {
        Self {
            kind,
            starting_rating,
            entries: HashMap::new(),
        }
    }

    pub fn kind(&self) -> LedgerKind {
        self.kind
    }

    pub fn starting_rating(&self) -> i64 {
        self.starting_rating
    }

    pub fn entry(&self, key: &K) -> Option<&LedgerEntry> {
        self.entries.get(key)
    }

    /// Current rating, or the starting rating for an unseen entity
    pub fn rating(&self, key: &K) -> i64 {
        self.entries
            .get(key)
            .map(|entry| entry.rating)
            .unwrap_or(self.starting_rating)
    }

    /// Ranked games played so far
    pub fn games(&self, key: &K) -> u32 {
        self.entries.get(key).map(|entry| entry.games).unwrap_or(0)
    }

    /// Create an entry at the starting rating if none exists
    pub fn seed(&mut self, key: K) -> &LedgerEntry {
        let starting = self.starting_rating;
        self.entries
            .entry(key)
            .or_insert_with(|| LedgerEntry::new(starting))
    }

    pub fn apply(&mut self, key: &K, delta: i64, won: bool, at: DateTime<Utc>) -> AppliedDelta {
        let starting = self.starting_rating;
        self.entries
            .entry(key.clone())
            .or_insert_with(|| LedgerEntry::new(starting))
            .apply(delta, won, at)
    }

    pub fn revert(&mut self, key: &K, applied: &AppliedDelta, won: bool) -> Result<()> {
        let kind = self.kind;
        let entry = self.entries.get_mut(key).ok_or_else(|| {
            EngineError::consistency(format!(
                "Cannot revert {kind} delta: no ledger entry for the entity"
            ))
        })?;
        entry.revert(applied, won)
    }

    /// Reset every entity to the starting rating, keeping their identities
    pub fn reset(&mut self) {
        let starting = self.starting_rating;
        for entry in self.entries.values_mut() {
            *entry = LedgerEntry::new(starting);
        }
    }

    /// Move the baseline; entities without ranked games follow it
    pub fn set_starting_rating(&mut self, starting_rating: i64) {
        self.starting_rating = starting_rating;
        for entry in self.entries.values_mut().filter(|entry| entry.games == 0) {
            *entry = LedgerEntry::new(starting_rating);
        }
    }

    /// Reset only the entities matching the predicate
    pub fn reset_where(&mut self, mut predicate: impl FnMut(&K) -> bool) {
        let starting = self.starting_rating;
        for (key, entry) in self.entries.iter_mut() {
            if predicate(key) {
                *entry = LedgerEntry::new(starting);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &LedgerEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by rating, then high-water mark, both descending
    pub fn standings(&self) -> Vec<(&K, &LedgerEntry)> {
        let mut standings: Vec<_> = self.entries.iter().collect();
        standings.sort_by(|(ka, a), (kb, b)| {
            b.rating
                .cmp(&a.rating)
                .then(b.peak.cmp(&a.peak))
                .then(ka.cmp(kb))
        });
        standings
    }
}
