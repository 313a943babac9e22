//! Common types used throughout the rating engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::rating::ledger::AppliedDelta;

/// Cross-context identity of a participant
pub type IndividualId = String;

/// A participant's footprint inside one context
pub type MemberId = String;

/// Unique identifier for a community/context
pub type ContextId = String;

/// Unique identifier for a persistent team
pub type CollectiveId = String;

/// Unique identifier for an anonymous squad
pub type SquadId = Uuid;

/// Unique identifier for games
pub type GameId = Uuid;

/// Unique identifier for one side of one game
pub type SideId = Uuid;

/// Which individual-level ledgers a ranked game in a context updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPolicy {
    /// Update the cross-context Individual ledger
    pub updates_individual: bool,
    /// Update the per-context Member ledger
    pub updates_member: bool,
}

impl Default for ContextPolicy {
    fn default() -> Self {
        Self {
            updates_individual: true,
            updates_member: true,
        }
    }
}

impl ContextPolicy {
    /// Context whose games never touch the global ledger
    pub fn local_only() -> Self {
        Self {
            updates_individual: false,
            updates_member: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub id: ContextId,
    pub policy: ContextPolicy,
    /// Start of the current collective season, if one was ever started
    pub season_started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Individual {
    pub id: IndividualId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub individual_id: IndividualId,
    pub context_id: ContextId,
    pub joined_at: DateTime<Utc>,
}

/// A persistent team within one context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collective {
    pub id: CollectiveId,
    pub context_id: ContextId,
    pub name: String,
    pub members: BTreeSet<MemberId>,
    pub created_at: DateTime<Utc>,
}

/// An anonymous rating entity keyed by an exact member set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Squad {
    pub id: SquadId,
    pub context_id: ContextId,
    pub members: BTreeSet<MemberId>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    /// Open for members to join
    Pending,
    /// All sides filled, waiting for a result
    Started,
    /// Winner declared but not ratified
    Completed,
    /// Winner ratified (terminal)
    Confirmed,
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameStatus::Pending => write!(f, "Pending"),
            GameStatus::Started => write!(f, "Started"),
            GameStatus::Completed => write!(f, "Completed"),
            GameStatus::Confirmed => write!(f, "Confirmed"),
        }
    }
}

/// Deltas applied to the side-level ledgers by one game
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SideDeltas {
    pub squad: Option<AppliedDelta>,
    pub collective_season: Option<AppliedDelta>,
    pub collective_all_time: Option<AppliedDelta>,
}

impl SideDeltas {
    pub fn is_empty(&self) -> bool {
        self.squad.is_none()
            && self.collective_season.is_none()
            && self.collective_all_time.is_none()
    }
}

/// One competing group within a game
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Side {
    pub id: SideId,
    /// Number of slots on this side
    pub size: usize,
    /// Members in join order
    pub members: Vec<MemberId>,
    pub collective_id: Option<CollectiveId>,
    pub squad_id: Option<SquadId>,
    #[serde(default)]
    pub applied: SideDeltas,
}

impl Side {
    pub fn is_full(&self) -> bool {
        self.members.len() == self.size
    }

    pub fn member_set(&self) -> BTreeSet<MemberId> {
        self.members.iter().cloned().collect()
    }
}

/// Join of one member to one side, with the ledger audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineupEntry {
    pub member_id: MemberId,
    pub side_id: SideId,
    pub member_delta: Option<AppliedDelta>,
    pub individual_delta: Option<AppliedDelta>,
    /// Rating right after the game (member rating when updated, else individual)
    pub rating_snapshot: Option<i64>,
}

impl LineupEntry {
    pub fn new(member_id: MemberId, side_id: SideId) -> Self {
        Self {
            member_id,
            side_id,
            member_delta: None,
            individual_delta: None,
            rating_snapshot: None,
        }
    }

    pub fn clear_applied(&mut self) {
        self.member_delta = None;
        self.individual_delta = None;
        self.rating_snapshot = None;
    }
}

/// A contest among two or more sides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub context_id: ContextId,
    pub ranked: bool,
    pub status: GameStatus,
    pub sides: Vec<Side>,
    pub lineup: Vec<LineupEntry>,
    pub winner: Option<SideId>,
    pub created_at: DateTime<Utc>,
    /// Creation order; breaks completion-time ties during replay
    pub sequence: u64,
    pub completed_at: Option<DateTime<Utc>>,
    /// Whether ledger deltas from this game are currently applied
    pub ratings_applied: bool,
}

impl Game {
    pub fn side(&self, side_id: SideId) -> Option<&Side> {
        self.sides.iter().find(|side| side.id == side_id)
    }

    pub fn side_mut(&mut self, side_id: SideId) -> Option<&mut Side> {
        self.sides.iter_mut().find(|side| side.id == side_id)
    }

    /// Side the member currently plays on, if any
    pub fn side_of(&self, member_id: &str) -> Option<&Side> {
        self.sides
            .iter()
            .find(|side| side.members.iter().any(|m| m == member_id))
    }

    pub fn is_full(&self) -> bool {
        self.sides.iter().all(Side::is_full)
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == GameStatus::Confirmed
    }

    /// Games a recalculation replays
    pub fn is_replayable(&self) -> bool {
        self.ranked && self.is_confirmed()
    }

    /// Largest side size in the game
    pub fn max_side_size(&self) -> usize {
        self.sides.iter().map(|side| side.size).max().unwrap_or(0)
    }

    /// Ordering key used by replays
    pub fn replay_key(&self) -> (Option<DateTime<Utc>>, u64) {
        (self.completed_at, self.sequence)
    }
}

/// Reference to any rated entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    Individual(IndividualId),
    Member(MemberId),
    Collective(CollectiveId),
    Squad(SquadId),
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityRef::Individual(id) => write!(f, "individual:{id}"),
            EntityRef::Member(id) => write!(f, "member:{id}"),
            EntityRef::Collective(id) => write!(f, "collective:{id}"),
            EntityRef::Squad(id) => write!(f, "squad:{id}"),
        }
    }
}

/// Win/loss tally over confirmed games
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinLossRecord {
    pub wins: u32,
    pub losses: u32,
}

impl WinLossRecord {
    pub fn games(&self) -> u32 {
        self.wins + self.losses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn side(size: usize, members: &[&str]) -> Side {
        Side {
            id: Uuid::new_v4(),
            size,
            members: members.iter().map(|m| m.to_string()).collect(),
            collective_id: None,
            squad_id: None,
            applied: SideDeltas::default(),
        }
    }

    #[test]
    fn test_side_fullness() {
        assert!(side(2, &["a", "b"]).is_full());
        assert!(!side(3, &["a", "b"]).is_full());
    }

    #[test]
    fn test_game_lookup_helpers() {
        let red = side(1, &["alice"]);
        let blue = side(2, &["bob", "carol"]);
        let blue_id = blue.id;
        let game = Game {
            id: Uuid::new_v4(),
            context_id: "guild".to_string(),
            ranked: true,
            status: GameStatus::Started,
            sides: vec![red, blue],
            lineup: vec![],
            winner: None,
            created_at: Utc::now(),
            sequence: 1,
            completed_at: None,
            ratings_applied: false,
        };

        assert_eq!(game.side_of("carol").map(|s| s.id), Some(blue_id));
        assert!(game.side_of("dave").is_none());
        assert_eq!(game.max_side_size(), 2);
        assert!(game.is_full());
        assert!(!game.is_replayable());
    }

    #[test]
    fn test_status_ordering() {
        assert!(GameStatus::Pending < GameStatus::Started);
        assert!(GameStatus::Completed < GameStatus::Confirmed);
        assert_eq!(GameStatus::Confirmed.to_string(), "Confirmed");
    }

    #[test]
    fn test_entity_ref_display() {
        assert_eq!(
            EntityRef::Member("alice".to_string()).to_string(),
            "member:alice"
        );
    }
}
