//! Squad resolution
//!
//! A squad is identified by the exact set of members who played together.
//! Resolving a set either returns the squad registered for that exact set or
//! creates a new one; subsets and supersets never match.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::types::{ContextId, MemberId, Squad, SquadId};
use crate::utils::generate_squad_id;

/// Outcome of a resolve call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub squad_id: SquadId,
    /// True when the squad did not exist before this call
    pub created: bool,
}

/// Registry of every squad, indexed by exact member set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Squad>", into = "Vec<Squad>")]
pub struct SquadRegistry {
    squads: HashMap<SquadId, Squad>,
    by_members: HashMap<BTreeSet<MemberId>, SquadId>,
}

impl From<Vec<Squad>> for SquadRegistry {
    fn from(squads: Vec<Squad>) -> Self {
        let by_members = squads
            .iter()
            .map(|squad| (squad.members.clone(), squad.id))
            .collect();
        Self {
            squads: squads.into_iter().map(|squad| (squad.id, squad)).collect(),
            by_members,
        }
    }
}

impl From<SquadRegistry> for Vec<Squad> {
    fn from(registry: SquadRegistry) -> Self {
        let mut squads: Vec<Squad> = registry.squads.into_values().collect();
        squads.sort_by_key(|squad| (squad.created_at, squad.id));
        squads
    }
}

impl SquadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing squad for exactly this member set, or a newly created one
    pub fn resolve<I>(
        &mut self,
        context_id: &ContextId,
        members: I,
        now: DateTime<Utc>,
    ) -> Result<Resolution>
    where
        I: IntoIterator<Item = MemberId>,
    {
        let members: BTreeSet<MemberId> = members.into_iter().collect();
        if members.len() < 2 {
            return Err(EngineError::validation(format!(
                "A squad needs at least two distinct members, got {}",
                members.len()
            )));
        }

        if let Some(&squad_id) = self.by_members.get(&members) {
            return Ok(Resolution {
                squad_id,
                created: false,
            });
        }

        let squad = Squad {
            id: generate_squad_id(),
            context_id: context_id.clone(),
            members: members.clone(),
            created_at: now,
        };
        let squad_id = squad.id;
        debug!(
            "Created squad {} in context '{}' for {} members",
            squad_id,
            context_id,
            members.len()
        );

        self.by_members.insert(members, squad_id);
        self.squads.insert(squad_id, squad);

        Ok(Resolution {
            squad_id,
            created: true,
        })
    }

    /// Lookup without creating
    pub fn find<'a, I>(&self, members: I) -> Option<&Squad>
    where
        I: IntoIterator<Item = &'a MemberId>,
    {
        let members: BTreeSet<MemberId> = members.into_iter().cloned().collect();
        self.by_members
            .get(&members)
            .and_then(|id| self.squads.get(id))
    }

    pub fn get(&self, squad_id: &SquadId) -> Option<&Squad> {
        self.squads.get(squad_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Squad> {
        self.squads.values()
    }

    pub fn len(&self) -> usize {
        self.squads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.squads.is_empty()
    }
}
