//! Draft order generation
//!
//! Produces one pick list for a filled multi-sided roster. Each side carries
//! a pick-score; the lowest score picks next and pays the total slot count
//! for it. Short-handed sides start behind by the size gap so the larger
//! sides pick first, and ties alternate direction every round.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::types::{Game, MemberId, SideId};

/// One side as the draft sees it
#[derive(Debug, Clone, PartialEq)]
pub struct DraftSide {
    pub side_id: SideId,
    pub size: usize,
    /// Members in the order the side will call them
    pub members: Vec<MemberId>,
}

impl DraftSide {
    pub fn from_game(game: &Game) -> Vec<DraftSide> {
        game.sides
            .iter()
            .map(|side| DraftSide {
                side_id: side.id,
                size: side.size,
                members: side.members.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftPick {
    pub side_id: SideId,
    pub member_id: MemberId,
    /// Score of the side at the moment it picked
    pub pick_score: usize,
}

struct Cursor<'a> {
    index: usize,
    side: &'a DraftSide,
    score: usize,
    next: usize,
}

impl Cursor<'_> {
    fn remaining(&self) -> bool {
        self.next < self.side.members.len()
    }
}

/// Balanced serpentine pick order for a full roster
pub fn draft_order(sides: &[DraftSide]) -> Result<Vec<DraftPick>> {
    if sides.len() < 2 {
        return Err(EngineError::validation(format!(
            "A draft needs at least two sides, got {}",
            sides.len()
        )));
    }
    if let Some(side) = sides.iter().find(|side| side.members.len() != side.size) {
        return Err(EngineError::validation(format!(
            "Side {} has {} of {} members; the roster must be full",
            side.side_id,
            side.members.len(),
            side.size
        )));
    }

    let total: usize = sides.iter().map(|side| side.size).sum();
    if total == 0 {
        return Err(EngineError::validation("A draft needs at least one slot"));
    }
    let max_size = sides.iter().map(|side| side.size).max().unwrap_or(0);

    let mut cursors: Vec<Cursor> = sides
        .iter()
        .enumerate()
        .map(|(index, side)| Cursor {
            index,
            side,
            score: (max_size - side.size) * total,
            next: 0,
        })
        .collect();

    let mut picks = Vec::with_capacity(total);
    while let Some(position) = next_picker(&cursors, total) {
        let cursor = &mut cursors[position];
        picks.push(DraftPick {
            side_id: cursor.side.side_id,
            member_id: cursor.side.members[cursor.next].clone(),
            pick_score: cursor.score,
        });
        cursor.next += 1;
        cursor.score += total;
    }

    let swaps = smooth(&mut picks);
    debug!(
        "Generated draft order of {} picks across {} sides ({} smoothing swaps)",
        picks.len(),
        sides.len(),
        swaps
    );

    Ok(picks)
}

/// Lowest score wins; ties go ascending on even rounds and descending on odd ones
fn next_picker(cursors: &[Cursor], total: usize) -> Option<usize> {
    cursors
        .iter()
        .enumerate()
        .filter(|(_, cursor)| cursor.remaining())
        .min_by(|(_, a), (_, b)| {
            a.score.cmp(&b.score).then_with(|| {
                if (a.score / total) % 2 == 0 {
                    a.index.cmp(&b.index)
                } else {
                    b.index.cmp(&a.index)
                }
            })
        })
        .map(|(position, _)| position)
}

/// Break up runs where one side got more than one pick ahead of its neighbour
fn smooth(picks: &mut [DraftPick]) -> usize {
    let max_passes = picks.len() * picks.len();
    let mut swaps = 0;

    for _ in 0..max_passes {
        let mut counts: HashMap<SideId, usize> = HashMap::new();
        let mut swapped = false;

        for i in 0..picks.len().saturating_sub(1) {
            let earlier = picks[i].side_id;
            let later = picks[i + 1].side_id;
            if earlier != later {
                let earlier_count = counts.get(&earlier).copied().unwrap_or(0);
                let later_count = counts.get(&later).copied().unwrap_or(0);
                if earlier_count > later_count + 1 {
                    picks.swap(i, i + 1);
                    swaps += 1;
                    swapped = true;
                }
            }
            *counts.entry(picks[i].side_id).or_insert(0) += 1;
        }

        if !swapped {
            break;
        }
    }

    swaps
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn side(size: usize, members: &[&str]) -> DraftSide {
        DraftSide {
            side_id: Uuid::new_v4(),
            size,
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }

    fn members(picks: &[DraftPick]) -> Vec<&str> {
        picks.iter().map(|p| p.member_id.as_str()).collect()
    }

    #[test]
    fn test_equal_sides_snake() {
        let sides = vec![side(3, &["a1", "a2", "a3"]), side(3, &["b1", "b2", "b3"])];
        let picks = draft_order(&sides).unwrap();
        assert_eq!(members(&picks), vec!["a1", "b1", "b2", "a2", "a3", "b3"]);
    }

    #[test]
    fn test_three_sides_reverse_each_round() {
        let sides = vec![
            side(2, &["a1", "a2"]),
            side(2, &["b1", "b2"]),
            side(2, &["c1", "c2"]),
        ];
        let picks = draft_order(&sides).unwrap();
        assert_eq!(
            members(&picks),
            vec!["a1", "b1", "c1", "c2", "b2", "a2"]
        );
    }

    #[test]
    fn test_short_side_starts_behind() {
        let big = side(3, &["a1", "a2", "a3"]);
        let small = side(1, &["b1"]);
        let small_id = small.side_id;
        let picks = draft_order(&[big, small]).unwrap();

        assert_eq!(picks.len(), 4);
        assert_eq!(picks[0].member_id, "a1");
        // Smoothing pulls the lone pick ahead of the third
        assert_eq!(members(&picks), vec!["a1", "a2", "b1", "a3"]);
        assert_eq!(picks[2].side_id, small_id);
        assert_eq!(picks[2].pick_score, 8);
    }

    #[test]
    fn test_every_member_picked_once() {
        let sides = vec![
            side(4, &["a1", "a2", "a3", "a4"]),
            side(2, &["b1", "b2"]),
            side(3, &["c1", "c2", "c3"]),
        ];
        let picks = draft_order(&sides).unwrap();
        let mut picked = members(&picks);
        picked.sort();
        assert_eq!(
            picked,
            vec!["a1", "a2", "a3", "a4", "b1", "b2", "c1", "c2", "c3"]
        );
    }

    #[test]
    fn test_rejects_partial_roster() {
        let sides = vec![side(2, &["a1"]), side(2, &["b1", "b2"])];
        assert!(matches!(
            draft_order(&sides),
            Err(EngineError::Validation { .. })
        ));
    }

    #[test]
    fn test_rejects_single_side() {
        let sides = vec![side(2, &["a1", "a2"])];
        assert!(draft_order(&sides).is_err());
    }
}
