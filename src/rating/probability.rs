//! Win probabilities for asymmetric multi-sided games
//!
//! Smaller sides are handicapped with virtual members before the pairwise
//! Elo comparison. With more than two sides each side is compared against
//! its strongest rival only, and the results are normalized to sum to one.

use serde::{Deserialize, Serialize};
use skillratings::elo::{expected_score, EloRating};

use crate::error::{EngineError, Result};

/// Aggregate rating and member count of one side
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SideStrength {
    pub rating: f64,
    pub size: usize,
}

impl SideStrength {
    pub fn new(rating: f64, size: usize) -> Self {
        Self { rating, size }
    }
}

/// Side-size handicap parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WinProbabilityCalculator {
    /// Points a virtual member sits below the side it fills in for
    pub handicap_points: f64,
    /// Share of a small side's rating surplus over its rivals removed from each virtual member
    pub surplus_factor: f64,
}

impl Default for WinProbabilityCalculator {
    fn default() -> Self {
        Self {
            handicap_points: 200.0,
            surplus_factor: 1.0,
        }
    }
}

impl WinProbabilityCalculator {
    pub fn new(handicap_points: f64, surplus_factor: f64) -> Self {
        Self {
            handicap_points,
            surplus_factor,
        }
    }

    /// Pairwise chance that `rating` beats `opponent`
    pub fn pairwise(rating: f64, opponent: f64) -> f64 {
        let (chance, _) = expected_score(
            &EloRating { rating },
            &EloRating { rating: opponent },
        );
        chance
    }

    /// One probability per side, in input order, summing to 1.0
    pub fn win_probabilities(&self, sides: &[SideStrength]) -> Result<Vec<f64>> {
        if sides.len() < 2 {
            return Err(EngineError::validation(format!(
                "A game needs at least two sides, got {}",
                sides.len()
            )));
        }
        if let Some(index) = sides.iter().position(|side| side.size == 0) {
            return Err(EngineError::validation(format!(
                "Side {} has no members",
                index + 1
            )));
        }

        let effective = self.effective_ratings(sides);

        let raw: Vec<f64> = effective
            .iter()
            .enumerate()
            .map(|(i, &rating)| {
                let strongest_rival = effective
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, &r)| r)
                    .fold(f64::NEG_INFINITY, f64::max);
                Self::pairwise(rating, strongest_rival)
            })
            .collect();

        let total: f64 = raw.iter().sum();
        Ok(raw.into_iter().map(|chance| chance / total).collect())
    }

    /// Ratings after filling smaller sides with virtual members
    pub fn effective_ratings(&self, sides: &[SideStrength]) -> Vec<f64> {
        let max_size = sides.iter().map(|side| side.size).max().unwrap_or(0);

        sides
            .iter()
            .enumerate()
            .map(|(i, side)| {
                if side.size >= max_size {
                    return side.rating;
                }

                let (weighted, members) = sides
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .fold((0.0, 0usize), |(sum, count), (_, rival)| {
                        (sum + rival.rating * rival.size as f64, count + rival.size)
                    });
                let rivals_rating = weighted / members as f64;

                let surplus = (side.rating - rivals_rating).max(0.0);
                let virtual_member =
                    side.rating - self.handicap_points - self.surplus_factor * surplus;

                let missing = (max_size - side.size) as f64;
                (side.rating * side.size as f64 + virtual_member * missing) / max_size as f64
            })
            .collect()
    }
}
