//! Rating engine combining win probabilities and deltas
//!
//! One call computes the deltas of every entity in one ledger for one game,
//! always from pre-game values.

use crate::config::RatingConfig;
use crate::error::{EngineError, Result};
use crate::rating::delta::{DeltaCalculator, DeltaInput};
use crate::rating::ledger::LedgerKind;
use crate::rating::probability::{SideStrength, WinProbabilityCalculator};
use crate::utils::mean_rating;

/// Pre-game state of one rated entity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityRating {
    pub rating: i64,
    pub prior_games: u32,
}

/// One side as seen by a single ledger
#[derive(Debug, Clone, PartialEq)]
pub struct SideInput {
    /// Slot count of the side
    pub size: usize,
    /// Rated entities on this side; their mean is the side rating
    pub entities: Vec<EntityRating>,
}

impl SideInput {
    pub fn strength(&self) -> SideStrength {
        let ratings: Vec<f64> = self.entities.iter().map(|e| e.rating as f64).collect();
        SideStrength::new(mean_rating(&ratings), self.size)
    }
}

/// Deltas for one side, in entity order
#[derive(Debug, Clone, PartialEq)]
pub struct SideOutcome {
    pub win_chance: f64,
    pub won: bool,
    pub deltas: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct RatingEngine {
    starting_rating: i64,
    probability: WinProbabilityCalculator,
    deltas: DeltaCalculator,
}

impl Default for RatingEngine {
    fn default() -> Self {
        Self {
            starting_rating: 1000,
            probability: WinProbabilityCalculator::default(),
            deltas: DeltaCalculator::default(),
        }
    }
}

impl RatingEngine {
    pub fn new(config: &RatingConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            starting_rating: config.starting_rating,
            probability: WinProbabilityCalculator::new(
                config.handicap_points,
                config.handicap_surplus_factor,
            ),
            deltas: DeltaCalculator {
                individual_k: config.individual_k.clone(),
                group_k: config.group_k.clone(),
                underdog_boost: config.underdog_boost,
            },
        })
    }

    pub fn starting_rating(&self) -> i64 {
        self.starting_rating
    }

    pub fn probability(&self) -> &WinProbabilityCalculator {
        &self.probability
    }

    pub fn deltas(&self) -> &DeltaCalculator {
        &self.deltas
    }

    pub fn win_probabilities(&self, sides: &[SideInput]) -> Result<Vec<f64>> {
        let strengths: Vec<SideStrength> = sides.iter().map(SideInput::strength).collect();
        self.probability.win_probabilities(&strengths)
    }

    /// Deltas for every entity of every side in one ledger
    pub fn outcomes(
        &self,
        kind: LedgerKind,
        sides: &[SideInput],
        winner: usize,
    ) -> Result<Vec<SideOutcome>> {
        if winner >= sides.len() {
            return Err(EngineError::validation(format!(
                "Winning side index {winner} out of range for {} sides",
                sides.len()
            )));
        }
        if let Some(index) = sides.iter().position(|side| side.entities.is_empty()) {
            return Err(EngineError::validation(format!(
                "Side {} has no rated entities in the {kind} ledger",
                index + 1
            )));
        }

        let chances = self.win_probabilities(sides)?;
        let class = kind.class();

        Ok(sides
            .iter()
            .zip(chances)
            .enumerate()
            .map(|(index, (side, win_chance))| {
                let won = index == winner;
                let deltas = side
                    .entities
                    .iter()
                    .map(|entity| {
                        self.deltas.delta(
                            class,
                            DeltaInput {
                                win_chance,
                                won,
                                prior_games: entity.prior_games,
                                rating: entity.rating,
                            },
                        )
                    })
                    .collect();
                SideOutcome {
                    win_chance,
                    won,
                    deltas,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solo(rating: i64, prior_games: u32) -> SideInput {
        SideInput {
            size: 1,
            entities: vec![EntityRating {
                rating,
                prior_games,
            }],
        }
    }

    #[test]
    fn test_even_duel_outcomes() {
        let engine = RatingEngine::default();
        let outcomes = engine
            .outcomes(LedgerKind::Member, &[solo(1000, 3), solo(1000, 3)], 0)
            .unwrap();

        assert!((outcomes[0].win_chance - 0.5).abs() < 1e-9);
        assert_eq!(outcomes[0].deltas, vec![61]);
        assert_eq!(outcomes[1].deltas, vec![-61]);
        assert!(outcomes[0].won);
        assert!(!outcomes[1].won);
    }

    #[test]
    fn test_group_ledger_is_not_boosted() {
        let engine = RatingEngine::default();
        let outcomes = engine
            .outcomes(LedgerKind::Squad, &[solo(1000, 0), solo(1000, 0)], 1)
            .unwrap();
        assert_eq!(outcomes[0].deltas, vec![-25]);
        assert_eq!(outcomes[1].deltas, vec![25]);
    }

    #[test]
    fn test_side_strength_is_member_mean() {
        let side = SideInput {
            size: 2,
            entities: vec![
                EntityRating {
                    rating: 900,
                    prior_games: 0,
                },
                EntityRating {
                    rating: 1100,
                    prior_games: 0,
                },
            ],
        };
        assert_eq!(side.strength(), SideStrength::new(1000.0, 2));
    }

    #[test]
    fn test_invalid_winner_index() {
        let engine = RatingEngine::default();
        let result = engine.outcomes(LedgerKind::Member, &[solo(1000, 0), solo(1000, 0)], 2);
        assert!(matches!(result, Err(EngineError::Validation { .. })));
    }

    #[test]
    fn test_engine_from_config() {
        let mut config = RatingConfig::default();
        config.starting_rating = 1500;
        let engine = RatingEngine::new(&config).unwrap();
        assert_eq!(engine.starting_rating(), 1500);

        config.handicap_points = -1.0;
        assert!(RatingEngine::new(&config).is_err());
    }
}
