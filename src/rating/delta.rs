//! Rating delta calculation
//!
//! Converts a win probability and an outcome into a signed integer delta
//! using an experience-based K-factor schedule and, for individuals, an
//! underdog boost for low-rated players.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// One step of a K-factor schedule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KFactorTier {
    /// Applies while the prior ranked game count is below this value
    pub below_games: u32,
    pub k: f64,
}

/// K-factor by prior ranked contest count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KFactorSchedule {
    /// Tiers in ascending `below_games` order
    pub tiers: Vec<KFactorTier>,
    /// K-factor once every tier has been outgrown
    pub settled: f64,
}

impl KFactorSchedule {
    /// Schedule for members and individuals: 75, then 50, then 32
    pub fn individual() -> Self {
        Self {
            tiers: vec![
                KFactorTier {
                    below_games: 6,
                    k: 75.0,
                },
                KFactorTier {
                    below_games: 11,
                    k: 50.0,
                },
            ],
            settled: 32.0,
        }
    }

    /// Schedule for collectives and squads: 50, then 32
    pub fn group() -> Self {
        Self {
            tiers: vec![KFactorTier {
                below_games: 6,
                k: 50.0,
            }],
            settled: 32.0,
        }
    }

    pub fn k_for(&self, prior_games: u32) -> f64 {
        self.tiers
            .iter()
            .find(|tier| prior_games < tier.below_games)
            .map(|tier| tier.k)
            .unwrap_or(self.settled)
    }

    pub fn validate(&self) -> Result<()> {
        if self.settled <= 0.0 || self.tiers.iter().any(|tier| tier.k <= 0.0) {
            return Err(EngineError::validation("K-factors must be positive"));
        }
        if self
            .tiers
            .windows(2)
            .any(|pair| pair[0].below_games >= pair[1].below_games)
        {
            return Err(EngineError::validation(
                "K-factor tiers must be in ascending game-count order",
            ));
        }
        Ok(())
    }
}

/// Extra delta magnitude for low-rated individuals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnderdogBoost {
    /// Bonus fraction applied at or below `full_at_or_below`
    pub max_bonus: f64,
    pub full_at_or_below: f64,
    /// No bonus at or above this rating
    pub zero_at_or_above: f64,
}

impl Default for UnderdogBoost {
    fn default() -> Self {
        Self {
            max_bonus: 0.6,
            full_at_or_below: 1000.0,
            zero_at_or_above: 1200.0,
        }
    }
}

impl UnderdogBoost {
    /// Bonus fraction for a rating, interpolated linearly across the band
    pub fn fraction(&self, rating: f64) -> f64 {
        if rating <= self.full_at_or_below {
            self.max_bonus
        } else if rating >= self.zero_at_or_above {
            0.0
        } else {
            let span = self.zero_at_or_above - self.full_at_or_below;
            self.max_bonus * (self.zero_at_or_above - rating) / span
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_bonus < 0.0 {
            return Err(EngineError::validation("Underdog bonus cannot be negative"));
        }
        if self.full_at_or_below >= self.zero_at_or_above {
            return Err(EngineError::validation(
                "Underdog boost band must have full_at_or_below < zero_at_or_above",
            ));
        }
        Ok(())
    }
}

/// Which schedule an entity is rated with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RatingClass {
    /// Members and individuals
    Individual,
    /// Collectives and squads
    Group,
}

/// Inputs for a single entity's delta
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaInput {
    pub win_chance: f64,
    pub won: bool,
    /// Ranked games played before this one
    pub prior_games: u32,
    pub rating: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaCalculator {
    pub individual_k: KFactorSchedule,
    pub group_k: KFactorSchedule,
    pub underdog_boost: UnderdogBoost,
}

impl Default for DeltaCalculator {
    fn default() -> Self {
        Self {
            individual_k: KFactorSchedule::individual(),
            group_k: KFactorSchedule::group(),
            underdog_boost: UnderdogBoost::default(),
        }
    }
}

impl DeltaCalculator {
    pub fn k_factor(&self, class: RatingClass, prior_games: u32) -> f64 {
        match class {
            RatingClass::Individual => self.individual_k.k_for(prior_games),
            RatingClass::Group => self.group_k.k_for(prior_games),
        }
    }

    /// Signed delta for one entity
    pub fn delta(&self, class: RatingClass, input: DeltaInput) -> i64 {
        let outcome = if input.won { 1.0 } else { 0.0 };
        let k = self.k_factor(class, input.prior_games);
        let raw = (k * (outcome - input.win_chance)).round() as i64;

        match class {
            RatingClass::Group => raw,
            RatingClass::Individual => {
                let fraction = self.underdog_boost.fraction(input.rating as f64);
                let bonus = (raw.abs() as f64 * fraction).round() as i64;
                raw + bonus * raw.signum()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.individual_k.validate()?;
        self.group_k.validate()?;
        self.underdog_boost.validate()
    }
}
