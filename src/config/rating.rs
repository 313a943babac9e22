//! Rating system configuration

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::rating::delta::{KFactorSchedule, UnderdogBoost};

/// Tunable constants of the rating engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    /// Rating of every entity before its first ranked game
    pub starting_rating: i64,
    /// Points a virtual member sits below the short-handed side
    pub handicap_points: f64,
    /// Share of a short-handed side's surplus over its rivals removed per virtual member
    pub handicap_surplus_factor: f64,
    pub individual_k: KFactorSchedule,
    pub group_k: KFactorSchedule,
    pub underdog_boost: UnderdogBoost,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            starting_rating: 1000,
            handicap_points: 200.0,
            handicap_surplus_factor: 1.0,
            individual_k: KFactorSchedule::individual(),
            group_k: KFactorSchedule::group(),
            underdog_boost: UnderdogBoost::default(),
        }
    }
}

impl RatingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.starting_rating <= 0 {
            return Err(EngineError::validation("Starting rating must be positive"));
        }
        if self.handicap_points < 0.0 {
            return Err(EngineError::validation(
                "Handicap points cannot be negative",
            ));
        }
        if self.handicap_surplus_factor < 0.0 {
            return Err(EngineError::validation(
                "Handicap surplus factor cannot be negative",
            ));
        }
        self.individual_k.validate()?;
        self.group_k.validate()?;
        self.underdog_boost.validate()
    }
}
