//! Data-driven game balance
//!
//! Every balance constant the round state machine consults lives here so the
//! game can be rebalanced from JSON without touching the state machine.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Attack time limit: `max(min_ms, base_ms - level * per_level_ms)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeoutFormula {
    pub base_ms: u32,
    pub per_level_ms: u32,
    pub min_ms: u32,
}

impl TimeoutFormula {
    pub fn time_limit_ms(&self, level: u32) -> u32 {
        self.base_ms
            .saturating_sub(level.saturating_mul(self.per_level_ms))
            .max(self.min_ms)
    }
}

impl Default for TimeoutFormula {
    fn default() -> Self {
        Self {
            base_ms: 4000,
            per_level_ms: 150,
            min_ms: 1500,
        }
    }
}

/// Linear speed ramp in pixels/second: `base + level * per_level`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedFormula {
    pub base: f32,
    pub per_level: f32,
}

impl SpeedFormula {
    pub fn speed(&self, level: u32) -> f32 {
        self.base + level as f32 * self.per_level
    }
}

/// Game balance parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Correct answers to win (and wrong answers to lose)
    pub target: u32,
    /// Damage to the enemy per correct answer
    pub base_damage: u32,
    /// Damage to the player per hit
    pub player_damage: u32,
    /// Health restored by a HealPlayer equation
    pub heal_amount: u32,
    /// Health pool size for both ships
    pub max_health: u32,
    /// BonusCurrency award per level
    pub bonus_currency_rate: u32,
    /// Currency per level for completing a level
    pub level_bonus_rate: u32,

    pub attack_timeout: TimeoutFormula,
    /// Tokens launched at the player
    pub attack_speed: SpeedFormula,
    /// Tokens returning to the enemy after a correct answer
    pub homing_speed: SpeedFormula,

    // === Timing (ms) ===
    /// Delay between consecutive token spawns
    pub stage_interval_ms: u32,
    /// Travel time from enemy to staging slot
    pub token_travel_ms: u32,
    pub collision_fallback_ms: u32,
    pub homing_fallback_ms: u32,
    /// Pause after an enemy hit before the next round
    pub enemy_hit_delay_ms: u32,
    /// Pause after a player hit before the next round
    pub player_hit_delay_ms: u32,
    /// Pause before the first round of a match
    pub first_round_delay_ms: u32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            target: 10,
            base_damage: 20,
            player_damage: 15,
            heal_amount: 15,
            max_health: 100,
            bonus_currency_rate: 10,
            level_bonus_rate: 50,

            attack_timeout: TimeoutFormula::default(),
            attack_speed: SpeedFormula {
                base: 360.0,
                per_level: 12.0,
            },
            homing_speed: SpeedFormula {
                base: 420.0,
                per_level: 14.0,
            },

            stage_interval_ms: 120,
            token_travel_ms: 180,
            collision_fallback_ms: 1000,
            homing_fallback_ms: 1200,
            enemy_hit_delay_ms: 600,
            player_hit_delay_ms: 2000,
            first_round_delay_ms: 1200,
        }
    }
}

impl Tuning {
    /// Parse from JSON (missing fields take defaults) and validate
    pub fn from_json(json: &str) -> Result<Self> {
        let tuning: Tuning = serde_json::from_str(json)?;
        tuning.validate()?;
        Ok(tuning)
    }

    /// Reject configurations the state machine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.target == 0 {
            return Err(ConfigError::InvalidTarget(self.target));
        }
        if self.max_health == 0 {
            return Err(ConfigError::InvalidMaxHealth);
        }
        let durations = [
            ("attack_timeout.min_ms", self.attack_timeout.min_ms),
            ("token_travel_ms", self.token_travel_ms),
            ("collision_fallback_ms", self.collision_fallback_ms),
            ("homing_fallback_ms", self.homing_fallback_ms),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::ZeroDuration(*name));
        }

        for (name, formula) in [("attack", self.attack_speed), ("homing", self.homing_speed)] {
            let valid = formula.base.is_finite()
                && formula.per_level.is_finite()
                && formula.base > 0.0
                && formula.per_level >= 0.0;
            if !valid {
                return Err(ConfigError::InvalidSpeed(name));
            }
        }

        // Linear ramps: faster at level 0 and ramping at least as fast keeps
        // homing ahead at every level
        if self.homing_speed.base <= self.attack_speed.base
            || self.homing_speed.per_level < self.attack_speed.per_level
        {
            return Err(ConfigError::HomingNotFaster);
        }
        Ok(())
    }
}
