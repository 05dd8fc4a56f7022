//! Per-match game context
//!
//! Owned by whoever composes the round controller with progression and passed
//! in by reference; the controller never reaches for ambient state.

use crate::consts::MAX_LEVEL;
use crate::error::{ConfigError, Result};
use crate::progression::Progress;
use crate::sim::OperatorMode;
use crate::tuning::Tuning;

/// Health pools, level selection and progression for one match
#[derive(Debug, Clone)]
pub struct GameSession {
    pub level: u32,
    pub mode: OperatorMode,
    /// Display-only; the win/loss rule is counter based
    pub player_hp: u32,
    pub enemy_hp: u32,
    pub max_health: u32,
    pub progress: Progress,
}

impl GameSession {
    pub fn new(level: u32, mode: OperatorMode, progress: Progress, tuning: &Tuning) -> Result<Self> {
        check_level(level)?;
        if tuning.max_health == 0 {
            return Err(ConfigError::InvalidMaxHealth);
        }
        Ok(Self {
            level,
            mode,
            player_hp: tuning.max_health,
            enemy_hp: tuning.max_health,
            max_health: tuning.max_health,
            progress,
        })
    }

    /// Resume at the last played mode/level
    pub fn resume(progress: Progress, tuning: &Tuning) -> Result<Self> {
        let (level, mode) = (progress.last_level, progress.last_mode);
        Self::new(level, mode, progress, tuning)
    }

    /// Choose a level from level select
    pub fn select(&mut self, mode: OperatorMode, level: u32) -> Result<()> {
        check_level(level)?;
        self.mode = mode;
        self.level = level;
        self.progress.remember_selection(mode, level);
        self.reset_health();
        Ok(())
    }

    /// Refill both pools (new match, retry, next level)
    pub fn reset_health(&mut self) {
        self.player_hp = self.max_health;
        self.enemy_hp = self.max_health;
    }

    pub fn damage_player(&mut self, amount: u32) {
        self.player_hp = self.player_hp.saturating_sub(amount);
    }

    pub fn damage_enemy(&mut self, amount: u32) {
        self.enemy_hp = self.enemy_hp.saturating_sub(amount);
    }

    /// Heal the player, clamped to max. Returns the amount actually restored.
    pub fn heal_player(&mut self, amount: u32) -> u32 {
        let before = self.player_hp;
        self.player_hp = self.player_hp.saturating_add(amount).min(self.max_health);
        self.player_hp - before
    }
}

fn check_level(level: u32) -> Result<()> {
    if (1..=MAX_LEVEL).contains(&level) {
        Ok(())
    } else {
        Err(ConfigError::InvalidLevel(level))
    }
}
