//! Equation projectile lifecycle
//!
//! The tokens of one equation move through
//! Idle -> Staging -> Dwelling -> {LaunchedAtPlayer | HomingAtEnemy} -> Resolved.
//! Geometric overlap is polled every step; fallback timers force the hit if
//! overlap never registers. Resolution happens at most once per round.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::equation::Equation;
use super::input::InputTracker;
use super::timers::{TimerKind, TimerRegistry};
use crate::consts::*;
use crate::tuning::Tuning;
use crate::{circles_overlap, velocity_toward};

/// Per-token motion state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenMotion {
    /// Spawning or travelling to (or sitting on) the staging line
    Staged,
    /// Drifting down while the player answers
    Falling,
    LaunchedAtPlayer,
    HomingAtEnemy,
}

/// One display unit of an equation (digit, operator, '=', or answer slot)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub character: String,
    pub is_answer_slot: bool,
    pub position: Vec2,
    pub motion: TokenMotion,
    /// Target on the staging line
    pub slot: Vec2,
    pub velocity: Vec2,
    /// Whether the token has left the enemy yet
    pub spawned: bool,
    travel_elapsed_ms: u32,
}

impl Token {
    fn new(character: &str, is_answer_slot: bool, slot: Vec2) -> Self {
        Self {
            character: character.to_string(),
            is_answer_slot,
            position: ENEMY_POS,
            motion: TokenMotion::Staged,
            slot,
            velocity: Vec2::ZERO,
            spawned: false,
            travel_elapsed_ms: 0,
        }
    }
}

/// Lay out an equation as tokens: display tokens, '=', then one '_' per answer digit
pub fn build_tokens(equation: &Equation) -> Vec<Token> {
    let answer_digits = equation.answer_digits();
    let count = equation.display_tokens.len() + 1 + answer_digits;
    let total_width = (count.saturating_sub(1)) as f32 * TOKEN_SPACING;
    let left = ARENA_WIDTH / 2.0 - total_width / 2.0;
    let slot = |i: usize| Vec2::new(left + i as f32 * TOKEN_SPACING, STAGE_Y);

    let mut tokens = Vec::with_capacity(count);
    for part in &equation.display_tokens {
        tokens.push(Token::new(part, false, slot(tokens.len())));
    }
    tokens.push(Token::new("=", false, slot(tokens.len())));
    for _ in 0..answer_digits {
        tokens.push(Token::new("_", true, slot(tokens.len())));
    }
    tokens
}

/// Which ship the projectile resolved against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Impact {
    PlayerHit,
    EnemyHit,
}

/// Why tokens were launched at the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchCause {
    Timeout,
    WrongAnswer,
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectileState {
    Idle,
    Staging,
    Dwelling,
    LaunchedAtPlayer(LaunchCause),
    HomingAtEnemy,
    Resolved(Impact),
}

/// Inputs to the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectileEvent {
    /// A lifecycle timer fired (already checked against the live generation)
    Timer(TimerKind),
    /// Player typed the exact answer
    Correct,
    /// Player typed a divergent digit
    Wrong,
    /// Advance motion and poll overlap
    Step { dt_ms: u32 },
}

/// Transitions reported back to the round controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectileSignal {
    /// All tokens are on the staging line and the attack timer is armed
    Staged { time_limit_ms: u32 },
    Launched(LaunchCause),
    Homing,
    /// Emitted exactly once per round
    Resolved {
        impact: Impact,
        token: usize,
        forced: bool,
    },
}

/// Level-resolved lifecycle parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectileParams {
    pub attack_speed: f32,
    pub homing_speed: f32,
    pub time_limit_ms: u32,
    pub stage_interval_ms: u32,
    pub token_travel_ms: u32,
    pub collision_fallback_ms: u32,
    pub homing_fallback_ms: u32,
}

impl ProjectileParams {
    pub fn for_level(tuning: &Tuning, level: u32) -> Self {
        Self {
            attack_speed: tuning.attack_speed.speed(level),
            homing_speed: tuning.homing_speed.speed(level),
            time_limit_ms: tuning.attack_timeout.time_limit_ms(level),
            stage_interval_ms: tuning.stage_interval_ms,
            token_travel_ms: tuning.token_travel_ms,
            collision_fallback_ms: tuning.collision_fallback_ms,
            homing_fallback_ms: tuning.homing_fallback_ms,
        }
    }
}

/// Projectile lifecycle for the live equation
#[derive(Debug, Clone)]
pub struct ProjectileLifecycle {
    state: ProjectileState,
    tokens: Vec<Token>,
    params: ProjectileParams,
    resolved: bool,
}

impl ProjectileLifecycle {
    pub fn new(params: ProjectileParams) -> Self {
        Self {
            state: ProjectileState::Idle,
            tokens: Vec::new(),
            params,
            resolved: false,
        }
    }

    pub fn state(&self) -> ProjectileState {
        self.state
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Whether tokens are in motion (presentation needs position updates)
    pub fn is_moving(&self) -> bool {
        matches!(
            self.state,
            ProjectileState::Staging
                | ProjectileState::Dwelling
                | ProjectileState::LaunchedAtPlayer(_)
                | ProjectileState::HomingAtEnemy
        )
    }

    /// Begin staging a fresh set of tokens. Token `i` spawns after `i * stage_interval_ms`.
    pub fn stage(&mut self, tokens: Vec<Token>, params: ProjectileParams, timers: &mut TimerRegistry) {
        self.tokens = tokens;
        self.params = params;
        self.resolved = false;
        self.state = ProjectileState::Staging;
        for i in 0..self.tokens.len() {
            let delay = (i as u32).saturating_mul(params.stage_interval_ms);
            timers.schedule(TimerKind::SpawnToken(i), delay);
        }
    }

    /// Drop all tokens and return to Idle (timers are the caller's registry to clear)
    pub fn clear(&mut self) {
        self.tokens.clear();
        self.state = ProjectileState::Idle;
        self.resolved = false;
    }

    /// Mirror the player's typed digits into the answer slots
    pub fn fill_answer_slots(&mut self, input: &InputTracker) {
        for (i, token) in self.tokens.iter_mut().filter(|t| t.is_answer_slot).enumerate() {
            token.character = input.slot_char(i).to_string();
        }
    }

    /// Single entry point for lifecycle transitions
    pub fn advance(
        &mut self,
        event: ProjectileEvent,
        timers: &mut TimerRegistry,
    ) -> Option<ProjectileSignal> {
        match event {
            ProjectileEvent::Timer(kind) => self.on_timer(kind, timers),
            ProjectileEvent::Correct => self.home_to_enemy(timers),
            ProjectileEvent::Wrong => self.launch_at_player(LaunchCause::WrongAnswer, timers),
            ProjectileEvent::Step { dt_ms } => self.step(dt_ms, timers),
        }
    }

    fn on_timer(&mut self, kind: TimerKind, timers: &mut TimerRegistry) -> Option<ProjectileSignal> {
        match kind {
            TimerKind::SpawnToken(i) => {
                if self.state == ProjectileState::Staging {
                    if let Some(token) = self.tokens.get_mut(i) {
                        token.spawned = true;
                        token.position = ENEMY_POS;
                        token.travel_elapsed_ms = 0;
                    }
                }
                None
            }
            TimerKind::AttackTimeout => self.launch_at_player(LaunchCause::Timeout, timers),
            TimerKind::CollisionFallback => {
                if matches!(self.state, ProjectileState::LaunchedAtPlayer(_)) {
                    log::debug!("Collision fallback fired; forcing player hit");
                    self.resolve(Impact::PlayerHit, 0, true, timers)
                } else {
                    None
                }
            }
            TimerKind::HomingFallback => {
                if self.state == ProjectileState::HomingAtEnemy {
                    log::debug!("Homing fallback fired; forcing enemy hit");
                    self.resolve(Impact::EnemyHit, 0, true, timers)
                } else {
                    None
                }
            }
            TimerKind::StartRound => None,
        }
    }

    fn launch_at_player(
        &mut self,
        cause: LaunchCause,
        timers: &mut TimerRegistry,
    ) -> Option<ProjectileSignal> {
        if self.state != ProjectileState::Dwelling {
            return None;
        }
        timers.cancel(TimerKind::AttackTimeout);
        let speed = self.params.attack_speed;
        for token in &mut self.tokens {
            token.motion = TokenMotion::LaunchedAtPlayer;
            token.velocity = velocity_toward(token.position, PLAYER_POS, speed);
        }
        self.state = ProjectileState::LaunchedAtPlayer(cause);
        timers.schedule(TimerKind::CollisionFallback, self.params.collision_fallback_ms);
        Some(ProjectileSignal::Launched(cause))
    }

    fn home_to_enemy(&mut self, timers: &mut TimerRegistry) -> Option<ProjectileSignal> {
        if self.state != ProjectileState::Dwelling {
            return None;
        }
        timers.cancel(TimerKind::AttackTimeout);
        for token in &mut self.tokens {
            token.motion = TokenMotion::HomingAtEnemy;
        }
        self.state = ProjectileState::HomingAtEnemy;
        timers.schedule(TimerKind::HomingFallback, self.params.homing_fallback_ms);
        Some(ProjectileSignal::Homing)
    }

    fn step(&mut self, dt_ms: u32, timers: &mut TimerRegistry) -> Option<ProjectileSignal> {
        let dt = dt_ms as f32 / 1000.0;
        match self.state {
            ProjectileState::Staging => {
                let travel_ms = self.params.token_travel_ms.max(1);
                for token in self.tokens.iter_mut().filter(|t| t.spawned) {
                    token.travel_elapsed_ms = (token.travel_elapsed_ms + dt_ms).min(travel_ms);
                    let t = token.travel_elapsed_ms as f32 / travel_ms as f32;
                    token.position = ENEMY_POS.lerp(token.slot, t);
                }
                let all_arrived = !self.tokens.is_empty()
                    && self
                        .tokens
                        .iter()
                        .all(|t| t.spawned && t.travel_elapsed_ms >= travel_ms);
                if all_arrived {
                    for token in &mut self.tokens {
                        token.position = token.slot;
                        token.motion = TokenMotion::Falling;
                        token.velocity = Vec2::new(0.0, DWELL_DRIFT_SPEED);
                    }
                    self.state = ProjectileState::Dwelling;
                    timers.schedule(TimerKind::AttackTimeout, self.params.time_limit_ms);
                    return Some(ProjectileSignal::Staged {
                        time_limit_ms: self.params.time_limit_ms,
                    });
                }
                None
            }
            ProjectileState::Dwelling => {
                for token in &mut self.tokens {
                    token.position += token.velocity * dt;
                }
                None
            }
            ProjectileState::LaunchedAtPlayer(_) => {
                for token in &mut self.tokens {
                    token.position += token.velocity * dt;
                }
                let hit = self.tokens.iter().position(|t| {
                    circles_overlap(t.position, TOKEN_RADIUS, PLAYER_POS, SHIP_RADIUS)
                        || t.position.y > PLAYER_POS.y + PASS_MARGIN
                })?;
                self.resolve(Impact::PlayerHit, hit, false, timers)
            }
            ProjectileState::HomingAtEnemy => {
                let speed = self.params.homing_speed;
                for token in &mut self.tokens {
                    token.velocity = velocity_toward(token.position, ENEMY_POS, speed);
                    token.position += token.velocity * dt;
                }
                let hit = self
                    .tokens
                    .iter()
                    .position(|t| circles_overlap(t.position, TOKEN_RADIUS, ENEMY_POS, SHIP_RADIUS))?;
                self.resolve(Impact::EnemyHit, hit, false, timers)
            }
            ProjectileState::Idle | ProjectileState::Resolved(_) => None,
        }
    }

    /// Resolve against a ship. Only the first call per round has any effect.
    pub fn resolve(
        &mut self,
        impact: Impact,
        token: usize,
        forced: bool,
        timers: &mut TimerRegistry,
    ) -> Option<ProjectileSignal> {
        if self.resolved {
            log::trace!("Duplicate {:?} resolution ignored", impact);
            return None;
        }
        self.resolved = true;
        timers.cancel(TimerKind::CollisionFallback);
        timers.cancel(TimerKind::HomingFallback);
        for t in &mut self.tokens {
            t.velocity = Vec2::ZERO;
        }
        self.state = ProjectileState::Resolved(impact);
        Some(ProjectileSignal::Resolved {
            impact,
            token,
            forced,
        })
    }
}
