//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only (simulated millisecond clock)
//! - Seeded RNG only
//! - Timers are data, cancelled by generation at round boundaries
//! - No rendering or platform dependencies

pub mod equation;
pub mod input;
pub mod projectile;
pub mod round;
pub mod tick;
pub mod timers;

pub use equation::{Equation, Operator, OperatorMode, SpecialEffect, generate};
pub use input::{InputMatch, InputTracker};
pub use projectile::{
    Impact, LaunchCause, ProjectileEvent, ProjectileLifecycle, ProjectileParams, ProjectileSignal,
    ProjectileState, Token, TokenMotion, build_tokens,
};
pub use round::{GameEvent, MatchOutcome, MatchSummary, RoundController, RoundInput, RoundPhase};
pub use tick::{Autopilot, KeyPress, TickInput, tick};
pub use timers::{Timer, TimerId, TimerKind, TimerRegistry};
