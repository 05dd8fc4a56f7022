//! Math Defenders - equation-combat arcade math game
//!
//! Core modules:
//! - `sim`: Deterministic round state machine (equations, input, projectiles, timers)
//! - `session`: Explicit per-match context (health pools, level, progression)
//! - `progression`: Currency and level unlocks, persisted to LocalStorage
//! - `tuning`: Data-driven game balance
//! - `error`: Configuration errors

pub mod error;
pub mod progression;
pub mod session;
pub mod sim;
pub mod tuning;

pub use error::ConfigError;
pub use progression::{ItemKind, Progress};
pub use session::GameSession;
pub use tuning::Tuning;

use glam::Vec2;

/// Game configuration constants
pub mod consts {
    use glam::Vec2;

    /// Fixed simulation timestep in milliseconds (125 Hz)
    pub const SIM_DT_MS: u32 = 8;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;

    /// Highest level a session may be played at
    pub const MAX_LEVEL: u32 = 9_999;

    /// Arena dimensions (screen space, y grows downward)
    pub const ARENA_WIDTH: f32 = 800.0;
    pub const ARENA_HEIGHT: f32 = 600.0;

    /// Ship positions
    pub const PLAYER_POS: Vec2 = Vec2::new(400.0, 500.0);
    pub const ENEMY_POS: Vec2 = Vec2::new(400.0, 100.0);
    /// Ship hit radius
    pub const SHIP_RADIUS: f32 = 32.0;

    /// Token hit radius (28px body)
    pub const TOKEN_RADIUS: f32 = 14.0;
    /// Horizontal spacing between staged tokens
    pub const TOKEN_SPACING: f32 = 40.0;
    /// Staging line, just below the enemy
    pub const STAGE_Y: f32 = 150.0;
    /// Downward drift while the player is answering (pixels/s)
    pub const DWELL_DRIFT_SPEED: f32 = 6.0;
    /// A launched token this far below the player counts as a hit
    pub const PASS_MARGIN: f32 = 50.0;
}

/// Whether two circles overlap
#[inline]
pub fn circles_overlap(a: Vec2, ra: f32, b: Vec2, rb: f32) -> bool {
    a.distance_squared(b) < (ra + rb) * (ra + rb)
}

/// Unit vector from `from` toward `to` scaled to `speed` (zero if coincident)
#[inline]
pub fn velocity_toward(from: Vec2, to: Vec2, speed: f32) -> Vec2 {
    (to - from).normalize_or_zero() * speed
}
