//! Error types for configuration and session setup
//!
//! Only construction can fail. Once a controller exists, out-of-phase input,
//! stale timers and duplicate resolutions are absorbed silently.

/// Configuration error raised when building tuning, sessions or controllers
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Answers-to-win/lose target must be at least 1
    #[error("target must be at least 1 (got {0})")]
    InvalidTarget(u32),

    /// Health pool cannot be empty
    #[error("max_health must be at least 1")]
    InvalidMaxHealth,

    /// A duration that must be non-zero was zero
    #[error("{0} must be greater than 0 ms")]
    ZeroDuration(&'static str),

    /// Speed formula yields a non-positive or non-finite speed
    #[error("{0} speed must be finite and positive")]
    InvalidSpeed(&'static str),

    /// Homing tokens must outrun the outbound attack at every level
    #[error("homing speed must exceed attack speed at every level")]
    HomingNotFaster,

    /// Levels are 1-based
    #[error("level must be at least 1 (got {0})")]
    InvalidLevel(u32),

    /// Level text that is not a number
    #[error("level must be a whole number (got {0:?})")]
    UnparsableLevel(String),

    /// Operator mode name not recognized
    #[error("unsupported operator mode: {0}")]
    UnsupportedMode(String),

    /// Malformed tuning/progress JSON
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
