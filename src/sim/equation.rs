//! Equation generation
//!
//! Pure function of (level, mode, rng). Difficulty widens operand ranges as
//! the level climbs; division is built backward so the quotient is exact.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::consts::MAX_LEVEL;
use crate::error::ConfigError;

/// Chance that an equation carries a special effect
pub const SPECIAL_EFFECT_CHANCE: f64 = 0.15;

/// Game mode selected by the player (one operator per mode)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OperatorMode {
    Addition,
    Subtraction,
    #[default]
    Multiplication,
    Division,
}

impl OperatorMode {
    pub const ALL: [OperatorMode; 4] = [
        OperatorMode::Addition,
        OperatorMode::Subtraction,
        OperatorMode::Multiplication,
        OperatorMode::Division,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorMode::Addition => "addition",
            OperatorMode::Subtraction => "subtraction",
            OperatorMode::Multiplication => "multiplication",
            OperatorMode::Division => "division",
        }
    }

    /// Parse a mode name, failing loudly on anything unknown
    pub fn from_name(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "addition" | "add" | "+" => Ok(OperatorMode::Addition),
            "subtraction" | "sub" | "-" => Ok(OperatorMode::Subtraction),
            "multiplication" | "mul" | "x" | "×" | "*" => Ok(OperatorMode::Multiplication),
            "division" | "div" | "÷" | "/" => Ok(OperatorMode::Division),
            _ => Err(ConfigError::UnsupportedMode(s.to_string())),
        }
    }

    pub fn operator(&self) -> Operator {
        match self {
            OperatorMode::Addition => Operator::Add,
            OperatorMode::Subtraction => Operator::Subtract,
            OperatorMode::Multiplication => Operator::Multiply,
            OperatorMode::Division => Operator::Divide,
        }
    }
}

/// Arithmetic operator shown in the equation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operator {
    /// Display symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "×",
            Operator::Divide => "÷",
        }
    }

    /// Apply the operator (None for inexact or negative results)
    pub fn apply(&self, a: u32, b: u32) -> Option<u32> {
        match self {
            Operator::Add => a.checked_add(b),
            Operator::Subtract => a.checked_sub(b),
            Operator::Multiply => a.checked_mul(b),
            Operator::Divide => {
                if b != 0 && a % b == 0 {
                    Some(a / b)
                } else {
                    None
                }
            }
        }
    }
}

/// Probabilistic modifier applied when the enemy is hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SpecialEffect {
    #[default]
    None,
    DoubleDamage,
    HealPlayer,
    BonusCurrency,
}

/// A generated equation (immutable for the lifetime of a round)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equation {
    pub first_operand: u32,
    pub second_operand: u32,
    pub operator: Operator,
    pub answer: u32,
    /// e.g. ["7", "×", "3"]
    pub display_tokens: Vec<String>,
    pub special_effect: SpecialEffect,
}

impl Equation {
    /// Build an equation from explicit parts (answer derived from the operator)
    pub fn new(
        first_operand: u32,
        operator: Operator,
        second_operand: u32,
        special_effect: SpecialEffect,
    ) -> Option<Self> {
        let answer = operator.apply(first_operand, second_operand)?;
        Some(Self {
            first_operand,
            second_operand,
            operator,
            answer,
            display_tokens: vec![
                first_operand.to_string(),
                operator.symbol().to_string(),
                second_operand.to_string(),
            ],
            special_effect,
        })
    }

    /// Answer in the form the player types it
    pub fn answer_text(&self) -> String {
        self.answer.to_string()
    }

    /// Number of digits the player must enter
    pub fn answer_digits(&self) -> usize {
        self.answer_text().len()
    }

    /// "7 × 3"
    pub fn display(&self) -> String {
        self.display_tokens.join(" ")
    }
}

/// Generate an equation for the given level and mode.
/// Levels outside `1..=MAX_LEVEL` are clamped into range.
pub fn generate<R: Rng + ?Sized>(level: u32, mode: OperatorMode, rng: &mut R) -> Equation {
    let level = level.clamp(1, MAX_LEVEL);
    let small_cap = 12u32.min(2 + level);
    let wide_cap = if level > 10 { 15 } else { 12 };

    let (a, b, answer) = match mode {
        OperatorMode::Addition => {
            let a = rng.random_range(1..=10 + level);
            let b = rng.random_range(1..=10 + level);
            (a, b, a + b)
        }
        OperatorMode::Subtraction => {
            let a = rng.random_range(10 + level..=20 + level);
            let b = rng.random_range(1..=a);
            (a, b, a - b)
        }
        OperatorMode::Multiplication => {
            let a = rng.random_range(1..=small_cap);
            let b = rng.random_range(1..=wide_cap);
            (a, b, a * b)
        }
        OperatorMode::Division => {
            // Backward: pick divisor and quotient, multiply out the dividend
            let divisor = rng.random_range(1..=small_cap);
            let quotient = rng.random_range(1..=wide_cap);
            (divisor * quotient, divisor, quotient)
        }
    };

    let operator = mode.operator();
    Equation {
        first_operand: a,
        second_operand: b,
        operator,
        answer,
        display_tokens: vec![a.to_string(), operator.symbol().to_string(), b.to_string()],
        special_effect: roll_special_effect(rng),
    }
}

fn roll_special_effect<R: Rng + ?Sized>(rng: &mut R) -> SpecialEffect {
    if !rng.random_bool(SPECIAL_EFFECT_CHANCE) {
        return SpecialEffect::None;
    }
    match rng.random_range(0..3u8) {
        0 => SpecialEffect::DoubleDamage,
        1 => SpecialEffect::HealPlayer,
        _ => SpecialEffect::BonusCurrency,
    }
}
