//! Fixed timestep simulation tick
//!
//! Feeds one frame's keystrokes and one timestep into the round controller.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::round::{GameEvent, RoundController, RoundInput, RoundPhase};
use crate::session::GameSession;

/// A keystroke the game understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPress {
    Digit(char),
    Backspace,
}

impl KeyPress {
    /// Map a DOM `KeyboardEvent.key` value (digits and numpad digits report the same key)
    pub fn from_key(key: &str) -> Option<Self> {
        let mut chars = key.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_digit() => Some(KeyPress::Digit(c)),
            _ if key == "Backspace" => Some(KeyPress::Backspace),
            _ => None,
        }
    }
}

impl From<KeyPress> for RoundInput {
    fn from(key: KeyPress) -> Self {
        match key {
            KeyPress::Digit(c) => RoundInput::Digit(c),
            KeyPress::Backspace => RoundInput::Backspace,
        }
    }
}

/// Input commands for a single tick (deterministic)
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Keystrokes since the last tick, in arrival order
    pub keys: Vec<KeyPress>,
}

/// Advance the game by one fixed timestep. Keys are applied before time moves.
pub fn tick(
    ctrl: &mut RoundController,
    session: &mut GameSession,
    input: &TickInput,
    dt_ms: u32,
) -> Vec<GameEvent> {
    let mut events = Vec::new();
    for &key in &input.keys {
        events.extend(ctrl.advance(session, key.into()));
    }
    events.extend(ctrl.advance(session, RoundInput::Tick(dt_ms)));
    events
}

/// Demo/headless player: answers each equation after a short pause
#[derive(Debug, Clone)]
pub struct Autopilot {
    rng: Pcg32,
    /// Chance of typing the right answer
    accuracy: f64,
    think_ms: u32,
    waited_ms: u32,
    answered_round: u32,
}

impl Autopilot {
    pub fn new(seed: u64, accuracy: f64, think_ms: u32) -> Self {
        Self {
            rng: Pcg32::seed_from_u64(seed),
            accuracy: accuracy.clamp(0.0, 1.0),
            think_ms,
            waited_ms: 0,
            answered_round: 0,
        }
    }

    /// Keys to press this tick
    pub fn plan(&mut self, ctrl: &RoundController, dt_ms: u32) -> Vec<KeyPress> {
        if ctrl.phase() == RoundPhase::Idle {
            // New match (round numbering restarts)
            self.answered_round = 0;
        }
        if ctrl.phase() != RoundPhase::AwaitingInput || self.answered_round == ctrl.round() {
            self.waited_ms = 0;
            return Vec::new();
        }
        self.waited_ms += dt_ms;
        if self.waited_ms < self.think_ms {
            return Vec::new();
        }
        let Some(equation) = ctrl.equation() else {
            return Vec::new();
        };
        self.answered_round = ctrl.round();

        let answer = equation.answer_text();
        if self.rng.random_bool(self.accuracy) {
            answer.chars().map(KeyPress::Digit).collect()
        } else {
            // Any digit that is not the answer's first one diverges immediately
            let first = answer.chars().next().and_then(|c| c.to_digit(10)).unwrap_or(0);
            let wrong = (first + self.rng.random_range(1..10)) % 10;
            vec![KeyPress::Digit(char::from(b'0' + wrong as u8))]
        }
    }
}
