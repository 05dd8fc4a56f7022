//! Player keystroke tracking against the expected answer
//!
//! Classification uses prefix matching so a wrong answer is detected on the
//! first divergent digit, without waiting for the buffer to fill.

use serde::{Deserialize, Serialize};

/// Classification of the current input buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputMatch {
    Empty,
    PartialMatch,
    ExactMatch,
    Mismatch,
}

/// Digit buffer bounded by the answer's digit count
#[derive(Debug, Clone, Default)]
pub struct InputTracker {
    buffer: String,
    target: String,
    locked: bool,
}

impl InputTracker {
    pub fn new(answer: u32) -> Self {
        let mut tracker = Self::default();
        tracker.reset(answer);
        tracker
    }

    /// Start tracking a new answer (clears buffer, unlocks)
    pub fn reset(&mut self, answer: u32) {
        self.buffer.clear();
        self.target = answer.to_string();
        self.locked = false;
    }

    /// Stop accepting keystrokes until the next reset
    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn max_len(&self) -> usize {
        self.target.len()
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Append a digit. Ignored when full, locked, or not an ASCII digit.
    pub fn append_digit(&mut self, digit: char) -> InputMatch {
        if !self.locked && digit.is_ascii_digit() && self.buffer.len() < self.max_len() {
            self.buffer.push(digit);
        }
        self.classify()
    }

    /// Remove the last digit (if any)
    pub fn backspace(&mut self) -> InputMatch {
        if !self.locked {
            self.buffer.pop();
        }
        self.classify()
    }

    pub fn classify(&self) -> InputMatch {
        if self.buffer.is_empty() {
            return InputMatch::Empty;
        }
        match (self.buffer.parse::<u64>(), self.target.parse::<u64>()) {
            (Ok(typed), Ok(target)) if typed == target => InputMatch::ExactMatch,
            (Ok(_), _) if self.target.starts_with(&self.buffer) => InputMatch::PartialMatch,
            _ => InputMatch::Mismatch,
        }
    }

    /// Character shown in answer slot `index` ('_' while unfilled)
    pub fn slot_char(&self, index: usize) -> char {
        self.buffer.chars().nth(index).unwrap_or('_')
    }
}
