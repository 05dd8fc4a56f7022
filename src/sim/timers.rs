//! Cancellable timers on the simulated millisecond clock
//!
//! Timers are plain data (kind + due time), never closures. Each one is
//! stamped with the registry generation current when it was armed; the
//! generation advances at every round boundary, so a timer from an earlier
//! round can be recognized and dropped even if it slips past cancellation.

use serde::{Deserialize, Serialize};

/// What a timer does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerKind {
    /// Spawn equation token `n` from the enemy
    SpawnToken(usize),
    /// Player ran out of time; launch tokens at the player
    AttackTimeout,
    /// Force a player hit if overlap detection missed
    CollisionFallback,
    /// Force an enemy hit if homing overlap detection missed
    HomingFallback,
    /// Begin the next round
    StartRound,
}

/// Unique timer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerId(pub u64);

/// A scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
    pub id: TimerId,
    pub kind: TimerKind,
    pub due_ms: u64,
    pub generation: u64,
}

/// Per-round timer registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimerRegistry {
    now_ms: u64,
    generation: u64,
    pending: Vec<Timer>,
    next_id: u64,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulated time
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Advance the clock (does not fire anything; see `pop_due`)
    pub fn advance_clock(&mut self, dt_ms: u32) {
        self.now_ms += u64::from(dt_ms);
    }

    /// Arm a timer `delay_ms` from now in the current generation
    pub fn schedule(&mut self, kind: TimerKind, delay_ms: u32) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.pending.push(Timer {
            id,
            kind,
            due_ms: self.now_ms + u64::from(delay_ms),
            generation: self.generation,
        });
        id
    }

    /// Cancel every pending timer of this kind. Returns how many were removed.
    pub fn cancel(&mut self, kind: TimerKind) -> usize {
        let before = self.pending.len();
        self.pending.retain(|t| t.kind != kind);
        before - self.pending.len()
    }

    pub fn cancel_id(&mut self, id: TimerId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|t| t.id != id);
        before != self.pending.len()
    }

    /// Cancel everything
    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    /// Close the current generation: cancel all timers and advance the token.
    /// Returns the new generation.
    pub fn begin_generation(&mut self) -> u64 {
        self.cancel_all();
        self.generation += 1;
        self.generation
    }

    /// Remove and return the earliest due timer (ties broken by arming order)
    pub fn pop_due(&mut self) -> Option<Timer> {
        let now = self.now_ms;
        let idx = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due_ms <= now)
            .min_by_key(|(_, t)| (t.due_ms, t.id))
            .map(|(i, _)| i)?;
        Some(self.pending.remove(idx))
    }

    /// Whether a popped timer still belongs to the live generation
    pub fn is_current(&self, timer: &Timer) -> bool {
        timer.generation == self.generation
    }

    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.pending.iter().any(|t| t.kind == kind)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Pending timers armed in the given generation
    pub fn pending_in_generation(&self, generation: u64) -> usize {
        self.pending
            .iter()
            .filter(|t| t.generation == generation)
            .count()
    }

    pub fn pending(&self) -> &[Timer] {
        &self.pending
    }
}
