//! Round controller: the equation-combat state machine
//!
//! Idle -> Staging -> AwaitingInput -> Resolving -> (RoundComplete -> Idle | MatchComplete)
//!
//! Everything enters through [`RoundController::advance`]. Time only moves on
//! `RoundInput::Tick`; timers live in a per-round registry whose generation
//! advances at every round boundary, so nothing armed in one round can act
//! on the next.

use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::equation::{self, Equation, SpecialEffect};
use super::input::{InputMatch, InputTracker};
use super::projectile::{
    Impact, LaunchCause, ProjectileEvent, ProjectileLifecycle, ProjectileParams, ProjectileSignal,
    Token, build_tokens,
};
use super::timers::{TimerKind, TimerRegistry};
use crate::consts::MAX_LEVEL;
use crate::error::Result;
use crate::session::GameSession;
use crate::sim::OperatorMode;
use crate::tuning::Tuning;

/// Round phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundPhase {
    /// No live equation; the next round may start
    Idle,
    /// Tokens are travelling to the staging line
    Staging,
    /// Attack timer armed, keystrokes accepted
    AwaitingInput,
    /// Tokens in flight toward a ship; input locked
    Resolving,
    /// Hit applied, waiting to start the next round
    RoundComplete,
    /// Match over; no more rounds
    MatchComplete(MatchOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOutcome {
    Win,
    Loss,
}

/// Result reported to progression when a match ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub outcome: MatchOutcome,
    pub level: u32,
    pub mode: OperatorMode,
    pub correct_count: u32,
    pub wrong_count: u32,
    /// Bonus-equation currency plus the level-completion bonus
    pub currency_awarded: u64,
    /// New highest unlocked level, if this win moved it
    pub new_high_level: Option<u32>,
}

/// Inputs to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundInput {
    Digit(char),
    Backspace,
    /// Advance the simulated clock by this many milliseconds
    Tick(u32),
}

/// Events published for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    RoundStarted {
        round: u32,
        equation: Equation,
    },
    InputChanged {
        text: String,
        classification: InputMatch,
    },
    TokensStaged {
        time_limit_ms: u32,
    },
    /// Token positions changed this tick
    TokensMoved,
    AttackLaunched {
        cause: LaunchCause,
    },
    HomingLaunched,
    EnemyHit {
        damage: u32,
        effect: SpecialEffect,
        healed: u32,
        bonus_currency: u64,
        forced: bool,
    },
    PlayerHit {
        damage: u32,
        forced: bool,
    },
    MatchWon(MatchSummary),
    MatchLost(MatchSummary),
}

/// Orchestrates rounds for one match at a time
#[derive(Debug, Clone)]
pub struct RoundController {
    tuning: Tuning,
    rng: Pcg32,
    phase: RoundPhase,
    equation: Option<Equation>,
    input: InputTracker,
    projectile: ProjectileLifecycle,
    timers: TimerRegistry,
    round: u32,
    correct_count: u32,
    wrong_count: u32,
    currency_earned: u64,
    summary: Option<MatchSummary>,
}

impl RoundController {
    /// Build a controller. Fails if the tuning cannot drive a match.
    pub fn new(tuning: Tuning, seed: u64) -> Result<Self> {
        tuning.validate()?;
        let params = ProjectileParams::for_level(&tuning, 1);
        Ok(Self {
            tuning,
            rng: Pcg32::seed_from_u64(seed),
            phase: RoundPhase::Idle,
            equation: None,
            input: InputTracker::default(),
            projectile: ProjectileLifecycle::new(params),
            timers: TimerRegistry::new(),
            round: 0,
            correct_count: 0,
            wrong_count: 0,
            currency_earned: 0,
            summary: None,
        })
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn equation(&self) -> Option<&Equation> {
        self.equation.as_ref()
    }

    pub fn tokens(&self) -> &[Token] {
        self.projectile.tokens()
    }

    pub fn input_text(&self) -> &str {
        self.input.buffer()
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    pub fn wrong_count(&self) -> u32 {
        self.wrong_count
    }

    pub fn currency_earned(&self) -> u64 {
        self.currency_earned
    }

    pub fn summary(&self) -> Option<&MatchSummary> {
        self.summary.as_ref()
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.timers
    }

    /// Start a fresh match at the session's level; the first round begins
    /// after `first_round_delay_ms`
    pub fn begin_match(&mut self, session: &mut GameSession) -> Vec<GameEvent> {
        self.teardown();
        self.correct_count = 0;
        self.wrong_count = 0;
        self.currency_earned = 0;
        self.round = 0;
        self.summary = None;
        session.reset_health();
        session.progress.remember_selection(session.mode, session.level);
        self.timers
            .schedule(TimerKind::StartRound, self.tuning.first_round_delay_ms);
        log::info!(
            "Match started: level {} in {} mode",
            session.level,
            session.mode.as_str()
        );
        Vec::new()
    }

    /// Replay the same level
    pub fn retry(&mut self, session: &mut GameSession) -> Vec<GameEvent> {
        self.begin_match(session)
    }

    /// Advance to the next level and start it (the last level replays)
    pub fn start_next_level(&mut self, session: &mut GameSession) -> Vec<GameEvent> {
        session.level = session.level.saturating_add(1).min(MAX_LEVEL);
        self.begin_match(session)
    }

    /// Navigate away: drop the round and every pending timer
    pub fn abandon(&mut self) {
        self.teardown();
        log::info!("Match abandoned after {} rounds", self.round);
    }

    /// Single entry point for input and time
    pub fn advance(&mut self, session: &mut GameSession, input: RoundInput) -> Vec<GameEvent> {
        let mut events = Vec::new();
        match input {
            RoundInput::Digit(d) => self.on_key(session, Some(d), &mut events),
            RoundInput::Backspace => self.on_key(session, None, &mut events),
            RoundInput::Tick(dt_ms) => self.on_tick(session, dt_ms, &mut events),
        }
        events
    }

    /// Cancel all timers and return to Idle with no live equation
    fn teardown(&mut self) {
        self.timers.begin_generation();
        self.projectile.clear();
        self.equation = None;
        self.input.lock();
        self.phase = RoundPhase::Idle;
    }

    fn on_key(&mut self, session: &mut GameSession, digit: Option<char>, events: &mut Vec<GameEvent>) {
        if self.phase != RoundPhase::AwaitingInput {
            log::trace!("Key ignored in {:?}", self.phase);
            return;
        }

        let before = self.input.buffer().len();
        let classification = match digit {
            Some(d) => self.input.append_digit(d),
            None => self.input.backspace(),
        };
        if self.input.buffer().len() == before {
            return;
        }

        self.projectile.fill_answer_slots(&self.input);
        events.push(GameEvent::InputChanged {
            text: self.input.buffer().to_string(),
            classification,
        });

        let event = match classification {
            InputMatch::ExactMatch => ProjectileEvent::Correct,
            InputMatch::Mismatch => ProjectileEvent::Wrong,
            InputMatch::Empty | InputMatch::PartialMatch => return,
        };
        if let Some(signal) = self.projectile.advance(event, &mut self.timers) {
            self.on_signal(session, signal, events);
        }
    }

    fn on_tick(&mut self, session: &mut GameSession, dt_ms: u32, events: &mut Vec<GameEvent>) {
        self.timers.advance_clock(dt_ms);

        while let Some(timer) = self.timers.pop_due() {
            if !self.timers.is_current(&timer) {
                log::trace!("Stale {:?} from generation {} dropped", timer.kind, timer.generation);
                continue;
            }
            self.dispatch_timer(session, timer.kind, events);
        }

        if matches!(
            self.phase,
            RoundPhase::Staging | RoundPhase::AwaitingInput | RoundPhase::Resolving
        ) {
            let signal = self
                .projectile
                .advance(ProjectileEvent::Step { dt_ms }, &mut self.timers);
            if self.projectile.is_moving() {
                events.push(GameEvent::TokensMoved);
            }
            if let Some(signal) = signal {
                self.on_signal(session, signal, events);
            }
        }
    }

    fn dispatch_timer(
        &mut self,
        session: &mut GameSession,
        kind: TimerKind,
        events: &mut Vec<GameEvent>,
    ) {
        match kind {
            TimerKind::StartRound => {
                if matches!(self.phase, RoundPhase::Idle | RoundPhase::RoundComplete) {
                    self.start_round(session, events);
                }
            }
            _ => {
                if let Some(signal) = self
                    .projectile
                    .advance(ProjectileEvent::Timer(kind), &mut self.timers)
                {
                    self.on_signal(session, signal, events);
                }
            }
        }
    }

    fn start_round(&mut self, session: &GameSession, events: &mut Vec<GameEvent>) {
        let equation = equation::generate(session.level, session.mode, &mut self.rng);
        self.start_round_with(session, equation, events);
    }

    fn start_round_with(
        &mut self,
        session: &GameSession,
        equation: Equation,
        events: &mut Vec<GameEvent>,
    ) {
        // Previous round's timers go with its generation
        self.timers.begin_generation();
        self.projectile.clear();
        self.phase = RoundPhase::Idle;

        self.round += 1;
        self.input.reset(equation.answer);
        let params = ProjectileParams::for_level(&self.tuning, session.level);
        self.projectile
            .stage(build_tokens(&equation), params, &mut self.timers);
        self.phase = RoundPhase::Staging;

        log::debug!(
            "Round {}: {} = {} ({:?})",
            self.round,
            equation.display(),
            equation.answer,
            equation.special_effect
        );
        events.push(GameEvent::RoundStarted {
            round: self.round,
            equation: equation.clone(),
        });
        self.equation = Some(equation);
    }

    /// React to a lifecycle signal
    fn on_signal(
        &mut self,
        session: &mut GameSession,
        signal: ProjectileSignal,
        events: &mut Vec<GameEvent>,
    ) {
        match signal {
            ProjectileSignal::Staged { time_limit_ms } => {
                if self.phase == RoundPhase::Staging {
                    self.phase = RoundPhase::AwaitingInput;
                    events.push(GameEvent::TokensStaged { time_limit_ms });
                }
            }
            ProjectileSignal::Launched(cause) => {
                self.input.lock();
                self.phase = RoundPhase::Resolving;
                log::debug!("Attack launched ({:?})", cause);
                events.push(GameEvent::AttackLaunched { cause });
            }
            ProjectileSignal::Homing => {
                self.input.lock();
                self.phase = RoundPhase::Resolving;
                log::debug!("Correct answer, homing to enemy");
                events.push(GameEvent::HomingLaunched);
            }
            ProjectileSignal::Resolved { impact, forced, .. } => {
                if self.phase != RoundPhase::Resolving {
                    log::trace!("{:?} arrived in {:?}; ignored", impact, self.phase);
                    return;
                }
                self.resolve_round(session, impact, forced, events);
            }
        }
    }

    fn resolve_round(
        &mut self,
        session: &mut GameSession,
        impact: Impact,
        forced: bool,
        events: &mut Vec<GameEvent>,
    ) {
        let delay = match impact {
            Impact::EnemyHit => {
                self.apply_enemy_hit(session, forced, events);
                self.correct_count += 1;
                self.tuning.enemy_hit_delay_ms
            }
            Impact::PlayerHit => {
                let damage = self.tuning.player_damage;
                session.damage_player(damage);
                self.wrong_count += 1;
                log::debug!("Player takes {} damage. HP: {}", damage, session.player_hp);
                events.push(GameEvent::PlayerHit { damage, forced });
                self.tuning.player_hit_delay_ms
            }
        };

        self.teardown();

        let target = self.tuning.target;
        let outcome = if self.correct_count >= target {
            Some(MatchOutcome::Win)
        } else if self.wrong_count >= target {
            Some(MatchOutcome::Loss)
        } else {
            None
        };

        match outcome {
            Some(outcome) => self.finish_match(session, outcome, events),
            None => {
                self.phase = RoundPhase::RoundComplete;
                self.timers.schedule(TimerKind::StartRound, delay);
            }
        }
    }

    fn apply_enemy_hit(&mut self, session: &mut GameSession, forced: bool, events: &mut Vec<GameEvent>) {
        let effect = self
            .equation
            .as_ref()
            .map(|e| e.special_effect)
            .unwrap_or_default();

        let mut damage = self.tuning.base_damage;
        if effect == SpecialEffect::DoubleDamage {
            damage = damage.saturating_mul(2);
        }
        session.damage_enemy(damage);

        let mut healed = 0;
        let mut bonus_currency = 0;
        match effect {
            SpecialEffect::HealPlayer => {
                healed = session.heal_player(self.tuning.heal_amount);
            }
            SpecialEffect::BonusCurrency => {
                bonus_currency = u64::from(session.level) * u64::from(self.tuning.bonus_currency_rate);
                session.progress.award_currency(bonus_currency);
                self.currency_earned = self.currency_earned.saturating_add(bonus_currency);
            }
            SpecialEffect::None | SpecialEffect::DoubleDamage => {}
        }

        log::debug!("Enemy takes {} damage. HP: {}", damage, session.enemy_hp);
        events.push(GameEvent::EnemyHit {
            damage,
            effect,
            healed,
            bonus_currency,
            forced,
        });
    }

    fn finish_match(
        &mut self,
        session: &mut GameSession,
        outcome: MatchOutcome,
        events: &mut Vec<GameEvent>,
    ) {
        let mut new_high_level = None;
        if outcome == MatchOutcome::Win {
            let bonus = u64::from(session.level) * u64::from(self.tuning.level_bonus_rate);
            session.progress.award_currency(bonus);
            self.currency_earned = self.currency_earned.saturating_add(bonus);
            new_high_level = session.progress.record_win(session.mode, session.level);
        }
        if new_high_level.is_some() || self.currency_earned > 0 {
            session.progress.save();
        }

        let summary = MatchSummary {
            outcome,
            level: session.level,
            mode: session.mode,
            correct_count: self.correct_count,
            wrong_count: self.wrong_count,
            currency_awarded: self.currency_earned,
            new_high_level,
        };
        log::info!(
            "Match {:?}: {}/{} correct, {} wrong, +{} SpaceBux",
            outcome,
            self.correct_count,
            self.tuning.target,
            self.wrong_count,
            self.currency_earned
        );

        self.phase = RoundPhase::MatchComplete(outcome);
        self.summary = Some(summary.clone());
        events.push(match outcome {
            MatchOutcome::Win => GameEvent::MatchWon(summary),
            MatchOutcome::Loss => GameEvent::MatchLost(summary),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SIM_DT_MS;
    use crate::progression::Progress;
    use crate::sim::equation::Operator;

    fn setup(level: u32) -> (RoundController, GameSession) {
        let tuning = Tuning::default();
        let session =
            GameSession::new(level, OperatorMode::Multiplication, Progress::new(), &tuning).unwrap();
        (RoundController::new(tuning, 42).unwrap(), session)
    }

    fn tick_for(ctrl: &mut RoundController, session: &mut GameSession, ms: u32) -> Vec<GameEvent> {
        let mut events = Vec::new();
        for _ in 0..ms.div_ceil(SIM_DT_MS) {
            events.extend(ctrl.advance(session, RoundInput::Tick(SIM_DT_MS)));
        }
        events
    }

    /// Tick until the phase satisfies `pred` (panics after 10 simulated seconds)
    fn tick_until(
        ctrl: &mut RoundController,
        session: &mut GameSession,
        pred: impl Fn(RoundPhase) -> bool,
    ) -> Vec<GameEvent> {
        let mut events = Vec::new();
        for _ in 0..10_000 / SIM_DT_MS {
            if pred(ctrl.phase()) {
                return events;
            }
            events.extend(ctrl.advance(session, RoundInput::Tick(SIM_DT_MS)));
        }
        panic!("phase never reached; stuck in {:?}", ctrl.phase());
    }

    fn await_input(ctrl: &mut RoundController, session: &mut GameSession) -> Vec<GameEvent> {
        tick_until(ctrl, session, |p| p == RoundPhase::AwaitingInput)
    }

    fn type_answer(ctrl: &mut RoundController, session: &mut GameSession) -> Vec<GameEvent> {
        let answer = ctrl.equation().unwrap().answer_text();
        answer
            .chars()
            .flat_map(|c| ctrl.advance(session, RoundInput::Digit(c)))
            .collect()
    }

    fn type_wrong(ctrl: &mut RoundController, session: &mut GameSession) -> Vec<GameEvent> {
        let first = ctrl.equation().unwrap().answer_text().chars().next().unwrap();
        let wrong = if first == '9' { '1' } else { '9' };
        ctrl.advance(session, RoundInput::Digit(wrong))
    }

    fn count<F: Fn(&GameEvent) -> bool>(events: &[GameEvent], f: F) -> usize {
        events.iter().filter(|e| f(e)).count()
    }

    #[test]
    fn test_first_round_starts_after_delay() {
        let (mut ctrl, mut session) = setup(1);
        ctrl.begin_match(&mut session);
        let events = tick_for(&mut ctrl, &mut session, 1000);
        assert!(events.is_empty());
        assert_eq!(ctrl.phase(), RoundPhase::Idle);

        let events = tick_for(&mut ctrl, &mut session, 300);
        assert!(matches!(events[0], GameEvent::RoundStarted { round: 1, .. }));
        assert_eq!(ctrl.phase(), RoundPhase::Staging);

        let eq = ctrl.equation().unwrap();
        assert_eq!(ctrl.tokens().len(), eq.display_tokens.len() + 1 + eq.answer_digits());
    }

    #[test]
    fn test_input_ignored_outside_awaiting_input() {
        let (mut ctrl, mut session) = setup(1);
        assert!(ctrl.advance(&mut session, RoundInput::Digit('1')).is_empty());

        ctrl.begin_match(&mut session);
        tick_until(&mut ctrl, &mut session, |p| p == RoundPhase::Staging);
        assert!(ctrl.advance(&mut session, RoundInput::Digit('1')).is_empty());
        assert_eq!(ctrl.input_text(), "");

        let events = await_input(&mut ctrl, &mut session);
        assert_eq!(count(&events, |e| matches!(e, GameEvent::TokensStaged { .. })), 1);
    }

    #[test]
    fn test_correct_answer_hits_enemy_then_next_round() {
        let (mut ctrl, mut session) = setup(1);
        ctrl.begin_match(&mut session);
        await_input(&mut ctrl, &mut session);

        let events = type_answer(&mut ctrl, &mut session);
        assert!(events.contains(&GameEvent::HomingLaunched));
        assert_eq!(ctrl.phase(), RoundPhase::Resolving);
        // Input is locked once resolving
        assert!(ctrl.advance(&mut session, RoundInput::Backspace).is_empty());

        let events = tick_until(&mut ctrl, &mut session, |p| p == RoundPhase::RoundComplete);
        assert_eq!(count(&events, |e| matches!(e, GameEvent::EnemyHit { .. })), 1);
        assert_eq!(ctrl.correct_count(), 1);
        assert_eq!(ctrl.wrong_count(), 0);
        assert!(session.enemy_hp < session.max_health);
        assert!(ctrl.equation().is_none());

        let delay = ctrl.tuning().enemy_hit_delay_ms + SIM_DT_MS;
        let events = tick_for(&mut ctrl, &mut session, delay);
        assert!(matches!(events[0], GameEvent::RoundStarted { round: 2, .. }));
    }

    #[test]
    fn test_first_divergent_digit_launches_attack() {
        let (mut ctrl, mut session) = setup(1);
        ctrl.begin_match(&mut session);
        await_input(&mut ctrl, &mut session);

        let events = type_wrong(&mut ctrl, &mut session);
        assert!(events.contains(&GameEvent::AttackLaunched {
            cause: LaunchCause::WrongAnswer
        }));
        assert!(!ctrl.timers().is_pending(TimerKind::AttackTimeout));

        let events = tick_until(&mut ctrl, &mut session, |p| p == RoundPhase::RoundComplete);
        assert_eq!(count(&events, |e| matches!(e, GameEvent::PlayerHit { .. })), 1);
        assert_eq!(ctrl.wrong_count(), 1);
        assert_eq!(session.player_hp, session.max_health - ctrl.tuning().player_damage);
    }

    #[test]
    fn test_timeout_launches_attack() {
        let (mut ctrl, mut session) = setup(1);
        ctrl.begin_match(&mut session);
        await_input(&mut ctrl, &mut session);

        let events = tick_until(&mut ctrl, &mut session, |p| p == RoundPhase::RoundComplete);
        assert!(events.contains(&GameEvent::AttackLaunched {
            cause: LaunchCause::Timeout
        }));
        assert_eq!(ctrl.wrong_count(), 1);
        assert_eq!(ctrl.correct_count(), 0);
    }

    #[test]
    fn test_partial_answer_then_timeout() {
        let (mut ctrl, mut session) = setup(1);
        ctrl.begin_match(&mut session);
        ctrl.start_round_with(
            &session,
            Equation::new(6, Operator::Multiply, 7, SpecialEffect::None).unwrap(),
            &mut Vec::new(),
        );
        await_input(&mut ctrl, &mut session);

        let events = ctrl.advance(&mut session, RoundInput::Digit('4'));
        assert_eq!(
            events,
            vec![GameEvent::InputChanged {
                text: "4".to_string(),
                classification: InputMatch::PartialMatch
            }]
        );
        assert_eq!(ctrl.tokens().last().unwrap().character, "_");
        assert_eq!(ctrl.phase(), RoundPhase::AwaitingInput);

        tick_until(&mut ctrl, &mut session, |p| p == RoundPhase::RoundComplete);
        assert_eq!(ctrl.wrong_count(), 1);
    }

    #[test]
    fn test_overlap_and_fallback_resolve_once() {
        let (mut ctrl, mut session) = setup(1);
        ctrl.begin_match(&mut session);
        ctrl.start_round_with(
            &session,
            Equation::new(3, Operator::Multiply, 3, SpecialEffect::None).unwrap(),
            &mut Vec::new(),
        );
        await_input(&mut ctrl, &mut session);
        type_answer(&mut ctrl, &mut session);

        // Fallback fires first, then overlap polling keeps running
        let mut events = Vec::new();
        ctrl.dispatch_timer(&mut session, TimerKind::HomingFallback, &mut events);
        ctrl.dispatch_timer(&mut session, TimerKind::HomingFallback, &mut events);
        events.extend(tick_for(&mut ctrl, &mut session, 500));

        assert_eq!(count(&events, |e| matches!(e, GameEvent::EnemyHit { .. })), 1);
        assert_eq!(ctrl.correct_count(), 1);
        assert_eq!(session.enemy_hp, session.max_health - ctrl.tuning().base_damage);
    }

    #[test]
    fn test_forced_collision_after_wrong_answer() {
        let (mut ctrl, mut session) = setup(1);
        ctrl.begin_match(&mut session);
        await_input(&mut ctrl, &mut session);
        type_wrong(&mut ctrl, &mut session);

        let mut events = Vec::new();
        ctrl.dispatch_timer(&mut session, TimerKind::CollisionFallback, &mut events);
        assert_eq!(
            events,
            vec![GameEvent::PlayerHit {
                damage: ctrl.tuning().player_damage,
                forced: true
            }]
        );
        let events = tick_for(&mut ctrl, &mut session, 300);
        assert_eq!(count(&events, |e| matches!(e, GameEvent::PlayerHit { .. })), 0);
        assert_eq!(ctrl.wrong_count(), 1);
    }

    #[test]
    fn test_new_round_leaves_no_timers_from_previous_generation() {
        let (mut ctrl, mut session) = setup(1);
        ctrl.begin_match(&mut session);
        await_input(&mut ctrl, &mut session);
        let round_generation = ctrl.timers().generation();
        assert!(ctrl.timers().pending_in_generation(round_generation) > 0);

        type_wrong(&mut ctrl, &mut session);
        tick_until(&mut ctrl, &mut session, |p| p == RoundPhase::Staging);

        assert!(ctrl.timers().generation() > round_generation);
        assert_eq!(ctrl.timers().pending_in_generation(round_generation), 0);
        assert!(ctrl
            .timers()
            .pending()
            .iter()
            .all(|t| t.generation == ctrl.timers().generation()));
    }

    #[test]
    fn test_stale_resolution_ignored_after_teardown() {
        let (mut ctrl, mut session) = setup(1);
        ctrl.begin_match(&mut session);
        await_input(&mut ctrl, &mut session);
        type_answer(&mut ctrl, &mut session);
        tick_until(&mut ctrl, &mut session, |p| p == RoundPhase::RoundComplete);

        // A late fallback from the finished round must not count again
        let mut events = Vec::new();
        ctrl.dispatch_timer(&mut session, TimerKind::HomingFallback, &mut events);
        ctrl.dispatch_timer(&mut session, TimerKind::CollisionFallback, &mut events);
        ctrl.dispatch_timer(&mut session, TimerKind::AttackTimeout, &mut events);
        assert!(events.is_empty());
        assert_eq!(ctrl.correct_count(), 1);
        assert_eq!(ctrl.wrong_count(), 0);
    }

    #[test]
    fn test_win_at_target() {
        let (mut ctrl, mut session) = setup(3);
        ctrl.begin_match(&mut session);
        let mut all = Vec::new();
        for round in 0..10 {
            await_input(&mut ctrl, &mut session);
            if round % 3 == 0 {
                type_wrong(&mut ctrl, &mut session);
                tick_until(&mut ctrl, &mut session, |p| p == RoundPhase::RoundComplete);
                await_input(&mut ctrl, &mut session);
            }
            type_answer(&mut ctrl, &mut session);
            all.extend(tick_until(&mut ctrl, &mut session, |p| {
                matches!(p, RoundPhase::RoundComplete | RoundPhase::MatchComplete(_))
            }));
        }

        assert_eq!(ctrl.phase(), RoundPhase::MatchComplete(MatchOutcome::Win));
        let summary = ctrl.summary().unwrap().clone();
        assert_eq!(summary.correct_count, 10);
        assert_eq!(summary.wrong_count, 4);
        assert!(summary.wrong_count < 10);
        assert_eq!(summary.new_high_level, Some(4));
        assert!(summary.currency_awarded >= 3 * 50);
        assert_eq!(session.progress.currency, summary.currency_awarded);
        assert_eq!(session.progress.highest_level(OperatorMode::Multiplication), 4);
        assert_eq!(count(&all, |e| matches!(e, GameEvent::MatchWon(_))), 1);

        // Terminal: no further rounds, input ignored
        assert!(tick_for(&mut ctrl, &mut session, 5000).is_empty());
        assert!(ctrl.advance(&mut session, RoundInput::Digit('1')).is_empty());
        assert_eq!(ctrl.timers().pending_count(), 0);
    }

    #[test]
    fn test_loss_at_target() {
        let (mut ctrl, mut session) = setup(2);
        ctrl.begin_match(&mut session);
        let mut all = Vec::new();
        for _ in 0..10 {
            await_input(&mut ctrl, &mut session);
            type_wrong(&mut ctrl, &mut session);
            all.extend(tick_until(&mut ctrl, &mut session, |p| {
                matches!(p, RoundPhase::RoundComplete | RoundPhase::MatchComplete(_))
            }));
        }

        assert_eq!(ctrl.phase(), RoundPhase::MatchComplete(MatchOutcome::Loss));
        let summary = ctrl.summary().unwrap();
        assert_eq!(summary.wrong_count, 10);
        assert_eq!(summary.correct_count, 0);
        assert_eq!(summary.new_high_level, None);
        assert_eq!(session.player_hp, 0);
        assert_eq!(session.progress.highest_level(OperatorMode::Multiplication), 1);
        assert_eq!(count(&all, |e| matches!(e, GameEvent::MatchLost(_))), 1);
    }

    fn hit_with(effect: SpecialEffect, level: u32, player_hp: u32) -> (RoundController, GameSession, Vec<GameEvent>) {
        let (mut ctrl, mut session) = setup(level);
        ctrl.begin_match(&mut session);
        session.player_hp = player_hp;
        ctrl.start_round_with(
            &session,
            Equation::new(4, Operator::Multiply, 5, effect).unwrap(),
            &mut Vec::new(),
        );
        await_input(&mut ctrl, &mut session);
        type_answer(&mut ctrl, &mut session);
        let events = tick_until(&mut ctrl, &mut session, |p| p == RoundPhase::RoundComplete);
        (ctrl, session, events)
    }

    #[test]
    fn test_double_damage() {
        let (_, session, events) = hit_with(SpecialEffect::DoubleDamage, 1, 100);
        assert_eq!(session.enemy_hp, 60);
        assert!(events.iter().any(|e| matches!(
            e,
            GameEvent::EnemyHit {
                damage: 40,
                effect: SpecialEffect::DoubleDamage,
                ..
            }
        )));
    }

    #[test]
    fn test_heal_clamped_at_max() {
        let (_, session, events) = hit_with(SpecialEffect::HealPlayer, 1, 95);
        assert_eq!(session.player_hp, 100);
        assert_eq!(session.enemy_hp, 80);
        assert!(events.iter().any(|e| matches!(e, GameEvent::EnemyHit { healed: 5, .. })));
    }

    #[test]
    fn test_bonus_currency_scales_with_level() {
        let (ctrl, session, _) = hit_with(SpecialEffect::BonusCurrency, 3, 100);
        assert_eq!(session.progress.currency, 30);
        assert_eq!(ctrl.currency_earned(), 30);
    }

    #[test]
    fn test_abandon_cancels_everything() {
        let (mut ctrl, mut session) = setup(1);
        ctrl.begin_match(&mut session);
        await_input(&mut ctrl, &mut session);
        ctrl.abandon();

        assert_eq!(ctrl.phase(), RoundPhase::Idle);
        assert_eq!(ctrl.timers().pending_count(), 0);
        assert!(ctrl.tokens().is_empty());
        assert!(tick_for(&mut ctrl, &mut session, 10_000).is_empty());
    }

    #[test]
    fn test_retry_and_next_level_reset_counters() {
        let (mut ctrl, mut session) = setup(1);
        ctrl.begin_match(&mut session);
        await_input(&mut ctrl, &mut session);
        type_wrong(&mut ctrl, &mut session);
        tick_until(&mut ctrl, &mut session, |p| p == RoundPhase::RoundComplete);
        assert_eq!(ctrl.wrong_count(), 1);

        ctrl.retry(&mut session);
        assert_eq!(ctrl.wrong_count(), 0);
        assert_eq!(session.player_hp, session.max_health);
        assert_eq!(ctrl.timers().pending_count(), 1);

        ctrl.start_next_level(&mut session);
        assert_eq!(session.level, 2);
        assert_eq!(session.progress.last_level, 2);
        let events = tick_until(&mut ctrl, &mut session, |p| p == RoundPhase::Staging);
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::RoundStarted { round: 1, .. })));
    }

    #[test]
    fn test_resolution_while_handling_key_is_applied() {
        let (mut ctrl, mut session) = setup(1);
        ctrl.begin_match(&mut session);
        ctrl.start_round_with(
            &session,
            Equation::new(2, Operator::Multiply, 4, SpecialEffect::None).unwrap(),
            &mut Vec::new(),
        );
        await_input(&mut ctrl, &mut session);
        type_answer(&mut ctrl, &mut session);

        let signal = ctrl
            .projectile
            .resolve(Impact::EnemyHit, 0, false, &mut ctrl.timers)
            .unwrap();
        let mut events = Vec::new();
        ctrl.on_signal(&mut session, signal, &mut events);

        assert_eq!(count(&events, |e| matches!(e, GameEvent::EnemyHit { .. })), 1);
        assert_eq!(ctrl.correct_count(), 1);
        assert_eq!(ctrl.phase(), RoundPhase::RoundComplete);
    }

    #[test]
    fn test_double_damage_saturates() {
        let tuning = Tuning {
            base_damage: u32::MAX,
            ..Default::default()
        };
        let mut session =
            GameSession::new(1, OperatorMode::Multiplication, Progress::new(), &tuning).unwrap();
        let mut ctrl = RoundController::new(tuning, 5).unwrap();
        ctrl.begin_match(&mut session);
        ctrl.start_round_with(
            &session,
            Equation::new(4, Operator::Multiply, 5, SpecialEffect::DoubleDamage).unwrap(),
            &mut Vec::new(),
        );
        await_input(&mut ctrl, &mut session);
        type_answer(&mut ctrl, &mut session);
        let events = tick_until(&mut ctrl, &mut session, |p| p == RoundPhase::RoundComplete);

        assert_eq!(session.enemy_hp, 0);
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::EnemyHit { damage: u32::MAX, .. })));
    }

    #[test]
    fn test_next_level_stops_at_max() {
        let (mut ctrl, mut session) = setup(1);
        session.select(OperatorMode::Addition, MAX_LEVEL).unwrap();
        ctrl.start_next_level(&mut session);
        assert_eq!(session.level, MAX_LEVEL);

        let events = tick_until(&mut ctrl, &mut session, |p| p == RoundPhase::Staging);
        assert!(events
            .iter()
            .any(|e| matches!(e, GameEvent::RoundStarted { round: 1, .. })));
    }

    #[test]
    fn test_invalid_tuning_rejected() {
        let tuning = Tuning {
            target: 0,
            ..Default::default()
        };
        assert!(RoundController::new(tuning, 1).is_err());
    }

    #[test]
    fn test_same_seed_same_equations() {
        let (mut a, mut sa) = setup(5);
        let (mut b, mut sb) = setup(5);
        a.begin_match(&mut sa);
        b.begin_match(&mut sb);
        let ea = tick_for(&mut a, &mut sa, 1500);
        let eb = tick_for(&mut b, &mut sb, 1500);
        assert_eq!(ea, eb);
    }
}
