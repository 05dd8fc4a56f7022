//! Math Defenders entry point
//!
//! Handles platform-specific initialization and runs the game loop.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod wasm_game {
    use std::cell::RefCell;
    use std::rc::Rc;
    use wasm_bindgen::prelude::*;
    use web_sys::{Document, KeyboardEvent};

    use math_defenders::consts::*;
    use math_defenders::sim::{
        GameEvent, KeyPress, MatchOutcome, OperatorMode, RoundController, RoundPhase, TickInput,
        tick,
    };
    use math_defenders::{GameSession, ItemKind, Progress, Tuning};

    /// Game instance holding all state
    struct Game {
        ctrl: RoundController,
        session: GameSession,
        accumulator_ms: f64,
        last_time: f64,
        input: TickInput,
        /// Simulated time at which the staged equation attacks
        attack_deadline_ms: Option<u64>,
        status: String,
    }

    impl Game {
        fn new(seed: u64) -> Result<Self, math_defenders::ConfigError> {
            let tuning = Tuning::default();
            let session = GameSession::resume(Progress::load(), &tuning)?;
            Ok(Self {
                ctrl: RoundController::new(tuning, seed)?,
                session,
                accumulator_ms: 0.0,
                last_time: 0.0,
                input: TickInput::default(),
                attack_deadline_ms: None,
                status: "Press Enter to start".to_string(),
            })
        }

        fn can_pick_level(&self) -> bool {
            matches!(
                self.ctrl.phase(),
                RoundPhase::Idle | RoundPhase::MatchComplete(_)
            )
        }

        fn on_key(&mut self, key: &str) {
            if let Some(press) = KeyPress::from_key(key) {
                self.input.keys.push(press);
                return;
            }
            match key {
                "Enter" if self.can_pick_level() => {
                    self.ctrl.begin_match(&mut self.session);
                    self.status = format!("Level {} - get ready", self.session.level);
                }
                "r" | "R" if matches!(self.ctrl.phase(), RoundPhase::MatchComplete(_)) => {
                    self.ctrl.retry(&mut self.session);
                    self.status = format!("Retrying level {}", self.session.level);
                }
                "n" | "N" if self.ctrl.phase() == RoundPhase::MatchComplete(MatchOutcome::Win) => {
                    self.ctrl.start_next_level(&mut self.session);
                    self.status = format!("Level {} - get ready", self.session.level);
                }
                "Escape" => {
                    self.ctrl.abandon();
                    self.attack_deadline_ms = None;
                    self.status = "Press Enter to start".to_string();
                }
                "a" | "s" | "m" | "d" if self.can_pick_level() => {
                    let mode = match key {
                        "a" => OperatorMode::Addition,
                        "s" => OperatorMode::Subtraction,
                        "m" => OperatorMode::Multiplication,
                        _ => OperatorMode::Division,
                    };
                    let level = self.session.progress.highest_level(mode);
                    self.select(mode, level);
                }
                "+" | "-" if self.can_pick_level() => {
                    let mode = self.session.mode;
                    let levels = self.session.progress.selectable_levels(mode);
                    let level = if key == "+" {
                        self.session.level.saturating_add(1).min(*levels.end())
                    } else {
                        self.session.level.saturating_sub(1).max(*levels.start())
                    };
                    self.select(mode, level);
                }
                _ => {}
            }
        }

        fn select(&mut self, mode: OperatorMode, level: u32) {
            if !self.session.progress.is_unlocked(mode, level) {
                return;
            }
            match self.session.select(mode, level) {
                Ok(()) => {
                    self.ctrl.abandon();
                    self.status = format!("{} level {} - press Enter", mode.as_str(), level);
                }
                Err(e) => log::warn!("Level select failed: {}", e),
            }
        }

        /// Run simulation ticks
        fn update(&mut self, dt_ms: f64) {
            self.accumulator_ms += dt_ms.min(100.0);

            let step = f64::from(SIM_DT_MS);
            let mut substeps = 0;
            while self.accumulator_ms >= step && substeps < MAX_SUBSTEPS {
                let input = std::mem::take(&mut self.input);
                let events = tick(&mut self.ctrl, &mut self.session, &input, SIM_DT_MS);
                for event in &events {
                    self.on_event(event);
                }
                self.accumulator_ms -= step;
                substeps += 1;
            }
        }

        fn on_event(&mut self, event: &GameEvent) {
            match event {
                GameEvent::RoundStarted { round, .. } => {
                    self.attack_deadline_ms = None;
                    self.status = format!("Round {}", round);
                }
                GameEvent::TokensStaged { time_limit_ms } => {
                    self.attack_deadline_ms =
                        Some(self.ctrl.timers().now_ms() + u64::from(*time_limit_ms));
                }
                GameEvent::AttackLaunched { .. } | GameEvent::HomingLaunched => {
                    self.attack_deadline_ms = None;
                }
                GameEvent::EnemyHit { damage, effect, .. } => {
                    self.status = format!("Hit! {} damage ({:?})", damage, effect);
                }
                GameEvent::PlayerHit { damage, .. } => {
                    self.status = format!("Ouch! -{} HP", damage);
                }
                GameEvent::MatchWon(summary) => {
                    self.status = format!(
                        "Victory! +{} SpaceBux - N: next level, R: retry",
                        summary.currency_awarded
                    );
                }
                GameEvent::MatchLost(_) => {
                    self.status = "Defeated - R: retry, Esc: menu".to_string();
                }
                GameEvent::InputChanged { .. } | GameEvent::TokensMoved => {}
            }
        }

        fn render(&self, document: &Document) {
            let mut html = String::new();
            for token in self.ctrl.tokens() {
                let class = if token.is_answer_slot { "token slot" } else { "token" };
                html.push_str(&format!(
                    "<span class=\"{}\" style=\"position:absolute;left:{:.0}px;top:{:.0}px\">{}</span>",
                    class,
                    token.position.x - TOKEN_RADIUS,
                    token.position.y - TOKEN_RADIUS,
                    token.character
                ));
            }
            if let Some(arena) = document.get_element_by_id("arena") {
                arena.set_inner_html(&html);
            }

            let target = self.ctrl.tuning().target;
            let time_left = self
                .attack_deadline_ms
                .map(|due| due.saturating_sub(self.ctrl.timers().now_ms()) as f64 / 1000.0);

            set_text(document, "hud-mode", self.session.mode.as_str());
            set_text(document, "hud-level", &self.session.level.to_string());
            set_text(document, "hud-correct", &format!("{}/{}", self.ctrl.correct_count(), target));
            set_text(document, "hud-wrong", &format!("{}/{}", self.ctrl.wrong_count(), target));
            set_text(document, "hud-player-hp", &self.session.player_hp.to_string());
            set_text(document, "hud-enemy-hp", &self.session.enemy_hp.to_string());
            set_text(document, "hud-currency", &self.session.progress.currency.to_string());
            set_text(document, "hud-input", self.ctrl.input_text());
            set_text(
                document,
                "hud-timer",
                &time_left.map(|t| format!("{:.1}s", t)).unwrap_or_default(),
            );
            set_text(document, "hud-ship", self.session.progress.equipped(ItemKind::Ship));
            set_text(document, "status", &self.status);

            if let Some(el) = document.get_element_by_id("match-over") {
                let class = if matches!(self.ctrl.phase(), RoundPhase::MatchComplete(_)) {
                    ""
                } else {
                    "hidden"
                };
                let _ = el.set_attribute("class", class);
            }
        }
    }

    fn set_text(document: &Document, id: &str, text: &str) {
        if let Some(el) = document.get_element_by_id(id) {
            el.set_text_content(Some(text));
        }
    }

    pub fn run() {
        console_error_panic_hook::set_once();
        if console_log::init_with_level(log::Level::Info).is_err() {
            web_sys::console::warn_1(&"Logger already initialized".into());
        }
        log::info!("Math Defenders starting...");

        let seed = js_sys::Date::now() as u64;
        let game = match Game::new(seed) {
            Ok(game) => Rc::new(RefCell::new(game)),
            Err(e) => {
                log::error!("Failed to start: {}", e);
                return;
            }
        };

        setup_input_handlers(game.clone());
        request_animation_frame(game);
    }

    fn setup_input_handlers(game: Rc<RefCell<Game>>) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let closure = Closure::<dyn FnMut(_)>::new(move |event: KeyboardEvent| {
            let key = event.key();
            if key == "Backspace" {
                // Keep the browser from navigating back
                event.prevent_default();
            }
            game.borrow_mut().on_key(&key);
        });
        let _ = window.add_event_listener_with_callback("keydown", closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn request_animation_frame(game: Rc<RefCell<Game>>) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let closure = Closure::once(move |time: f64| {
            game_loop(game, time);
        });
        let _ = window.request_animation_frame(closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn game_loop(game: Rc<RefCell<Game>>, time: f64) {
        {
            let mut g = game.borrow_mut();

            let dt_ms = if g.last_time > 0.0 {
                time - g.last_time
            } else {
                f64::from(SIM_DT_MS)
            };
            g.last_time = time;

            g.update(dt_ms);
            if let Some(document) = web_sys::window().and_then(|w| w.document()) {
                g.render(&document);
            }
        }

        request_animation_frame(game);
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn wasm_main() {
    wasm_game::run();
}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    log::info!("Math Defenders (native) starting...");
    log::info!("Native mode plays a headless demo match - run with `trunk serve` for the web version");

    if let Err(e) = demo::run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}

/// Headless autoplay, the native counterpart of the web idle mode
#[cfg(not(target_arch = "wasm32"))]
mod demo {
    use math_defenders::consts::SIM_DT_MS;
    use math_defenders::error::{ConfigError, Result};
    use math_defenders::sim::{
        Autopilot, GameEvent, OperatorMode, RoundController, RoundPhase, TickInput, tick,
    };
    use math_defenders::{GameSession, Progress, Tuning};

    /// Chance the demo player answers correctly
    const DEMO_ACCURACY: f64 = 0.8;
    /// Pause before the demo player types
    const DEMO_THINK_MS: u32 = 900;
    /// Give up after this much simulated time
    const DEMO_LIMIT_MS: u32 = 30 * 60 * 1000;

    /// Usage: `math-defenders [mode] [level] [seed]`.
    /// `MATH_DEFENDERS_TUNING` may hold a tuning JSON document.
    pub fn run() -> Result<()> {
        let mut args = std::env::args().skip(1);
        let mode = match args.next() {
            Some(name) => OperatorMode::from_name(&name)?,
            None => OperatorMode::default(),
        };
        let level = match args.next() {
            Some(text) => parse_level(&text)?,
            None => 1,
        };
        let seed = args.next().and_then(|s| s.parse().ok()).unwrap_or(42);

        let tuning = match std::env::var("MATH_DEFENDERS_TUNING") {
            Ok(json) => Tuning::from_json(&json)?,
            Err(_) => Tuning::default(),
        };

        let mut session = GameSession::new(level, mode, Progress::load(), &tuning)?;
        let mut ctrl = RoundController::new(tuning, seed)?;
        let mut pilot = Autopilot::new(seed.wrapping_add(1), DEMO_ACCURACY, DEMO_THINK_MS);

        ctrl.begin_match(&mut session);
        let mut elapsed_ms = 0;
        while !matches!(ctrl.phase(), RoundPhase::MatchComplete(_)) && elapsed_ms < DEMO_LIMIT_MS {
            let input = TickInput {
                keys: pilot.plan(&ctrl, SIM_DT_MS),
            };
            for event in tick(&mut ctrl, &mut session, &input, SIM_DT_MS) {
                log_event(&event);
            }
            elapsed_ms += SIM_DT_MS;
        }

        match ctrl.summary() {
            Some(summary) => println!(
                "{:?} at {} level {}: {} correct, {} wrong, +{} SpaceBux",
                summary.outcome,
                summary.mode.as_str(),
                summary.level,
                summary.correct_count,
                summary.wrong_count,
                summary.currency_awarded
            ),
            None => println!("Demo stopped after {} rounds", ctrl.round()),
        }
        Ok(())
    }

    fn parse_level(text: &str) -> Result<u32> {
        text.trim()
            .parse()
            .map_err(|_| ConfigError::UnparsableLevel(text.to_string()))
    }

    fn log_event(event: &GameEvent) {
        match event {
            GameEvent::TokensMoved => {}
            GameEvent::RoundStarted { round, equation } => {
                log::info!("Round {}: {} = ?", round, equation.display());
            }
            GameEvent::MatchWon(_) | GameEvent::MatchLost(_) => {}
            other => log::info!("{:?}", other),
        }
    }

}
