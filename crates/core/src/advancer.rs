//! The outer per-frame match loop: classify the current screen, dispatch the
//! right navigation routine, and report when a match is (or stops being) live.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::controller::Controller;
use crate::gamestate::{Character, GameState, GamestateSource, Menu, Stage};
use crate::menu::{self, CharSelectOptions};
use crate::MeleeError;

/// Per-frame processing budget. Breaches are logged and nothing more;
/// occasional slow frames are expected and must not abort a session.
pub const FRAME_BUDGET_MS: f32 = 12.0;

/// Frames a reset phase may spin without a menu transition before the
/// emulator is declared unresponsive and torn down.
pub const RESET_WATCHDOG_FRAMES: u32 = 9000;

/// Cancellation token checked at the top of every frame step. Cloned into
/// whatever wants to request shutdown (typically a ctrl-c handler); the
/// advancer terminates the emulator before surfacing the cancellation.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle to the emulator process, used for teardown on fatal paths.
pub trait EmulatorHandle {
    /// Synchronously stop the emulator. Must be idempotent.
    fn terminate(&mut self);
}

/// What is plugged into the opponent's port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpponentKind {
    Human,
    Cpu,
    Bot,
}

/// The match the advancer drives the menus toward.
#[derive(Debug, Clone)]
pub struct MatchSetup {
    pub character: Character,
    pub opponent_character: Character,
    pub stage: Stage,
    pub opponent: OpponentKind,
}

impl Default for MatchSetup {
    fn default() -> Self {
        Self {
            character: Character::Fox,
            opponent_character: Character::Marth,
            stage: Stage::FinalDestination,
            opponent: OpponentKind::Cpu,
        }
    }
}

/// Session object driving the frame loop. Owns both pads, the snapshot
/// source, and the emulator handle; constructed once by the caller and
/// stepped explicitly (there is no background scheduler).
pub struct FrameAdvancer<S, E> {
    source: S,
    emulator: E,
    controller: Controller,
    opponent_controller: Controller,
    setup: MatchSetup,
    shutdown: ShutdownToken,
    latest: GameState,
    first_match: bool,
}

impl<S: GamestateSource, E: EmulatorHandle> FrameAdvancer<S, E> {
    pub fn new(
        source: S,
        emulator: E,
        controller: Controller,
        opponent_controller: Controller,
        setup: MatchSetup,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            source,
            emulator,
            controller,
            opponent_controller,
            setup,
            shutdown,
            latest: GameState::default(),
            first_match: true,
        }
    }

    /// Snapshot from the most recent frame step.
    pub fn gamestate(&self) -> &GameState {
        &self.latest
    }

    /// The bot's pad, for in-match input between steps.
    pub fn controller_mut(&mut self) -> &mut Controller {
        &mut self.controller
    }

    pub fn opponent_controller_mut(&mut self) -> &mut Controller {
        &mut self.opponent_controller
    }

    /// Advance into (or through) a match: flush whatever input is pending,
    /// then step frames, navigating menus as they come up, until the game is
    /// in a live match. When already in one, this advances exactly one frame.
    pub fn step_match_frame(&mut self) -> Result<(), MeleeError> {
        self.controller.flush()?;
        self.opponent_controller.flush()?;
        while !self.step_helper(false)? {}
        Ok(())
    }

    /// Forcibly reset the current match: spam the reset combo until the game
    /// leaves the match, then step until a fresh match is live. Each phase is
    /// bounded by [`RESET_WATCHDOG_FRAMES`]; exceeding the bound means the
    /// emulator is unresponsive, so it is terminated and the error is fatal.
    pub fn reset_match(&mut self) -> Result<(), MeleeError> {
        self.controller.empty_input();
        self.controller.flush()?;
        self.opponent_controller.empty_input();
        self.opponent_controller.flush()?;

        // Phase 1: get to the first frame outside the match.
        let mut iterations = 0u32;
        while !self.step_helper(true)? {
            iterations += 1;
            if iterations >= RESET_WATCHDOG_FRAMES {
                return Err(self.fatal_unresponsive(iterations));
            }
        }

        // Phase 2: get to the first frame inside the next match.
        iterations = 0;
        while !self.step_helper(false)? {
            iterations += 1;
            if iterations >= RESET_WATCHDOG_FRAMES {
                return Err(self.fatal_unresponsive(iterations));
            }
        }
        Ok(())
    }

    fn fatal_unresponsive(&mut self, iterations: u32) -> MeleeError {
        log::error!(
            "no menu transition after {} frames; terminating emulator",
            iterations
        );
        self.emulator.terminate();
        MeleeError::UnresponsiveReset { iterations }
    }

    /// Step one emulator frame and dispatch on the resulting screen.
    ///
    /// Returns `Ok(true)` when the step loop should stop: in a live match
    /// normally, or back on a menu when `resetting`.
    fn step_helper(&mut self, resetting: bool) -> Result<bool, MeleeError> {
        if self.shutdown.is_cancelled() {
            log::info!("shutdown requested; terminating emulator");
            self.emulator.terminate();
            return Err(MeleeError::Interrupted);
        }

        let gamestate = self.source.next_frame()?;
        if gamestate.processing_time_ms > FRAME_BUDGET_MS {
            log::warn!(
                "frame {} took {:.1}ms to process",
                gamestate.frame,
                gamestate.processing_time_ms
            );
        }

        if gamestate.menu_state.in_match() {
            self.latest = gamestate;
            if resetting {
                menu::reset_match(&mut self.controller);
                self.controller.flush()?;
                return Ok(false);
            }
            return Ok(true);
        }

        match gamestate.menu_state {
            Menu::CharacterSelect => {
                menu::choose_character(
                    self.setup.character,
                    &gamestate,
                    self.controller.port(),
                    &mut self.controller,
                    CharSelectOptions {
                        start: true,
                        make_cpu: false,
                    },
                );
                if self.first_match {
                    // Opponent setup happens once. Repeating it on later
                    // matches would undo choices made by hand in between
                    // (switching a human opponent back to CPU, for example).
                    let make_cpu = self.setup.opponent == OpponentKind::Cpu;
                    menu::choose_character(
                        self.setup.opponent_character,
                        &gamestate,
                        self.opponent_controller.port(),
                        &mut self.opponent_controller,
                        CharSelectOptions {
                            start: true,
                            make_cpu,
                        },
                    );
                }
            }
            Menu::PostgameScores => {
                menu::spam_start(&mut self.controller);
                menu::spam_start(&mut self.opponent_controller);
            }
            Menu::StageSelect => {
                self.first_match = false;
                menu::choose_stage(self.setup.stage, &gamestate, &mut self.controller);
            }
            _ => {}
        }

        self.latest = gamestate;
        // Both pads must be committed before the next frame read or Dolphin
        // stalls waiting for input.
        self.controller.flush()?;
        self.opponent_controller.flush()?;
        Ok(resetting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gamestate::PlayerState;

    struct FnSource<F>(F);

    impl<F: FnMut() -> GameState> GamestateSource for FnSource<F> {
        fn next_frame(&mut self) -> Result<GameState, MeleeError> {
            Ok((self.0)())
        }
    }

    #[derive(Clone, Default)]
    struct FakeEmulator {
        terminated: Arc<AtomicBool>,
    }

    impl FakeEmulator {
        fn is_terminated(&self) -> bool {
            self.terminated.load(Ordering::SeqCst)
        }
    }

    impl EmulatorHandle for FakeEmulator {
        fn terminate(&mut self) {
            self.terminated.store(true, Ordering::SeqCst);
        }
    }

    fn pad(port: u8) -> Controller {
        let mut c = Controller::new(port);
        c.connect(Box::new(std::io::sink()));
        c
    }

    fn in_game() -> GameState {
        GameState {
            menu_state: Menu::InGame,
            ..GameState::default()
        }
    }

    fn postgame(frame: u32) -> GameState {
        GameState {
            menu_state: Menu::PostgameScores,
            frame,
            ..GameState::default()
        }
    }

    fn advancer<F: FnMut() -> GameState>(
        frames: F,
    ) -> (FrameAdvancer<FnSource<F>, FakeEmulator>, FakeEmulator) {
        let emulator = FakeEmulator::default();
        let adv = FrameAdvancer::new(
            FnSource(frames),
            emulator.clone(),
            pad(2),
            pad(1),
            MatchSetup::default(),
            ShutdownToken::new(),
        );
        (adv, emulator)
    }

    #[test]
    fn step_returns_once_in_match() {
        let mut n = 0u32;
        let (mut adv, _) = advancer(move || {
            n += 1;
            if n <= 3 {
                postgame(n)
            } else {
                in_game()
            }
        });
        adv.step_match_frame().unwrap();
        assert!(adv.gamestate().in_match());
    }

    #[test]
    fn slow_frames_warn_but_do_not_fail() {
        let (mut adv, emulator) = advancer(|| {
            let mut gs = in_game();
            gs.processing_time_ms = 48.0;
            gs
        });
        adv.step_match_frame().unwrap();
        assert!(!emulator.is_terminated());
    }

    #[test]
    fn reset_watchdog_fatal_at_bound() {
        // The game never leaves the match: phase 1 must trip the watchdog,
        // kill the emulator, and surface a fatal error.
        let (mut adv, emulator) = advancer(in_game);
        let err = adv.reset_match().unwrap_err();
        match err {
            MeleeError::UnresponsiveReset { iterations } => {
                assert_eq!(iterations, RESET_WATCHDOG_FRAMES)
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(emulator.is_terminated());
    }

    #[test]
    fn reset_watchdog_spares_one_below_bound() {
        // Leave the match on the last allowed iteration, then come right
        // back: both phases finish without tripping.
        let mut n = 0u32;
        let (mut adv, emulator) = advancer(move || {
            n += 1;
            if n <= RESET_WATCHDOG_FRAMES - 1 {
                in_game()
            } else if n == RESET_WATCHDOG_FRAMES {
                postgame(0)
            } else {
                in_game()
            }
        });
        adv.reset_match().unwrap();
        assert!(!emulator.is_terminated());
    }

    #[test]
    fn reset_spams_combo_while_in_match() {
        use std::io::Write;
        use std::sync::Mutex;

        #[derive(Clone, Default)]
        struct SharedSink(Arc<Mutex<Vec<u8>>>);
        impl Write for SharedSink {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let sink = SharedSink::default();
        let mut controller = Controller::new(2);
        controller.connect(Box::new(sink.clone()));

        let mut n = 0u32;
        let mut adv = FrameAdvancer::new(
            FnSource(move || {
                n += 1;
                if n <= 4 {
                    in_game()
                } else {
                    postgame(0)
                }
            }),
            FakeEmulator::default(),
            controller,
            pad(1),
            MatchSetup::default(),
            ShutdownToken::new(),
        );
        // Phase 1 only: step until out of the match.
        adv.controller.empty_input();
        adv.controller.flush().unwrap();
        while !adv.step_helper(true).unwrap() {}
        let out = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        // The in-match frames must have committed the full reset chord.
        assert!(out.contains("PRESS START\nPRESS L\nPRESS R"));
        assert!(out.contains("PRESS A"));
    }

    #[test]
    fn cancellation_terminates_emulator() {
        let token = ShutdownToken::new();
        let emulator = FakeEmulator::default();
        let mut adv = FrameAdvancer::new(
            FnSource(in_game),
            emulator.clone(),
            pad(2),
            pad(1),
            MatchSetup::default(),
            token.clone(),
        );
        token.cancel();
        assert!(matches!(
            adv.step_match_frame(),
            Err(MeleeError::Interrupted)
        ));
        assert!(emulator.is_terminated());
    }

    #[test]
    fn opponent_setup_only_before_first_stage_select() {
        // Stage select clears the first-match flag; on the next character
        // select only our own pad is driven.
        let mut n = 0u32;
        let (mut adv, _) = advancer(move || {
            n += 1;
            match n {
                1 => GameState {
                    menu_state: Menu::StageSelect,
                    frame: 30,
                    stage_select_x: 6.7,
                    stage_select_y: -9.0,
                    ..GameState::default()
                },
                2 => GameState {
                    menu_state: Menu::CharacterSelect,
                    frame: 5,
                    players: [PlayerState::default(); 4],
                    ..GameState::default()
                },
                _ => in_game(),
            }
        });
        adv.step_match_frame().unwrap();
        // Character select at frame 5 raises our cursor; the opponent pad
        // must have stayed neutral on that frame.
        assert_eq!(adv.controller.prev().main_stick, (0.5, 1.0));
        assert!(adv.opponent_controller.prev().is_neutral());
    }
}
