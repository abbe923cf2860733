//! Frame-synchronized menu navigation.
//!
//! Every routine here is called once per frame while its screen is up and
//! performs exactly one controller mutation per call. All timing is keyed to
//! the per-screen frame counter (which resets on menu entry), never to wall
//! time, so a session replays deterministically at any emulation speed.

use crate::controller::{AnalogStick, Button, Controller};
use crate::gamestate::{Character, ControllerStatus, GameState, Stage};

/// Positional tolerance when servoing a cursor toward a target.
pub const WIGGLE_ROOM: f32 = 1.5;

/// Frames spent lifting the cursor above the character icons after entering
/// the select screen. Automatic match start fails unless every cursor is
/// raised above the icon rows first.
const CURSOR_RAISE_FRAMES: u32 = 18;

/// Frame the scripted CPU-toggle macro ends (exclusive).
const CPU_TOGGLE_END: u32 = 45;

/// Stage select fades in; inputs during the fade are dropped by the game.
const STAGE_FADE_IN_FRAMES: u32 = 20;

// Character-select grid geometry: cell centers in cursor units, rows numbered
// bottom-up. Assumes the full roster is unlocked; positions are wrong
// otherwise.
const CSS_ORIGIN_X: f32 = -27.0;
const CSS_ORIGIN_Y: f32 = 2.0;
const CSS_CELL_W: f32 = 6.8;
const CSS_CELL_H: f32 = 7.0;

/// Grid cell for a character: (row, column) with rows numbered bottom-up.
/// The random slot pushes the bottom row over one column.
pub fn css_cell(character: Character) -> (u8, u8) {
    // Random sits in the bottom-left cell that the shift makes room for.
    if character == Character::Random {
        return (0, 0);
    }
    let slot = character.css_slot();
    let row = slot / 9;
    let mut column = slot % 9;
    if row == 2 {
        column += 1;
    }
    (2 - row, column)
}

/// Cursor-space center of a character's icon.
pub fn css_target(character: Character) -> (f32, f32) {
    let (row, column) = css_cell(character);
    (
        CSS_ORIGIN_X + CSS_CELL_W * column as f32,
        CSS_ORIGIN_Y + CSS_CELL_H * row as f32,
    )
}

/// Y-before-X cursor servo. Corrects at most one axis per call (Y takes
/// priority, producing the L-shaped path the rest of the code and the tests
/// rely on) and returns true once the cursor is inside the tolerance window
/// on both axes.
fn servo_toward(controller: &mut Controller, cursor: (f32, f32), target: (f32, f32)) -> bool {
    let (cx, cy) = cursor;
    let (tx, ty) = target;
    if cy < ty - WIGGLE_ROOM {
        controller.release_button(Button::A);
        controller.tilt_analog(AnalogStick::Main, 0.5, 1.0);
        return false;
    }
    if cy > ty + WIGGLE_ROOM {
        controller.release_button(Button::A);
        controller.tilt_analog(AnalogStick::Main, 0.5, 0.0);
        return false;
    }
    if cx < tx - WIGGLE_ROOM {
        controller.release_button(Button::A);
        controller.tilt_analog(AnalogStick::Main, 1.0, 0.5);
        return false;
    }
    if cx > tx + WIGGLE_ROOM {
        controller.release_button(Button::A);
        controller.tilt_analog(AnalogStick::Main, 0.0, 0.5);
        return false;
    }
    true
}

/// One scripted step of the CPU-toggle macro: applies while `frame < until`.
struct MacroStep {
    until: u32,
    buttons: &'static [Button],
    stick: (f32, f32),
}

// Hard-coded against known menu timing (pluck the port token, pull it down to
// the status toggle, slide across to CPU, confirm, hand the cursor back).
// Deliberately not derived from cursor state.
const CPU_TOGGLE_MACRO: &[MacroStep] = &[
    MacroStep { until: 19, buttons: &[Button::A], stick: (0.5, 0.5) },
    MacroStep { until: 20, buttons: &[], stick: (0.5, 0.5) },
    MacroStep { until: 21, buttons: &[Button::A], stick: (0.5, 0.5) },
    MacroStep { until: 22, buttons: &[], stick: (0.5, 0.5) },
    MacroStep { until: 33, buttons: &[], stick: (0.5, 0.0) },
    MacroStep { until: 34, buttons: &[Button::A], stick: (1.0, 0.5) },
    MacroStep { until: 42, buttons: &[], stick: (1.0, 0.5) },
    MacroStep { until: 43, buttons: &[Button::A], stick: (0.5, 0.5) },
    MacroStep { until: CPU_TOGGLE_END, buttons: &[], stick: (0.5, 0.5) },
];

fn apply_cpu_toggle(frame: u32, controller: &mut Controller) {
    for step in CPU_TOGGLE_MACRO {
        if frame < step.until {
            controller.empty_input();
            for &button in step.buttons {
                controller.press_button(button);
            }
            let (x, y) = step.stick;
            controller.tilt_analog(AnalogStick::Main, x, y);
            return;
        }
    }
}

/// Options for [`choose_character`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CharSelectOptions {
    /// Toggle START once the match can begin.
    pub start: bool,
    /// Run the scripted macro that flips this port to a CPU player first.
    pub make_cpu: bool,
}

/// Drive one port's cursor to `character` on the character select screen.
/// Call once per frame while the screen is up.
///
/// Phases: raise the cursor above the icon rows (frames 0-17), optionally run
/// the CPU-toggle macro (frames 18-44), then servo the live cursor onto the
/// target cell, drop the coin with A, and verify the lock before releasing.
/// With `start` set, START is toggled on rising edges only once the match is
/// ready, so it can never re-trigger.
pub fn choose_character(
    character: Character,
    gamestate: &GameState,
    port: u8,
    controller: &mut Controller,
    opts: CharSelectOptions,
) {
    // Holding B backs out of the whole menu; clear it before anything else.
    if controller.prev().button(Button::B) || controller.current().button(Button::B) {
        controller.release_button(Button::B);
    }

    if gamestate.frame < CURSOR_RAISE_FRAMES {
        controller.tilt_analog(AnalogStick::Main, 0.5, 1.0);
        return;
    }

    if opts.make_cpu && gamestate.frame < CPU_TOGGLE_END {
        apply_cpu_toggle(gamestate.frame, controller);
        return;
    }

    let player = gamestate.player(port);
    if player.character == Some(character) && player.coin_down {
        // Locked in. Stay put; optionally toggle START on the rising edge.
        controller.release_button(Button::A);
        if opts.start && player.ready_to_start {
            if controller.prev().button(Button::Start) {
                controller.release_button(Button::Start);
            } else {
                controller.press_button(Button::Start);
            }
        }
        return;
    }

    let cursor = (player.cursor_x, player.cursor_y);
    if servo_toward(controller, cursor, css_target(character)) {
        // On the cell: drop the coin.
        controller.press_button(Button::A);
    }
}

/// Cursor-space target for each stage slot on the stage select screen.
fn stage_target(stage: Stage) -> (f32, f32) {
    match stage {
        Stage::Battlefield => (1.0, -9.0),
        Stage::FinalDestination => (6.7, -9.0),
        Stage::Dreamland => (12.5, -9.0),
        Stage::PokemonStadium => (15.0, 3.5),
        Stage::YoshisStory => (3.5, 15.5),
        Stage::FountainOfDreams => (10.0, 15.5),
        Stage::Random => (-13.5, 3.5),
    }
}

/// Drive the shared stage-select cursor to `stage` and confirm with A.
/// Call once per frame while the screen is up. The first 20 frames are a
/// forced no-op while the screen fades in.
pub fn choose_stage(stage: Stage, gamestate: &GameState, controller: &mut Controller) {
    if gamestate.frame < STAGE_FADE_IN_FRAMES {
        controller.empty_input();
        return;
    }
    let cursor = (gamestate.stage_select_x, gamestate.stage_select_y);
    if servo_toward(controller, cursor, stage_target(stage)) {
        controller.press_button(Button::A);
    }
}

// Port-status box targets on the character select screen. One X per port,
// shared Y row under the icon grid.
const PORT_STATUS_X: [f32; 4] = [-31.5, -16.5, -1.0, 14.0];
const PORT_STATUS_Y: f32 = -2.2;

/// Servo onto `target_port`'s status box and toggle A until the port shows
/// the requested `(status, character)` pair.
///
/// Preconditions: `target_port` must be 1-4 (panics otherwise), and — an
/// emulator rule that cannot be worked around here — only the pad that owns a
/// port may change that port's status away from occupied. Calling this
/// against another pad's occupied port spins forever.
pub fn change_controller_status(
    controller: &mut Controller,
    gamestate: &GameState,
    target_port: u8,
    status: ControllerStatus,
    character: Option<Character>,
) {
    debug_assert!(
        (1..=4).contains(&target_port),
        "port {target_port} outside 1-4"
    );
    let target = gamestate.player(target_port);
    let done = target.controller_status == status
        && character.map_or(true, |c| target.character == Some(c));
    if done {
        controller.empty_input();
        return;
    }

    let own = gamestate.player(controller.port());
    let cursor = (own.cursor_x, own.cursor_y);
    let goal = (PORT_STATUS_X[(target_port - 1) as usize], PORT_STATUS_Y);
    if servo_toward(controller, cursor, goal) {
        // On the box: press A on alternating frames until the status flips.
        if controller.prev().button(Button::A) {
            controller.empty_input();
        } else {
            controller.press_button(Button::A);
        }
    }
}

/// Toggle START on rising edges only, advancing the post-game screens without
/// ever double-triggering. All other inputs are cleared every call so nothing
/// is left held when the menu finally changes.
pub fn spam_start(controller: &mut Controller) {
    let press = !controller.prev().button(Button::Start);
    controller.empty_input();
    if press {
        controller.press_button(Button::Start);
    }
}

/// Alternate pressing START+A+L+R and letting go, triggering the game's
/// built-in match reset combo.
pub fn reset_match(controller: &mut Controller) {
    if controller.prev().button(Button::Start) {
        controller.empty_input();
    } else {
        controller.press_button(Button::Start);
        controller.press_button(Button::A);
        controller.press_button(Button::L);
        controller.press_button(Button::R);
    }
}
