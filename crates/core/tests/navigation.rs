//! End-to-end menu navigation against a simulated cursor.
//!
//! The "game" here applies each committed stick position to the cursor at one
//! unit per frame per axis, which is enough to drive the real routines from a
//! cold screen entry all the way to a locked-in selection.

use melee_core::menu::{self, CharSelectOptions, WIGGLE_ROOM};
use melee_core::{Button, Character, Controller, GameState, Menu, Stage};

const CURSOR_SPEED: f32 = 1.0;

fn pad(port: u8) -> Controller {
    let mut c = Controller::new(port);
    c.connect(Box::new(std::io::sink()));
    c
}

/// Advance a cursor by the stick position committed last flush.
fn apply_stick(cursor: &mut (f32, f32), stick: (f32, f32)) {
    cursor.0 += (stick.0 - 0.5) * 2.0 * CURSOR_SPEED;
    cursor.1 += (stick.1 - 0.5) * 2.0 * CURSOR_SPEED;
}

fn within(cursor: (f32, f32), target: (f32, f32)) -> bool {
    (cursor.0 - target.0).abs() <= WIGGLE_ROOM && (cursor.1 - target.1).abs() <= WIGGLE_ROOM
}

#[test]
fn character_select_reaches_fox_and_starts_once() {
    let mut c = pad(2);
    let opts = CharSelectOptions {
        start: true,
        make_cpu: false,
    };
    let target = menu::css_target(Character::Fox);
    let mut cursor = (0.0f32, 0.0f32);
    let mut coin_down = false;
    let mut starts_pressed = 0;
    let mut a_press_frame = None;
    let mut start_frame = None;

    for frame in 0..300u32 {
        let mut gs = GameState {
            menu_state: Menu::CharacterSelect,
            frame,
            ..GameState::default()
        };
        gs.players[1].cursor_x = cursor.0;
        gs.players[1].cursor_y = cursor.1;
        if coin_down {
            gs.players[1].character = Some(Character::Fox);
            gs.players[1].coin_down = true;
            gs.players[1].ready_to_start = true;
        }

        menu::choose_character(Character::Fox, &gs, 2, &mut c, opts);

        if frame < 18 {
            // Cursor raise phase: stick up, nothing else.
            assert_eq!(c.current().main_stick, (0.5, 1.0), "frame {frame}");
            assert!(!c.current().button(Button::A));
        }
        match a_press_frame {
            None => {
                if c.current().button(Button::A) {
                    // A must only drop once the cursor is in the wiggle window.
                    assert!(within(cursor, target), "early A at {cursor:?}");
                    a_press_frame = Some(frame);
                    coin_down = true;
                }
            }
            Some(af) if frame > af => {
                // Locked in: A stays released and the cursor stays put.
                assert!(!c.current().button(Button::A), "A re-issued after lock");
                assert_eq!(c.current().main_stick, (0.5, 0.5));
            }
            _ => {}
        }
        if c.current().button(Button::Start) {
            starts_pressed += 1;
            start_frame = Some(frame);
        }

        c.flush().unwrap();
        apply_stick(&mut cursor, c.prev().main_stick);

        if let Some(sf) = start_frame {
            if frame > sf {
                // The frame after the press must release, never press again.
                assert!(!c.prev().button(Button::Start));
                break;
            }
        }
    }

    let af = a_press_frame.expect("never converged on Fox");
    assert!(af >= 18, "selection locked during cursor raise");
    assert_eq!(starts_pressed, 1, "START must fire exactly once");
}

#[test]
fn stage_select_reaches_final_destination_y_first() {
    let mut c = pad(1);
    let target = (6.7f32, -9.0f32);
    let mut cursor = (0.0f32, 0.0f32);
    let mut confirmed = false;
    let mut x_moved_before_y_done = false;

    for frame in 0..120u32 {
        let gs = GameState {
            menu_state: Menu::StageSelect,
            frame,
            stage_select_x: cursor.0,
            stage_select_y: cursor.1,
            ..GameState::default()
        };
        menu::choose_stage(Stage::FinalDestination, &gs, &mut c);

        if frame < 20 {
            // Fade-in: forced neutral.
            assert!(c.current().is_neutral(), "frame {frame}");
        }
        let stick = c.current().main_stick;
        let y_off = (cursor.1 - target.1).abs() > WIGGLE_ROOM;
        if stick.0 != 0.5 && y_off {
            x_moved_before_y_done = true;
        }
        if c.current().button(Button::A) {
            assert!(within(cursor, target), "A outside the window at {cursor:?}");
            confirmed = true;
            break;
        }

        c.flush().unwrap();
        apply_stick(&mut cursor, c.prev().main_stick);
    }

    assert!(confirmed, "never confirmed Final Destination");
    assert!(!x_moved_before_y_done, "X corrected while Y was off-target");
}
