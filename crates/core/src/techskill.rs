//! Illustrative in-match input, kept as a placeholder for real gameplay
//! logic. The only entry point is Fox's multishine loop.

use crate::controller::{AnalogStick, Button, Controller};
use crate::gamestate::{Action, PlayerState};

/// Repeatedly shine and jump-cancel as Fox. Call once per in-match frame.
/// Placeholder quality: no DI, no opponent awareness.
pub fn multishine(player: &PlayerState, controller: &mut Controller) {
    match player.action {
        Action::Standing => {
            controller.press_button(Button::B);
            controller.tilt_analog(AnalogStick::Main, 0.5, 0.0);
        }
        Action::KneeBend => {
            // Shine comes out on frame 3 of jumpsquat; earlier presses whiff.
            if player.action_frame == 3 {
                controller.press_button(Button::B);
                controller.tilt_analog(AnalogStick::Main, 0.5, 0.0);
            } else {
                controller.empty_input();
            }
        }
        Action::DownBGroundStart | Action::DownBAir if player.action_frame >= 3 => {
            // Jump-cancel the shine as soon as it can be interrupted.
            controller.press_button(Button::Y);
        }
        _ => controller.empty_input(),
    }
}
