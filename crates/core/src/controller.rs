//! Virtual GameCube pad with accumulate-then-flush semantics.
//!
//! Navigation routines mutate the working state during a frame; nothing
//! reaches Dolphin until [`Controller::flush`] serializes the whole state down
//! the pad's named pipe. The last flushed state is kept as `prev` so routines
//! can detect press edges across frame boundaries instead of re-issuing the
//! same press every frame (which the pipe protocol would buffer into a stuck
//! input).

use std::io::Write;

use crate::MeleeError;

/// Digital buttons on a GameCube pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Button {
    A = 0,
    B = 1,
    X = 2,
    Y = 3,
    Z = 4,
    Start = 5,
    L = 6,
    R = 7,
    DUp = 8,
    DDown = 9,
    DLeft = 10,
    DRight = 11,
}

impl Button {
    pub const ALL: [Button; 12] = [
        Button::A,
        Button::B,
        Button::X,
        Button::Y,
        Button::Z,
        Button::Start,
        Button::L,
        Button::R,
        Button::DUp,
        Button::DDown,
        Button::DLeft,
        Button::DRight,
    ];

    /// Name used by Dolphin's pipe-input protocol.
    fn pipe_name(self) -> &'static str {
        match self {
            Button::A => "A",
            Button::B => "B",
            Button::X => "X",
            Button::Y => "Y",
            Button::Z => "Z",
            Button::Start => "START",
            Button::L => "L",
            Button::R => "R",
            Button::DUp => "D_UP",
            Button::DDown => "D_DOWN",
            Button::DLeft => "D_LEFT",
            Button::DRight => "D_RIGHT",
        }
    }
}

/// The two analog sticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalogStick {
    Main,
    C,
}

/// One pad's complete desired state for a frame. Sticks are held positions in
/// [0,1] on both axes with (0.5, 0.5) as neutral; shoulder sliders are [0,1]
/// with 0 released.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerState {
    buttons: [bool; 12],
    pub main_stick: (f32, f32),
    pub c_stick: (f32, f32),
    pub l_shoulder: f32,
    pub r_shoulder: f32,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            buttons: [false; 12],
            main_stick: (0.5, 0.5),
            c_stick: (0.5, 0.5),
            l_shoulder: 0.0,
            r_shoulder: 0.0,
        }
    }
}

impl ControllerState {
    pub fn button(&self, button: Button) -> bool {
        self.buttons[button as usize]
    }

    fn set_button(&mut self, button: Button, pressed: bool) {
        self.buttons[button as usize] = pressed;
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }
}

/// A virtual pad bound to one controller port.
///
/// Holds the two-slot pair: `current` is the working state accumulated this
/// frame, `prev` is the last state actually committed to Dolphin. Only
/// [`flush`](Controller::flush) may copy working into committed.
pub struct Controller {
    port: u8,
    current: ControllerState,
    prev: ControllerState,
    pipe: Option<Box<dyn Write + Send>>,
}

impl Controller {
    /// Create an unconnected pad for `port` (1-4). Connect it only after
    /// Dolphin is running; opening the pipe earlier blocks forever.
    pub fn new(port: u8) -> Self {
        Self {
            port,
            current: ControllerState::default(),
            prev: ControllerState::default(),
            pipe: None,
        }
    }

    /// Attach the pad's write side (normally the named pipe from
    /// [`Dolphin::connect_pad`](crate::Dolphin::connect_pad)).
    pub fn connect(&mut self, sink: Box<dyn Write + Send>) {
        self.pipe = Some(sink);
    }

    pub fn port(&self) -> u8 {
        self.port
    }

    /// Working state for the frame being accumulated.
    pub fn current(&self) -> &ControllerState {
        &self.current
    }

    /// Last state committed to the emulator.
    pub fn prev(&self) -> &ControllerState {
        &self.prev
    }

    pub fn press_button(&mut self, button: Button) {
        self.current.set_button(button, true);
    }

    pub fn release_button(&mut self, button: Button) {
        self.current.set_button(button, false);
    }

    /// Hold an analog shoulder slider at `amount` (clamped to [0,1]).
    /// Buttons other than L/R are ignored.
    pub fn press_shoulder(&mut self, button: Button, amount: f32) {
        let amount = amount.clamp(0.0, 1.0);
        match button {
            Button::L => self.current.l_shoulder = amount,
            Button::R => self.current.r_shoulder = amount,
            _ => {}
        }
    }

    /// Hold a stick at (x, y), clamped to [0,1] per axis.
    pub fn tilt_analog(&mut self, stick: AnalogStick, x: f32, y: f32) {
        let pos = (x.clamp(0.0, 1.0), y.clamp(0.0, 1.0));
        match stick {
            AnalogStick::Main => self.current.main_stick = pos,
            AnalogStick::C => self.current.c_stick = pos,
        }
    }

    /// Reset the working state to neutral: all buttons up, sticks centered,
    /// shoulders released.
    pub fn empty_input(&mut self) {
        self.current = ControllerState::default();
    }

    /// Commit the working state to Dolphin. The full state is written every
    /// flush (the pipe protocol's unit of input), then copied into `prev`, and
    /// the working state returns to neutral. Callers must flush exactly once
    /// per frame even when nothing changed, or the emulator stalls waiting
    /// for input.
    pub fn flush(&mut self) -> Result<(), MeleeError> {
        let pipe = self
            .pipe
            .as_mut()
            .ok_or(MeleeError::PadNotConnected(self.port))?;
        for button in Button::ALL {
            let verb = if self.current.button(button) {
                "PRESS"
            } else {
                "RELEASE"
            };
            writeln!(pipe, "{} {}", verb, button.pipe_name())?;
        }
        let (mx, my) = self.current.main_stick;
        writeln!(pipe, "SET MAIN {} {}", mx, my)?;
        let (cx, cy) = self.current.c_stick;
        writeln!(pipe, "SET C {} {}", cx, cy)?;
        writeln!(pipe, "SET L {}", self.current.l_shoulder)?;
        writeln!(pipe, "SET R {}", self.current.r_shoulder)?;
        pipe.flush()?;

        self.prev = self.current;
        self.current = ControllerState::default();
        Ok(())
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("port", &self.port)
            .field("current", &self.current)
            .field("prev", &self.prev)
            .field("connected", &self.pipe.is_some())
            .finish()
    }
}
