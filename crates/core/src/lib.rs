//! Core primitives for driving Melee inside Dolphin as a bot-playable
//! environment: virtual-pad output, per-frame gamestate snapshots, menu
//! navigation, and the frame-synchronized match loop.

pub mod advancer;
pub mod controller;
pub mod dolphin;
pub mod gamestate;
pub mod menu;
pub mod techskill;

pub use advancer::{EmulatorHandle, FrameAdvancer, MatchSetup, OpponentKind, ShutdownToken};
pub use controller::{AnalogStick, Button, Controller, ControllerState};
pub use dolphin::{Dolphin, DolphinConfig, PadType};
pub use gamestate::{
    Action, Character, ControllerStatus, GameState, GamestateSource, MemoryWatcher, Menu,
    PlayerState, Stage,
};

/// Errors surfaced by the core driver.
#[derive(thiserror::Error, Debug)]
pub enum MeleeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("controller pipe for port {0} is not connected")]
    PadNotConnected(u8),
    #[error("Dolphin is not running")]
    NotRunning,
    #[error("malformed memory watcher message: {0:?}")]
    BadMessage(String),
    #[error("emulator unresponsive: no menu transition after {iterations} frames")]
    UnresponsiveReset { iterations: u32 },
    #[error("shutdown requested")]
    Interrupted,
}
