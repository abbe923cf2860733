//! Per-frame gamestate snapshots read from Dolphin's MemoryWatcher.
//!
//! A [`GameState`] is a read-only view of the game's memory for one emulated
//! frame, fully replaced on every step. The frame counter restarts at zero on
//! each menu transition, so all navigation timing keys off the per-screen
//! counter rather than wall-clock time.

use std::os::unix::net::UnixDatagram;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::MeleeError;

/// Which screen the game is currently on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Menu {
    CharacterSelect,
    StageSelect,
    InGame,
    SuddenDeath,
    PostgameScores,
    /// Any screen the bot has no routine for (main menu, rules, etc).
    Other(u8),
}

impl Menu {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Menu::CharacterSelect,
            1 => Menu::StageSelect,
            2 => Menu::InGame,
            3 => Menu::SuddenDeath,
            4 => Menu::PostgameScores,
            other => Menu::Other(other),
        }
    }

    /// True while a match (including sudden death) is being played.
    pub fn in_match(self) -> bool {
        matches!(self, Menu::InGame | Menu::SuddenDeath)
    }
}

/// Occupancy of a controller port on the character select screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerStatus {
    Human,
    Cpu,
    Unplugged,
}

impl ControllerStatus {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => ControllerStatus::Human,
            1 => ControllerStatus::Cpu,
            _ => ControllerStatus::Unplugged,
        }
    }
}

impl Default for ControllerStatus {
    fn default() -> Self {
        ControllerStatus::Unplugged
    }
}

/// The 25-fighter roster plus the random pseudo-slot, numbered by
/// character-select-screen slot: nine columns per row, top row first,
/// reading left to right. Random is the extra bottom-left cell the
/// bottom-row shift makes room for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Character {
    DrMario = 0,
    Mario = 1,
    Luigi = 2,
    Bowser = 3,
    Peach = 4,
    Yoshi = 5,
    DonkeyKong = 6,
    CaptainFalcon = 7,
    Ganondorf = 8,
    Falco = 9,
    Fox = 10,
    Ness = 11,
    IceClimbers = 12,
    Kirby = 13,
    Samus = 14,
    Zelda = 15,
    Link = 16,
    YoungLink = 17,
    Pichu = 18,
    Pikachu = 19,
    Jigglypuff = 20,
    Mewtwo = 21,
    GameAndWatch = 22,
    Marth = 23,
    Roy = 24,
    Random = 25,
}

impl Character {
    pub const ROSTER: [Character; 25] = [
        Character::DrMario,
        Character::Mario,
        Character::Luigi,
        Character::Bowser,
        Character::Peach,
        Character::Yoshi,
        Character::DonkeyKong,
        Character::CaptainFalcon,
        Character::Ganondorf,
        Character::Falco,
        Character::Fox,
        Character::Ness,
        Character::IceClimbers,
        Character::Kirby,
        Character::Samus,
        Character::Zelda,
        Character::Link,
        Character::YoungLink,
        Character::Pichu,
        Character::Pikachu,
        Character::Jigglypuff,
        Character::Mewtwo,
        Character::GameAndWatch,
        Character::Marth,
        Character::Roy,
    ];

    /// Character-select-screen slot index (0-24 for fighters, 25 for the
    /// random slot).
    pub fn css_slot(self) -> u8 {
        self as u8
    }

    pub fn from_css_slot(slot: u8) -> Option<Character> {
        if slot == Character::Random.css_slot() {
            return Some(Character::Random);
        }
        Character::ROSTER.get(slot as usize).copied()
    }
}

/// Stages selectable on the tournament-legal stage select screen, plus the
/// random slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Battlefield,
    FinalDestination,
    Dreamland,
    PokemonStadium,
    YoshisStory,
    FountainOfDreams,
    Random,
}

/// In-match action states the bot cares about. This is a tiny slice of the
/// game's action-state table, just enough for the multishine macro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Standing,
    KneeBend,
    DownBGroundStart,
    DownBGround,
    DownBAir,
    Other(u16),
}

impl Action {
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0x000e => Action::Standing,
            0x0018 => Action::KneeBend,
            0x0161 => Action::DownBGroundStart,
            0x0162 => Action::DownBGround,
            0x0165 => Action::DownBAir,
            other => Action::Other(other),
        }
    }
}

impl Default for Action {
    fn default() -> Self {
        Action::Other(0)
    }
}

/// One port's slice of the snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PlayerState {
    /// Character-select cursor position for this port.
    pub cursor_x: f32,
    pub cursor_y: f32,
    /// Character currently hovered/locked, if the slot maps to one.
    pub character: Option<Character>,
    /// True once this port's coin has been dropped on a character.
    pub coin_down: bool,
    pub controller_status: ControllerStatus,
    /// True when the match can be started from this port.
    pub ready_to_start: bool,
    /// In-match action state and its frame counter.
    pub action: Action,
    pub action_frame: u32,
}

/// A read-only snapshot of game memory for one emulated frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub menu_state: Menu,
    /// Frames since the current screen was entered. Resets to 0 on every menu
    /// transition; this is the only clock the navigation routines use.
    pub frame: u32,
    /// Stage-select cursor (shared, not per-port).
    pub stage_select_x: f32,
    pub stage_select_y: f32,
    /// Wall time spent producing this snapshot, diagnostic only.
    pub processing_time_ms: f32,
    pub players: [PlayerState; 4],
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            menu_state: Menu::Other(0xff),
            frame: 0,
            stage_select_x: 0.0,
            stage_select_y: 0.0,
            processing_time_ms: 0.0,
            players: [PlayerState::default(); 4],
        }
    }
}

impl GameState {
    /// Player slice for a 1-based controller port. Ports outside 1-4 panic.
    pub fn player(&self, port: u8) -> &PlayerState {
        debug_assert!((1..=4).contains(&port), "port {port} outside 1-4");
        &self.players[(port - 1) as usize]
    }

    pub fn in_match(&self) -> bool {
        self.menu_state.in_match()
    }
}

/// Blocking source of per-frame snapshots.
///
/// `next_frame` suspends until the emulator publishes the next frame. This is
/// the frame loop's only suspension point besides the controller pipe write.
pub trait GamestateSource {
    fn next_frame(&mut self) -> Result<GameState, MeleeError>;
}

// Memory addresses watched in Dolphin's MemoryWatcher config (NTSC 1.02
// globals). Per-player fields live in fixed-stride blocks.
const ADDR_MENU_STATE: u32 = 0x0047_9D30;
const ADDR_FRAME: u32 = 0x0047_9D60;
const ADDR_STAGE_CURSOR_X: u32 = 0x004A_0BB0;
const ADDR_STAGE_CURSOR_Y: u32 = 0x004A_0BB4;
const PLAYER_BLOCK_BASE: u32 = 0x0051_1EC8;
const PLAYER_BLOCK_STRIDE: u32 = 0x40;
const OFF_CURSOR_X: u32 = 0x00;
const OFF_CURSOR_Y: u32 = 0x04;
const OFF_CHARACTER: u32 = 0x08;
const OFF_COIN_DOWN: u32 = 0x0C;
const OFF_CONTROLLER_STATUS: u32 = 0x10;
const OFF_READY_TO_START: u32 = 0x14;
const OFF_ACTION: u32 = 0x18;
const OFF_ACTION_FRAME: u32 = 0x1C;

/// Decodes MemoryWatcher address/value updates into snapshot fields.
/// Split out from the socket so it can be tested without one.
#[derive(Debug, Default)]
pub(crate) struct AddressMap;

impl AddressMap {
    /// Apply one update. Returns true when the update was the frame counter,
    /// i.e. the snapshot for this frame is complete.
    pub(crate) fn apply(&self, state: &mut GameState, address: u32, raw: u32) -> bool {
        match address {
            ADDR_MENU_STATE => {
                let menu = Menu::from_raw(raw as u8);
                if menu != state.menu_state {
                    // New screen: the in-game counter restarts too.
                    state.frame = 0;
                }
                state.menu_state = menu;
            }
            ADDR_FRAME => {
                state.frame = raw;
                return true;
            }
            ADDR_STAGE_CURSOR_X => state.stage_select_x = f32::from_bits(raw),
            ADDR_STAGE_CURSOR_Y => state.stage_select_y = f32::from_bits(raw),
            _ => {
                let Some(rel) = address.checked_sub(PLAYER_BLOCK_BASE) else {
                    return false;
                };
                let (slot, off) = (rel / PLAYER_BLOCK_STRIDE, rel % PLAYER_BLOCK_STRIDE);
                if slot >= 4 {
                    return false;
                }
                let player = &mut state.players[slot as usize];
                match off {
                    OFF_CURSOR_X => player.cursor_x = f32::from_bits(raw),
                    OFF_CURSOR_Y => player.cursor_y = f32::from_bits(raw),
                    OFF_CHARACTER => player.character = Character::from_css_slot(raw as u8),
                    OFF_COIN_DOWN => player.coin_down = raw != 0,
                    OFF_CONTROLLER_STATUS => {
                        player.controller_status = ControllerStatus::from_raw(raw as u8)
                    }
                    OFF_READY_TO_START => player.ready_to_start = raw != 0,
                    OFF_ACTION => player.action = Action::from_raw(raw as u16),
                    OFF_ACTION_FRAME => player.action_frame = raw,
                    _ => {}
                }
            }
        }
        false
    }
}

/// Snapshot source backed by Dolphin's MemoryWatcher unix-datagram socket.
///
/// Dolphin sends one datagram per watched value change, `"<hex address>\n<hex
/// value>\0"`. A frame is complete when the frame-counter address updates.
pub struct MemoryWatcher {
    socket: UnixDatagram,
    map: AddressMap,
    state: GameState,
}

impl MemoryWatcher {
    /// Bind the watcher socket. Must happen before Dolphin starts so the
    /// emulator finds a listener when it opens the socket.
    pub fn bind<P: AsRef<Path>>(path: P) -> Result<Self, MeleeError> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let socket = UnixDatagram::bind(path)?;
        log::info!("memory watcher listening on {}", path.display());
        Ok(Self {
            socket,
            map: AddressMap,
            state: GameState::default(),
        })
    }

    fn parse_message(buf: &[u8]) -> Result<(u32, u32), MeleeError> {
        let text = std::str::from_utf8(buf)
            .map_err(|_| MeleeError::BadMessage(String::from_utf8_lossy(buf).into_owned()))?;
        let text = text.trim_end_matches('\0');
        let bad = || MeleeError::BadMessage(text.to_owned());
        let (addr, value) = text.split_once('\n').ok_or_else(bad)?;
        let addr = u32::from_str_radix(addr.trim(), 16).map_err(|_| bad())?;
        let value = u32::from_str_radix(value.trim(), 16).map_err(|_| bad())?;
        Ok((addr, value))
    }
}

impl GamestateSource for MemoryWatcher {
    fn next_frame(&mut self) -> Result<GameState, MeleeError> {
        let started = Instant::now();
        let mut buf = [0u8; 64];
        loop {
            let n = self.socket.recv(&mut buf)?;
            let (address, raw) = Self::parse_message(&buf[..n])?;
            if self.map.apply(&mut self.state, address, raw) {
                let mut snapshot = self.state.clone();
                snapshot.processing_time_ms = started.elapsed().as_secs_f32() * 1000.0;
                return Ok(snapshot);
            }
        }
    }
}
