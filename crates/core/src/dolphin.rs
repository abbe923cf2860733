//! Dolphin process lifecycle and transport wiring.
//!
//! Dolphin is an external collaborator with a fixed interface: virtual pads
//! are fed through named pipes under the user directory, and gamestate comes
//! back through the MemoryWatcher socket. This module only launches,
//! configures, and tears down the process; it never looks inside it.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use crate::advancer::EmulatorHandle;
use crate::controller::Controller;
use crate::MeleeError;

/// Backing for a controller port in Dolphin's serial-interface config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadType {
    /// Virtual pad fed through a named pipe.
    Standard,
    /// Passthrough to a real pad on a GCN USB adapter (human opponent).
    GcnAdapter,
    Unplugged,
}

impl PadType {
    fn si_device(self) -> &'static str {
        match self {
            PadType::Standard => "6",
            PadType::GcnAdapter => "12",
            PadType::Unplugged => "0",
        }
    }
}

/// Launch configuration for one Dolphin session.
#[derive(Debug, Clone)]
pub struct DolphinConfig {
    pub ai_port: u8,
    pub opponent_port: u8,
    pub opponent_type: PadType,
    /// None keeps Dolphin's configured speed; Some(0.0) is unlimited.
    pub emulation_speed: Option<f32>,
    pub render: bool,
    /// Dolphin user directory holding `Pipes/` and `MemoryWatcher/`.
    pub home: PathBuf,
    pub executable: PathBuf,
}

impl DolphinConfig {
    pub fn new(ai_port: u8, opponent_port: u8) -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_default()
            .join(".dolphin-emu");
        Self {
            ai_port,
            opponent_port,
            opponent_type: PadType::Standard,
            emulation_speed: None,
            render: true,
            home,
            executable: PathBuf::from("dolphin-emu"),
        }
    }
}

/// A running (or launchable) Dolphin process.
pub struct Dolphin {
    config: DolphinConfig,
    child: Option<Child>,
}

impl Dolphin {
    pub fn new(config: DolphinConfig) -> Self {
        Self {
            config,
            child: None,
        }
    }

    pub fn config(&self) -> &DolphinConfig {
        &self.config
    }

    /// Named pipe feeding a virtual pad on `port`.
    pub fn pipe_path(&self, port: u8) -> PathBuf {
        self.config.home.join("Pipes").join(format!("meleebot{port}"))
    }

    /// Socket the MemoryWatcher publishes gamestate on. Bind it (see
    /// [`MemoryWatcher::bind`](crate::gamestate::MemoryWatcher::bind)) before
    /// calling [`run`](Dolphin::run).
    pub fn watcher_socket_path(&self) -> PathBuf {
        self.config.home.join("MemoryWatcher").join("MemoryWatcher")
    }

    /// Launch Dolphin booting `iso_path`.
    pub fn run(&mut self, iso_path: &Path) -> Result<(), MeleeError> {
        let cfg = &self.config;
        let mut cmd = Command::new(&cfg.executable);
        cmd.arg("--exec").arg(iso_path);
        cmd.arg("--user").arg(&cfg.home);
        if !cfg.render {
            cmd.arg("--batch");
        }
        cmd.arg("-C").arg(format!(
            "Dolphin.Core.SIDevice{}={}",
            cfg.ai_port - 1,
            PadType::Standard.si_device()
        ));
        cmd.arg("-C").arg(format!(
            "Dolphin.Core.SIDevice{}={}",
            cfg.opponent_port - 1,
            cfg.opponent_type.si_device()
        ));
        if let Some(speed) = cfg.emulation_speed {
            cmd.arg("-C")
                .arg(format!("Dolphin.Core.EmulationSpeed={speed}"));
        }
        log::info!("launching {:?}", cmd);
        self.child = Some(cmd.spawn()?);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Open a pad's named pipe and attach it to `controller`. Must be called
    /// only after [`run`](Dolphin::run): opening the write side of a FIFO
    /// blocks until Dolphin has opened the read side.
    pub fn connect_pad(&self, controller: &mut Controller) -> Result<(), MeleeError> {
        if !self.is_running() {
            return Err(MeleeError::NotRunning);
        }
        let path = self.pipe_path(controller.port());
        if !path.exists() {
            return Err(MeleeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!(
                    "pad pipe {} missing; configure Dolphin's pipe input for port {} first",
                    path.display(),
                    controller.port()
                ),
            )));
        }
        let pipe = OpenOptions::new().write(true).open(&path)?;
        controller.connect(Box::new(pipe));
        log::info!("pad {} connected via {}", controller.port(), path.display());
        Ok(())
    }

    /// Synchronously stop the process. Safe to call repeatedly or when the
    /// process was never started.
    pub fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            log::info!("terminating Dolphin (pid {})", child.id());
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl EmulatorHandle for Dolphin {
    fn terminate(&mut self) {
        Dolphin::terminate(self);
    }
}

// The emulator must not outlive the session on any exit path, including
// panics and early returns in the caller.
impl Drop for Dolphin {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipe_paths_live_under_home() {
        let mut cfg = DolphinConfig::new(2, 1);
        cfg.home = PathBuf::from("/tmp/dolphin-test");
        let dolphin = Dolphin::new(cfg);
        assert_eq!(
            dolphin.pipe_path(2),
            PathBuf::from("/tmp/dolphin-test/Pipes/meleebot2")
        );
        assert_eq!(
            dolphin.watcher_socket_path(),
            PathBuf::from("/tmp/dolphin-test/MemoryWatcher/MemoryWatcher")
        );
    }

    #[test]
    fn connect_before_run_fails() {
        let dolphin = Dolphin::new(DolphinConfig::new(2, 1));
        let mut pad = Controller::new(2);
        assert!(matches!(
            dolphin.connect_pad(&mut pad),
            Err(MeleeError::NotRunning)
        ));
    }

    #[test]
    fn run_with_missing_executable_is_an_io_error() {
        let mut cfg = DolphinConfig::new(2, 1);
        cfg.executable = PathBuf::from("/nonexistent/dolphin-emu");
        let mut dolphin = Dolphin::new(cfg);
        assert!(matches!(
            dolphin.run(Path::new("/tmp/melee.iso")),
            Err(MeleeError::Io(_))
        ));
    }

    #[test]
    fn terminate_is_idempotent_without_child() {
        let mut dolphin = Dolphin::new(DolphinConfig::new(2, 1));
        dolphin.terminate();
        dolphin.terminate();
        assert!(!dolphin.is_running());
    }
}
