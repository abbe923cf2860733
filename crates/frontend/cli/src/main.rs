use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use melee_core::{
    techskill, Controller, Dolphin, DolphinConfig, FrameAdvancer, MatchSetup, MeleeError,
    MemoryWatcher, OpponentKind, PadType, ShutdownToken,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OpponentArg {
    Human,
    Cpu,
    Bot,
}

impl From<OpponentArg> for OpponentKind {
    fn from(arg: OpponentArg) -> Self {
        match arg {
            OpponentArg::Human => OpponentKind::Human,
            OpponentArg::Cpu => OpponentKind::Cpu,
            OpponentArg::Bot => OpponentKind::Bot,
        }
    }
}

#[derive(Parser)]
#[command(name = "meleebot", about = "Drive Melee in Dolphin as a bot")]
struct Args {
    /// Controller port the bot plays on
    #[arg(short = 'p', long, default_value_t = 2,
          value_parser = clap::value_parser!(u8).range(1..=4))]
    port: u8,

    /// Controller port the opponent plays on
    #[arg(short = 'o', long, default_value_t = 1,
          value_parser = clap::value_parser!(u8).range(1..=4))]
    opponent: u8,

    /// Path to an SSBM v1.02 ISO
    #[arg(long, required = true)]
    iso_path: PathBuf,

    /// Emulation speed override (1.0 = realtime, 0 = unlimited)
    #[arg(long)]
    speed: Option<f32>,

    /// Run Dolphin without rendering
    #[arg(long, default_value_t = false)]
    headless: bool,

    /// What is plugged into the opponent port
    #[arg(long, value_enum, default_value_t = OpponentArg::Cpu)]
    opponent_kind: OpponentArg,

    /// Print each in-match snapshot as JSON on stderr (very noisy)
    #[arg(long, default_value_t = false)]
    dump_state: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    anyhow::ensure!(
        args.port != args.opponent,
        "bot and opponent must use different ports"
    );

    match run(&args) {
        Err(err) if matches!(err.downcast_ref::<MeleeError>(), Some(MeleeError::Interrupted)) => {
            println!("Shutting down cleanly...");
            Ok(())
        }
        other => other,
    }
}

fn run(args: &Args) -> Result<()> {
    let mut config = DolphinConfig::new(args.port, args.opponent);
    config.emulation_speed = args.speed;
    config.render = !args.headless;
    config.opponent_type = match args.opponent_kind {
        OpponentArg::Human => PadType::GcnAdapter,
        _ => PadType::Standard,
    };
    let mut dolphin = Dolphin::new(config);

    // The watcher socket must have a listener before Dolphin boots.
    let source = MemoryWatcher::bind(dolphin.watcher_socket_path())
        .context("binding the MemoryWatcher socket")?;
    dolphin.run(&args.iso_path).context("launching Dolphin")?;

    // Pads connect only after launch; the pipes have no reader before that.
    let mut controller = Controller::new(args.port);
    dolphin.connect_pad(&mut controller)?;
    let mut opponent_controller = Controller::new(args.opponent);
    dolphin.connect_pad(&mut opponent_controller)?;

    let shutdown = ShutdownToken::new();
    let token = shutdown.clone();
    ctrlc::set_handler(move || token.cancel()).context("installing ctrl-c handler")?;

    let setup = MatchSetup {
        opponent: args.opponent_kind.into(),
        ..MatchSetup::default()
    };
    let mut advancer = FrameAdvancer::new(
        source,
        dolphin,
        controller,
        opponent_controller,
        setup,
        shutdown,
    );

    log::info!("session up; navigating to the first match");
    loop {
        // Returns once per in-match frame, navigating menus along the way.
        advancer.step_match_frame()?;
        if args.dump_state {
            eprintln!("{}", serde_json::to_string(advancer.gamestate())?);
        }
        let player = *advancer.gamestate().player(args.port);
        techskill::multishine(&player, advancer.controller_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_range_is_validated_at_parse_time() {
        let err = Args::try_parse_from(["meleebot", "--iso-path", "m.iso", "-p", "5"]);
        assert!(err.is_err());
        let ok = Args::try_parse_from(["meleebot", "--iso-path", "m.iso", "-p", "4"]);
        assert!(ok.is_ok());
    }

    #[test]
    fn iso_path_is_required() {
        assert!(Args::try_parse_from(["meleebot"]).is_err());
    }
}
