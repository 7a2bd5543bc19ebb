use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use labctl_backend::LudlStage;
use labctl_core::stage::Axes;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();

    let cli = Cli::parse();
    match cli.execute() {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            error!("{}", msg);
            ExitCode::from(1)
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "labctl", about = "Patch rig control: stage commands and seal tests")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn execute(self) -> Result<(), String> {
        match self.command {
            Command::Stage(args) => stage_command(args),
            #[cfg(feature = "nidaqmx")]
            Command::Seal(args) => seal::seal_command(args),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one command to the Ludl stage.
    Stage(StageArgs),
    /// Run a patch clamp protocol and log batch statistics.
    #[cfg(feature = "nidaqmx")]
    Seal(seal::SealArgs),
}

#[derive(Args, Debug)]
struct StageArgs {
    /// Serial port of the controller, e.g. /dev/ttyUSB0 or COM3.
    port: String,
    #[command(subcommand)]
    action: StageAction,
}

#[derive(Subcommand, Debug)]
enum StageAction {
    /// Print the current position.
    Where,
    /// Absolute move.
    Move {
        #[arg(allow_hyphen_values = true)]
        x: i64,
        #[arg(allow_hyphen_values = true)]
        y: i64,
    },
    /// Absolute move along a straight line.
    Vmove {
        #[arg(allow_hyphen_values = true)]
        x: i64,
        #[arg(allow_hyphen_values = true)]
        y: i64,
    },
    /// Relative move on one or both axes.
    Movrel {
        #[arg(long, allow_hyphen_values = true)]
        x: Option<i64>,
        #[arg(long, allow_hyphen_values = true)]
        y: Option<i64>,
    },
    Home,
    /// Declare the current position as the origin.
    Zero,
    /// Report whether the motors have stopped.
    Status,
    Joystick {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Reset the controller.
    Reset,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    On,
    Off,
}

fn stage_command(args: StageArgs) -> Result<(), String> {
    let stage = LudlStage::open(&args.port);
    let acked = match args.action {
        StageAction::Where => {
            let pos = stage
                .position()
                .ok_or_else(|| format!("No position from stage on {}", args.port))?;
            println!("{} {}", pos.x, pos.y);
            return Ok(());
        }
        StageAction::Status => {
            let stopped = stage.motors_stopped();
            println!("{}", if stopped { "stopped" } else { "moving" });
            return Ok(());
        }
        StageAction::Move { x, y } => stage.move_abs(x, y),
        StageAction::Vmove { x, y } => stage.move_vec(x, y),
        StageAction::Movrel { x, y } => {
            let axes = match (x, y) {
                (Some(x), Some(y)) => Axes::XY(x, y),
                (Some(x), None) => Axes::X(x),
                (None, Some(y)) => Axes::Y(y),
                (None, None) => return Err("movrel needs --x, --y or both".to_string()),
            };
            stage.move_rel(axes)
        }
        StageAction::Home => stage.home(),
        StageAction::Zero => stage.set_zero(),
        StageAction::Joystick { state } => stage.joystick(matches!(state, Toggle::On)),
        StageAction::Reset => stage.reset(),
    };
    if acked {
        info!("Stage command sent");
        Ok(())
    } else {
        Err(format!("Stage on {} did not accept the command", args.port))
    }
}

#[cfg(feature = "nidaqmx")]
mod seal {
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    use clap::Args;
    use tracing::info;

    use labctl_backend::{batch_channel, NiDaq, Protocol, SealTest};
    use labctl_core::config::RigConfig;

    #[derive(Args, Debug)]
    pub struct SealArgs {
        /// seal, hold, current-clamp or zap.
        #[arg(long, default_value = "seal")]
        protocol: Protocol,
        /// How long to run a continuous protocol, in seconds.
        #[arg(long, default_value = "5", value_parser = parse_seconds)]
        seconds: Duration,
        /// Rig configuration (JSON). Built-in wiring when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    }

    fn parse_seconds(arg: &str) -> Result<Duration, String> {
        let seconds: f64 = arg.parse().map_err(|e| format!("{}", e))?;
        Duration::try_from_secs_f64(seconds)
            .map_err(|_| format!("expected a finite, non-negative duration, got {}", arg))
    }

    pub fn seal_command(args: SealArgs) -> Result<(), String> {
        let config = match &args.config {
            Some(path) => RigConfig::from_json_file(path).map_err(|e| e.to_string())?,
            None => RigConfig::default(),
        };
        let mut test =
            SealTest::new(NiDaq, args.protocol, &config).map_err(|e| e.to_string())?;

        let (consumer, rx) = batch_channel();
        test.start(consumer).map_err(|e| e.to_string())?;
        if args.protocol == Protocol::Zap {
            return test.join().map_err(|e| e.to_string());
        }

        let started = Instant::now();
        let mut nbatches = 0usize;
        let (mut primary_sum, mut secondary_sum, mut nsamps) = (0., 0., 0usize);
        while started.elapsed() < args.seconds {
            if let Ok(batch) = rx.recv_timeout(Duration::from_millis(100)) {
                nbatches += 1;
                nsamps += batch.chunk_size();
                primary_sum += batch.primary().sum();
                secondary_sum += batch.secondary().map_or(0., |chan| chan.sum());
            }
        }
        test.stop().map_err(|e| e.to_string())?;

        let n = nsamps.max(1) as f64;
        info!(
            "{} batches, mean primary {:.6} V, mean secondary {:.6} V",
            nbatches,
            primary_sum / n,
            secondary_sum / n
        );
        Ok(())
    }

}
