use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod race;

/// Port the simulator listens on.
pub const DEFAULT_PORT: u16 = 9091;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load a scene, configure the car and drive it until interrupted.
    Race(RaceArgs),
    /// Connect, optionally send messages, and print what the simulator sends.
    Listen(ListenArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Race(args) => race::run(args),
        Command::Listen(args) => listen::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct RaceArgs {
    /// Path to the driving model.
    #[arg(long)]
    pub model: PathBuf,
    /// Simulator host address.
    #[arg(long)]
    pub host: String,
    /// Simulator port.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Car name shown in the simulator.
    #[arg(long)]
    pub name: String,
    /// Scene to load.
    #[arg(long, default_value = "generated_track")]
    pub scene: String,
    /// Car body style.
    #[arg(long, default_value = "dokney")]
    pub body_style: String,
    /// Car body colour as R,G,B.
    #[arg(long, value_parser = parse_rgb, default_value = "64,64,64")]
    pub body_rgb: [u8; 3],
    /// Font size of the car name label.
    #[arg(long, default_value_t = 100)]
    pub font_size: u32,
    /// I/O worker poll interval (e.g. 10ms, 1s).
    #[arg(long, default_value = "10ms")]
    pub poll_interval: String,
    /// Time between control updates (e.g. 100ms).
    #[arg(long, default_value = "100ms")]
    pub tick: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Simulator host address.
    #[arg(long)]
    pub host: String,
    /// Simulator port.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// JSON message to send after connecting. Repeatable; sent in order.
    #[arg(long = "send", value_name = "JSON")]
    pub send: Vec<String>,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// I/O worker poll interval (e.g. 10ms, 1s).
    #[arg(long, default_value = "10ms")]
    pub poll_interval: String,
}

/// Parse `500ms`, `2s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

fn parse_rgb(input: &str) -> Result<[u8; 3], String> {
    let parts: Vec<&str> = input.split(',').map(str::trim).collect();
    let [r, g, b] = parts.as_slice() else {
        return Err(format!("expected R,G,B, got {input:?}"));
    };

    let channel = |text: &str| {
        text.parse::<u8>()
            .map_err(|_| format!("colour channel out of range 0-255: {text:?}"))
    };
    Ok([channel(*r)?, channel(*g)?, channel(*b)?])
}

pub(crate) fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

/// Sleep for `duration` in short steps, returning early on Ctrl-C.
pub(crate) fn pause(duration: Duration, running: &AtomicBool) {
    const STEP: Duration = Duration::from_millis(20);
    let deadline = std::time::Instant::now() + duration;
    while running.load(Ordering::SeqCst) {
        let now = std::time::Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(STEP.min(deadline - now));
    }
}
