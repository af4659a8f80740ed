use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;

/// One `ADDR=VALUE` memory preset applied before the script starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poke {
    pub address: u32,
    pub value: u32,
}

fn parse_u32(text: &str) -> Result<u32, String> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse::<u32>(),
    };
    parsed.map_err(|err| format!("invalid 32-bit value {text:?}: {err}"))
}

fn parse_poke(text: &str) -> Result<Poke, String> {
    let Some((address, value)) = text.split_once('=') else {
        return Err(format!("expected ADDR=VALUE, got {text:?}"));
    };
    Ok(Poke {
        address: parse_u32(address)?,
        value: parse_u32(value)?,
    })
}

/// Headless host that runs one Lua script against a simulated core.
#[derive(Parser, Debug)]
#[command(about = "Run a Lua input script against the simulated emulator core", version)]
pub struct Args {
    /// Lua script to execute
    pub script: PathBuf,

    /// JSON file with controller settings (hook cadence, wait slices, grace period)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Stop the script once this many frames have elapsed since it started
    #[arg(long)]
    pub frames: Option<u64>,

    /// Stop the script after this many milliseconds of wall-clock time
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Real-time pacing of the simulated frame loop
    #[arg(long, default_value_t = 16)]
    pub frame_interval_ms: u64,

    /// Start replaying a recorded movie of this many frames before the script runs
    #[arg(long)]
    pub replay_length: Option<u64>,

    /// Path to write the session report as JSON
    #[arg(long)]
    pub report_json: Option<PathBuf>,

    /// Write a 32-bit value into memory before the script starts (repeatable)
    #[arg(long = "poke", value_name = "ADDR=VALUE", value_parser = parse_poke)]
    pub pokes: Vec<Poke>,

    /// Log at debug level and print the session summary
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug)]
pub struct RunArgs {
    pub script: PathBuf,
    pub config: Option<PathBuf>,
    pub frame_budget: Option<u64>,
    pub timeout: Option<Duration>,
    pub frame_interval: Duration,
    pub replay_length: Option<u64>,
    pub report_json: Option<PathBuf>,
    pub pokes: Vec<Poke>,
    pub verbose: bool,
}

pub fn parse() -> Result<RunArgs> {
    Args::parse().into_run_args()
}

impl Args {
    fn into_run_args(self) -> Result<RunArgs> {
        if self.frame_interval_ms == 0 {
            bail!("--frame-interval-ms must be at least 1");
        }
        if self.frames == Some(0) {
            bail!("--frames must be at least 1");
        }
        if self.replay_length == Some(0) {
            bail!("--replay-length must be at least 1");
        }

        Ok(RunArgs {
            script: self.script,
            config: self.config,
            frame_budget: self.frames,
            timeout: self.timeout_ms.map(Duration::from_millis),
            frame_interval: Duration::from_millis(self.frame_interval_ms),
            replay_length: self.replay_length,
            report_json: self.report_json,
            pokes: self.pokes,
            verbose: self.verbose,
        })
    }
}
