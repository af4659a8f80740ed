use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use luapad_host::sim::OnScreenMessage;
use luapad_host::{
    ConsoleBuffer, ConsoleSink, ControllerConfig, EmulatorCore, MemoryBus,
    ScriptExecutionController, SessionOutcome, SessionReport, SimulatedCore,
};
use serde::Serialize;

mod cli;

const IDLE_POLL: Duration = Duration::from_millis(20);

/// Mirrors script output to stdout as it arrives and keeps a copy for the
/// report.
#[derive(Debug, Default)]
struct StdoutConsole {
    buffer: ConsoleBuffer,
}

impl ConsoleSink for StdoutConsole {
    fn append(&self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        if stdout
            .write_all(text.as_bytes())
            .and_then(|()| stdout.flush())
            .is_err()
        {
            log::warn!("stdout closed; script output is only kept in the report");
        }
        self.buffer.append(text);
    }
}

#[derive(Serialize)]
struct RunManifest<'a> {
    report: &'a SessionReport,
    console: String,
    messages: Vec<OnScreenMessage>,
    debug_text: String,
    final_frame: u64,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn write_manifest(path: &Path, manifest: &RunManifest<'_>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(manifest).context("serializing session report")?;
    fs::write(path, json).with_context(|| format!("writing session report to {}", path.display()))
}

/// Waits for the session to end, requesting a stop once the frame budget or
/// the wall-clock timeout runs out.
fn supervise(
    controller: &ScriptExecutionController,
    core: &SimulatedCore,
    frame_budget: Option<u64>,
    timeout: Option<Duration>,
) {
    let clock = core.frame_clock();
    let start_frame = clock.current();
    let started = Instant::now();
    let mut stop_requested = false;

    while !controller.wait_for_idle(IDLE_POLL) {
        if stop_requested {
            continue;
        }
        let frames_spent = clock.current().saturating_sub(start_frame);
        let out_of_frames = frame_budget.is_some_and(|budget| frames_spent >= budget);
        let out_of_time = timeout.is_some_and(|limit| started.elapsed() >= limit);
        if out_of_frames || out_of_time {
            log::info!(
                "stopping script after {frames_spent} frames / {} ms",
                started.elapsed().as_millis()
            );
            if let Err(err) = controller.stop() {
                log::debug!("stop request ignored: {err}");
            }
            stop_requested = true;
        }
    }
}

fn main() -> Result<()> {
    let args = cli::parse()?;
    init_logging(args.verbose);

    let config = match args.config.as_deref() {
        Some(path) => ControllerConfig::from_json_file(path)?,
        None => ControllerConfig::default(),
    };

    let core = Arc::new(SimulatedCore::new());
    for poke in &args.pokes {
        core.write_u32(poke.address, poke.value);
        log::debug!("poked 0x{:08X} = 0x{:08X}", poke.address, poke.value);
    }
    if let Some(length) = args.replay_length {
        core.start_playback(length);
    }
    let frame_loop = core.spawn_frame_loop(args.frame_interval);

    let console = Arc::new(StdoutConsole::default());
    let controller = ScriptExecutionController::new(core.clone(), console.clone(), config);
    controller
        .start(&args.script)
        .with_context(|| format!("starting script {}", args.script.display()))?;
    supervise(&controller, &core, args.frame_budget, args.timeout);

    let report = controller
        .last_report()
        .context("script session ended without a report")?;
    frame_loop.stop();

    let manifest = RunManifest {
        report: &report,
        console: console.buffer.contents(),
        messages: core.messages(),
        debug_text: core.debug_text(),
        final_frame: core.frame_clock().current(),
    };
    if let Some(path) = args.report_json.as_deref() {
        write_manifest(path, &manifest)?;
    }
    if args.verbose {
        eprintln!(
            "[luapad_console] {} finished: {:?}, {} frame(s) advanced (frames {}..{})",
            report.script.display(),
            report.outcome,
            report.frames_advanced,
            report.start_frame,
            report.end_frame
        );
    }

    match report.outcome {
        SessionOutcome::Completed | SessionOutcome::Cancelled => Ok(()),
        SessionOutcome::LoadFailed | SessionOutcome::RuntimeError => bail!(
            "script {} failed: {}",
            report.script.display(),
            report.error.as_deref().unwrap_or("unknown error")
        ),
    }
}
