//! Owns at most one running script session and arbitrates start / stop.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::cancel::CancellationFlag;
use crate::config::ControllerConfig;
use crate::console::ConsoleSink;
use crate::core::{EmulatorCore, FrameClock};
use crate::overlay::InputOverlayBridge;
use crate::session::{ScriptSession, SessionOutcome, SessionReport};

/// Error text recorded for a session whose worker thread panicked.
pub const WORKER_PANICKED: &str = "script thread panicked";

/// Warning shown when the host tries to close while a script still runs.
pub const CLOSE_WHILE_RUNNING: &str = "You must stop your script before closing this window!";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("a script is already running")]
    AlreadyRunning,
    #[error("no script is running")]
    NotRunning,
    #[error("{}", CLOSE_WHILE_RUNNING)]
    SessionActive,
    #[error("failed to spawn script thread: {0}")]
    Spawn(String),
}

#[derive(Debug)]
struct ActiveSession {
    id: u64,
    script: PathBuf,
    cancel: Arc<CancellationFlag>,
}

#[derive(Debug, Default)]
struct ControllerState {
    active: Option<ActiveSession>,
    next_id: u64,
    last_report: Option<SessionReport>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<ControllerState>,
    idle: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called by the worker once its session is fully torn down.
    fn finish(&self, report: SessionReport) {
        let mut state = self.lock();
        if state
            .active
            .as_ref()
            .is_some_and(|active| active.id == report.session_id)
        {
            state.active = None;
        }
        state.last_report = Some(report);
        self.idle.notify_all();
    }
}

/// Hands the worker's report to [`Shared::finish`] when the worker thread
/// ends, including when it unwinds. A worker that dies without a report
/// still frees the controller, with a runtime-error report in its place.
struct FinishGuard {
    shared: Arc<Shared>,
    id: u64,
    script: PathBuf,
    start_frame: u64,
    clock: Arc<FrameClock>,
    report: Option<SessionReport>,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        let report = self.report.take().unwrap_or_else(|| {
            log::error!("script session #{} panicked", self.id);
            SessionReport {
                session_id: self.id,
                script: self.script.clone(),
                outcome: SessionOutcome::RuntimeError,
                error: Some(WORKER_PANICKED.to_string()),
                frames_advanced: 0,
                start_frame: self.start_frame,
                end_frame: self.clock.current(),
            }
        });
        self.shared.finish(report);
    }
}

/// Runs user scripts against an [`EmulatorCore`], one session at a time.
///
/// Console output from scripts and from the controller itself goes to the
/// supplied [`ConsoleSink`]. The sink is shared with worker threads and
/// may be appended to from any of them.
#[derive(Debug)]
pub struct ScriptExecutionController {
    core: Arc<dyn EmulatorCore>,
    console: Arc<dyn ConsoleSink>,
    config: ControllerConfig,
    shared: Arc<Shared>,
}

impl ScriptExecutionController {
    pub fn new(
        core: Arc<dyn EmulatorCore>,
        console: Arc<dyn ConsoleSink>,
        config: ControllerConfig,
    ) -> Self {
        ScriptExecutionController {
            core,
            console,
            config,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Starts `script` on a fresh worker thread.
    ///
    /// The input overlay is registered before this returns, so the next
    /// frame the core polls already goes through the merge.
    pub fn start(&self, script: impl AsRef<Path>) -> Result<(), ControllerError> {
        let script = script.as_ref().to_path_buf();
        let mut state = self.shared.lock();
        if state.active.is_some() {
            log::warn!("refusing to start {}: a script is already running", script.display());
            return Err(ControllerError::AlreadyRunning);
        }

        state.next_id += 1;
        let id = state.next_id;
        let cancel = Arc::new(CancellationFlag::new());
        let overlay = Arc::new(InputOverlayBridge::new());
        let registration = overlay.register(self.core.clone());
        let session = ScriptSession {
            id,
            script: script.clone(),
            core: self.core.clone(),
            console: self.console.clone(),
            config: self.config.clone(),
            cancel: cancel.clone(),
            overlay,
            registration,
        };

        let shared = self.shared.clone();
        let clock = self.core.frame_clock();
        let start_frame = clock.current();
        let guard_script = script.clone();
        let spawned = thread::Builder::new()
            .name(format!("luapad-script-{id}"))
            .spawn(move || {
                let mut guard = FinishGuard {
                    shared,
                    id,
                    script: guard_script,
                    start_frame,
                    clock,
                    report: None,
                };
                guard.report = Some(session.run());
            });
        if let Err(err) = spawned {
            // The closure, and with it the overlay registration, is dropped
            // on failure.
            log::error!("failed to spawn script thread: {err}");
            return Err(ControllerError::Spawn(err.to_string()));
        }

        log::info!("started script session #{id}: {}", script.display());
        state.active = Some(ActiveSession { id, script, cancel });
        Ok(())
    }

    /// Asks the running script to exit. Returns immediately; the worker
    /// notices the request at its next line, instruction batch or frame
    /// wait slice.
    pub fn stop(&self) -> Result<(), ControllerError> {
        let state = self.shared.lock();
        match &state.active {
            Some(active) => {
                active.cancel.cancel();
                log::info!("stop requested for script session #{}", active.id);
                Ok(())
            }
            None => Err(ControllerError::NotRunning),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().active.is_some()
    }

    /// Script path of the running session, if any.
    pub fn current_script(&self) -> Option<PathBuf> {
        self.shared
            .lock()
            .active
            .as_ref()
            .map(|active| active.script.clone())
    }

    /// Appends `text` verbatim to the output console.
    pub fn log(&self, text: &str) {
        self.console.append(text);
    }

    /// Host close hook. Closing is refused while a script runs.
    pub fn request_close(&self) -> Result<(), ControllerError> {
        if self.is_running() {
            log::warn!("{CLOSE_WHILE_RUNNING}");
            return Err(ControllerError::SessionActive);
        }
        Ok(())
    }

    /// Blocks until no session is running or `timeout` elapses. Returns
    /// whether the controller is idle.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        let state = self.shared.lock();
        let (state, _) = self
            .shared
            .idle
            .wait_timeout_while(state, timeout, |state| state.active.is_some())
            .unwrap_or_else(PoisonError::into_inner);
        state.active.is_none()
    }

    /// Report of the most recently finished session.
    pub fn last_report(&self) -> Option<SessionReport> {
        self.shared.lock().last_report.clone()
    }
}

impl Drop for ScriptExecutionController {
    fn drop(&mut self) {
        if self.stop().is_err() {
            return;
        }
        if !self.wait_for_idle(self.config.stop_grace()) {
            log::warn!(
                "script thread still running {} ms after stop request; detaching",
                self.config.stop_grace_ms
            );
        }
    }
}
