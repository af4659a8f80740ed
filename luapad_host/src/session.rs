//! The script worker: one interpreter, one script file, one session.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mlua::{Lua, LuaOptions, StdLib};
use serde::Serialize;
use thiserror::Error;

use crate::cancel::{install_cancellation_hook, CancellationFlag};
use crate::config::ControllerConfig;
use crate::console::ConsoleSink;
use crate::core::EmulatorCore;
use crate::frame_sync::FrameSyncBarrier;
use crate::lua_api::{install_namespaces, SessionServices};
use crate::memory::MemoryAccessBridge;
use crate::overlay::{InputOverlayBridge, OverlayRegistration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    LoadFailed,
    RuntimeError,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Error opening file.\n{message}")]
    Load { path: PathBuf, message: String },
    #[error("{0}")]
    Runtime(String),
    #[error("Script exited.")]
    Cancelled,
}

impl SessionError {
    pub fn outcome(&self) -> SessionOutcome {
        match self {
            SessionError::Load { .. } => SessionOutcome::LoadFailed,
            SessionError::Runtime(_) => SessionOutcome::RuntimeError,
            SessionError::Cancelled => SessionOutcome::Cancelled,
        }
    }
}

/// Summary of one finished session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub session_id: u64,
    pub script: PathBuf,
    pub outcome: SessionOutcome,
    pub error: Option<String>,
    pub frames_advanced: u64,
    pub start_frame: u64,
    pub end_frame: u64,
}

/// State handed to the worker thread when a session starts. The overlay
/// registration is made before the thread exists so the first frame after
/// `start` already sees the (neutral) overlay.
pub(crate) struct ScriptSession {
    pub(crate) id: u64,
    pub(crate) script: PathBuf,
    pub(crate) core: Arc<dyn EmulatorCore>,
    pub(crate) console: Arc<dyn ConsoleSink>,
    pub(crate) config: ControllerConfig,
    pub(crate) cancel: Arc<CancellationFlag>,
    pub(crate) overlay: Arc<InputOverlayBridge>,
    pub(crate) registration: OverlayRegistration,
}

impl ScriptSession {
    /// Runs the script to completion on the calling thread.
    ///
    /// Teardown order: the input manipulator is cleared first, then the
    /// interpreter is dropped; only after this returns may the controller
    /// forget the session.
    pub(crate) fn run(self) -> SessionReport {
        let ScriptSession {
            id,
            script,
            core,
            console,
            config,
            cancel,
            overlay,
            registration,
        } = self;

        let clock = core.frame_clock();
        let start_frame = clock.current();
        let frames = Arc::new(FrameSyncBarrier::new(
            core.clone(),
            cancel.clone(),
            config.frame_wait_slice(),
        ));
        let services = SessionServices {
            core: core.clone(),
            memory: MemoryAccessBridge::new(core.clone()),
            overlay,
            frames: frames.clone(),
            console: console.clone(),
            config: config.clone(),
        };
        log::info!("session #{id}: running {}", script.display());

        let result = match Lua::new_with(StdLib::ALL_SAFE, LuaOptions::default()) {
            Ok(lua) => {
                let result = execute(&lua, &script, &services, &cancel);
                registration.unregister();
                drop(lua);
                result
            }
            Err(err) => {
                registration.unregister();
                Err(SessionError::Load {
                    path: script.clone(),
                    message: format!("initialising Lua runtime: {err}"),
                })
            }
        };

        let (outcome, error) = match &result {
            Ok(()) => {
                log::info!("session #{id}: script finished");
                (SessionOutcome::Completed, None)
            }
            Err(err) => {
                let mut text = err.to_string();
                if !text.ends_with('\n') {
                    text.push('\n');
                }
                services.log(&text);
                log::warn!("session #{id}: {}", text.trim_end());
                (err.outcome(), Some(text.trim_end().to_string()))
            }
        };

        SessionReport {
            session_id: id,
            script,
            outcome,
            error,
            frames_advanced: frames.frames_advanced(),
            start_frame,
            end_frame: clock.current(),
        }
    }
}

fn chunk_name(path: &Path) -> String {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("script");
    format!("@{name}")
}

fn execute(
    lua: &Lua,
    script: &Path,
    services: &SessionServices,
    cancel: &Arc<CancellationFlag>,
) -> Result<(), SessionError> {
    install_cancellation_hook(lua, cancel.clone(), &services.config);
    install_namespaces(lua, services).map_err(|err| SessionError::Load {
        path: script.to_path_buf(),
        message: format!("{err:#}"),
    })?;

    let bytes = fs::read(script).map_err(|err| SessionError::Load {
        path: script.to_path_buf(),
        message: format!("{}: {err}", script.display()),
    })?;
    let function = lua
        .load(bytes.as_slice())
        .set_name(chunk_name(script))
        .into_function()
        .map_err(|err| SessionError::Load {
            path: script.to_path_buf(),
            message: err.to_string(),
        })?;

    // Scripts start against a stopped machine; they step it themselves.
    services.core.set_paused(true);

    function.call::<_, ()>(()).map_err(|err| {
        if cancel.is_cancelled() {
            SessionError::Cancelled
        } else {
            SessionError::Runtime(err.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::SCRIPT_EXITED;
    use crate::console::ConsoleBuffer;
    use crate::sim::SimulatedCore;
    use std::io::Write;

    fn session(core: &Arc<SimulatedCore>, console: &Arc<ConsoleBuffer>, script: &Path) -> ScriptSession {
        let overlay = Arc::new(InputOverlayBridge::new());
        let registration = overlay.register(core.clone());
        ScriptSession {
            id: 1,
            script: script.to_path_buf(),
            core: core.clone(),
            console: console.clone(),
            config: ControllerConfig::default(),
            cancel: Arc::new(CancellationFlag::new()),
            overlay,
            registration,
        }
    }

    fn script_file(source: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".lua")
            .tempfile()
            .expect("temp script");
        file.write_all(source.as_bytes()).expect("write script");
        file
    }

    #[test]
    fn completed_run_pauses_core_and_unregisters_overlay() {
        let core = Arc::new(SimulatedCore::with_memory_size(0x1000));
        let console = Arc::new(ConsoleBuffer::new());
        let file = script_file("client.print('hi')");
        let report = session(&core, &console, file.path()).run();

        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert_eq!(report.error, None);
        assert_eq!(console.contents(), "hi\n");
        assert!(core.is_paused());
        assert!(!core.has_input_manipulator());
    }

    #[test]
    fn syntax_error_is_a_load_failure() {
        let core = Arc::new(SimulatedCore::with_memory_size(0x1000));
        let console = Arc::new(ConsoleBuffer::new());
        let file = script_file("this is not lua");
        let report = session(&core, &console, file.path()).run();

        assert_eq!(report.outcome, SessionOutcome::LoadFailed);
        assert!(console.contents().starts_with("Error opening file.\n"));
        assert!(!core.is_paused(), "load failures never pause the core");
        assert!(!core.has_input_manipulator());
    }

    #[test]
    fn missing_file_is_a_load_failure() {
        let core = Arc::new(SimulatedCore::with_memory_size(0x1000));
        let console = Arc::new(ConsoleBuffer::new());
        let dir = tempfile::tempdir().expect("temp dir");
        let report = session(&core, &console, &dir.path().join("absent.lua")).run();
        assert_eq!(report.outcome, SessionOutcome::LoadFailed);
        assert!(!core.has_input_manipulator());
    }

    #[test]
    fn runtime_error_text_is_logged() {
        let core = Arc::new(SimulatedCore::with_memory_size(0x1000));
        let console = Arc::new(ConsoleBuffer::new());
        let file = script_file("client.print('before')\nerror('boom')");
        let report = session(&core, &console, file.path()).run();

        assert_eq!(report.outcome, SessionOutcome::RuntimeError);
        let log = console.contents();
        assert!(log.starts_with("before\n"), "{log}");
        assert!(log.contains("boom"), "{log}");
        assert!(report.error.as_deref().unwrap_or_default().contains("boom"));
    }

    #[test]
    fn pre_cancelled_session_reports_cancellation() {
        let core = Arc::new(SimulatedCore::with_memory_size(0x1000));
        let console = Arc::new(ConsoleBuffer::new());
        let file = script_file("while true do end");
        let session = session(&core, &console, file.path());
        session.cancel.cancel();
        let report = session.run();

        assert_eq!(report.outcome, SessionOutcome::Cancelled);
        assert_eq!(console.contents(), format!("{SCRIPT_EXITED}\n"));
    }
}
