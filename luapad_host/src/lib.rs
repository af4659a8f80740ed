//! Lua scripting bridge for a GameCube-style emulator core.
//!
//! A [`ScriptExecutionController`] runs one user script at a time on its
//! own thread. The script sees a fixed set of namespaces (`memory`,
//! `joypad`, `emu`, `gui`, `client`, `bit`) that reach the emulator only
//! through the [`EmulatorCore`] trait.

pub mod cancel;
pub mod config;
pub mod console;
pub mod controller;
pub mod core;
pub mod frame_sync;
mod lua_api;
pub mod memory;
pub mod overlay;
pub mod pad;
pub mod session;
pub mod sim;

pub use crate::config::ControllerConfig;
pub use crate::console::{ConsoleBuffer, ConsoleSink};
pub use crate::controller::{ControllerError, ScriptExecutionController};
pub use crate::core::{EmulatorCore, FrameClock, InputManipulator, MemoryBus};
pub use crate::pad::{PadButtons, PadStatus};
pub use crate::session::{SessionOutcome, SessionReport};
pub use crate::sim::SimulatedCore;
