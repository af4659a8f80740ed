//! Script-visible function surface.
//!
//! Binds the fixed capability groups (`memory`, `joypad`, `emu`, `gui`,
//! `client`, `bit`) into the interpreter's globals at session start.

mod args;
mod bit;
mod client;
mod emu;
mod gui;
mod joypad;
mod memory;

use std::sync::Arc;

use anyhow::{Context, Result};
use mlua::{Lua, MultiValue, Value};

use crate::config::ControllerConfig;
use crate::console::ConsoleSink;
use crate::core::EmulatorCore;
use crate::frame_sync::FrameSyncBarrier;
use crate::memory::MemoryAccessBridge;
use crate::overlay::InputOverlayBridge;

/// Everything the bound functions of one session may reach.
#[derive(Debug, Clone)]
pub(crate) struct SessionServices {
    pub(crate) core: Arc<dyn EmulatorCore>,
    pub(crate) memory: MemoryAccessBridge,
    pub(crate) overlay: Arc<InputOverlayBridge>,
    pub(crate) frames: Arc<FrameSyncBarrier>,
    pub(crate) console: Arc<dyn ConsoleSink>,
    pub(crate) config: ControllerConfig,
}

impl SessionServices {
    pub(crate) fn log(&self, text: &str) {
        log::info!(target: "luapad::script", "{}", text.trim_end());
        self.console.append(text);
    }
}

pub(crate) fn install_namespaces(lua: &Lua, services: &SessionServices) -> Result<()> {
    bit::install_bit(lua).context("registering bit namespace")?;
    client::install_client(lua, services.clone()).context("registering client namespace")?;
    gui::install_gui(lua, services.clone()).context("registering gui namespace")?;
    memory::install_memory(lua, services.memory.clone())
        .context("registering memory namespace")?;
    emu::install_emu(lua, services.clone()).context("registering emu namespace")?;
    joypad::install_joypad(lua, services.overlay.clone())
        .context("registering joypad namespace")?;
    Ok(())
}

/// Zero or one return values.
fn optional<'lua>(value: Option<Value<'lua>>) -> MultiValue<'lua> {
    MultiValue::from_vec(value.into_iter().collect())
}
