use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Tunables for the script controller. Every field has a default, so a
/// JSON file only needs the keys it wants to change.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Run the stop check on every new source line.
    pub hook_every_line: bool,
    /// Also run the stop check every N VM instructions (`None` disables).
    pub hook_instruction_interval: Option<u32>,
    /// How long a blocked `emu.frameAdvance` sleeps between stop checks.
    pub frame_wait_slice_ms: u64,
    /// Grace period granted to a running script when the controller is
    /// dropped with a session still active.
    pub stop_grace_ms: u64,
    /// Duration of `gui.Msg` when the script does not pass one.
    pub default_message_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            hook_every_line: true,
            hook_instruction_interval: Some(1000),
            frame_wait_slice_ms: 10,
            stop_grace_ms: 250,
            default_message_ms: 5000,
        }
    }
}

impl ControllerConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading controller config {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("parsing controller config {}", path.display()))
    }

    pub fn frame_wait_slice(&self) -> Duration {
        Duration::from_millis(self.frame_wait_slice_ms.max(1))
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn default_message_duration(&self) -> Duration {
        Duration::from_millis(self.default_message_ms)
    }
}
