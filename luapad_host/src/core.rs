//! Narrow surface of the emulator the script bridge is allowed to touch.
//!
//! The host owns the real memory, movie, and save-state subsystems; the
//! bridge only ever sees them through these traits.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::pad::PadStatus;

/// Callback invoked once per polled frame with the controller state the
/// core is about to consume. It may override fields in place.
pub type InputManipulator = Arc<dyn Fn(&mut PadStatus) + Send + Sync>;

/// Typed access to the emulated big-endian address space.
pub trait MemoryBus: Send + Sync {
    fn read_u8(&self, address: u32) -> u8;
    fn read_u16(&self, address: u32) -> u16;
    fn read_u32(&self, address: u32) -> u32;
    fn write_u8(&self, address: u32, value: u8);
    fn write_u16(&self, address: u32, value: u16);
    fn write_u32(&self, address: u32, value: u32);

    fn read_f32(&self, address: u32) -> f32 {
        f32::from_bits(self.read_u32(address))
    }

    fn write_f32(&self, address: u32, value: f32) {
        self.write_u32(address, value.to_bits());
    }

    /// Reads exactly `len` bytes; embedded NUL bytes are kept.
    fn read_bytes(&self, address: u32, len: usize) -> Vec<u8> {
        (0..len)
            .map(|index| self.read_u8(address.wrapping_add(index as u32)))
            .collect()
    }

    /// Writes exactly the supplied bytes, without a terminator.
    fn write_bytes(&self, address: u32, bytes: &[u8]) {
        for (index, byte) in bytes.iter().enumerate() {
            self.write_u8(address.wrapping_add(index as u32), *byte);
        }
    }
}

/// Emulation-control half of the collaborator surface.
pub trait EmulatorCore: MemoryBus {
    /// True while a recorded input movie is being replayed.
    fn is_playing_input(&self) -> bool;

    fn frame_clock(&self) -> Arc<FrameClock>;

    /// Total frames of the active recording, `None` when no movie is active.
    fn total_frames(&self) -> Option<u64>;

    /// Runs a single frame if paused, pauses otherwise.
    fn request_frame_step(&self);
    /// Withdraws a step request that has not been serviced yet.
    fn cancel_frame_step(&self);

    fn set_paused(&self, paused: bool);

    fn soft_reset(&self);

    fn save_state(&self, slot: u32);

    fn load_state(&self, slot: u32);

    /// `1.0` is real time.
    fn set_emulation_speed(&self, factor: f32);

    fn display_message(&self, text: &str, duration: Duration);

    fn set_debug_text(&self, text: &str);

    /// Installs or clears the per-frame input manipulator. Once a call with
    /// `None` returns, the previous manipulator must never run again.
    fn set_input_manipulator(&self, manipulator: Option<InputManipulator>);
}

impl fmt::Debug for dyn EmulatorCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EmulatorCore")
    }
}

/// Published frame counter. The emulation loop bumps it after every frame;
/// script-side waiters block on it instead of spinning.
#[derive(Debug, Default)]
pub struct FrameClock {
    frame: Mutex<u64>,
    advanced: Condvar,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        *self.frame.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks one frame as finished and wakes every waiter.
    pub fn complete_frame(&self) -> u64 {
        let mut frame = self.frame.lock().unwrap_or_else(PoisonError::into_inner);
        *frame += 1;
        self.advanced.notify_all();
        *frame
    }

    /// Blocks until the counter exceeds `after` or `timeout` elapses.
    /// Returns the counter value observed on wake-up.
    pub fn wait_past(&self, after: u64, timeout: Duration) -> u64 {
        let guard = self.frame.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .advanced
            .wait_timeout_while(guard, timeout, |frame| *frame <= after)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}
