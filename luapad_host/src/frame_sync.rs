use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancellationFlag;
use crate::core::EmulatorCore;

/// Lets a script step the emulator exactly one frame at a time.
#[derive(Debug)]
pub struct FrameSyncBarrier {
    core: Arc<dyn EmulatorCore>,
    cancel: Arc<CancellationFlag>,
    slice: Duration,
    frames_advanced: AtomicU64,
}

impl FrameSyncBarrier {
    pub fn new(core: Arc<dyn EmulatorCore>, cancel: Arc<CancellationFlag>, slice: Duration) -> Self {
        FrameSyncBarrier {
            core,
            cancel,
            slice,
            frames_advanced: AtomicU64::new(0),
        }
    }

    /// Requests a single-frame step and blocks until the frame counter has
    /// moved past its value at entry. Returns the new frame index.
    ///
    /// No lock is held while waiting except the clock's own, which the
    /// condition variable releases, so the emulation thread can always
    /// complete the frame being waited for. A stop request ends the wait
    /// with the script-exit error and withdraws the unserviced step, so the
    /// core does not run a stray frame after the script is gone.
    pub fn advance(&self) -> mlua::Result<u64> {
        self.cancel.check()?;
        let clock = self.core.frame_clock();
        let before = clock.current();
        self.core.request_frame_step();
        loop {
            let now = clock.wait_past(before, self.slice);
            if now > before {
                self.frames_advanced.fetch_add(1, Ordering::Relaxed);
                return Ok(now);
            }
            if let Err(err) = self.cancel.check() {
                self.core.cancel_frame_step();
                return Err(err);
            }
        }
    }

    /// Number of completed `advance` calls in this session.
    pub fn frames_advanced(&self) -> u64 {
        self.frames_advanced.load(Ordering::Relaxed)
    }
}
