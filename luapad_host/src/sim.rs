//! Deterministic in-process emulator core.
//!
//! Backs the console host and the test suite: big-endian MEM1, a movie
//! model that gates writes, numbered save-state slots, pause/step control,
//! and a real-time frame loop that polls the controller through the
//! installed input manipulator.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;

use crate::core::{EmulatorCore, FrameClock, InputManipulator, MemoryBus};
use crate::pad::PadStatus;

pub const MEM1_BASE: u32 = 0x8000_0000;
pub const DEFAULT_MEM1_SIZE: usize = 24 * 1024 * 1024;

/// Strips the cached/uncached segment bits so every mirror lands in MEM1.
const PHYSICAL_MASK: u32 = 0x3FFF_FFFF;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnScreenMessage {
    pub text: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MovieMode {
    Playback,
    Recording,
}

#[derive(Debug, Clone, Copy)]
struct MovieState {
    mode: MovieMode,
    total_frames: u64,
}

#[derive(Debug, Default)]
struct RunState {
    paused: bool,
    step_pending: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SimulatedCore {
    memory: Mutex<Vec<u8>>,
    clock: Arc<FrameClock>,
    run: Mutex<RunState>,
    run_changed: Condvar,
    movie: Mutex<Option<MovieState>>,
    manipulator: Mutex<Option<InputManipulator>>,
    physical_pad: Mutex<PadStatus>,
    last_polled: Mutex<PadStatus>,
    save_slots: Mutex<BTreeMap<u32, Vec<u8>>>,
    speed: Mutex<f32>,
    messages: Mutex<Vec<OnScreenMessage>>,
    debug_text: Mutex<String>,
    resets: AtomicU64,
}

impl std::fmt::Debug for SimulatedCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedCore")
            .field("frame", &self.clock.current())
            .field("paused", &self.is_paused())
            .field("playing_input", &self.is_playing_input())
            .finish_non_exhaustive()
    }
}

impl Default for SimulatedCore {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCore {
    pub fn new() -> Self {
        Self::with_memory_size(DEFAULT_MEM1_SIZE)
    }

    pub fn with_memory_size(size: usize) -> Self {
        SimulatedCore {
            memory: Mutex::new(vec![0; size]),
            clock: Arc::new(FrameClock::new()),
            run: Mutex::new(RunState::default()),
            run_changed: Condvar::new(),
            movie: Mutex::new(None),
            manipulator: Mutex::new(None),
            physical_pad: Mutex::new(PadStatus::neutral()),
            last_polled: Mutex::new(PadStatus::neutral()),
            save_slots: Mutex::new(BTreeMap::new()),
            speed: Mutex::new(1.0),
            messages: Mutex::new(Vec::new()),
            debug_text: Mutex::new(String::new()),
            resets: AtomicU64::new(0),
        }
    }

    fn physical_range(&self, address: u32, len: usize) -> Option<std::ops::Range<usize>> {
        let start = (address & PHYSICAL_MASK) as usize;
        let end = start.checked_add(len)?;
        (end <= lock(&self.memory).len()).then_some(start..end)
    }

    fn read_array<const N: usize>(&self, address: u32) -> [u8; N] {
        let mut out = [0u8; N];
        if let Some(range) = self.physical_range(address, N) {
            out.copy_from_slice(&lock(&self.memory)[range]);
        }
        out
    }

    fn write_slice(&self, address: u32, bytes: &[u8]) {
        match self.physical_range(address, bytes.len()) {
            Some(range) => lock(&self.memory)[range].copy_from_slice(bytes),
            None => log::debug!(
                "dropping {}-byte write outside MEM1 at 0x{address:08X}",
                bytes.len()
            ),
        }
    }

    /// Begins replaying a recorded movie of `total_frames` frames.
    pub fn start_playback(&self, total_frames: u64) {
        *lock(&self.movie) = Some(MovieState {
            mode: MovieMode::Playback,
            total_frames,
        });
    }

    /// Begins recording a movie; its length grows with every frame.
    pub fn start_recording(&self) {
        *lock(&self.movie) = Some(MovieState {
            mode: MovieMode::Recording,
            total_frames: 0,
        });
    }

    pub fn stop_movie(&self) {
        *lock(&self.movie) = None;
    }

    pub fn set_physical_pad(&self, pad: PadStatus) {
        *lock(&self.physical_pad) = pad;
    }

    /// Controller state the most recent frame actually consumed.
    pub fn last_polled_pad(&self) -> PadStatus {
        *lock(&self.last_polled)
    }

    pub fn has_input_manipulator(&self) -> bool {
        lock(&self.manipulator).is_some()
    }

    pub fn has_pending_step(&self) -> bool {
        lock(&self.run).step_pending
    }

    pub fn is_paused(&self) -> bool {
        lock(&self.run).paused
    }

    pub fn emulation_speed(&self) -> f32 {
        *lock(&self.speed)
    }

    pub fn messages(&self) -> Vec<OnScreenMessage> {
        lock(&self.messages).clone()
    }

    pub fn debug_text(&self) -> String {
        lock(&self.debug_text).clone()
    }

    pub fn reset_count(&self) -> u64 {
        self.resets.load(Ordering::Relaxed)
    }

    pub fn has_save_slot(&self, slot: u32) -> bool {
        lock(&self.save_slots).contains_key(&slot)
    }

    /// Emulates one frame: polls the pad through the manipulator, advances
    /// movie bookkeeping, then publishes the frame on the clock.
    pub fn run_frame(&self) -> u64 {
        let mut pad = *lock(&self.physical_pad);
        {
            // Held across the call so clearing the manipulator waits for
            // any in-flight merge.
            let manipulator = lock(&self.manipulator);
            if let Some(manipulate) = manipulator.as_ref() {
                manipulate(&mut pad);
            }
        }
        *lock(&self.last_polled) = pad;

        let frame = self.clock.current();
        {
            let mut movie = lock(&self.movie);
            let finished = match movie.as_mut() {
                Some(state) if state.mode == MovieMode::Recording => {
                    state.total_frames += 1;
                    false
                }
                Some(state) => frame + 1 >= state.total_frames,
                None => false,
            };
            if finished {
                log::info!("movie playback finished at frame {}", frame + 1);
                *movie = None;
            }
        }
        self.clock.complete_frame()
    }

    fn take_frame_permit(&self) -> bool {
        let mut run = lock(&self.run);
        if !run.paused {
            return true;
        }
        if run.step_pending {
            run.step_pending = false;
            return true;
        }
        false
    }

    /// Drives [`SimulatedCore::run_frame`] on a dedicated thread, one frame
    /// per `interval` while running or while a single step is pending.
    pub fn spawn_frame_loop(self: &Arc<Self>, interval: Duration) -> FrameLoop {
        let stop = Arc::new(AtomicBool::new(false));
        let core = Arc::clone(self);
        let loop_stop = stop.clone();
        let handle = thread::spawn(move || {
            while !loop_stop.load(Ordering::Acquire) {
                if core.take_frame_permit() {
                    core.run_frame();
                    thread::sleep(interval);
                    continue;
                }
                let run = lock(&core.run);
                let _ = core
                    .run_changed
                    .wait_timeout(run, interval.max(Duration::from_millis(1)))
                    .unwrap_or_else(PoisonError::into_inner);
            }
        });
        FrameLoop {
            core: Arc::clone(self),
            stop,
            handle: Some(handle),
        }
    }
}

impl MemoryBus for SimulatedCore {
    fn read_u8(&self, address: u32) -> u8 {
        self.read_array::<1>(address)[0]
    }

    fn read_u16(&self, address: u32) -> u16 {
        u16::from_be_bytes(self.read_array(address))
    }

    fn read_u32(&self, address: u32) -> u32 {
        u32::from_be_bytes(self.read_array(address))
    }

    fn write_u8(&self, address: u32, value: u8) {
        self.write_slice(address, &[value]);
    }

    fn write_u16(&self, address: u32, value: u16) {
        self.write_slice(address, &value.to_be_bytes());
    }

    fn write_u32(&self, address: u32, value: u32) {
        self.write_slice(address, &value.to_be_bytes());
    }
}

impl EmulatorCore for SimulatedCore {
    fn is_playing_input(&self) -> bool {
        matches!(
            *lock(&self.movie),
            Some(MovieState {
                mode: MovieMode::Playback,
                ..
            })
        )
    }

    fn frame_clock(&self) -> Arc<FrameClock> {
        self.clock.clone()
    }

    fn total_frames(&self) -> Option<u64> {
        lock(&self.movie).map(|movie| movie.total_frames)
    }

    fn request_frame_step(&self) {
        let mut run = lock(&self.run);
        run.paused = true;
        run.step_pending = true;
        self.run_changed.notify_all();
    }

    fn cancel_frame_step(&self) {
        lock(&self.run).step_pending = false;
    }

    fn set_paused(&self, paused: bool) {
        let mut run = lock(&self.run);
        run.paused = paused;
        if !paused {
            run.step_pending = false;
        }
        self.run_changed.notify_all();
    }

    fn soft_reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
        log::info!("soft reset requested");
    }

    fn save_state(&self, slot: u32) {
        let snapshot = lock(&self.memory).clone();
        lock(&self.save_slots).insert(slot, snapshot);
        log::info!("saved state to slot {slot}");
    }

    fn load_state(&self, slot: u32) {
        let Some(snapshot) = lock(&self.save_slots).get(&slot).cloned() else {
            log::warn!("state slot {slot} is empty");
            return;
        };
        *lock(&self.memory) = snapshot;
        log::info!("loaded state from slot {slot}");
    }

    fn set_emulation_speed(&self, factor: f32) {
        *lock(&self.speed) = factor;
    }

    fn display_message(&self, text: &str, duration: Duration) {
        lock(&self.messages).push(OnScreenMessage {
            text: text.to_string(),
            duration_ms: duration.as_millis() as u64,
        });
    }

    fn set_debug_text(&self, text: &str) {
        *lock(&self.debug_text) = text.to_string();
    }

    fn set_input_manipulator(&self, manipulator: Option<InputManipulator>) {
        *lock(&self.manipulator) = manipulator;
    }
}

/// Handle to a running frame loop; stops and joins the thread on drop.
pub struct FrameLoop {
    core: Arc<SimulatedCore>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FrameLoop {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.core.run_changed.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("frame loop thread panicked");
            }
        }
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}
