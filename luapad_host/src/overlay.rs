use std::sync::{Arc, Mutex, PoisonError};

use crate::core::{EmulatorCore, InputManipulator};
use crate::pad::{ButtonCodes, PadButtons, PadStatus, C_STICK_CENTER, MAIN_STICK_CENTER, TRIGGER_RELEASED};

/// Script-owned controller overlay plus the last merged pad state.
///
/// The script thread writes the overlay and reads the snapshot; the
/// emulation thread does the opposite inside [`InputOverlayBridge::merge`].
/// Each side takes one lock at a time, so multi-field updates are never
/// observed half-applied.
#[derive(Debug, Default)]
pub struct InputOverlayBridge {
    overlay: Mutex<PadStatus>,
    last_observed: Mutex<PadStatus>,
}

impl InputOverlayBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds the overlay into the pad state the core is about to consume.
    ///
    /// Axes still at their neutral value pass the real input through; an
    /// axis deliberately set back to neutral therefore cannot override.
    pub fn merge(&self, status: &mut PadStatus) {
        let overlay = self.overlay();

        if overlay.stick_x != MAIN_STICK_CENTER {
            status.stick_x = overlay.stick_x;
        }
        if overlay.stick_y != MAIN_STICK_CENTER {
            status.stick_y = overlay.stick_y;
        }
        if overlay.trigger_left != TRIGGER_RELEASED {
            status.trigger_left = overlay.trigger_left;
        }
        if overlay.trigger_right != TRIGGER_RELEASED {
            status.trigger_right = overlay.trigger_right;
        }
        if overlay.substick_x != C_STICK_CENTER {
            status.substick_x = overlay.substick_x;
        }
        if overlay.substick_y != C_STICK_CENTER {
            status.substick_y = overlay.substick_y;
        }
        status.button |= overlay.button;

        *self
            .last_observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = *status;
    }

    pub fn overlay(&self) -> PadStatus {
        *self.overlay.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fully merged pad state from the most recently polled frame.
    pub fn last_observed(&self) -> PadStatus {
        *self
            .last_observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, apply: impl FnOnce(&mut PadStatus)) {
        let mut overlay = self.overlay.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut overlay);
    }

    pub fn set_stick(&self, x: u8, y: u8) {
        self.update(|pad| {
            pad.stick_x = x;
            pad.stick_y = y;
        });
    }

    pub fn set_c_stick(&self, x: u8, y: u8) {
        self.update(|pad| {
            pad.substick_x = x;
            pad.substick_y = y;
        });
    }

    pub fn set_triggers(&self, left: u8, right: u8) {
        self.update(|pad| {
            pad.trigger_left = left;
            pad.trigger_right = right;
        });
    }

    pub fn apply_buttons(&self, codes: ButtonCodes) {
        self.update(|pad| codes.apply(&mut pad.button));
    }

    pub fn press(&self, buttons: PadButtons) {
        self.update(|pad| pad.press(buttons));
    }

    /// Installs [`InputOverlayBridge::merge`] as the core's input manipulator.
    /// The returned guard clears it again when dropped.
    pub fn register(self: &Arc<Self>, core: Arc<dyn EmulatorCore>) -> OverlayRegistration {
        let bridge = Arc::clone(self);
        let manipulator: InputManipulator = Arc::new(move |status: &mut PadStatus| {
            bridge.merge(status);
        });
        core.set_input_manipulator(Some(manipulator));
        log::debug!("input overlay registered");
        OverlayRegistration { core: Some(core) }
    }
}

/// Keeps the overlay merge installed for the lifetime of a session.
#[derive(Debug)]
pub struct OverlayRegistration {
    core: Option<Arc<dyn EmulatorCore>>,
}

impl OverlayRegistration {
    /// Clears the manipulator now; later frames no longer see the overlay.
    pub fn unregister(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(core) = self.core.take() {
            core.set_input_manipulator(None);
            log::debug!("input overlay unregistered");
        }
    }
}

impl Drop for OverlayRegistration {
    fn drop(&mut self) {
        self.release();
    }
}
