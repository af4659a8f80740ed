use bitflags::bitflags;
use serde::Serialize;
use thiserror::Error;

pub const MAIN_STICK_CENTER: u8 = 0x80;
pub const C_STICK_CENTER: u8 = 0x80;
pub const TRIGGER_RELEASED: u8 = 0;

/// Polar magnitudes must stay strictly inside the stick's half-range.
pub const POLAR_MAGNITUDE_LIMIT: i64 = 128;

/// Character that clears every held button before the rest of a
/// `setButtons` code string is applied.
pub const RELEASE_ALL_CODE: char = 'U';

bitflags! {
    /// GameCube controller button bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PadButtons: u16 {
        const LEFT = 0x0001;
        const RIGHT = 0x0002;
        const DOWN = 0x0004;
        const UP = 0x0008;
        const TRIGGER_Z = 0x0010;
        const TRIGGER_R = 0x0020;
        const TRIGGER_L = 0x0040;
        const A = 0x0100;
        const B = 0x0200;
        const X = 0x0400;
        const Y = 0x0800;
        const START = 0x1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PadStatus {
    pub button: u16,
    pub stick_x: u8,
    pub stick_y: u8,
    pub substick_x: u8,
    pub substick_y: u8,
    pub trigger_left: u8,
    pub trigger_right: u8,
}

impl PadStatus {
    /// Sticks centred, triggers released, no buttons held.
    pub const fn neutral() -> Self {
        PadStatus {
            button: 0,
            stick_x: MAIN_STICK_CENTER,
            stick_y: MAIN_STICK_CENTER,
            substick_x: C_STICK_CENTER,
            substick_y: C_STICK_CENTER,
            trigger_left: TRIGGER_RELEASED,
            trigger_right: TRIGGER_RELEASED,
        }
    }

    pub fn buttons(&self) -> PadButtons {
        PadButtons::from_bits_truncate(self.button)
    }

    pub fn press(&mut self, buttons: PadButtons) {
        self.button |= buttons.bits();
    }
}

impl Default for PadStatus {
    fn default() -> Self {
        Self::neutral()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PadCodeError {
    #[error("unknown button code '{0}'")]
    UnknownButton(char),
    #[error("unknown d-pad code '{0}'")]
    UnknownDirection(char),
    #[error("m is outside of acceptable range [0, 128)")]
    MagnitudeOutOfRange(i64),
}

/// Result of parsing a `setButtons` code string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonCodes {
    pub release_all: bool,
    pub pressed: PadButtons,
}

impl ButtonCodes {
    /// Applies the codes to a held-button field: release first, then OR.
    pub fn apply(self, button: &mut u16) {
        if self.release_all {
            *button = 0;
        }
        *button |= self.pressed.bits();
    }
}

pub fn parse_button_codes(codes: &str) -> Result<ButtonCodes, PadCodeError> {
    let mut parsed = ButtonCodes {
        release_all: false,
        pressed: PadButtons::empty(),
    };
    for code in codes.chars().filter(|c| !c.is_whitespace()) {
        let button = match code {
            RELEASE_ALL_CODE => {
                parsed.release_all = true;
                continue;
            }
            'A' => PadButtons::A,
            'B' => PadButtons::B,
            'X' => PadButtons::X,
            'Y' => PadButtons::Y,
            'S' => PadButtons::START,
            'Z' => PadButtons::TRIGGER_Z,
            other => return Err(PadCodeError::UnknownButton(other)),
        };
        parsed.pressed |= button;
    }
    Ok(parsed)
}

pub fn parse_dpad_codes(codes: &str) -> Result<PadButtons, PadCodeError> {
    let mut pressed = PadButtons::empty();
    for code in codes.chars().filter(|c| !c.is_whitespace()) {
        pressed |= match code {
            'U' => PadButtons::UP,
            'D' => PadButtons::DOWN,
            'L' => PadButtons::LEFT,
            'R' => PadButtons::RIGHT,
            other => return Err(PadCodeError::UnknownDirection(other)),
        };
    }
    Ok(pressed)
}

/// Converts a polar stick request into axis values around the 128 centre.
pub fn polar_to_axes(magnitude: i64, angle_degrees: f64) -> Result<(u8, u8), PadCodeError> {
    if !(0..POLAR_MAGNITUDE_LIMIT).contains(&magnitude) {
        return Err(PadCodeError::MagnitudeOutOfRange(magnitude));
    }
    let theta = angle_degrees.to_radians();
    let m = magnitude as f64;
    let x = (m * theta.cos()).floor() + f64::from(MAIN_STICK_CENTER);
    let y = (m * theta.sin()).floor() + f64::from(MAIN_STICK_CENTER);
    Ok((narrow_axis(x), narrow_axis(y)))
}

fn narrow_axis(value: f64) -> u8 {
    value.clamp(0.0, f64::from(u8::MAX)) as u8
}
