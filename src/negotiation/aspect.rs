// SPDX-License-Identifier: GPL-3.0-only

//! Pixel aspect ratio
//!
//! The device reports the pixel aspect of its default crop rectangle. The
//! ratio for the current format follows from scaling that rectangle to the
//! current size:
//!
//! ```text
//! x : y = (den * hint_width) / cur_width : (num * hint_height) / cur_height
//! ```
//!
//! where `num/den` is the pixel aspect and `hint_*` is the default crop
//! size. The result is kept exact and reduced to lowest terms. A single-field format carries half the lines, so the numerator
//! doubles and the hint height halves.

use super::standards::{LineSystem, line_system};
use crate::codec::{CropCapability, Field, FrameSize, Fraction};
use serde::{Deserialize, Serialize};

/// Where the pixel aspect comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelAspectHint {
    /// Whatever the device or the active standard reports
    #[default]
    DeviceDefault,
    Square,
    Ntsc,
    NtscAnamorphic,
    Pal,
    PalAnamorphic,
}

impl PixelAspectHint {
    pub const ALL: [PixelAspectHint; 6] = [
        PixelAspectHint::DeviceDefault,
        PixelAspectHint::Square,
        PixelAspectHint::Ntsc,
        PixelAspectHint::NtscAnamorphic,
        PixelAspectHint::Pal,
        PixelAspectHint::PalAnamorphic,
    ];

    /// Fixed pixel aspect, `None` for the device default
    pub fn pixel_aspect(self) -> Option<Fraction> {
        match self {
            PixelAspectHint::DeviceDefault => None,
            PixelAspectHint::Square => Some(Fraction::new(1, 1)),
            PixelAspectHint::Ntsc => Some(Fraction::new(11, 10)),
            PixelAspectHint::NtscAnamorphic => Some(Fraction::new(33, 40)),
            PixelAspectHint::Pal => Some(Fraction::new(11, 12)),
            PixelAspectHint::PalAnamorphic => Some(Fraction::new(11, 16)),
        }
    }
}

/// Display aspect of one pixel as `x:y`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelAspect {
    pub x: u32,
    pub y: u32,
}

impl PixelAspect {
    pub const SQUARE: PixelAspect = PixelAspect { x: 1, y: 1 };

    pub fn ratio(self) -> f64 {
        if self.y == 0 {
            return 1.0;
        }
        self.x as f64 / self.y as f64
    }
}

/// Pixel aspect and default size when the device has no crop capability
fn standard_fallback(standard: Option<u64>) -> (Fraction, FrameSize) {
    match standard.and_then(line_system) {
        Some(LineSystem::Lines525) => (Fraction::new(11, 10), FrameSize::new(720, 480)),
        Some(LineSystem::Lines625) => (Fraction::new(54, 59), FrameSize::new(720, 576)),
        None => (Fraction::new(1, 1), FrameSize::new(0, 0)),
    }
}

/// Pixel aspect for `current`, or 1:1 when any input is degenerate
pub fn pixel_aspect(
    hint: PixelAspectHint,
    crop_cap: Option<&CropCapability>,
    standard: Option<u64>,
    field: Field,
    current: FrameSize,
) -> PixelAspect {
    let (mut aspect, default_size) = match crop_cap {
        Some(cap) => (
            cap.pixelaspect,
            FrameSize::new(cap.defrect.width, cap.defrect.height),
        ),
        None => standard_fallback(standard),
    };
    if let Some(fixed) = hint.pixel_aspect() {
        aspect = fixed;
    }

    let hint_width = if default_size.width == 0 {
        current.width
    } else {
        default_size.width
    };
    let mut num = aspect.numerator as u64;
    let mut hint_height = default_size.height;
    if field.is_single_field() {
        num *= 2;
        hint_height /= 2;
    }
    if hint_height == 0 {
        hint_height = current.height;
    }

    if current.width == 0 || current.height == 0 || aspect.denominator == 0 || num == 0 {
        return PixelAspect::SQUARE;
    }
    // x / y = (den * hint_width * cur_height) / (num * hint_height * cur_width)
    let x = aspect.denominator as u128 * hint_width as u128 * current.height as u128;
    let y = num as u128 * hint_height as u128 * current.width as u128;
    reduced(x, y)
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// `x:y` in lowest terms, scaled down if it still does not fit in `u32`
fn reduced(x: u128, y: u128) -> PixelAspect {
    if x == 0 || y == 0 {
        return PixelAspect::SQUARE;
    }
    let g = gcd(x, y);
    let (mut x, mut y) = (x / g, y / g);
    while x > u32::MAX as u128 || y > u32::MAX as u128 {
        x = (x >> 1).max(1);
        y = (y >> 1).max(1);
    }
    PixelAspect {
        x: x as u32,
        y: y as u32,
    }
}
