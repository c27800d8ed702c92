//! Color codec: caller colors to the three 16-bit wire channels.
//!
//! Same-mode inputs are scaled directly. Cross-mode inputs go through the
//! wide-gamut sRGB / CIE 1931 conversion the bridge itself uses (D65 white
//! point, sRGB companding), so a frame always carries values in the
//! session's declared color space.

use serde::{Deserialize, Serialize};

use crate::model::Color;

/// Color space declared in the frame header.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum ColorSpace {
    #[default]
    #[strum(to_string = "rgb")]
    Rgb,
    #[strum(to_string = "xy", serialize = "xyb")]
    Xy,
}

impl ColorSpace {
    pub const fn wire_tag(self) -> u8 {
        match self {
            Self::Rgb => 0x00,
            Self::Xy => 0x01,
        }
    }

    pub const fn from_wire_tag(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(Self::Rgb),
            0x01 => Some(Self::Xy),
            _ => None,
        }
    }
}

/// Encode `color` as three big-endian-ready channels in `space`.
///
/// RGB mode yields (R, G, B); XY mode yields (x, y, brightness).
/// Never fails: out-of-range and NaN floats are clamped.
pub fn encode(color: &Color, space: ColorSpace) -> [u16; 3] {
    match (*color, space) {
        (Color::Rgb8 { r, g, b }, ColorSpace::Rgb) => [r, g, b].map(byte_to_wide),
        (Color::Xy { x, y, brightness }, ColorSpace::Xy) => [x, y, brightness].map(unit_to_wide),
        (Color::Rgb8 { r, g, b }, ColorSpace::Xy) => rgb_to_xyb(r, g, b).map(unit_to_wide),
        (Color::Xy { x, y, brightness }, ColorSpace::Rgb) => {
            xyb_to_rgb(x, y, brightness).map(unit_to_wide)
        }
    }
}

// ── Scaling ──────────────────────────────────────────────────────────

/// 0..=255 onto 0..=65535 (0xAB becomes 0xABAB).
fn byte_to_wide(value: u8) -> u16 {
    u16::from(value) * 257
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
fn unit_to_wide(value: f64) -> u16 {
    let value = clamp_unit(value);
    (value * f64::from(u16::MAX)).round() as u16
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

// ── Gamut conversion ─────────────────────────────────────────────────

fn gamma_expand(channel: f64) -> f64 {
    if channel > 0.040_45 {
        ((channel + 0.055) / 1.055).powf(2.4)
    } else {
        channel / 12.92
    }
}

fn gamma_compress(channel: f64) -> f64 {
    if channel <= 0.003_130_8 {
        12.92 * channel
    } else {
        1.055 * channel.powf(1.0 / 2.4) - 0.055
    }
}

/// sRGB bytes to (x, y, luminance).
fn rgb_to_xyb(r: u8, g: u8, b: u8) -> [f64; 3] {
    let [r, g, b] = [r, g, b].map(|c| gamma_expand(f64::from(c) / 255.0));

    let x = r * 0.664_511 + g * 0.154_324 + b * 0.162_028;
    let y = r * 0.283_881 + g * 0.668_433 + b * 0.047_685;
    let z = r * 0.000_088 + g * 0.072_310 + b * 0.986_039;

    let sum = x + y + z;
    if sum <= 0.0 {
        return [0.0; 3];
    }
    [x / sum, y / sum, y]
}

/// (x, y, brightness) to sRGB in [0, 1], normalized so the strongest
/// channel never exceeds full scale.
fn xyb_to_rgb(x: f64, y: f64, brightness: f64) -> [f64; 3] {
    let (x, y, luminance) = (clamp_unit(x), clamp_unit(y), clamp_unit(brightness));
    if y <= 0.0 || luminance <= 0.0 {
        return [0.0; 3];
    }

    let big_x = luminance / y * x;
    let big_z = luminance / y * (1.0 - x - y);

    let r = big_x * 1.656_492 - luminance * 0.354_851 - big_z * 0.255_038;
    let g = -big_x * 0.707_196 + luminance * 1.655_397 + big_z * 0.036_152;
    let b = big_x * 0.051_713 - luminance * 0.121_364 + big_z * 1.011_530;

    let rgb = [r, g, b].map(|c| gamma_compress(c.max(0.0)));
    let peak = rgb.iter().copied().fold(0.0_f64, f64::max);
    if peak > 1.0 { rgb.map(|c| c / peak) } else { rgb }
}
