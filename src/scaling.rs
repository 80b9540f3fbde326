//! Conversion between physical quantities and raw 16-bit register values.
//!
//! A register holds `round(physical / scale)`. The scale is the physical size of one
//! raw unit, e.g. `0.01` for a register counting in 10 mV steps.

use crate::error::EncodingError;

/// 10 mV per raw unit.
pub const CENTIVOLTS: f64 = 0.01;
/// 1 mA per raw unit.
pub const MILLIAMPS: f64 = 0.001;
/// 10 mW per raw unit.
pub const CENTIWATTS: f64 = 0.01;
/// Raw value is the physical value.
pub const UNITY: f64 = 1.0;

/// Absorbs binary representation error of decimal inputs sitting on a half step,
/// so `2.005 V` at 10 mV resolution encodes as `201`, not `200`.
const HALF_STEP_SLACK: f64 = 1e-9;

/// Convert `physical` to the raw register value at `scale`, rounding to the nearest
/// raw unit (halves round up).
///
/// Fails with [`EncodingError::OutOfRange`] for negative results, results above
/// `u16::MAX`, and non-finite input.
pub fn to_raw(physical: f64, scale: f64) -> Result<u16, EncodingError> {
    let out_of_range = EncodingError::OutOfRange {
        value: physical,
        scale,
    };
    let steps = physical / scale;
    if !steps.is_finite() || !(scale > 0.0) {
        return Err(out_of_range);
    }

    // Truncation of a non-negative value is floor; `f64::round` needs std.
    let shifted = steps + 0.5 + HALF_STEP_SLACK;
    if shifted < 0.0 {
        return Err(out_of_range);
    }
    let rounded = shifted as u64;
    u16::try_from(rounded).map_err(|_| out_of_range)
}

/// Convert a raw register value to its physical quantity at `scale`.
#[inline]
pub fn from_raw(raw: u16, scale: f64) -> f64 {
    raw as f64 * scale
}
