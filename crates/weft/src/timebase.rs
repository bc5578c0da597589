//! Rational time bases and timestamp rescaling.
//!
//! Every stream counts time in integer ticks of its own rational unit
//! (e.g. 1/48000 for 48 kHz audio, 1/90000 for transport streams).
//! Rescaling between units is pure integer arithmetic: widen to i128,
//! round to nearest with ties away from zero. Durations get one extra
//! rule - a non-zero duration never collapses to zero ticks, because a
//! zero-length packet would stall the timeline it is supposed to extend.

use std::fmt;

/// Duration of one timestamp tick, as the rational `num/den` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub num: u32,
    pub den: u32,
}

impl TimeBase {
    pub fn new(num: u32, den: u32) -> Self {
        debug_assert!(num > 0 && den > 0, "degenerate time base {num}/{den}");
        Self { num, den }
    }

    /// Tick = one sample at `rate` Hz. The usual audio time base.
    pub fn hz(rate: u32) -> Self {
        Self::new(1, rate)
    }

    /// Position of `ticks` in seconds.
    pub fn to_seconds(self, ticks: i64) -> f64 {
        ticks as f64 * self.num as f64 / self.den as f64
    }

    /// Whole ticks covering `seconds`, truncated.
    pub fn from_seconds(self, seconds: f64) -> i64 {
        (seconds * self.den as f64 / self.num as f64) as i64
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Convert `value` ticks of `from` into ticks of `to`.
///
/// Round to nearest; ties resolve away from zero so that symmetric
/// inputs stay symmetric around the origin.
pub fn rescale(value: i64, from: TimeBase, to: TimeBase) -> i64 {
    let num = value as i128 * from.num as i128 * to.den as i128;
    let den = from.den as i128 * to.num as i128;
    let rounded = (2 * num + num.signum() * den) / (2 * den);
    rounded as i64
}

/// Like [`rescale`], but a positive duration never becomes zero.
pub fn rescale_duration(value: i64, from: TimeBase, to: TimeBase) -> i64 {
    let rescaled = rescale(value, from, to);
    if value > 0 && rescaled == 0 {
        1
    } else {
        rescaled
    }
}
