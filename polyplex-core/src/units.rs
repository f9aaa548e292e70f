// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `units` module provides definitions for common units.

use std::fmt;
use std::ops::{Add, Sub};

/// A `Timestamp` is an instant in time since the start of a stream, counted in ticks of that
/// stream's [`TimeBase`].
///
/// Timestamps are monotonically non-decreasing only within one stream, never across streams.
pub type Timestamp = i64;

/// A `Duration` is a span of time counted in ticks of a stream's [`TimeBase`].
pub type Duration = i64;

/// The number of [`Time`] ticks per second.
pub const TIME_SCALE: u32 = 1_000_000;

/// A `TimeBase` is the conversion factor between time, expressed in seconds, and a `Timestamp`
/// or `Duration`.
///
/// In other words, a `TimeBase` is the length in seconds of one tick of a `Timestamp`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TimeBase {
    /// The numerator.
    pub numer: u32,
    /// The denominator.
    pub denom: u32,
}

impl TimeBase {
    /// The time base of [`Time`], one microsecond.
    pub const MICROS: TimeBase = TimeBase { numer: 1, denom: TIME_SCALE };

    /// Creates a new `TimeBase`. Panics if either the numerator or denominator is 0.
    pub fn new(numer: u32, denom: u32) -> Self {
        if numer == 0 || denom == 0 {
            panic!("TimeBase cannot have 0 numerator or denominator");
        }

        TimeBase { numer, denom }
    }

    /// Creates a new `TimeBase`, or `None` if either the numerator or denominator is 0.
    pub fn try_new(numer: u32, denom: u32) -> Option<Self> {
        if numer == 0 || denom == 0 {
            None
        }
        else {
            Some(TimeBase { numer, denom })
        }
    }

    /// Creates a `TimeBase` that is the reciprocal of a rate (e.g., a sample rate).
    pub fn from_rate(rate: u32) -> Option<Self> {
        TimeBase::try_new(1, rate)
    }

    /// Converts a tick count in this time base into the equivalent tick count in `other`.
    ///
    /// The result is rounded towards negative infinity and saturates on overflow.
    pub fn rescale(&self, ts: Timestamp, other: TimeBase) -> Timestamp {
        if *self == other {
            return ts;
        }

        // ts * (n0 / d0) / (n1 / d1) = ts * n0 * d1 / (d0 * n1). The numerator requires up-to
        // 128 bits.
        let num = i128::from(ts) * i128::from(self.numer) * i128::from(other.denom);
        let den = i128::from(self.denom) * i128::from(other.numer);

        let q = num.div_euclid(den);

        q.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }
}

impl From<TimeBase> for f64 {
    fn from(timebase: TimeBase) -> Self {
        f64::from(timebase.numer) / f64::from(timebase.denom)
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numer, self.denom)
    }
}

/// `Time` is a signed span of time, or an instant relative to the start of the media, with
/// microsecond precision.
///
/// `Time` is the common time base all streams are converted into whenever times of different
/// streams must be compared.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(i64);

impl Time {
    pub const ZERO: Time = Time(0);
    pub const MAX: Time = Time(i64::MAX);

    /// Create a `Time` from a number of microseconds.
    pub const fn from_micros(micros: i64) -> Self {
        Time(micros)
    }

    /// Create a `Time` from a number of milliseconds.
    pub const fn from_millis(millis: i64) -> Self {
        Time(millis.saturating_mul(1_000))
    }

    /// Create a `Time` from a whole number of seconds.
    pub const fn from_secs(secs: i64) -> Self {
        Time(secs.saturating_mul(TIME_SCALE as i64))
    }

    /// Create a `Time` from fractional seconds. Non-finite values map to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs.is_finite() {
            Time((secs * f64::from(TIME_SCALE)).round() as i64)
        }
        else {
            Time::ZERO
        }
    }

    /// Convert a timestamp in the given time base into a `Time`.
    pub fn from_ts(ts: Timestamp, tb: TimeBase) -> Self {
        Time(tb.rescale(ts, TimeBase::MICROS))
    }

    /// Convert this `Time` into a timestamp in the given time base.
    pub fn to_ts(self, tb: TimeBase) -> Timestamp {
        TimeBase::MICROS.rescale(self.0, tb)
    }

    /// Get the number of microseconds.
    pub const fn as_micros(self) -> i64 {
        self.0
    }

    /// Get the time in fractional seconds.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / f64::from(TIME_SCALE)
    }

    /// Scale the time by a factor, rounding to the nearest microsecond.
    pub fn scale(self, factor: f64) -> Self {
        Time::from_micros((self.0 as f64 * factor).round() as i64)
    }

    pub const fn saturating_add(self, rhs: Time) -> Self {
        Time(self.0.saturating_add(rhs.0))
    }

    pub const fn saturating_sub(self, rhs: Time) -> Self {
        Time(self.0.saturating_sub(rhs.0))
    }

    /// Get the absolute distance between two times.
    pub const fn abs_diff(self, rhs: Time) -> Time {
        Time(self.0.abs_diff(rhs.0) as i64)
    }
}

impl Add for Time {
    type Output = Time;

    fn add(self, rhs: Time) -> Time {
        self.saturating_add(rhs)
    }
}

impl Sub for Time {
    type Output = Time;

    fn sub(self, rhs: Time) -> Time {
        self.saturating_sub(rhs)
    }
}

impl From<std::time::Duration> for Time {
    fn from(duration: std::time::Duration) -> Self {
        Time(i64::try_from(duration.as_micros()).unwrap_or(i64::MAX))
    }
}

impl TryFrom<Time> for std::time::Duration {
    type Error = Time;

    /// Negative times have no `std::time::Duration` equivalent.
    fn try_from(time: Time) -> Result<Self, Self::Error> {
        u64::try_from(time.0).map(std::time::Duration::from_micros).map_err(|_| time)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let micros = self.0.unsigned_abs();

        let millis = (micros / 1_000) % 1_000;
        let secs = micros / 1_000_000;

        write!(f, "{}{}:{:02}:{:02}.{:03}", sign, secs / 3600, (secs / 60) % 60, secs % 60, millis)
    }
}
