//! Time-related types based on the UWB radio's system time
//!
//! All ranging arithmetic in this crate happens on the radio's 40-bit tick
//! counter. The types here encapsulate that counter: [`Instant`] is a point
//! on the (wrapping) system clock, [`Duration`] is a tick count between two
//! such points.

use core::ops::{Add, Div, Mul, Sub};

use serde::{Deserialize, Serialize};

/// The maximum value of 40-bit system time stamps.
pub const TIME_MAX: u64 = 0xffff_ffff_ff;

/// Speed of light in m/s
pub const SPEED_OF_LIGHT: u64 = 299_792_458;

/// Meters the radio signal travels per system-time tick
///
/// One tick is 1/(128 × 499.2 MHz) ≈ 15.65 ps, so this is
/// `SPEED_OF_LIGHT × 15.65e-12`.
pub const METERS_PER_TICK: f32 = 0.004_691_763_9;

/// Represents an instant in time
///
/// Internally uses the same 40-bit timestamps that the radio uses.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(C)]
pub struct Instant(u64);

impl Instant {
    /// Creates a new instance of `Instant`
    ///
    /// The given value must fit in a 40-bit timestamp, so:
    /// 0 <= `value` <= 2^40 - 1
    ///
    /// Returns `Some(...)`, if `value` is within the valid range, `None` if
    /// it isn't.
    ///
    /// # Example
    ///
    /// ``` rust
    /// use twr_ring::time::{Instant, TIME_MAX};
    ///
    /// let valid_instant   = Instant::new(TIME_MAX);
    /// let invalid_instant = Instant::new(TIME_MAX + 1);
    ///
    /// assert!(valid_instant.is_some());
    /// assert!(invalid_instant.is_none());
    /// ```
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Instant(value))
        } else {
            None
        }
    }

    /// Creates an `Instant` from its 5-byte little-endian wire encoding
    pub fn from_le_bytes(bytes: [u8; 5]) -> Self {
        let mut value = 0;
        for (i, b) in bytes.iter().enumerate() {
            value |= (*b as u64) << (8 * i);
        }

        // 5 bytes hold at most 40 bits, so this can't be out of range.
        Instant(value)
    }

    /// Returns the 5-byte little-endian wire encoding of this timestamp
    ///
    /// `Instant::from_le_bytes(instant.to_le_bytes())` round-trips for any
    /// timestamp.
    pub fn to_le_bytes(self) -> [u8; 5] {
        let mut bytes = [0; 5];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (self.0 >> (8 * i)) as u8;
        }
        bytes
    }

    /// Returns the raw 40-bit timestamp
    ///
    /// The returned value is guaranteed to be in the following range:
    /// 0 <= `value` <= 2^40 - 1
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the amount of time passed between the two `Instant`s
    ///
    /// Assumes that `&self` represents a later time than the argument
    /// `earlier`. Please make sure that this is the case, as this method has
    /// no way of knowing (40-bit timestamps can overflow, so comparing the
    /// numerical value of the timestamp doesn't tell anything about order).
    ///
    /// # Example
    ///
    /// ``` rust
    /// use twr_ring::time::{Instant, TIME_MAX};
    ///
    /// // `unwrap`ing here is okay, since we're passing constants that we
    /// // know are in the valid range.
    /// let instant_1 = Instant::new(TIME_MAX - 50).unwrap();
    /// let instant_2 = Instant::new(TIME_MAX).unwrap();
    /// let instant_3 = Instant::new(49).unwrap();
    ///
    /// // Works as expected, if the later timestamp is larger than the
    /// // earlier one.
    /// let duration = instant_2.duration_since(instant_1);
    /// assert_eq!(duration.value(), 50);
    ///
    /// // Still works as expected, if the later timestamp is the numerically
    /// // smaller value.
    /// let duration = instant_3.duration_since(instant_2);
    /// assert_eq!(duration.value(), 50);
    /// ```
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        if self.value() >= earlier.value() {
            Duration(self.value() - earlier.value())
        } else {
            Duration(TIME_MAX - earlier.value() + self.value() + 1)
        }
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Self::Output {
        // Both `Instant` and `Duration` are guaranteed to contain 40-bit
        // numbers, so this addition will never overflow.
        let value = (self.value() + rhs.value()) % (TIME_MAX + 1);

        // We made sure to keep the result of the addition within `TIME_MAX`,
        // so the following will never panic.
        Instant::new(value).unwrap()
    }
}

/// A duration between two instants in radio system time
///
/// Internally uses the same 40-bit timestamps that the radio uses.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(C)]
pub struct Duration(u64);

impl Duration {
    /// Creates a new instance of `Duration`
    ///
    /// The given value must fit in a 40-bit timestamp, so:
    /// 0 <= `value` <= 2^40 - 1
    ///
    /// Returns `Some(...)`, if `value` is within the valid range, `None` if
    /// it isn't.
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Duration(value))
        } else {
            None
        }
    }

    /// Creates an instance of `Duration` from a number of nanoseconds
    ///
    /// Uses the nominal 64 GHz time base: one nanosecond is 64 ticks.
    pub fn from_nanos(nanos: u32) -> Self {
        // `nanos` takes up at most 32 bits before it is cast to `u64`. That
        // means the result of the multiplication fits within 38 bits, so the
        // following should never panic.
        Duration::new(nanos as u64 * 64).unwrap()
    }

    /// Creates an instance of `Duration` from a number of microseconds
    ///
    /// The value must stay within the 40-bit range, which means
    /// `micros` <= 17_179_869.
    pub fn from_micros(micros: u32) -> Option<Self> {
        Duration::new(micros as u64 * 64_000)
    }

    /// Creates an instance of `Duration` from a number of milliseconds
    ///
    /// The value must stay within the 40-bit range, which means
    /// `millis` <= 17_179.
    pub fn from_millis(millis: u32) -> Option<Self> {
        Duration::new(millis as u64 * 64_000_000)
    }

    /// Returns the raw 40-bit timestamp
    ///
    /// The returned value is guaranteed to be in the following range:
    /// 0 <= `value` <= 2^40 - 1
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the distance the radio signal travels in this duration
    ///
    /// This is only meaningful for durations that represent a time of
    /// flight. The result is `ticks × 15.65 ps × c`, in meters.
    pub fn as_meters(&self) -> f32 {
        self.0 as f32 * METERS_PER_TICK
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Self::Output {
        Duration((self.value() + rhs.value()) % (TIME_MAX + 1))
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Self::Output {
        if self.value() >= rhs.value() {
            Duration(self.value() - rhs.value())
        } else {
            Duration(TIME_MAX - rhs.value() + self.value() + 1)
        }
    }
}

impl Mul<u32> for Duration {
    type Output = Duration;

    /// Multiplies in 64-bit intermediate space
    ///
    /// The caller is responsible for keeping the result within the 40-bit
    /// range; the low 40 bits are kept on overflow.
    fn mul(self, rhs: u32) -> Self::Output {
        Duration(self.value().wrapping_mul(rhs as u64) & TIME_MAX)
    }
}

impl Div<u32> for Duration {
    type Output = Duration;

    /// Divides in 64-bit intermediate space, rounding toward zero
    ///
    /// A zero divisor is the caller's responsibility, as with primitive
    /// integer division.
    fn div(self, rhs: u32) -> Self::Output {
        Duration(self.value() / rhs as u64)
    }
}
