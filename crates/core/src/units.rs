//! Semantic unit newtypes for physical quantities.
//!
//! Thin `f64` wrappers so Celsius can't be handed to a function expecting
//! Kelvin, or a percent clamped to `[0, 100]` can't silently be a raw
//! fraction. Each type totally orders via `f64::total_cmp` so weather and
//! index values can be sorted/compared even when a sentinel `-1.0`
//! ("invalid") value is present.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::{Add, Sub};

macro_rules! unit_newtype {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(pub f64);

        impl Eq for $name {}

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0.total_cmp(&other.0)
            }
        }

        impl $name {
            /// Wrap a raw value.
            #[must_use]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Unwrap to the raw `f64`.
            #[must_use]
            pub const fn value(self) -> f64 {
                self.0
            }
        }

        impl From<f64> for $name {
            fn from(v: f64) -> Self {
                Self(v)
            }
        }

        impl From<$name> for f64 {
            fn from(v: $name) -> f64 {
                v.0
            }
        }

        impl Add for $name {
            type Output = $name;
            fn add(self, rhs: $name) -> $name {
                $name(self.0 + rhs.0)
            }
        }

        impl Sub for $name {
            type Output = $name;
            fn sub(self, rhs: $name) -> $name {
                $name(self.0 - rhs.0)
            }
        }
    };
}

unit_newtype!(Celsius, "Temperature in degrees Celsius.");
unit_newtype!(KilometresPerHour, "Wind speed in km/h.");
unit_newtype!(Degrees, "Compass bearing in degrees, 0 = north, clockwise.");
unit_newtype!(Millimetres, "Precipitation depth in mm.");
unit_newtype!(Metres, "A linear distance in metres.");

/// A percentage clamped to `[0, 100]` at construction time (relative
/// humidity, slope-as-percent, curing). Out-of-range inputs are clamped
/// rather than rejected, matching the FWI calculator's documented
/// behaviour for relative humidity (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Percent(f64);

impl Percent {
    /// Sentinel for "not computed", used by edge cells that have no full
    /// 3x3 elevation window for Horn's algorithm (spec.md §4.3).
    pub const INVALID: Percent = Percent(-1.0);

    /// Clamp `value` into `[0, 100]` and wrap it.
    #[must_use]
    pub fn clamped(value: f64) -> Self {
        Self(value.clamp(0.0, 100.0))
    }

    /// Unwrap to the raw `f64` in `[0, 100]`.
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    /// As a `[0, 1]` fraction.
    #[must_use]
    pub fn fraction(self) -> f64 {
        self.0 / 100.0
    }
}

/// Ground slope as a percent grade, clamped to `[0, 500]` at construction
/// time (spec.md §3 `Cell`: "Slope in percent, clamped to `[0, 500]`") — a
/// distinct type from [`Percent`] because slope, unlike relative humidity or
/// curing, regularly exceeds 100% on steep terrain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SlopePercent(f64);

impl SlopePercent {
    /// Sentinel for "not computed" (edge cells with no full 3x3 elevation
    /// window for Horn's algorithm, spec.md §4.3).
    pub const INVALID: SlopePercent = SlopePercent(-1.0);

    /// Clamp `value` into `[0, 500]` and wrap it.
    #[must_use]
    pub fn clamped(value: f64) -> Self {
        Self(value.clamp(0.0, 500.0))
    }

    /// Unwrap to the raw `f64` in `[0, 500]`.
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }
}

/// Wind observation: direction (compass degrees) + speed (km/h).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    /// Direction the wind is blowing *from*, compass degrees.
    pub direction: Degrees,
    /// Wind speed, km/h.
    pub speed: KilometresPerHour,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_clamps_out_of_range() {
        assert_eq!(Percent::clamped(150.0).value(), 100.0);
        assert_eq!(Percent::clamped(-5.0).value(), 0.0);
        assert_eq!(Percent::clamped(42.0).value(), 42.0);
    }

    #[test]
    fn celsius_orders_with_sentinel_values() {
        let mut v = vec![Celsius::new(10.0), Celsius::new(-1.0), Celsius::new(25.0)];
        v.sort();
        assert_eq!(v, vec![Celsius::new(-1.0), Celsius::new(10.0), Celsius::new(25.0)]);
    }

    #[test]
    fn slope_percent_allows_up_to_500_unlike_percent() {
        assert_eq!(SlopePercent::clamped(350.0).value(), 350.0);
        assert_eq!(SlopePercent::clamped(600.0).value(), 500.0);
        assert_eq!(SlopePercent::clamped(-5.0).value(), 0.0);
    }
}
