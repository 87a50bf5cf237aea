//! Canadian Forest Fire Weather Index (FWI) System calculator (C1).
//!
//! Six derived indices — FFMC, DMC, DC, ISI, BUI, FWI — plus the Daily
//! Severity Rating they imply. Every `new`/calculation constructor is a
//! pure function of its documented inputs; none of them allocate or touch
//! I/O, so they're cheap to call per-cell, per-hour.
//!
//! Relative humidity is clamped to `[0, 100]` by [`crate::units::Percent`]
//! before it ever reaches these formulas, so nothing here returns a
//! `Result` — spec-level `InvalidInput` belongs to the weather-stream and
//! CLI layers that accept raw, untrusted numbers.

use crate::units::{Celsius, KilometresPerHour, Millimetres, Percent};
use std::cmp::Ordering;

/// `K` in `m = K·(101−F)/(59.5+F)`, the FFMC/moisture-content bijection
/// constant from spec.md §4.1.
pub const FFMC_MOISTURE_CONSTANT: f64 = 250.0 * 59.5 / 101.0;

macro_rules! fwi_index {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Default)]
        pub struct $name {
            value: f64,
        }

        impl Eq for $name {}

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.value.total_cmp(&other.value)
            }
        }

        impl $name {
            /// Sentinel meaning "not yet calculated".
            pub const INVALID: $name = $name { value: -1.0 };
            /// The index's minimum valid (startup) value.
            pub const ZERO: $name = $name { value: 0.0 };

            /// Wrap an already-computed value (e.g. one read back from a
            /// weather file) without recomputing it.
            #[must_use]
            pub const fn from_value(value: f64) -> Self {
                Self { value }
            }

            /// The raw index value.
            #[must_use]
            pub const fn value(self) -> f64 {
                self.value
            }

            /// True if this is the `-1` "invalid" sentinel.
            #[must_use]
            pub fn is_invalid(self) -> bool {
                self == Self::INVALID
            }
        }
    };
}

fwi_index!(Ffmc, "Fine Fuel Moisture Code.");
fwi_index!(Dmc, "Duff Moisture Code.");
fwi_index!(Dc, "Drought Code.");
fwi_index!(Isi, "Initial Spread Index.");
fwi_index!(Bui, "Build-up Index.");
fwi_index!(Fwi, "Fire Weather Index.");
fwi_index!(Dsr, "Daily Severity Rating.");

/// Convert a Fine Fuel Moisture Code to fine-fuel moisture content (%).
#[must_use]
pub fn ffmc_to_moisture(ffmc: Ffmc) -> f64 {
    let f = ffmc.value();
    FFMC_MOISTURE_CONSTANT * (101.0 - f) / (59.5 + f)
}

/// Convert fine-fuel moisture content (%) back to a Fine Fuel Moisture
/// Code. Exact inverse of [`ffmc_to_moisture`] (§8 FWI round-trip
/// property).
#[must_use]
pub fn moisture_to_ffmc(moisture: f64) -> Ffmc {
    Ffmc::from_value(59.5 * (250.0 - moisture) / (FFMC_MOISTURE_CONSTANT + moisture))
}

impl Ffmc {
    /// Calculate today's FFMC from yesterday's and today's noon weather.
    ///
    /// `precip24` is the 24h (noon-to-noon) accumulated precipitation.
    #[must_use]
    pub fn calculate(
        temperature: Celsius,
        rh: Percent,
        wind_speed: KilometresPerHour,
        precip24: Millimetres,
        previous: Ffmc,
    ) -> Self {
        let t = temperature.value();
        let h = rh.value();
        let ws = wind_speed.value();
        let prec = precip24.value();

        let mut mo = ffmc_to_moisture(previous);

        if prec > 0.5 {
            let rf = prec - 0.5;
            let mut mr = if mo <= 150.0 {
                mo + 42.5 * rf * (-100.0 / (251.0 - mo)).exp() * (1.0 - (-6.93 / rf).exp())
            } else {
                mo + 42.5 * rf * (-100.0 / (251.0 - mo)).exp() * (1.0 - (-6.93 / rf).exp())
                    + 0.0015 * (mo - 150.0).powi(2) * rf.sqrt()
            };
            mr = mr.min(250.0);
            mo = mr;
        }

        let ed = 0.942 * h.powf(0.679)
            + 11.0 * ((h - 100.0) / 10.0).exp()
            + 0.18 * (21.1 - t) * (1.0 - (-0.115 * h).exp());

        let m = if mo > ed {
            let ko = 0.424 * (1.0 - (h / 100.0).powf(1.7))
                + 0.0694 * ws.sqrt() * (1.0 - (h / 100.0).powi(8));
            let kd = ko * 0.581 * (0.0365 * t).exp();
            ed + (mo - ed) * 10f64.powf(-kd)
        } else {
            let ew = 0.618 * h.powf(0.753)
                + 10.0 * ((h - 100.0) / 10.0).exp()
                + 0.18 * (21.1 - t) * (1.0 - (-0.115 * h).exp());
            if mo < ew {
                let k1 = 0.424 * (1.0 - ((100.0 - h) / 100.0).powf(1.7))
                    + 0.0694 * ws.sqrt() * (1.0 - ((100.0 - h) / 100.0).powi(8));
                let kw = k1 * 0.581 * (0.0365 * t).exp();
                ew - (ew - mo) * 10f64.powf(-kw)
            } else {
                mo
            }
        };

        Ffmc::from_value(moisture_to_ffmc(m).value().clamp(0.0, 101.0))
    }
}

/// Month-indexed (Jan=0..=Dec=11) effective day-length for DMC drying,
/// northern mid-latitude table from the published FWI System.
const DMC_DAY_LENGTH: [f64; 12] = [
    6.5, 7.5, 9.0, 12.8, 13.9, 13.9, 12.4, 10.9, 9.4, 8.0, 7.0, 6.0,
];

/// Month-indexed day-length adjustment factor for DC drying, same table
/// source as [`DMC_DAY_LENGTH`].
const DC_DAY_LENGTH_FACTOR: [f64; 12] =
    [-1.6, -1.6, -1.6, 0.9, 3.8, 5.8, 6.4, 5.0, 2.4, 0.4, -1.6, -1.6];

/// Southern-hemisphere stations see the same seasonal day-length curve
/// six months out of phase; this approximates it by shifting the table
/// index rather than carrying a second table (documented in DESIGN.md).
fn seasonal_month_index(month: u32, latitude: f64) -> usize {
    let m = month.clamp(1, 12) as usize - 1;
    if latitude < 0.0 {
        (m + 6) % 12
    } else {
        m
    }
}

impl Dmc {
    /// Calculate today's DMC.
    #[must_use]
    pub fn calculate(
        temperature: Celsius,
        rh: Percent,
        precip24: Millimetres,
        previous: Dmc,
        month: u32,
        latitude: f64,
    ) -> Self {
        let t = temperature.value().max(-1.1);
        let h = rh.value();
        let prec = precip24.value();
        let dmc_prev = previous.value().max(0.0);

        let after_rain = if prec > 1.5 {
            let re = 0.92 * prec - 1.27;
            let mo = 20.0 + (5.6348 - dmc_prev / 43.43).exp();
            let b = if dmc_prev <= 33.0 {
                100.0 / (0.5 + 0.3 * dmc_prev)
            } else if dmc_prev <= 65.0 {
                14.0 - 1.3 * dmc_prev.ln()
            } else {
                6.2 * dmc_prev.ln() - 17.2
            };
            let mr = mo + 1000.0 * re / (48.77 + b * re);
            if mr > 20.0 {
                (244.72 - 43.43 * (mr - 20.0).ln()).max(0.0)
            } else {
                0.0
            }
        } else {
            dmc_prev
        };

        let le = DMC_DAY_LENGTH[seasonal_month_index(month, latitude)];
        let k = 1.894 * (t + 1.1) * (100.0 - h) * le * 1e-6;
        Dmc::from_value((after_rain + 100.0 * k).max(0.0))
    }
}

impl Dc {
    /// Calculate today's DC.
    #[must_use]
    pub fn calculate(
        temperature: Celsius,
        precip24: Millimetres,
        previous: Dc,
        month: u32,
        latitude: f64,
    ) -> Self {
        let t = temperature.value();
        let prec = precip24.value();
        let dc_prev = previous.value().max(0.0);

        let after_rain = if prec > 2.8 {
            let rd = 0.83 * prec - 1.27;
            let qo = 800.0 * (-dc_prev / 400.0).exp();
            let qr = qo + 3.937 * rd;
            if qr > 0.0 {
                (400.0 * (800.0 / qr).ln()).max(0.0)
            } else {
                0.0
            }
        } else {
            dc_prev
        };

        let lf = DC_DAY_LENGTH_FACTOR[seasonal_month_index(month, latitude)];
        let v = (0.36 * (t + 2.8) + lf).max(0.0);
        Dc::from_value((after_rain + 0.5 * v).max(0.0))
    }
}

impl Isi {
    /// Calculate ISI from wind speed and FFMC, no tolerance check.
    #[must_use]
    pub fn calculate(wind_speed: KilometresPerHour, ffmc: Ffmc) -> Self {
        let m = ffmc_to_moisture(ffmc);
        let f_wind = (0.05039 * wind_speed.value()).exp();
        let f_ffmc = 91.9 * (-0.1386 * m).exp() * (1.0 + m.powi(5) / 4.93e7);
        Isi::from_value(0.208 * f_wind * f_ffmc)
    }
}

/// Recompute ISI and compare it against a previously stored value. If they
/// disagree by more than `1e-6`, log a warning and return the recomputed
/// value — stored values never win (Open Question resolution, see
/// DESIGN.md).
#[must_use]
pub fn check_isi(stored: f64, wind_speed: KilometresPerHour, ffmc: Ffmc) -> Isi {
    let recomputed = Isi::calculate(wind_speed, ffmc);
    if (recomputed.value() - stored).abs() > 1e-6 {
        tracing::warn!(
            stored,
            recomputed = recomputed.value(),
            "stored ISI disagrees with recomputed value; using recomputed"
        );
    }
    recomputed
}

impl Bui {
    /// Calculate BUI from DMC and DC.
    #[must_use]
    pub fn calculate(dmc: Dmc, dc: Dc) -> Self {
        let p = dmc.value();
        let d = dc.value();
        if p <= 0.0 && d <= 0.0 {
            return Bui::ZERO;
        }
        let value = if p <= 0.4 * d {
            0.8 * p * d / (p + 0.4 * d)
        } else {
            p - (1.0 - 0.8 * d / (p + 0.4 * d)) * (0.92 + (0.0114 * p).powf(1.7))
        };
        Bui::from_value(value.max(0.0))
    }
}

/// Recompute BUI and compare it against a previously stored value, same
/// tolerance policy as [`check_isi`].
#[must_use]
pub fn check_bui(stored: f64, dmc: Dmc, dc: Dc) -> Bui {
    let recomputed = Bui::calculate(dmc, dc);
    if (recomputed.value() - stored).abs() > 1e-6 {
        tracing::warn!(
            stored,
            recomputed = recomputed.value(),
            "stored BUI disagrees with recomputed value; using recomputed"
        );
    }
    recomputed
}

impl Fwi {
    /// Calculate FWI from ISI and BUI.
    #[must_use]
    pub fn calculate(isi: Isi, bui: Bui) -> Self {
        let i = isi.value();
        let u = bui.value();
        let f_d = if u <= 80.0 {
            0.626 * u.powf(0.809) + 2.0
        } else {
            1000.0 / (25.0 + 108.64 * (-0.023 * u).exp())
        };
        let b = 0.1 * i * f_d;
        let value = if b > 1.0 {
            (2.72 * (0.434 * b.ln()).powf(0.647)).exp()
        } else {
            b
        };
        Fwi::from_value(value)
    }
}

/// Recompute FWI and compare it against a previously stored value, same
/// tolerance policy as [`check_isi`].
#[must_use]
pub fn check_fwi(stored: f64, isi: Isi, bui: Bui) -> Fwi {
    let recomputed = Fwi::calculate(isi, bui);
    if (recomputed.value() - stored).abs() > 1e-6 {
        tracing::warn!(
            stored,
            recomputed = recomputed.value(),
            "stored FWI disagrees with recomputed value; using recomputed"
        );
    }
    recomputed
}

impl Dsr {
    /// Daily Severity Rating, a direct (and cheap) derivation of FWI that
    /// the original FWI System always computes alongside it (§9 of
    /// SPEC_FULL.md — not in spec.md's own operation list, but carried
    /// forward from `original_source/FWI.h`).
    #[must_use]
    pub fn calculate(fwi: Fwi) -> Self {
        Dsr::from_value(0.0272 * fwi.value().max(0.0).powf(1.77))
    }
}

/// A full weather observation with its computed FWI indices (§3
/// `FwiWeather`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FwiWeather {
    /// Air temperature.
    pub temperature: Celsius,
    /// Relative humidity.
    pub rh: Percent,
    /// Wind observation.
    pub wind: crate::units::Wind,
    /// Precipitation (1h accumulation for hourly rows, 24h for daily).
    pub precipitation: Millimetres,
    /// Fine Fuel Moisture Code.
    pub ffmc: Ffmc,
    /// Duff Moisture Code.
    pub dmc: Dmc,
    /// Drought Code.
    pub dc: Dc,
    /// Initial Spread Index.
    pub isi: Isi,
    /// Build-up Index.
    pub bui: Bui,
    /// Fire Weather Index.
    pub fwi: Fwi,
}

impl FwiWeather {
    /// Fine-fuel moisture content (%) implied by this observation's FFMC.
    #[must_use]
    pub fn moisture_pct(&self) -> f64 {
        ffmc_to_moisture(self.ffmc)
    }
}
