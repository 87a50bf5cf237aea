//! Cell-to-cell spread kernel contract and reference implementation
//! (spec.md §1 "cell-level spread kernel internals are a black box with a
//! stated contract", §4.6, component boundary between C6 `Scenario` and the
//! fuel-behaviour collaborator).
//!
//! [`SpreadKernel`] is the seam: [`crate::scenario::Scenario`] calls it once
//! per burning-cell/neighbour pair per time step and only cares about the
//! two numbers it returns. [`FbpSpreadKernel`] is a reference
//! implementation grounded in the teacher's Rothermel/crown-fire physics
//! (`physics::rothermel`, `solver::crown_fire`), re-expressed against the
//! Canadian FBP indices this engine actually carries (ISI/BUI) instead of
//! Rothermel's raw fuel-particle inputs, since spec.md §1 places the full
//! FBP fuel-behaviour library itself out of scope.

use crate::fuel::{FuelBehaviour, FuelGroup};
use crate::fwi::FwiWeather;
use crate::grid::IntensitySize;
use crate::units::Degrees;

/// Everything the kernel needs to judge whether fire crosses from a burning
/// `source` cell into a candidate `target` cell this step.
#[derive(Debug, Clone, Copy)]
pub struct SpreadContext<'a> {
    /// Fuel behaviour of the *target* cell (the one being judged for
    /// ignition); a non-combustible target never reaches the kernel (the
    /// scenario loop filters those out via [`crate::environment::Environment::unburnable`]).
    pub fuel: &'a FuelBehaviour,
    /// Hourly fire weather driving this step.
    pub weather: &'a FwiWeather,
    /// Target cell's slope, percent.
    pub slope_pct: f64,
    /// Target cell's aspect (the direction the slope faces), compass
    /// degrees, or [`crate::units::SlopePercent::INVALID`]-paired for edge
    /// cells (treated as flat by the kernel).
    pub aspect: Degrees,
    /// Compass bearing from `source` to `target`.
    pub spread_direction: Degrees,
    /// Centre-to-centre distance from `source` to `target`, metres.
    pub distance_m: f64,
}

/// The contract a cell-level spread model must satisfy. Pluggable so a
/// deterministic reference kernel and a stochastic/ensemble kernel can sit
/// behind the same scenario loop (spec.md §1).
pub trait SpreadKernel: Send + Sync {
    /// Probability, in `[0, 1]`, that fire crosses from the burning source
    /// cell into `ctx.target` during one simulation step.
    fn ignition_probability(&self, ctx: &SpreadContext) -> f64;

    /// Fireline intensity (kW/m) the target cell would register if it
    /// ignites this step.
    fn intensity(&self, ctx: &SpreadContext) -> IntensitySize;
}

/// Reference [`SpreadKernel`] built from the Canadian FBP System's rate of
/// spread/intensity relationships, re-derived against [`FuelBehaviour`]'s
/// reduced parameter set rather than the full FBP fuel-type tables (spec.md
/// §1 Non-goals; grounded in `physics::rothermel::calculate_wind_coefficient`/
/// `calculate_slope_coefficient` and `solver::crown_fire`'s length-to-breadth
/// treatment of wind-driven elongation).
#[derive(Debug, Clone, Copy, Default)]
pub struct FbpSpreadKernel;

impl FbpSpreadKernel {
    /// A kernel with no per-instance state; every input comes through
    /// [`SpreadContext`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Head-fire rate of spread (m/min) ignoring direction, from ISI, BUI
    /// fuel consumption, and the fuel's rate-of-spread coefficient.
    fn head_ros(fuel: &FuelBehaviour, weather: &FwiWeather) -> f64 {
        if weather.moisture_pct() / 100.0 >= fuel.moisture_of_extinction {
            return 0.0;
        }
        let isi_factor = 1.0 - (-0.05 * weather.isi.value()).exp();
        let bui_factor = 1.0 - (-0.0034 * weather.bui.value().max(0.0)).exp();
        (fuel.ros_coefficient * isi_factor * bui_factor * fuel.curing).max(0.0)
    }

    /// Length-to-breadth ratio of the elliptical fire shape, from wind
    /// speed alone (Alexander 1985, same family of empirical wind-shape
    /// relationships the teacher's crown-fire module cites).
    fn length_to_breadth(wind_speed_kmh: f64) -> f64 {
        1.0 + 8.0 * (1.0 - (-0.115 * wind_speed_kmh).exp())
    }

    /// Directional ROS scaling factor in `[backing_ratio, 1]`, attenuating
    /// the head-fire ROS as `spread_direction` diverges from the wind
    /// direction (standard elliptical-fire backing-ratio construction).
    fn directional_factor(weather: &FwiWeather, spread_direction: Degrees) -> f64 {
        let lb = Self::length_to_breadth(weather.wind.speed.value());
        let ecc = (lb * lb - 1.0).sqrt() / lb;
        let angle = (spread_direction.value() - weather.wind.direction.value())
            .to_radians();
        (1.0 - ecc) / (1.0 - ecc * angle.cos())
    }

    /// Slope scaling factor, matching the teacher's Rothermel slope
    /// coefficient shape but expressed as a multiplier on ROS rather than
    /// an additive term inside Rothermel's own formula (re-derivation
    /// noted in DESIGN.md).
    fn slope_factor(slope_pct: f64, aspect: Degrees, spread_direction: Degrees) -> f64 {
        if slope_pct <= 0.0 {
            return 1.0;
        }
        let upslope_alignment = (spread_direction.value() - aspect.value())
            .to_radians()
            .cos()
            .max(0.0);
        let slope_fraction = (slope_pct / 100.0).min(1.0);
        1.0 + 3.0 * slope_fraction * upslope_alignment
    }

    fn ros_m_per_min(&self, ctx: &SpreadContext) -> f64 {
        let head = Self::head_ros(ctx.fuel, ctx.weather);
        let directional = Self::directional_factor(ctx.weather, ctx.spread_direction);
        let slope = Self::slope_factor(ctx.slope_pct, ctx.aspect, ctx.spread_direction);
        head * directional * slope
    }
}

impl SpreadKernel for FbpSpreadKernel {
    fn ignition_probability(&self, ctx: &SpreadContext) -> f64 {
        let ros = self.ros_m_per_min(ctx);
        if ros <= 0.0 || ctx.distance_m <= 0.0 {
            return 0.0;
        }
        // Probability of covering the cell-to-cell distance within one
        // (implicitly hourly) step, saturating logistic-style rather than
        // a hard threshold so adjacent cells at marginal ROS still have a
        // nonzero chance of igniting (Monte-Carlo scenario diversity,
        // spec.md §1 "probabilistic").
        let time_to_cross_min = ctx.distance_m / ros;
        let step_minutes = 60.0;
        (1.0 - (-step_minutes / time_to_cross_min).exp()).clamp(0.0, 1.0)
    }

    fn intensity(&self, ctx: &SpreadContext) -> IntensitySize {
        let ros = self.ros_m_per_min(ctx);
        let fuel_consumption_kg_m2 = match ctx.fuel.group {
            FuelGroup::Grass => 0.3,
            FuelGroup::Slash => 2.5,
            FuelGroup::Conifer | FuelGroup::Mixedwood => 1.2,
            FuelGroup::Deciduous => 0.8,
            FuelGroup::NonFuel => 0.0,
        };
        let heat_of_combustion_kj_kg = 18_000.0;
        // Byram's fireline intensity: I = H * w * r, r in m/s.
        let ros_m_s = ros / 60.0;
        let intensity = heat_of_combustion_kj_kg * fuel_consumption_kg_m2 * ros_m_s;
        intensity.clamp(0.0, f64::from(IntensitySize::MAX)) as IntensitySize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuel::FuelModelRegistry;
    use crate::units::{Celsius, KilometresPerHour, Millimetres, Percent, Wind};

    fn weather(wind_speed: f64, wind_dir: f64, isi: f64, bui: f64) -> FwiWeather {
        FwiWeather {
            temperature: Celsius::new(25.0),
            rh: Percent::clamped(30.0),
            wind: Wind {
                direction: Degrees::new(wind_dir),
                speed: KilometresPerHour::new(wind_speed),
            },
            precipitation: Millimetres::new(0.0),
            ffmc: crate::fwi::Ffmc::from_value(90.0),
            dmc: crate::fwi::Dmc::from_value(30.0),
            dc: crate::fwi::Dc::from_value(250.0),
            isi: crate::fwi::Isi::from_value(isi),
            bui: crate::fwi::Bui::from_value(bui),
            fwi: crate::fwi::Fwi::from_value(20.0),
        }
    }

    #[test]
    fn head_direction_spreads_faster_than_flank() {
        let reg = FuelModelRegistry::reference();
        let fuel = reg.behaviour(crate::fuel::FuelId(5)).unwrap();
        let w = weather(20.0, 0.0, 15.0, 60.0);
        let kernel = FbpSpreadKernel::new();

        let head_ctx = SpreadContext {
            fuel,
            weather: &w,
            slope_pct: 0.0,
            aspect: Degrees::new(0.0),
            spread_direction: Degrees::new(0.0),
            distance_m: 100.0,
        };
        let flank_ctx = SpreadContext {
            spread_direction: Degrees::new(90.0),
            ..head_ctx
        };

        assert!(kernel.ros_m_per_min(&head_ctx) > kernel.ros_m_per_min(&flank_ctx));
    }

    #[test]
    fn moisture_above_extinction_prevents_spread() {
        let reg = FuelModelRegistry::reference();
        let fuel = reg.behaviour(crate::fuel::FuelId(1)).unwrap();
        let mut w = weather(10.0, 0.0, 5.0, 20.0);
        w.ffmc = crate::fwi::Ffmc::from_value(10.0); // very high moisture content
        let kernel = FbpSpreadKernel::new();
        let ctx = SpreadContext {
            fuel,
            weather: &w,
            slope_pct: 0.0,
            aspect: Degrees::new(0.0),
            spread_direction: Degrees::new(0.0),
            distance_m: 100.0,
        };
        assert_eq!(kernel.ignition_probability(&ctx), 0.0);
    }

    #[test]
    fn uphill_spread_is_faster_than_downhill() {
        let reg = FuelModelRegistry::reference();
        let fuel = reg.behaviour(crate::fuel::FuelId(3)).unwrap();
        let w = weather(10.0, 90.0, 10.0, 40.0);
        let kernel = FbpSpreadKernel::new();
        let uphill = SpreadContext {
            fuel,
            weather: &w,
            slope_pct: 30.0,
            aspect: Degrees::new(0.0),
            spread_direction: Degrees::new(0.0),
            distance_m: 100.0,
        };
        let downhill = SpreadContext {
            spread_direction: Degrees::new(180.0),
            ..uphill
        };
        assert!(kernel.ros_m_per_min(&uphill) > kernel.ros_m_per_min(&downhill));
    }
}
