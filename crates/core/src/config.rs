//! Immutable run configuration.
//!
//! Replaces the original engine's global mutable `Settings` singleton (see
//! DESIGN NOTES in spec.md) with a plain value built once by the CLI (or a
//! test) and threaded through [`crate::model::Model::new`]. Nothing in this
//! crate reads process-global state; everything a run depends on lives here.

use std::time::Duration;

/// How a [`crate::model::Model`] decides when to stop running iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Exactly one iteration, no convergence loop.
    Deterministic,
    /// One iteration per burnable start cell (probability-of-ignition surface).
    Surface,
    /// Iterate until the statistics in [`crate::stats::Statistics`] converge,
    /// or a hard stop (time or count) fires first.
    Probabilistic,
}

/// Immutable configuration for one `Model::run`.
///
/// Every field here corresponds to a CLI flag in spec.md §6.1. Construct
/// with [`Config::new`] or the `Default` values and override with the
/// builder-style `with_*` methods; there is no mutation after a `Model` is
/// built from it.
#[derive(Debug, Clone)]
pub struct Config {
    /// Which stopping policy `Model::run` uses.
    pub run_mode: RunMode,
    /// Run scenarios across a thread pool (`true`) or sequentially on the
    /// caller's thread (`false`). The watchdog thread runs either way.
    pub run_async: bool,
    /// Number of scenarios started per iteration.
    pub scenarios_per_iteration: usize,
    /// Wall-clock budget for the whole convergence loop.
    pub maximum_time: Duration,
    /// Hard cap on total completed scenario count.
    pub maximum_count_simulations: usize,
    /// Confidence level for the Student-t convergence check (e.g. `0.95`).
    pub confidence_level: f64,
    /// Maximum allowed relative half-width of the confidence interval
    /// around the mean, as a fraction of the mean (`Statistics::runs_required`).
    pub relative_error: f64,
    /// Lower bound (exclusive) of the "low" intensity band, kW/m.
    pub intensity_min: f64,
    /// Upper bound (inclusive) of the "low" intensity band, kW/m.
    pub intensity_low_max: f64,
    /// Upper bound (inclusive) of the "moderate" intensity band, kW/m.
    pub intensity_med_max: f64,
    /// Upper bound (inclusive) of the "high" intensity band, kW/m.
    pub intensity_max: f64,
    /// UTC offset in hours applied to local timestamps (`--tz`).
    pub utc_offset_hours: i32,
    /// Emit per-scenario grids in addition to the aggregate probability
    /// maps (`-i`).
    pub save_individual: bool,
    /// `--no-probability`: skip probability-map output entirely.
    pub save_probability: bool,
    /// `--no-intensity`: skip intensity-map output entirely.
    pub save_intensity: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run_mode: RunMode::Probabilistic,
            run_async: true,
            scenarios_per_iteration: 1,
            maximum_time: Duration::from_secs(60 * 60),
            maximum_count_simulations: 10_000,
            confidence_level: 0.95,
            relative_error: 0.1,
            intensity_min: 0.0,
            intensity_low_max: 500.0,
            intensity_med_max: 2_000.0,
            intensity_max: f64::MAX,
            utc_offset_hours: 0,
            save_individual: false,
            save_probability: true,
            save_intensity: true,
        }
    }
}

impl Config {
    /// A config suitable for `--deterministic`: one iteration, no
    /// convergence loop.
    #[must_use]
    pub fn deterministic() -> Self {
        Self {
            run_mode: RunMode::Deterministic,
            ..Self::default()
        }
    }

    /// A config for `surface` mode: one iteration per burnable cell,
    /// ignoring `maximum_time` (spec.md §9 Open Question, resolved in
    /// DESIGN.md: surface mode enumerates exhaustively and only the count
    /// limit applies).
    #[must_use]
    pub fn surface() -> Self {
        Self {
            run_mode: RunMode::Surface,
            ..Self::default()
        }
    }

    /// Returns the intensity band `(min, low_max, med_max, max)` tuple used
    /// by [`crate::probability::ProbabilityMap::add_probability`].
    #[must_use]
    pub fn intensity_bands(&self) -> (f64, f64, f64, f64) {
        (
            self.intensity_min,
            self.intensity_low_max,
            self.intensity_med_max,
            self.intensity_max,
        )
    }
}
