//! One batch of concurrently-run scenarios (spec.md §3/§4.7, component C7).
//!
//! An `Iteration` is the unit [`crate::model::Model`] launches and waits on:
//! `scenarios_per_iteration` [`Scenario`]s sharing one
//! [`crate::stats::SafeVector`] of final fire sizes, cancellable as a group
//! by the watchdog (spec.md §4.8 "watchdog... cancels the in-flight
//! iteration on timeout").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::error::ScenarioError;
use crate::scenario::{Scenario, SpreadOutcome};
use crate::stats::SafeVector;

/// A batch of scenarios run together, sharing one final-size accumulator
/// (spec.md §4.7).
pub struct Iteration {
    scenarios: Vec<Scenario>,
    final_sizes: SafeVector,
    cancelled: Arc<AtomicBool>,
    start_time: Option<Instant>,
}

impl Iteration {
    /// An iteration over `scenarios`, none of which have been reset yet.
    #[must_use]
    pub fn new(scenarios: Vec<Scenario>) -> Self {
        Self {
            scenarios,
            final_sizes: SafeVector::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
            start_time: None,
        }
    }

    /// Reset every scenario with a seed derived from `base_seed` and its
    /// index, and clear the cancellation flag (spec.md §4.7 `reset`).
    ///
    /// Replaces the cancellation flag on a fresh `Iteration` (or one whose
    /// flag was already tripped) with a new one shared across every
    /// scenario, so this batch starts uncancelled regardless of a previous
    /// run's outcome, and [`Iteration::cancel`] reaches every scenario
    /// through the same `Arc` (spec.md §5 "cancelled flag... scenarios +
    /// watchdog").
    pub fn reset(&mut self, base_seed: u64) {
        self.cancelled = Arc::new(AtomicBool::new(false));
        for (i, scenario) in self.scenarios.iter_mut().enumerate() {
            scenario.share_cancel_flag(Arc::clone(&self.cancelled));
            scenario.reset(base_seed ^ (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        }
        self.start_time = Some(Instant::now());
    }

    /// Run every scenario to completion (in parallel via `rayon` if
    /// `parallel`, otherwise sequentially on the caller's thread),
    /// recording each one's final fire size into the shared
    /// [`SafeVector`] (spec.md §4.7 `run`).
    ///
    /// Scenarios already in flight when [`Iteration::cancel`] is called
    /// still finish their current run; no new scenario in this batch is
    /// skipped retroactively — cancellation only takes effect on the next
    /// call to `run`.
    pub fn run(&mut self, parallel: bool) -> Vec<Result<SpreadOutcome, ScenarioError>> {
        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
        }

        let outcomes = if parallel {
            self.scenarios.par_iter_mut().map(Scenario::run).collect::<Vec<_>>()
        } else {
            self.scenarios.iter_mut().map(Scenario::run).collect::<Vec<_>>()
        };

        for outcome in &outcomes {
            if let Ok(o) = outcome {
                if !o.cancelled {
                    self.final_sizes.add_value(o.fire_size_ha);
                }
            }
        }
        outcomes
    }

    /// Signal every scenario in this iteration to stop (spec.md §4.7
    /// `cancel`). `show_warning` controls whether a `tracing::warn!` is
    /// emitted — the watchdog sets it on a real timeout, but a clean
    /// shutdown triggered by reaching `maximum_count_simulations` does not
    /// warrant a warning.
    pub fn cancel(&self, show_warning: bool) {
        self.cancelled.store(true, Ordering::SeqCst);
        if show_warning {
            tracing::warn!(iteration_scenarios = self.scenarios.len(), "iteration cancelled");
        }
    }

    /// `true` once [`Iteration::cancel`] has been called for this batch.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clone of this batch's shared cancellation flag, for a watchdog
    /// thread to trip directly without holding a reference to the
    /// `Iteration` itself (spec.md §4.8: "a dedicated watchdog thread...
    /// sets every iteration's cancel flag").
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// The shared accumulator of finished scenarios' final fire sizes,
    /// read by [`crate::model::Model`]'s convergence check. Named for what
    /// it holds, not for spec.md §4.7's `savePoints` (the common
    /// save-point *times* shared by every scenario in the batch), which
    /// this reference implementation does not separately track since every
    /// scenario here already shares one weather stream and step count.
    #[must_use]
    pub fn final_sizes(&self) -> &SafeVector {
        &self.final_sizes
    }

    /// When this iteration's scenarios were last reset/started, if ever.
    #[must_use]
    pub fn start_time(&self) -> Option<Instant> {
        self.start_time
    }

    /// Number of scenarios in this batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// `true` if this batch has no scenarios.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Environment, InMemoryRasterTile, LatLon};
    use crate::fuel::FuelModelRegistry;
    use crate::grid::{CellIndex, GridGeometry};
    use crate::scenario::StartPoint;
    use crate::spread_kernel::{FbpSpreadKernel, SpreadKernel};
    use crate::weather::{FireWeatherStream, ScenarioId, WeatherRow};
    use chrono::NaiveDate;

    fn geometry(n: u32) -> GridGeometry {
        GridGeometry {
            rows: n,
            columns: n,
            cell_size_m: 100.0,
            lower_left: (0.0, 0.0),
            upper_right: (f64::from(n) * 100.0, f64::from(n) * 100.0),
            projection: "EPSG:3978".to_string(),
        }
    }

    fn weather_stream(scenario_count: u32) -> Arc<FireWeatherStream> {
        let mut rows = Vec::new();
        for s in 0..scenario_count {
            for h in 0..48 {
                rows.push(WeatherRow {
                    scenario: s,
                    date: format!("2024-06-01 {:02}:00:00", h % 24),
                    prec: 0.0,
                    temp: 27.0,
                    rh: 22.0,
                    ws: 20.0,
                    wd: 0.0,
                    ffmc: 91.0,
                    dmc: 35.0,
                    dc: 280.0,
                    isi: 13.0,
                    bui: 55.0,
                    fwi: 26.0,
                });
            }
        }
        Arc::new(FireWeatherStream::from_rows(&rows, 0.0).unwrap())
    }

    #[test]
    fn run_accumulates_final_sizes_across_scenarios() {
        let tile = InMemoryRasterTile::flat(geometry(15), Some(5));
        let reg = Arc::new(FuelModelRegistry::reference());
        let env = Arc::new(
            Environment::build(&[&tile], (7, 7), LatLon { lat: 46.0, lon: -78.0 }, None, &reg).unwrap(),
        );
        let weather = weather_stream(3);
        let kernel: Arc<dyn SpreadKernel> = Arc::new(FbpSpreadKernel::new());

        let scenarios: Vec<_> = (0..3)
            .map(|i| {
                Scenario::new(
                    i,
                    Arc::clone(&env),
                    Arc::clone(&weather),
                    Arc::clone(&reg),
                    Arc::clone(&kernel),
                    ScenarioId(i),
                    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                    StartPoint::point(CellIndex::new(7, 7), 0.0),
                    48,
                )
            })
            .collect();

        let mut iteration = Iteration::new(scenarios);
        iteration.reset(7);
        let outcomes = iteration.run(false);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(Result::is_ok));
        assert_eq!(iteration.final_sizes().size(), 3);
    }

    #[test]
    fn cancel_before_run_excludes_sizes_from_accumulator() {
        let tile = InMemoryRasterTile::flat(geometry(15), Some(5));
        let reg = Arc::new(FuelModelRegistry::reference());
        let env = Arc::new(
            Environment::build(&[&tile], (7, 7), LatLon { lat: 46.0, lon: -78.0 }, None, &reg).unwrap(),
        );
        let weather = weather_stream(2);
        let kernel: Arc<dyn SpreadKernel> = Arc::new(FbpSpreadKernel::new());

        let scenarios: Vec<_> = (0..2)
            .map(|i| {
                Scenario::new(
                    i,
                    Arc::clone(&env),
                    Arc::clone(&weather),
                    Arc::clone(&reg),
                    Arc::clone(&kernel),
                    ScenarioId(i),
                    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                    StartPoint::point(CellIndex::new(7, 7), 0.0),
                    48,
                )
            })
            .collect();

        let mut iteration = Iteration::new(scenarios);
        iteration.reset(7);
        iteration.cancel(false);
        let outcomes = iteration.run(false);
        assert!(outcomes.iter().all(|o| o.as_ref().unwrap().cancelled));
        assert_eq!(iteration.final_sizes().size(), 0);
    }

    #[test]
    fn cancel_sets_flag() {
        let iteration = Iteration::new(Vec::new());
        assert!(!iteration.is_cancelled());
        iteration.cancel(false);
        assert!(iteration.is_cancelled());
    }
}
