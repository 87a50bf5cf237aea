//! Monte-Carlo convergence controller (spec.md §4.8, component C8) — "the
//! heart of the engine". Drives [`Iteration`]s through one of three
//! stopping policies ([`RunMode`]) and folds their results into one
//! [`ProbabilityMap`], watched by a dedicated watchdog thread that enforces
//! the wall-clock budget regardless of run mode (spec.md §5 "Only the
//! watchdog reads the clock; workers read a boolean").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Datelike;

use crate::config::{Config, RunMode};
use crate::environment::Environment;
use crate::error::FireStarrError;
use crate::fuel::FuelModelRegistry;
use crate::iteration::Iteration;
use crate::probability::ProbabilityMap;
use crate::scenario::{Scenario, SpreadOutcome, StartPoint};
use crate::spread_kernel::SpreadKernel;
use crate::stats::SafeVector;
use crate::weather::{Day, FireWeatherStream, ScenarioId};

/// How often the watchdog thread wakes to check the wall-clock deadline
/// (spec.md §4.8 `CHECK_INTERVAL`).
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(1);

/// Result of one [`Model::run`] (spec.md §4.8/§4.5: the controller "hands
/// C5 to raster writers" once it stops).
#[derive(Debug)]
pub struct ModelOutput {
    /// Accumulated burn-probability grid across every completed scenario.
    pub probability_map: ProbabilityMap,
    /// Iterations launched (including one that was cancelled mid-flight).
    pub iterations_run: usize,
    /// Iterations that contributed at least one completed scenario.
    pub iterations_completed: usize,
    /// Scenarios that ran to completion (not cancelled) and contributed to
    /// `probability_map` and the rolling size statistics.
    pub scenarios_completed: usize,
    /// `true` iff the run stopped before any iteration completed — per
    /// spec.md §4.8/§8 "Cancellation", the interim `probability_map` is in
    /// this case the *final* output, not a discardable partial one.
    pub interim_promoted: bool,
    /// Sample mean of completed scenarios' final fire sizes (ha), `0.0` if
    /// none completed.
    pub mean_size_ha: f64,
    /// 95th-percentile final fire size (ha) across completed scenarios.
    pub p95_size_ha: f64,
}

/// The convergence controller. Immutable once built (spec.md DESIGN NOTES
/// "explicit immutable configuration... threaded through the Model
/// constructor"); `Model::run` takes `&self` so nothing about a run mutates
/// the controller itself — all mutable state lives in the [`Iteration`]s
/// and [`ProbabilityMap`] it creates per call.
pub struct Model {
    config: Config,
    environment: Arc<Environment>,
    weather: Arc<FireWeatherStream>,
    registry: Arc<FuelModelRegistry>,
    kernel: Arc<dyn SpreadKernel>,
    start_day: Day,
    latitude: f64,
    longitude: f64,
    created_at: Instant,
}

impl Model {
    /// Build a controller for one run. `created_at` is captured here, not
    /// at `run()` time, so the wall-clock budget covers the whole process
    /// lifetime from construction (spec.md §5 "wall-clock is measured
    /// against a monotonic clock captured at Model construction").
    #[must_use]
    pub fn new(
        config: Config,
        environment: Arc<Environment>,
        weather: Arc<FireWeatherStream>,
        registry: Arc<FuelModelRegistry>,
        kernel: Arc<dyn SpreadKernel>,
        start_day: Day,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            config,
            environment,
            weather,
            registry,
            kernel,
            start_day,
            latitude,
            longitude,
            created_at: Instant::now(),
        }
    }

    /// This controller's configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The landscape this controller runs scenarios over.
    #[must_use]
    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    /// Drive the configured [`RunMode`] to completion (spec.md §4.8).
    /// `start` is the ignition point or perimeter for deterministic and
    /// probabilistic modes; surface mode ignores it and enumerates every
    /// burnable cell instead (spec.md §4.8 point 2).
    ///
    /// # Errors
    /// This reference controller has no fallible step once `Environment`
    /// and `FireWeatherStream` are already built, so it never returns
    /// `Err`; the `Result` return type is kept so a future raster-backed
    /// `Model` (or one whose `SpreadKernel` can fail) can surface
    /// [`FireStarrError`] without an API break.
    pub fn run(&self, start: StartPoint, max_steps: u32) -> Result<ModelOutput, FireStarrError> {
        Ok(match self.config.run_mode {
            RunMode::Deterministic => self.run_deterministic(start, max_steps),
            RunMode::Surface => self.run_surface(max_steps),
            RunMode::Probabilistic => self.run_probabilistic(start, max_steps),
        })
    }

    fn new_probability_map(&self) -> ProbabilityMap {
        let (_min, low, med, max) = self.config.intensity_bands();
        ProbabilityMap::new(self.environment.geometry().clone(), low, med, max)
    }

    fn build_scenario(&self, id: u32, weather_id: ScenarioId, start: StartPoint, max_steps: u32) -> Scenario {
        Scenario::new(
            id,
            Arc::clone(&self.environment),
            Arc::clone(&self.weather),
            Arc::clone(&self.registry),
            Arc::clone(&self.kernel),
            weather_id,
            self.start_day,
            start,
            max_steps,
        )
    }

    /// FNV-1a style mix of `(start_day, latitude, longitude, tag, iteration)`
    /// into one seed, matching spec.md §4.8's "deterministic from
    /// (startDay, latitude, longitude)" requirement, tagged 0 (spread) or 1
    /// (extinction) per spec.md §4.8's two independent seed sequences.
    fn seed_stream(&self, tag: u64, iteration: u64) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        let mut mix = |v: u64| {
            h ^= v;
            h = h.wrapping_mul(0x0000_0100_0000_01b3);
        };
        mix(self.start_day.num_days_from_ce() as u64);
        mix(self.latitude.to_bits());
        mix(self.longitude.to_bits());
        mix(tag);
        mix(iteration);
        h
    }

    /// Folds the two independent (spread, extinction) seed streams from
    /// spec.md §4.8 into the single `StdRng` seed
    /// [`crate::scenario::Scenario::reset`] currently accepts (this engine
    /// uses one RNG stream per scenario rather than two — see DESIGN.md's
    /// resolution of the Mersenne-Twister open question).
    fn seed(&self, iteration: u64) -> u64 {
        let spread = self.seed_stream(0, iteration);
        let extinction = self.seed_stream(1, iteration);
        spread ^ extinction.rotate_left(32)
    }

    /// Run `iteration` to completion while a scoped watchdog thread polls
    /// the wall-clock `deadline` every [`WATCHDOG_INTERVAL`] and, if it
    /// fires first, sets the iteration's shared cancellation flag (spec.md
    /// §4.8/§5: "a dedicated watchdog thread wakes every 1s... sets every
    /// iteration's cancel flag").
    fn run_iteration_with_watchdog(
        &self,
        iteration: &mut Iteration,
        deadline: Instant,
    ) -> Vec<Result<SpreadOutcome, crate::error::ScenarioError>> {
        let cancel_handle = iteration.cancel_handle();
        let finished = Arc::new(AtomicBool::new(false));

        std::thread::scope(|scope| {
            let watchdog_finished = Arc::clone(&finished);
            scope.spawn(move || {
                while !watchdog_finished.load(Ordering::Relaxed) {
                    if Instant::now() >= deadline {
                        tracing::warn!("maximum_time budget exceeded; cancelling in-flight iteration");
                        cancel_handle.store(true, Ordering::SeqCst);
                        break;
                    }
                    std::thread::sleep(WATCHDOG_INTERVAL);
                }
            });

            let outcomes = iteration.run(self.config.run_async);
            finished.store(true, Ordering::Relaxed);
            outcomes
        })
    }

    fn run_deterministic(&self, start: StartPoint, max_steps: u32) -> ModelOutput {
        let n = self.config.scenarios_per_iteration.max(1);
        let scenarios = (0..n)
            .map(|i| self.build_scenario(i as u32, ScenarioId(i as u32), start.clone(), max_steps))
            .collect();
        let mut iteration = Iteration::new(scenarios);
        iteration.reset(self.seed(0));
        let deadline = self.created_at + self.config.maximum_time;
        let outcomes = self.run_iteration_with_watchdog(&mut iteration, deadline);

        let prob_map = self.new_probability_map();
        let mut completed = 0usize;
        for outcome in outcomes.into_iter().flatten() {
            if !outcome.cancelled {
                prob_map.add_probability(&outcome.snapshot);
                prob_map.add_size(outcome.fire_size_ha);
                completed += 1;
            }
        }

        ModelOutput {
            probability_map: prob_map,
            iterations_run: 1,
            iterations_completed: usize::from(completed > 0),
            scenarios_completed: completed,
            interim_promoted: false,
            mean_size_ha: iteration.final_sizes().statistics().mean,
            p95_size_ha: crate::stats::Statistics::percentile(&iteration.final_sizes().get_values(), 95.0),
        }
    }

    /// One iteration per distinct burnable start cell, ignoring
    /// `maximum_time` (spec.md §4.8 point 2; §9 Open Question resolved: an
    /// exhaustive enumeration mode has no meaningful time budget to honour,
    /// only the implicit count limit of "one run per burnable cell").
    fn run_surface(&self, max_steps: u32) -> ModelOutput {
        let cells = self.environment.burnable_cells();
        let prob_map = self.new_probability_map();
        let sizes = SafeVector::new();
        let mut completed = 0usize;
        let mut iterations_completed = 0usize;

        for (idx, cell) in cells.iter().enumerate() {
            let start = StartPoint::point(*cell, 0.0);
            let scenario = self.build_scenario(0, ScenarioId(0), start, max_steps);
            let mut iteration = Iteration::new(vec![scenario]);
            iteration.reset(self.seed(idx as u64));
            let outcomes = iteration.run(self.config.run_async);

            let mut any = false;
            for outcome in outcomes.into_iter().flatten() {
                if !outcome.cancelled {
                    prob_map.add_probability(&outcome.snapshot);
                    prob_map.add_size(outcome.fire_size_ha);
                    sizes.add_value(outcome.fire_size_ha);
                    completed += 1;
                    any = true;
                }
            }
            if any {
                iterations_completed += 1;
            }
        }

        ModelOutput {
            probability_map: prob_map,
            iterations_run: cells.len(),
            iterations_completed,
            scenarios_completed: completed,
            interim_promoted: false,
            mean_size_ha: sizes.statistics().mean,
            p95_size_ha: crate::stats::Statistics::percentile(&sizes.get_values(), 95.0),
        }
    }

    /// Iterate until the sample mean's confidence interval (spec.md §4.10
    /// `runs_required`, folding the mean, 95th percentile, and full size
    /// vector into the single Student-t criterion the spec's own C10
    /// describes — see DESIGN.md) narrows to `relative_error`, or until a
    /// hard stop (wall-clock or completed-scenario count) fires first
    /// (spec.md §4.8 point 3).
    fn run_probabilistic(&self, start: StartPoint, max_steps: u32) -> ModelOutput {
        let prob_map = self.new_probability_map();
        let rolling = SafeVector::new();
        let deadline = self.created_at + self.config.maximum_time;

        let mut iterations_run = 0usize;
        let mut iterations_completed = 0usize;
        let mut scenarios_completed = 0usize;
        let mut interim_promoted = false;

        loop {
            if Instant::now() >= deadline {
                interim_promoted = iterations_completed == 0;
                break;
            }
            if scenarios_completed >= self.config.maximum_count_simulations {
                break;
            }
            if iterations_completed > 0 {
                let stats = rolling.statistics();
                if stats.is_confident(self.config.confidence_level, self.config.relative_error) {
                    break;
                }
            }

            let n = self.config.scenarios_per_iteration.max(1);
            let scenarios = (0..n)
                .map(|i| self.build_scenario(i as u32, ScenarioId(i as u32), start.clone(), max_steps))
                .collect();
            let mut iteration = Iteration::new(scenarios);
            iteration.reset(self.seed(iterations_run as u64));
            iterations_run += 1;

            let outcomes = self.run_iteration_with_watchdog(&mut iteration, deadline);

            let mut any_completed = false;
            for outcome in outcomes.into_iter().flatten() {
                if !outcome.cancelled {
                    prob_map.add_probability(&outcome.snapshot);
                    rolling.add_value(outcome.fire_size_ha);
                    scenarios_completed += 1;
                    any_completed = true;
                }
            }
            if any_completed {
                iterations_completed += 1;
            }

            if iteration.is_cancelled() {
                interim_promoted = iterations_completed == 0;
                break;
            }
        }

        let values = rolling.get_values();
        ModelOutput {
            probability_map: prob_map,
            iterations_run,
            iterations_completed,
            scenarios_completed,
            interim_promoted,
            mean_size_ha: rolling.statistics().mean,
            p95_size_ha: crate::stats::Statistics::percentile(&values, 95.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Environment, InMemoryRasterTile, LatLon};
    use crate::grid::{CellIndex, GridGeometry};
    use crate::spread_kernel::FbpSpreadKernel;
    use crate::weather::WeatherRow;
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

    fn weather_stream(scenario_count: u32, hours: u32) -> Arc<FireWeatherStream> {
        let mut rows = Vec::new();
        for s in 0..scenario_count {
            for h in 0..hours {
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

    fn test_model(config: Config, scenarios_per_iteration: u32, grid_n: u32) -> Model {
        let tile = InMemoryRasterTile::flat(geometry(grid_n), Some(5));
        let reg = Arc::new(FuelModelRegistry::reference());
        let env = Arc::new(
            Environment::build(
                &[&tile],
                (grid_n / 2, grid_n / 2),
                LatLon { lat: 46.0, lon: -78.0 },
                None,
                &reg,
            )
            .unwrap(),
        );
        let weather = weather_stream(scenarios_per_iteration, 48);
        let kernel: Arc<dyn SpreadKernel> = Arc::new(FbpSpreadKernel::new());
        Model::new(
            config,
            env,
            weather,
            reg,
            kernel,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            46.0,
            -78.0,
        )
    }

    #[test]
    fn deterministic_mode_runs_exactly_one_iteration() {
        let model = test_model(Config::deterministic(), 1, 15);
        let start = StartPoint::point(CellIndex::new(7, 7), 0.0);
        let output = model.run(start, 48).unwrap();
        assert_eq!(output.iterations_run, 1);
        assert_eq!(output.scenarios_completed, 1);
    }

    #[test]
    fn deterministic_mode_is_repeatable_with_same_seed() {
        let start = StartPoint::point(CellIndex::new(7, 7), 0.0);
        let a = test_model(Config::deterministic(), 1, 15).run(start.clone(), 48).unwrap();
        let b = test_model(Config::deterministic(), 1, 15).run(start, 48).unwrap();
        assert!((a.mean_size_ha - b.mean_size_ha).abs() < 1e-9);
    }

    #[test]
    fn surface_mode_runs_one_iteration_per_burnable_cell() {
        let model = test_model(Config::surface(), 1, 6);
        let burnable = model.environment().burnable_cells().len();
        let output = model.run(StartPoint::point(CellIndex::new(0, 0), 0.0), 24).unwrap();
        assert_eq!(output.iterations_run, burnable);
        assert_eq!(output.scenarios_completed, burnable);
    }

    #[test]
    fn probabilistic_mode_stops_on_count_limit_without_converging() {
        let mut config = Config::default();
        config.scenarios_per_iteration = 1;
        config.maximum_count_simulations = 3;
        config.maximum_time = Duration::from_secs(3600);
        // Impossible confidence target so the run can only stop on the count limit.
        config.relative_error = 1e-9;
        let model = test_model(config, 1, 15);
        let output = model.run(StartPoint::point(CellIndex::new(7, 7), 0.0), 48).unwrap();
        assert_eq!(output.scenarios_completed, 3);
        assert!(!output.interim_promoted);
    }

    #[test]
    fn probabilistic_mode_converges_with_generous_tolerance() {
        let mut config = Config::default();
        config.scenarios_per_iteration = 2;
        config.maximum_count_simulations = 500;
        config.maximum_time = Duration::from_secs(3600);
        config.relative_error = 2.0;
        config.confidence_level = 0.90;
        let model = test_model(config, 2, 15);
        let output = model.run(StartPoint::point(CellIndex::new(7, 7), 0.0), 48).unwrap();
        assert!(output.iterations_completed >= 1);
        assert!(output.scenarios_completed < 500);
    }

    #[test]
    fn zero_time_budget_promotes_interim_as_final_before_any_iteration() {
        let mut config = Config::default();
        config.maximum_time = Duration::from_secs(0);
        let model = test_model(config, 1, 15);
        let output = model.run(StartPoint::point(CellIndex::new(7, 7), 0.0), 48).unwrap();
        assert_eq!(output.iterations_run, 0);
        assert_eq!(output.iterations_completed, 0);
        assert!(output.interim_promoted);
    }
}
