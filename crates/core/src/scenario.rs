//! One Monte-Carlo realisation of a fire's spread (spec.md §3/§4.6,
//! component C6).
//!
//! A `Scenario` owns its own [`crate::grid::IntensityMap`] and
//! pseudo-random stream; everything it reads (the [`crate::environment::Environment`],
//! the [`crate::weather::FireWeatherStream`], the [`crate::fuel::FuelModelRegistry`])
//! is shared read-only with every other scenario in the same
//! [`crate::iteration::Iteration`] (spec.md §5 concurrency table). Its
//! per-hour newly-burned scratch list is recycled through a
//! [`crate::pool::MemoryPool`] rather than reallocated every step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::environment::Environment;
use crate::error::ScenarioError;
use crate::fuel::FuelModelRegistry;
use crate::grid::{CellIndex, GridGeometry, IntensityMap};
use crate::pool::MemoryPool;
use crate::spread_kernel::{SpreadContext, SpreadKernel};
use crate::weather::{Day, FireWeatherStream, ScenarioId};

/// Lifecycle state of a [`Scenario`] (spec.md §3 `Scenario`: `Created ->
/// Reset -> Running -> {Completed, Cancelled}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioState {
    /// Freshly constructed, never reset.
    Created,
    /// Reset and ready for [`Scenario::run`].
    Reset,
    /// Currently executing [`Scenario::run`].
    Running,
    /// Finished normally.
    Completed,
    /// Stopped early by [`crate::iteration::Iteration::cancel`].
    Cancelled,
}

/// Where and how large a scenario's fire starts (spec.md §3 `StartPoint`).
#[derive(Debug, Clone)]
pub struct StartPoint {
    /// Ignition cell (point-start scenarios).
    pub cell: CellIndex,
    /// Perimeter cells, for scenarios seeded from an existing fire
    /// perimeter instead of a single point. `None` for point ignition.
    pub perimeter: Option<Vec<CellIndex>>,
    /// Reported initial fire size, hectares. Carried through
    /// [`StartPoint::normalize`] untouched — clamping the ignition location
    /// into grid bounds does not change how large the fire already was
    /// (Open Question resolution, see DESIGN.md).
    pub size_ha: f64,
}

impl StartPoint {
    /// A single-cell point ignition at `cell` with `size_ha` of
    /// already-burned area (`0.0` for a fresh ignition).
    #[must_use]
    pub fn point(cell: CellIndex, size_ha: f64) -> Self {
        Self {
            cell,
            perimeter: None,
            size_ha,
        }
    }

    /// Clamp `cell` (and every perimeter cell) into `geometry`'s bounds,
    /// leaving `size_ha` untouched (spec.md §9 supplemented feature).
    #[must_use]
    pub fn normalize(&self, geometry: &GridGeometry) -> Self {
        let clamp = |c: CellIndex| CellIndex::new(c.row.min(geometry.rows - 1), c.column.min(geometry.columns - 1));
        Self {
            cell: clamp(self.cell),
            perimeter: self.perimeter.as_ref().map(|p| p.iter().copied().map(clamp).collect()),
            size_ha: self.size_ha,
        }
    }
}

/// Outcome of a completed [`Scenario::run`] (spec.md §4.6 `run`).
#[derive(Debug, Clone)]
pub struct SpreadOutcome {
    /// Final burned-cell/intensity snapshot, ready for
    /// [`crate::probability::ProbabilityMap::add_probability`].
    pub snapshot: Vec<(CellIndex, u16)>,
    /// Final fire size, hectares.
    pub fire_size_ha: f64,
    /// Number of hourly steps simulated.
    pub steps: u32,
    /// `true` if this run stopped early because
    /// [`crate::iteration::Iteration::cancel`] fired, rather than reaching
    /// the end of the weather stream or `max_steps` (spec.md §4.6
    /// cancellation: "cooperative... polls a cancelled flag at spread-event
    /// boundaries"). A cancelled outcome's `fire_size_ha` is a partial
    /// snapshot, not counted toward [`crate::stats::SafeVector`] unless the
    /// caller chooses to (spec.md §5 "without contributing its final size
    /// unless the scenario had already been counted").
    pub cancelled: bool,
}

/// One scenario: a private RNG stream and intensity map over a shared
/// [`Environment`]/[`FireWeatherStream`] (spec.md §4.6).
pub struct Scenario {
    id: u32,
    environment: Arc<Environment>,
    weather: Arc<FireWeatherStream>,
    registry: Arc<FuelModelRegistry>,
    kernel: Arc<dyn SpreadKernel>,
    weather_scenario: ScenarioId,
    start_day: Day,
    start: StartPoint,
    max_steps: u32,
    state: ScenarioState,
    rng: Option<StdRng>,
    intensity_map: Option<IntensityMap>,
    cancelled: Arc<AtomicBool>,
    /// Recycles the per-hour newly-burned scratch list (spec.md §4.9
    /// `MemoryPool`) instead of allocating one fresh each of the
    /// thousands of hourly steps a scenario runs.
    newly_burned_pool: MemoryPool<Vec<CellIndex>>,
}

impl Scenario {
    /// A freshly constructed scenario; call [`Scenario::reset`] before
    /// [`Scenario::run`].
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        id: u32,
        environment: Arc<Environment>,
        weather: Arc<FireWeatherStream>,
        registry: Arc<FuelModelRegistry>,
        kernel: Arc<dyn SpreadKernel>,
        weather_scenario: ScenarioId,
        start_day: Day,
        start: StartPoint,
        max_steps: u32,
    ) -> Self {
        let start = start.normalize(environment.geometry());
        Self {
            id,
            environment,
            weather,
            registry,
            kernel,
            weather_scenario,
            start_day,
            start,
            max_steps,
            state: ScenarioState::Created,
            rng: None,
            intensity_map: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            newly_burned_pool: MemoryPool::new(),
        }
    }

    /// Share a cancellation flag with this scenario, replacing its own
    /// private one (spec.md §4.7 `Iteration::cancel`: every scenario in an
    /// iteration is stopped through one shared flag). Call before
    /// [`Scenario::reset`].
    pub fn share_cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancelled = flag;
    }

    /// This scenario's id.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ScenarioState {
        self.state
    }

    /// Seed a fresh RNG stream and intensity map, and apply the starting
    /// ignition (spec.md §4.6 `reset`).
    pub fn reset(&mut self, seed: u64) {
        let geometry = self.environment.geometry();
        let map = IntensityMap::new(geometry.rows, geometry.columns, self.environment.unburnable().clone());
        match &self.start.perimeter {
            Some(perimeter) => map.apply_perimeter(perimeter),
            None => map.burn(self.start.cell, 1),
        }
        self.intensity_map = Some(map);
        self.rng = Some(StdRng::seed_from_u64(seed));
        self.state = ScenarioState::Reset;
    }

    /// Replace this scenario's starting ignition and reset it, for reuse
    /// across surface-mode's many single-cell scenarios (spec.md §4.8).
    pub fn reset_with_new_start(&mut self, start: StartPoint, seed: u64) {
        self.start = start.normalize(self.environment.geometry());
        self.reset(seed);
    }

    /// Run this scenario hour-by-hour from `start_day` through the
    /// weather stream's last day, or until `max_steps` is reached or the
    /// fire stops spreading (spec.md §4.6 `run`).
    ///
    /// # Errors
    /// [`ScenarioError::NotReset`] if called before [`Scenario::reset`].
    pub fn run(&mut self) -> Result<SpreadOutcome, ScenarioError> {
        if self.state != ScenarioState::Reset {
            return Err(ScenarioError::NotReset { id: self.id });
        }
        self.state = ScenarioState::Running;

        let map = self.intensity_map.as_ref().expect("reset populates intensity_map");
        let rng = self.rng.as_mut().expect("reset populates rng");
        let geometry = self.environment.geometry();
        let mut frontier: Vec<CellIndex> = match &self.start.perimeter {
            Some(perimeter) => perimeter.clone(),
            None => vec![self.start.cell],
        };

        let mut day = self.start_day;
        let mut steps: u32 = 0;
        let mut cancelled = false;

        'outer: while day <= self.weather.max_date() && steps < self.max_steps {
            for hour in 0..24u32 {
                if steps >= self.max_steps {
                    break 'outer;
                }
                if self.cancelled.load(Ordering::Relaxed) {
                    cancelled = true;
                    break 'outer;
                }
                steps += 1;
                let Some(weather) = self.weather.at(self.weather_scenario, day, hour) else {
                    continue;
                };

                let mut newly_burned = self.newly_burned_pool.acquire();
                for &source in &frontier {
                    for neighbour in source.neighbours_clipped(geometry.rows, geometry.columns) {
                        if map.has_burned(neighbour) {
                            continue;
                        }
                        let Some(cell) = self.environment.cell(neighbour.row, neighbour.column) else {
                            continue;
                        };
                        let Some(fuel_id) = cell.fuel else {
                            continue;
                        };
                        let Some(fuel) = self.registry.behaviour(fuel_id) else {
                            continue;
                        };

                        let direction = bearing(source, neighbour);
                        let ctx = SpreadContext {
                            fuel,
                            weather: &weather,
                            slope_pct: cell.slope.value().max(0.0),
                            aspect: cell.aspect,
                            spread_direction: direction,
                            distance_m: geometry.cell_size_m,
                        };
                        let probability = self.kernel.ignition_probability(&ctx);
                        if rng.random::<f64>() < probability {
                            let intensity = self.kernel.intensity(&ctx);
                            map.burn(neighbour, intensity);
                            newly_burned.push(neighbour);
                        }
                    }
                }

                frontier.extend(newly_burned.iter().copied());
                self.newly_burned_pool.release(newly_burned);
            }
            let Some(next_day) = day.succ_opt() else {
                break;
            };
            if day == self.weather.max_date() {
                break;
            }
            day = next_day;
        }

        self.state = if cancelled {
            ScenarioState::Cancelled
        } else {
            ScenarioState::Completed
        };
        let fire_size_ha = map.fire_size(geometry.cell_area_ha());
        Ok(SpreadOutcome {
            snapshot: map.snapshot(),
            fire_size_ha,
            steps,
            cancelled,
        })
    }
}

/// Compass bearing from `from` to `to`, degrees, `0` = north, clockwise.
fn bearing(from: CellIndex, to: CellIndex) -> crate::units::Degrees {
    let dr = f64::from(to.row) - f64::from(from.row);
    let dc = f64::from(to.column) - f64::from(from.column);
    let math_angle = dr.atan2(dc).to_degrees();
    let compass = (90.0 - math_angle + 360.0) % 360.0;
    crate::units::Degrees::new(compass)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{InMemoryRasterTile, LatLon, RasterTile};
    use crate::fwi::{Bui, Dc, Dmc, Ffmc, Fwi, Isi};
    use crate::spread_kernel::FbpSpreadKernel;
    use crate::units::{Celsius, KilometresPerHour, Millimetres, Percent, Wind};
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

    fn weather_stream(day: &str, scenario: u32) -> Arc<FireWeatherStream> {
        let rows: Vec<_> = (0..72)
            .map(|h| WeatherRow {
                scenario,
                date: format!("{day} {:02}:00:00", h % 24),
                prec: 0.0,
                temp: 28.0,
                rh: 25.0,
                ws: 25.0,
                wd: 0.0,
                ffmc: 92.0,
                dmc: 40.0,
                dc: 300.0,
                isi: 15.0,
                bui: 60.0,
                fwi: 30.0,
            })
            .collect();
        Arc::new(FireWeatherStream::from_rows(&rows, 0.0).unwrap())
    }

    #[test]
    fn run_without_reset_errors() {
        let tile = InMemoryRasterTile::flat(geometry(10), Some(5));
        let reg = Arc::new(FuelModelRegistry::reference());
        let env = Arc::new(
            Environment::build(&[&tile], (5, 5), LatLon { lat: 46.0, lon: -78.0 }, None, &reg).unwrap(),
        );
        let weather = weather_stream("2024-06-01", 0);
        let kernel: Arc<dyn SpreadKernel> = Arc::new(FbpSpreadKernel::new());
        let mut scenario = Scenario::new(
            0,
            env,
            weather,
            reg,
            kernel,
            ScenarioId(0),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            StartPoint::point(CellIndex::new(5, 5), 0.0),
            24,
        );
        assert!(matches!(scenario.run(), Err(ScenarioError::NotReset { .. })));
    }

    #[test]
    fn single_cell_ignition_grows_in_favourable_conditions() {
        let tile = InMemoryRasterTile::flat(geometry(15), Some(5));
        let reg = Arc::new(FuelModelRegistry::reference());
        let env = Arc::new(
            Environment::build(&[&tile], (7, 7), LatLon { lat: 46.0, lon: -78.0 }, None, &reg).unwrap(),
        );
        let weather = weather_stream("2024-06-01", 0);
        let kernel: Arc<dyn SpreadKernel> = Arc::new(FbpSpreadKernel::new());
        let mut scenario = Scenario::new(
            0,
            env,
            weather,
            reg,
            kernel,
            ScenarioId(0),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            StartPoint::point(CellIndex::new(7, 7), 0.0),
            72,
        );
        scenario.reset(42);
        let outcome = scenario.run().unwrap();
        assert!(outcome.fire_size_ha > 0.0);
        assert!(outcome.snapshot.len() > 1);
        assert!(
            !scenario.newly_burned_pool.is_empty(),
            "a multi-hour run must return its per-hour scratch buffer to the pool, not leak a fresh one each step"
        );
    }

    #[test]
    fn shared_cancel_flag_stops_run_early() {
        let tile = InMemoryRasterTile::flat(geometry(15), Some(5));
        let reg = Arc::new(FuelModelRegistry::reference());
        let env = Arc::new(
            Environment::build(&[&tile], (7, 7), LatLon { lat: 46.0, lon: -78.0 }, None, &reg).unwrap(),
        );
        let weather = weather_stream("2024-06-01", 0);
        let kernel: Arc<dyn SpreadKernel> = Arc::new(FbpSpreadKernel::new());
        let mut scenario = Scenario::new(
            0,
            env,
            weather,
            reg,
            kernel,
            ScenarioId(0),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            StartPoint::point(CellIndex::new(7, 7), 0.0),
            72,
        );
        let flag = Arc::new(AtomicBool::new(true));
        scenario.share_cancel_flag(Arc::clone(&flag));
        scenario.reset(1);
        let outcome = scenario.run().unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.steps, 0);
        assert_eq!(scenario.state(), ScenarioState::Cancelled);
    }

    #[test]
    fn start_point_normalize_clamps_but_preserves_size() {
        let g = geometry(10);
        let sp = StartPoint::point(CellIndex::new(50, 50), 12.5);
        let normalized = sp.normalize(&g);
        assert_eq!(normalized.cell, CellIndex::new(9, 9));
        assert!((normalized.size_ha - 12.5).abs() < 1e-9);
    }
}
