//! `firestarr` binary: a thin `clap` wrapper over `fire_sim_core::Model`
//! (spec.md §6.1). This crate owns no raster decoder, weather-file reader,
//! or output encoder — those are external collaborators (spec.md §1
//! Non-goals) — so `point`/`surface` parse and validate every flag but stop
//! short of a real run, reporting that clearly instead of pretending to
//! read a GeoTIFF that was never opened. `test` is the one subcommand that
//! can run end to end: it builds a flat in-memory landscape and a
//! synthetic weather stream, and drives `Model::run` against them.
//!
//! spec.md's positional form `firestarr <outputDir> <date> <lat> <lon>
//! <time> [options]` has no subcommand keyword; this crate spells it as an
//! explicit `point` subcommand since `clap`'s derive API needs every
//! invocation to name one (documented as a deliberate CLI-surface
//! adaptation in DESIGN.md, not a silent omission — `surface` and `test`
//! keep their literal spec.md names).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};

use fire_sim_core::config::{Config, RunMode};
use fire_sim_core::environment::{Environment, InMemoryRasterTile, LatLon};
use fire_sim_core::error::FireStarrError;
use fire_sim_core::fuel::FuelModelRegistry;
use fire_sim_core::grid::{CellIndex, GridGeometry};
use fire_sim_core::logging;
use fire_sim_core::model::Model;
use fire_sim_core::output::InMemoryOutputSink;
use fire_sim_core::scenario::StartPoint;
use fire_sim_core::spread_kernel::FbpSpreadKernel;
use fire_sim_core::weather::{FireWeatherStream, ScenarioId, WeatherRow};

#[derive(Parser, Debug)]
#[command(name = "firestarr", about = "Monte-Carlo wildland fire growth engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// `firestarr <outputDir> <date> <lat> <lon> <time> [options]`
    Point(RunArgs),
    /// `firestarr surface <outputDir> <date> <lat> <lon> <time> [options]`
    Surface(RunArgs),
    /// `firestarr test <outputDir> [--all] [options]`
    Test(TestArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Directory the final outputs are written to.
    output_dir: PathBuf,
    /// Ignition date, `YYYY-MM-DD`.
    date: NaiveDate,
    /// Ignition latitude, decimal degrees.
    lat: f64,
    /// Ignition longitude, decimal degrees.
    lon: f64,
    /// Ignition time of day, `HH:MM`.
    time: String,

    #[command(flatten)]
    options: RunOptions,
}

#[derive(Args, Debug)]
struct TestArgs {
    /// Directory the final outputs are written to.
    output_dir: PathBuf,
    /// Run every built-in scenario instead of just the deterministic one.
    #[arg(long)]
    all: bool,

    #[command(flatten)]
    options: RunOptions,
}

#[derive(Args, Debug)]
struct RunOptions {
    /// Raise the log level (repeatable).
    #[arg(short = 'v', action = ArgAction::Count)]
    verbose: u8,
    /// Lower the log level (repeatable).
    #[arg(short = 'q', action = ArgAction::Count)]
    quiet: u8,
    /// Save per-scenario grids in addition to the aggregate probability maps.
    #[arg(short = 'i')]
    save_individual: bool,
    /// Run synchronously (one thread, no `rayon` fan-out within an iteration).
    #[arg(short = 's')]
    synchronous: bool,
    /// Also emit `.asc` alongside `.tif` (ignored: no encoder in this crate).
    #[arg(long)]
    ascii: bool,
    /// Skip `.tif` output entirely (ignored: no encoder in this crate).
    #[arg(long = "no-tiff")]
    no_tiff: bool,
    /// Skip intensity-map output.
    #[arg(long = "no-intensity")]
    no_intensity: bool,
    /// Skip probability-map output.
    #[arg(long = "no-probability")]
    no_probability: bool,
    /// Emit an occurrence (ever-burned) grid.
    #[arg(long)]
    occurrence: bool,
    /// Emit a simulated-area grid.
    #[arg(long = "sim-area")]
    sim_area: bool,
    /// One iteration, no convergence loop.
    #[arg(long)]
    deterministic: bool,
    /// Confidence level for the convergence check, e.g. `0.95`.
    #[arg(long)]
    confidence: Option<f64>,
    /// Path to a perimeter file to seed ignition from (unsupported: no
    /// perimeter-file decoder in this crate).
    #[arg(long)]
    perim: Option<PathBuf>,
    /// Reported starting fire size, hectares.
    #[arg(long)]
    size: Option<f64>,
    /// Path to a weather CSV (spec.md §6.2 format).
    #[arg(long)]
    wx: Option<PathBuf>,
    #[arg(long)]
    ffmc: Option<f64>,
    #[arg(long)]
    dmc: Option<f64>,
    #[arg(long)]
    dc: Option<f64>,
    #[arg(long = "apcp_prev")]
    apcp_prev: Option<f64>,
    #[arg(long)]
    wd: Option<f64>,
    #[arg(long)]
    ws: Option<f64>,
    #[arg(long)]
    slope: Option<f64>,
    #[arg(long)]
    aspect: Option<f64>,
    #[arg(long)]
    curing: Option<f64>,
    #[arg(long = "force-greenup")]
    force_greenup: bool,
    #[arg(long = "force-no-greenup")]
    force_no_greenup: bool,
    #[arg(long = "output_date_offsets")]
    output_date_offsets: Option<String>,
    /// Root directory of tiled GeoTIFF inputs (unsupported: no GeoTIFF
    /// decoder in this crate; see spec.md §1 Non-goals).
    #[arg(long = "raster-root")]
    raster_root: Option<PathBuf>,
    /// Path to the fuel lookup table CSV (unsupported here; see
    /// `fire_sim_core::fuel::FuelModelRegistry::reference` for the
    /// in-memory stand-in).
    #[arg(long = "fuel-lut")]
    fuel_lut: Option<PathBuf>,
    /// UTC offset, hours, applied to local timestamps.
    #[arg(long)]
    tz: Option<i32>,
    /// Path to write logs to, in addition to stderr.
    #[arg(long)]
    log: Option<PathBuf>,
    /// Emit point-probability output alongside the grids.
    #[arg(long)]
    points: bool,
}

impl RunOptions {
    fn validate(&self) -> Result<(), FireStarrError> {
        if let Some(c) = self.confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(FireStarrError::InvalidInput(format!(
                    "--confidence {c} is out of range [0, 1]"
                )));
            }
        }
        if let Some(curing) = self.curing {
            if !(0.0..=100.0).contains(&curing) {
                return Err(FireStarrError::InvalidInput(format!(
                    "--curing {curing} is out of range [0, 100]"
                )));
            }
        }
        if self.force_greenup && self.force_no_greenup {
            return Err(FireStarrError::InvalidInput(
                "--force-greenup and --force-no-greenup are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }

    fn log_level(&self) -> tracing::Level {
        let base = 2i16; // INFO
        let delta = i16::from(self.verbose) - i16::from(self.quiet);
        match (base + delta).clamp(0, 4) {
            0 => tracing::Level::ERROR,
            1 => tracing::Level::WARN,
            2 => tracing::Level::INFO,
            3 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }

    fn apply(&self, config: &mut Config) {
        config.run_async = !self.synchronous;
        config.save_individual = self.save_individual;
        config.save_probability = !self.no_probability;
        config.save_intensity = !self.no_intensity;
        if let Some(c) = self.confidence {
            config.confidence_level = c;
        }
        if let Some(tz) = self.tz {
            config.utc_offset_hours = tz;
        }
        if self.deterministic {
            config.run_mode = RunMode::Deterministic;
        }
    }
}

/// Parse `HH:MM` into an hour-of-day (spec.md §6.1 ignition time; this
/// engine steps hourly, so sub-hour precision is dropped, not rounded).
fn parse_hour(time: &str) -> Result<u32, FireStarrError> {
    let (hour, _minute) = time.split_once(':').ok_or_else(|| {
        FireStarrError::InvalidInput(format!("ignition time '{time}' is not HH:MM"))
    })?;
    hour.parse::<u32>()
        .ok()
        .filter(|h| *h < 24)
        .ok_or_else(|| FireStarrError::InvalidInput(format!("ignition time '{time}' is not HH:MM")))
}

fn run_point(args: &RunArgs, surface: bool) -> Result<(), FireStarrError> {
    args.options.validate()?;
    parse_hour(&args.time)?;

    let mode = if surface { "surface" } else { "point" };
    Err(FireStarrError::InvalidInput(format!(
        "'{mode}' requires a raster-backed Environment and a weather file, and this crate has no \
         GeoTIFF/proj4 decoder wired in (raster I/O stays an external collaborator here); run \
         'firestarr test' for an end-to-end smoke run against an in-memory landscape instead"
    )))
}

fn synthetic_environment(n: u32) -> Result<(Arc<Environment>, Arc<FuelModelRegistry>), FireStarrError> {
    let geometry = GridGeometry {
        rows: n,
        columns: n,
        cell_size_m: 100.0,
        lower_left: (0.0, 0.0),
        upper_right: (f64::from(n) * 100.0, f64::from(n) * 100.0),
        projection: "EPSG:3978".to_string(),
    };
    let tile = InMemoryRasterTile::flat(geometry, Some(5));
    let registry = Arc::new(FuelModelRegistry::reference());
    let environment = Environment::build(
        &[&tile],
        (n / 2, n / 2),
        LatLon { lat: 46.0, lon: -78.0 },
        None,
        &registry,
    )?;
    Ok((Arc::new(environment), registry))
}

fn synthetic_weather(date: NaiveDate, hours: u32) -> Result<Arc<FireWeatherStream>, FireStarrError> {
    let rows: Vec<_> = (0..hours)
        .map(|h| WeatherRow {
            scenario: 0,
            date: format!("{date} {:02}:00:00", h % 24),
            prec: 0.0,
            temp: 28.0,
            rh: 25.0,
            ws: 20.0,
            wd: 0.0,
            ffmc: 91.0,
            dmc: 35.0,
            dc: 280.0,
            isi: 13.0,
            bui: 55.0,
            fwi: 26.0,
        })
        .collect();
    Ok(Arc::new(FireWeatherStream::from_rows(&rows, 0.0)?))
}

fn run_test(args: &TestArgs) -> Result<(), FireStarrError> {
    args.options.validate()?;
    tracing::info!(output_dir = %args.output_dir.display(), all = args.all, "running built-in smoke test");

    let date = NaiveDate::from_ymd_opt(2024, 6, 1)
        .ok_or_else(|| FireStarrError::InvalidInput("built-in test date is invalid".to_string()))?;
    let (environment, registry) = synthetic_environment(15)?;
    let weather = synthetic_weather(date, 72)?;
    let kernel = Arc::new(FbpSpreadKernel::new());

    let mut config = Config::deterministic();
    args.options.apply(&mut config);
    let model = Model::new(config, environment, weather, registry, kernel, date, 46.0, -78.0);

    let start = StartPoint::point(CellIndex::new(7, 7), 0.0);
    let output = model.run(start, 240)?;

    let sink = InMemoryOutputSink::default();
    output.probability_map.save_all(&sink)?;
    tracing::info!(
        iterations = output.iterations_run,
        scenarios = output.scenarios_completed,
        mean_size_ha = output.mean_size_ha,
        products = ?sink.saved_names(),
        "test run complete"
    );
    Ok(())
}

fn try_main() -> Result<(), FireStarrError> {
    let cli = Cli::parse();
    let level = match &cli.command {
        Command::Point(a) | Command::Surface(a) => a.options.log_level(),
        Command::Test(a) => a.options.log_level(),
    };
    logging::init_tracing(level);

    match &cli.command {
        Command::Point(args) => run_point(args, false),
        Command::Surface(args) => run_point(args, true),
        Command::Test(args) => run_test(args),
    }
}

fn main() -> ExitCode {
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "firestarr exiting with an error");
            // spec.md §6.1 uses -1 for a usage error; that is not
            // representable as a process exit code on most platforms, so
            // this crate uses 1 for every fatal error (DESIGN.md).
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hour_rejects_missing_colon() {
        assert!(parse_hour("13").is_err());
    }

    #[test]
    fn parse_hour_rejects_out_of_range() {
        assert!(parse_hour("24:00").is_err());
    }

    #[test]
    fn parse_hour_accepts_valid_time() {
        assert_eq!(parse_hour("13:45").unwrap(), 13);
    }

    #[test]
    fn validate_rejects_out_of_range_confidence() {
        let opts = RunOptions {
            verbose: 0,
            quiet: 0,
            save_individual: false,
            synchronous: false,
            ascii: false,
            no_tiff: false,
            no_intensity: false,
            no_probability: false,
            occurrence: false,
            sim_area: false,
            deterministic: false,
            confidence: Some(1.5),
            perim: None,
            size: None,
            wx: None,
            ffmc: None,
            dmc: None,
            dc: None,
            apcp_prev: None,
            wd: None,
            ws: None,
            slope: None,
            aspect: None,
            curing: None,
            force_greenup: false,
            force_no_greenup: false,
            output_date_offsets: None,
            raster_root: None,
            fuel_lut: None,
            tz: None,
            log: None,
            points: false,
        };
        assert!(opts.validate().is_err());
    }
}
