//! Crate-wide error taxonomy.
//!
//! Mirrors the error policy of the system this engine implements: fatal
//! errors unwind to the [`crate::model::Model`] controller, which flushes
//! logs and partial outputs; recoverable mismatches degrade to a
//! `tracing::warn!` instead of a returned `Err` (see [`crate::fwi::check_fwi`]
//! and friends).

use crate::grid::CellIndex;
use thiserror::Error;

/// Top-level error for anything that can abort a run.
#[derive(Debug, Error)]
pub enum FireStarrError {
    /// Malformed CLI input, missing required flag, out-of-range value, or
    /// misaligned grids.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Weather stream failed to parse or validate.
    #[error(transparent)]
    WeatherInput(#[from] WeatherInputError),

    /// A raster collaborator failed to produce usable data.
    #[error(transparent)]
    Raster(#[from] RasterError),

    /// A cell's fuel code has no entry in the registry *and* was reached
    /// during spread rather than at load time. Unknown fuel at load time is
    /// silently marked unburnable instead (see `Environment::unburnable`).
    #[error("fuel code for cell {cell:?} is unknown during spread")]
    FuelUnknown {
        /// Cell whose fuel lookup failed.
        cell: CellIndex,
    },

    /// A probability map merge was attempted across incompatible maps.
    #[error(transparent)]
    ProbabilityMap(#[from] ProbabilityMapError),

    /// A scenario was driven incorrectly (e.g. run twice without a reset).
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    /// An output collaborator failed to persist a result.
    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Errors raised while parsing or validating a weather stream (§6.2).
#[derive(Debug, Error)]
pub enum WeatherInputError {
    /// Underlying I/O failure reading the weather file.
    #[error("failed to read weather input: {0}")]
    Io(#[from] std::io::Error),

    /// The CSV header did not match the required column set/order.
    #[error("malformed weather header: {0}")]
    MalformedHeader(String),

    /// A row's timestamp did not advance by exactly one hour from the
    /// previous row in the same scenario.
    #[error("scenario {scenario}: non-sequential hours (expected {expected}, found {found})")]
    NonSequentialHours {
        /// Scenario id the bad row belongs to.
        scenario: u32,
        /// Timestamp that should have followed the previous row.
        expected: chrono::NaiveDateTime,
        /// Timestamp actually found.
        found: chrono::NaiveDateTime,
    },

    /// A row reported negative precipitation.
    #[error("scenario {scenario}: negative precipitation at {at}")]
    NegativePrecipitation {
        /// Scenario id the bad row belongs to.
        scenario: u32,
        /// Timestamp of the offending row.
        at: chrono::NaiveDateTime,
    },

    /// A required column was missing from a row.
    #[error("missing column: {0}")]
    MissingColumn(&'static str),

    /// Scenarios in the same stream disagree on their `[min_day, max_day]`
    /// range.
    #[error("scenario {scenario} does not share the stream's day range")]
    MismatchedDayRange {
        /// Scenario id with the mismatched range.
        scenario: u32,
    },

    /// A scenario's rows crossed a year boundary, which is not supported.
    #[error("scenario {scenario} crosses a year boundary")]
    CrossesYearBoundary {
        /// Scenario id that crossed the boundary.
        scenario: u32,
    },

    /// The stream contained no rows at all.
    #[error("weather stream is empty")]
    Empty,
}

/// Errors from the raster-store collaborator (§6.3, out of scope for this
/// crate beyond the trait contract in [`crate::environment::RasterTile`]).
#[derive(Debug, Error)]
pub enum RasterError {
    /// No candidate tile satisfied the selection rule in §4.3.
    #[error("no raster tile contains the ignition point")]
    NoTileContainsIgnition,

    /// Two rasters that must align (fuel + elevation) do not share extent,
    /// cell size, or corner.
    #[error("rasters are not co-aligned: {0}")]
    Misaligned(String),

    /// Requested grid exceeds the 4096x4096 cell cap.
    #[error("grid {rows}x{columns} exceeds the {max}x{max} cap")]
    GridTooLarge {
        /// Row count requested.
        rows: u32,
        /// Column count requested.
        columns: u32,
        /// Maximum rows/columns allowed.
        max: u32,
    },
}

/// Errors from [`crate::probability::ProbabilityMap::add_probabilities`].
#[derive(Debug, Error)]
pub enum ProbabilityMapError {
    /// The two maps cover different grid extents.
    #[error("probability maps have different extents")]
    ExtentMismatch,

    /// The two maps use different intensity-band thresholds.
    #[error("probability maps have different intensity bands")]
    BandingMismatch,
}

/// Errors raised by [`crate::scenario::Scenario`] misuse.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// `run()` was called on a scenario that was never reset, or was
    /// already run since its last reset.
    #[error("scenario {id} was run without a preceding reset")]
    NotReset {
        /// Scenario id.
        id: u32,
    },
}

/// Errors from the output-sink collaborator (§6.4).
#[derive(Debug, Error)]
pub enum OutputError {
    /// Underlying I/O failure while writing an output product.
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),

    /// The sink was asked to write a product it does not recognise.
    #[error("unknown output product: {0}")]
    UnknownProduct(String),
}
