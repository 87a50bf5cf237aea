//! Monte-Carlo wildland fire growth engine.
//!
//! A probabilistic fire-growth model grounded in the Canadian Forest Fire
//! Weather Index System: an [`environment`] (landscape + fuel), an hourly
//! [`weather`] stream, a per-cell [`spread_kernel`], and a convergence
//! [`model`] that runs many [`scenario`] realisations per [`iteration`]
//! until the accumulated [`probability`] map's statistics stabilize.

pub mod config;
pub mod environment;
pub mod error;
pub mod fuel;
pub mod fwi;
pub mod grid;
pub mod iteration;
pub mod logging;
pub mod model;
pub mod output;
pub mod pool;
pub mod probability;
pub mod scenario;
pub mod spread_kernel;
pub mod stats;
pub mod units;
pub mod util;
pub mod weather;

pub use config::{Config, RunMode};
pub use environment::Environment;
pub use error::FireStarrError;
pub use fuel::FuelModelRegistry;
pub use iteration::Iteration;
pub use model::{Model, ModelOutput};
pub use probability::ProbabilityMap;
pub use scenario::{Scenario, StartPoint};
pub use spread_kernel::{FbpSpreadKernel, SpreadKernel};
pub use weather::FireWeatherStream;
