//! Output-sink collaborator contract (spec.md §6.4).
//!
//! Writing a GeoTIFF is out of scope for this crate (spec.md §1 Non-goals);
//! what belongs here is the seam the rest of the engine calls through, plus
//! a test double that records what would have been written.

use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::OutputError;
use crate::grid::GridGeometry;
use crate::probability::ProcessingStatus;

/// A collaborator capable of persisting a named grid product (spec.md §6.4:
/// "raster output is an external collaborator; this crate hands it a name,
/// a grid, and a geometry").
pub trait OutputSink: Send + Sync {
    /// Persist `values` (row-major, `geometry.cell_count()` long) under
    /// `name`, tagging it with `status`.
    ///
    /// # Errors
    /// Implementations return [`OutputError`] on any failure to persist.
    fn save_grid(
        &self,
        name: &str,
        geometry: &GridGeometry,
        values: &[f64],
        status: ProcessingStatus,
    ) -> Result<PathBuf, OutputError>;

    /// Persist `sizes` (one final fire size per contributing scenario, ha)
    /// as the `sizes.csv` product spec.md §6.4 calls for alongside the four
    /// probability grids.
    ///
    /// # Errors
    /// Implementations return [`OutputError`] on any failure to persist.
    fn save_sizes(&self, sizes: &[f64]) -> Result<PathBuf, OutputError>;
}

#[derive(Debug, Clone)]
struct SavedGrid {
    name: String,
    values: Vec<f64>,
    status: ProcessingStatus,
}

/// An in-memory [`OutputSink`] that records every save instead of touching
/// the filesystem, for tests and for the `test` CLI subcommand (spec.md
/// §6.1).
#[derive(Default)]
pub struct InMemoryOutputSink {
    saved: Mutex<Vec<SavedGrid>>,
    sizes: Mutex<Option<Vec<f64>>>,
}

impl OutputSink for InMemoryOutputSink {
    fn save_grid(
        &self,
        name: &str,
        _geometry: &GridGeometry,
        values: &[f64],
        status: ProcessingStatus,
    ) -> Result<PathBuf, OutputError> {
        self.saved.lock().expect("output sink mutex poisoned").push(SavedGrid {
            name: name.to_string(),
            values: values.to_vec(),
            status,
        });
        Ok(PathBuf::from(format!("memory://{name}")))
    }

    fn save_sizes(&self, sizes: &[f64]) -> Result<PathBuf, OutputError> {
        *self.sizes.lock().expect("output sink mutex poisoned") = Some(sizes.to_vec());
        Ok(PathBuf::from("memory://sizes.csv"))
    }
}

impl InMemoryOutputSink {
    /// Names of every grid saved so far, in save order.
    #[must_use]
    pub fn saved_names(&self) -> Vec<String> {
        self.saved
            .lock()
            .expect("output sink mutex poisoned")
            .iter()
            .map(|g| g.name.clone())
            .collect()
    }

    /// The most recently saved values for `name`, if any.
    #[must_use]
    pub fn values_for(&self, name: &str) -> Option<Vec<f64>> {
        self.saved
            .lock()
            .expect("output sink mutex poisoned")
            .iter()
            .rev()
            .find(|g| g.name == name)
            .map(|g| g.values.clone())
    }

    /// The values most recently passed to [`OutputSink::save_sizes`], if any.
    #[must_use]
    pub fn saved_sizes(&self) -> Option<Vec<f64>> {
        self.sizes.lock().expect("output sink mutex poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sink_records_saves() {
        let sink = InMemoryOutputSink::default();
        let geometry = GridGeometry {
            rows: 1,
            columns: 2,
            cell_size_m: 100.0,
            lower_left: (0.0, 0.0),
            upper_right: (100.0, 200.0),
            projection: "EPSG:3978".to_string(),
        };
        sink.save_grid("all", &geometry, &[0.5, 0.25], ProcessingStatus::Processed)
            .unwrap();
        assert_eq!(sink.saved_names(), vec!["all"]);
        assert_eq!(sink.values_for("all"), Some(vec![0.5, 0.25]));
        assert_eq!(sink.values_for("missing"), None);
    }
}
