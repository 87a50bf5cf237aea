//! Cross-scenario burn-probability accumulation (spec.md §3/§4.5
//! `ProbabilityMap`, component C5).
//!
//! Every finished [`crate::scenario::Scenario`] contributes its final
//! [`crate::grid::IntensityMap`] snapshot here. `all` counts every burned
//! cell; `low`/`moderate`/`high` partition that same count by disjoint
//! intensity bands (`[min, lowMax] / (lowMax, medMax] / (medMax, maxValue]`,
//! spec.md §4.5) so `low + moderate + high == all` at every cell, and the
//! CLI can emit all four probability rasters from one accumulator (spec.md
//! §6.4).

use std::sync::Mutex;

use crate::error::{OutputError, ProbabilityMapError};
use crate::grid::{CellIndex, GridGeometry, IntensitySize};
use crate::output::OutputSink;
use crate::stats::SafeVector;

/// Lifecycle stage of a probability map, stamped into saved rasters'
/// metadata (SPEC_FULL.md §9, grounded in `original_source/ProbabilityMap.h`
/// which carries the same three-state enum with the same discriminants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcessingStatus {
    /// No scenario has contributed yet.
    Unprocessed = 2,
    /// At least one scenario has contributed but the map has not been
    /// finalized for output.
    Processing = 3,
    /// Finalized: no further scenarios will be added.
    Processed = 4,
}

struct ProbabilityMapInner {
    all: Vec<u32>,
    low: Vec<u32>,
    moderate: Vec<u32>,
    high: Vec<u32>,
    scenario_count: u32,
    status: ProcessingStatus,
}

/// Fraction-of-scenarios-burned accumulator over one grid extent, banded by
/// fireline intensity (spec.md §4.5).
pub struct ProbabilityMap {
    geometry: GridGeometry,
    intensity_low_max: f64,
    intensity_med_max: f64,
    intensity_max: f64,
    inner: Mutex<ProbabilityMapInner>,
    /// Per-run final fire sizes (ha), one per scenario that contributed via
    /// [`ProbabilityMap::add_size`] — the vector `saveAll` writes out as
    /// `sizes.csv` (spec.md §6.4/§4.5).
    sizes: SafeVector,
}

impl ProbabilityMap {
    /// A zeroed probability map over `geometry`, banded by the given
    /// upper bounds (kW/m) of the low and moderate intensity ranges plus
    /// the overall max, matching [`crate::config::Config::intensity_bands`]'s
    /// `(min, low_max, med_max, max)` tuple (the `min` bound is not
    /// separately tracked: every cell this map ever sees already burned, so
    /// it trivially clears the lower bound of the low band).
    #[must_use]
    pub fn new(geometry: GridGeometry, intensity_low_max: f64, intensity_med_max: f64, intensity_max: f64) -> Self {
        let cells = geometry.cell_count();
        Self {
            geometry,
            intensity_low_max,
            intensity_med_max,
            intensity_max,
            inner: Mutex::new(ProbabilityMapInner {
                all: vec![0; cells],
                low: vec![0; cells],
                moderate: vec![0; cells],
                high: vec![0; cells],
                scenario_count: 0,
                status: ProcessingStatus::Unprocessed,
            }),
            sizes: SafeVector::new(),
        }
    }

    fn index(&self, cell: CellIndex) -> usize {
        cell.row as usize * self.geometry.columns as usize + cell.column as usize
    }

    /// Fold one scenario's final burn snapshot in (spec.md §4.5 `addProbability`).
    ///
    /// Every burned cell lands in exactly one of `low`/`moderate`/`high`
    /// (half-open bands `(low_max, med_max]`/`(med_max, max]`, with `low`
    /// taking everything at or below `low_max`), so `low + moderate + high
    /// == all` always holds (spec.md §8).
    pub fn add_probability(&self, snapshot: &[(CellIndex, IntensitySize)]) {
        let mut inner = self.inner.lock().expect("probability map mutex poisoned");
        inner.status = ProcessingStatus::Processing;
        inner.scenario_count += 1;
        for &(cell, intensity) in snapshot {
            let idx = self.index(cell);
            let intensity = f64::from(intensity);
            inner.all[idx] += 1;
            if intensity <= self.intensity_low_max {
                inner.low[idx] += 1;
            } else if intensity <= self.intensity_med_max {
                inner.moderate[idx] += 1;
            } else {
                inner.high[idx] += 1;
            }
        }
    }

    /// Record one scenario's final fire size (ha), contributing a row to
    /// the `sizes.csv` product [`ProbabilityMap::save_all`] writes out.
    pub fn add_size(&self, size_ha: f64) {
        self.sizes.add_value(size_ha);
    }

    /// Merge `other`'s accumulated counts into `self` (spec.md §4.5
    /// `addProbabilities`, used to combine per-thread-pool accumulators).
    ///
    /// # Errors
    /// [`ProbabilityMapError::ExtentMismatch`] if the two maps cover
    /// different grids, or [`ProbabilityMapError::BandingMismatch`] if they
    /// use different intensity-band thresholds.
    pub fn add_probabilities(&self, other: &ProbabilityMap) -> Result<(), ProbabilityMapError> {
        if self.geometry.rows != other.geometry.rows || self.geometry.columns != other.geometry.columns {
            return Err(ProbabilityMapError::ExtentMismatch);
        }
        if (self.intensity_low_max - other.intensity_low_max).abs() > 1e-9
            || (self.intensity_med_max - other.intensity_med_max).abs() > 1e-9
            || (self.intensity_max - other.intensity_max).abs() > 1e-9
        {
            return Err(ProbabilityMapError::BandingMismatch);
        }

        let other_inner = other.inner.lock().expect("probability map mutex poisoned");
        let mut inner = self.inner.lock().expect("probability map mutex poisoned");
        for i in 0..inner.all.len() {
            inner.all[i] += other_inner.all[i];
            inner.low[i] += other_inner.low[i];
            inner.moderate[i] += other_inner.moderate[i];
            inner.high[i] += other_inner.high[i];
        }
        inner.scenario_count += other_inner.scenario_count;
        inner.status = ProcessingStatus::Processing;
        drop(inner);
        drop(other_inner);
        for size in other.sizes.get_values() {
            self.sizes.add_value(size);
        }
        Ok(())
    }

    /// Number of scenarios folded in so far.
    #[must_use]
    pub fn scenario_count(&self) -> u32 {
        self.inner.lock().expect("probability map mutex poisoned").scenario_count
    }

    /// Current lifecycle stage.
    #[must_use]
    pub fn status(&self) -> ProcessingStatus {
        self.inner.lock().expect("probability map mutex poisoned").status
    }

    /// Fraction of scenarios in which `cell` ever burned at an intensity at
    /// least as severe as `threshold_intensity` (`0.0` selects the unbanded
    /// "ever burned" grid; a threshold inside the low/moderate/high band
    /// sums that band and every more severe one, since every burned cell
    /// already clears the low band's floor).
    #[must_use]
    pub fn probability_at(&self, cell: CellIndex, threshold_intensity: f64) -> f64 {
        let inner = self.inner.lock().expect("probability map mutex poisoned");
        if inner.scenario_count == 0 {
            return 0.0;
        }
        let idx = self.index(cell);
        let count = if threshold_intensity <= self.intensity_low_max {
            inner.all[idx]
        } else if threshold_intensity <= self.intensity_med_max {
            inner.moderate[idx] + inner.high[idx]
        } else {
            inner.high[idx]
        };
        f64::from(count) / f64::from(inner.scenario_count)
    }

    /// Raw `(all, low, moderate, high)` scenario counts for `cell`, before
    /// dividing by `scenario_count` (spec.md §8: `low + moderate + high ==
    /// all` must hold for every cell).
    #[must_use]
    pub fn band_counts(&self, cell: CellIndex) -> (u32, u32, u32, u32) {
        let inner = self.inner.lock().expect("probability map mutex poisoned");
        let idx = self.index(cell);
        (inner.all[idx], inner.low[idx], inner.moderate[idx], inner.high[idx])
    }

    /// Write all four probability grids ("all", "low", "moderate", "high")
    /// through `sink`, then mark this map [`ProcessingStatus::Processed`]
    /// (spec.md §6.4, §4.5 `saveAll`).
    ///
    /// # Errors
    /// Propagates whatever [`OutputSink::save_grid`] returns.
    pub fn save_all(&self, sink: &dyn OutputSink) -> Result<(), OutputError> {
        let (names, grids) = {
            let mut inner = self.inner.lock().expect("probability map mutex poisoned");
            let n = f64::from(inner.scenario_count.max(1));
            let fractions = |counts: &[u32]| counts.iter().map(|&c| f64::from(c) / n).collect::<Vec<_>>();
            let grids = vec![
                fractions(&inner.all),
                fractions(&inner.low),
                fractions(&inner.moderate),
                fractions(&inner.high),
            ];
            inner.status = ProcessingStatus::Processed;
            (["all", "low", "moderate", "high"], grids)
        };

        for (name, grid) in names.into_iter().zip(grids) {
            sink.save_grid(name, &self.geometry, &grid, self.status())?;
        }
        sink.save_sizes(&self.sizes.get_values())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::InMemoryOutputSink;

    fn geometry() -> GridGeometry {
        GridGeometry {
            rows: 2,
            columns: 2,
            cell_size_m: 100.0,
            lower_left: (0.0, 0.0),
            upper_right: (200.0, 200.0),
            projection: "EPSG:3978".to_string(),
        }
    }

    #[test]
    fn add_probability_accumulates_bands() {
        let map = ProbabilityMap::new(geometry(), 10.0, 100.0, 1000.0);
        map.add_probability(&[(CellIndex::new(0, 0), 50), (CellIndex::new(0, 1), 5)]);
        map.add_probability(&[(CellIndex::new(0, 0), 2000)]);
        assert_eq!(map.scenario_count(), 2);
        assert!((map.probability_at(CellIndex::new(0, 0), 0.0) - 1.0).abs() < 1e-9);
        assert!((map.probability_at(CellIndex::new(0, 0), 1000.0) - 0.5).abs() < 1e-9);
        // cell (0,1) only burned once, at intensity 5 (inside the low band,
        // since 5 <= low_max of 10) — "at least low_max-severe" is every
        // burn, so this is 1/2, not 0.
        assert!((map.probability_at(CellIndex::new(0, 1), 10.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn bands_partition_every_burned_cell_exactly_once() {
        let map = ProbabilityMap::new(geometry(), 10.0, 100.0, 1000.0);
        map.add_probability(&[
            (CellIndex::new(0, 0), 5),    // low
            (CellIndex::new(0, 1), 50),   // moderate
            (CellIndex::new(1, 0), 2000), // high
        ]);
        map.add_probability(&[(CellIndex::new(0, 0), 2000)]);
        for cell in [CellIndex::new(0, 0), CellIndex::new(0, 1), CellIndex::new(1, 0), CellIndex::new(1, 1)] {
            let (all, low, moderate, high) = map.band_counts(cell);
            assert_eq!(low + moderate + high, all, "band partition disagrees with total at {cell:?}");
        }
    }

    #[test]
    fn add_probabilities_rejects_extent_mismatch() {
        let a = ProbabilityMap::new(geometry(), 10.0, 100.0, 1000.0);
        let mut mismatched = geometry();
        mismatched.rows = 3;
        let b = ProbabilityMap::new(mismatched, 10.0, 100.0, 1000.0);
        assert!(matches!(
            a.add_probabilities(&b),
            Err(ProbabilityMapError::ExtentMismatch)
        ));
    }

    #[test]
    fn add_probabilities_rejects_banding_mismatch() {
        let a = ProbabilityMap::new(geometry(), 10.0, 100.0, 1000.0);
        let b = ProbabilityMap::new(geometry(), 20.0, 100.0, 1000.0);
        assert!(matches!(
            a.add_probabilities(&b),
            Err(ProbabilityMapError::BandingMismatch)
        ));
    }

    #[test]
    fn save_all_writes_four_products_and_marks_processed() {
        let map = ProbabilityMap::new(geometry(), 10.0, 100.0, 1000.0);
        map.add_probability(&[(CellIndex::new(0, 0), 50)]);
        map.add_size(12.5);
        let sink = InMemoryOutputSink::default();
        map.save_all(&sink).unwrap();
        assert_eq!(sink.saved_names(), vec!["all", "low", "moderate", "high"]);
        assert_eq!(sink.saved_sizes(), Some(vec![12.5]));
        assert_eq!(map.status(), ProcessingStatus::Processed);
    }

    #[test]
    fn add_probabilities_merges_size_vectors() {
        let a = ProbabilityMap::new(geometry(), 10.0, 100.0, 1000.0);
        a.add_size(4.0);
        let b = ProbabilityMap::new(geometry(), 10.0, 100.0, 1000.0);
        b.add_size(9.0);
        a.add_probabilities(&b).unwrap();
        let mut sizes = a.sizes.get_values();
        sizes.sort_by(f64::total_cmp);
        assert_eq!(sizes, vec![4.0, 9.0]);
    }
}
