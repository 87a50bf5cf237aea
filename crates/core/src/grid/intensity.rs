//! Per-scenario mutable burn/intensity state (spec.md §3/§4.4 `IntensityMap`).

use std::sync::Mutex;

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use super::burned::BurnedData;
use super::geometry::CellIndex;

/// Fireline intensity, kW/m.
pub type IntensitySize = u16;

struct IntensityMapInner {
    intensities: FxHashMap<CellIndex, IntensitySize>,
    burned: BurnedData,
}

/// Pairing of a sparse cell -> intensity map with a [`BurnedData`] bitset.
///
/// Invariant: every key present in the intensity map has its bit set in the
/// `BurnedData` (spec.md §3). All public operations take the internal
/// mutex, matching spec.md §4.4 ("all public operations acquire an
/// internal mutex") and the concurrency table in spec.md §5.
pub struct IntensityMap {
    inner: Mutex<IntensityMapInner>,
    rows: u32,
    columns: u32,
}

impl IntensityMap {
    /// An intensity map over a `rows x columns` grid, initialised from the
    /// landscape's unburnable mask (spec.md §3: "Initialised from fuel
    /// grid (unburnable cells pre-set)").
    #[must_use]
    pub fn new(rows: u32, columns: u32, unburnable: BurnedData) -> Self {
        Self {
            inner: Mutex::new(IntensityMapInner {
                intensities: FxHashMap::default(),
                burned: unburnable,
            }),
            rows,
            columns,
        }
    }

    /// Mark every cell in `perimeter` as burned with intensity `1`,
    /// concurrently (spec.md §4.4 `applyPerimeter`).
    pub fn apply_perimeter(&self, perimeter: &[CellIndex]) {
        perimeter.par_iter().for_each(|&cell| self.burn(cell, 1));
    }

    /// Record `intensity` for `loc` and set its burned bit (spec.md §4.4
    /// `burn`).
    pub fn burn(&self, loc: CellIndex, intensity: IntensitySize) {
        let mut inner = self.inner.lock().expect("intensity map mutex poisoned");
        inner.burned.set(loc);
        inner.intensities.insert(loc, intensity);
    }

    /// True iff `loc` has burned (or was never burnable to begin with).
    #[must_use]
    pub fn has_burned(&self, loc: CellIndex) -> bool {
        self.inner.lock().expect("intensity map mutex poisoned").burned.get(loc)
    }

    /// True iff `loc` and all 8 (bounds-clipped) neighbours have burned
    /// (spec.md §4.4 `isSurrounded`).
    #[must_use]
    pub fn is_surrounded(&self, loc: CellIndex) -> bool {
        let inner = self.inner.lock().expect("intensity map mutex poisoned");
        if !inner.burned.get(loc) {
            return false;
        }
        loc.neighbours_clipped(self.rows, self.columns)
            .into_iter()
            .all(|n| inner.burned.get(n))
    }

    /// Total burned area, hectares, given the grid's cell size.
    ///
    /// Counts entries in the sparse intensity map, not set bits in
    /// `burned` — `burned` is pre-seeded with every unburnable cell
    /// (spec.md §3), so its popcount over-reports fire size by the
    /// landscape's non-combustible cell count on any landscape that has
    /// water, rock, or other unburnable terrain.
    #[must_use]
    pub fn fire_size(&self, cell_area_ha: f64) -> f64 {
        let inner = self.inner.lock().expect("intensity map mutex poisoned");
        inner.intensities.len() as f64 * cell_area_ha
    }

    /// Snapshot of every burned cell's recorded intensity.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(CellIndex, IntensitySize)> {
        let inner = self.inner.lock().expect("intensity map mutex poisoned");
        inner.intensities.iter().map(|(&c, &i)| (c, i)).collect()
    }

    /// Intensity recorded for `loc`, if it has burned and holds an entry.
    #[must_use]
    pub fn intensity_at(&self, loc: CellIndex) -> Option<IntensitySize> {
        self.inner.lock().expect("intensity map mutex poisoned").intensities.get(&loc).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_map(rows: u32, cols: u32) -> IntensityMap {
        IntensityMap::new(rows, cols, BurnedData::new(rows, cols))
    }

    #[test]
    fn burn_sets_bit_and_intensity() {
        let m = empty_map(10, 10);
        let c = CellIndex::new(3, 3);
        assert!(!m.has_burned(c));
        m.burn(c, 500);
        assert!(m.has_burned(c));
        assert_eq!(m.intensity_at(c), Some(500));
    }

    #[test]
    fn apply_perimeter_burns_every_cell_at_intensity_one() {
        let m = empty_map(10, 10);
        let perimeter: Vec<_> = (0..5).map(|i| CellIndex::new(0, i)).collect();
        m.apply_perimeter(&perimeter);
        for c in &perimeter {
            assert!(m.has_burned(*c));
            assert_eq!(m.intensity_at(*c), Some(1));
        }
    }

    #[test]
    fn is_surrounded_requires_all_eight_neighbours() {
        let m = empty_map(10, 10);
        let centre = CellIndex::new(5, 5);
        m.burn(centre, 10);
        assert!(!m.is_surrounded(centre));
        for n in centre.neighbours_clipped(10, 10) {
            m.burn(n, 10);
        }
        assert!(m.is_surrounded(centre));
    }

    #[test]
    fn fire_size_scales_with_cell_area() {
        let m = empty_map(10, 10);
        m.burn(CellIndex::new(0, 0), 1);
        m.burn(CellIndex::new(0, 1), 1);
        assert!((m.fire_size(1.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn fire_size_ignores_preseeded_unburnable_cells() {
        let mut unburnable = BurnedData::new(10, 10);
        for c in 0..10 {
            unburnable.set(CellIndex::new(0, c));
        }
        let m = IntensityMap::new(10, 10, unburnable);
        m.burn(CellIndex::new(5, 5), 1);
        assert!(
            (m.fire_size(1.0) - 1.0).abs() < 1e-9,
            "fire_size must count actually-burned cells, not the unburnable-preseeded bitset"
        );
    }
}
