//! Immutable landscape state (spec.md §3/§4.3, component C3).
//!
//! Built once per process from fuel + elevation rasters and read-only
//! thereafter (spec.md §3 "Lifecycles": "Environment: built once per
//! process, read-only thereafter"). GeoTIFF decoding itself is an external
//! collaborator (spec.md §1); this module only defines the [`RasterTile`]
//! contract a real raster store must satisfy, plus an in-memory test
//! double.

use crate::fuel::{FuelCode, FuelLookup, FuelModelRegistry};
use crate::grid::{BurnedData, CellIndex, GridGeometry};
use crate::units::{Degrees, SlopePercent};

/// Slope/aspect/fuel for one cell (spec.md §3 `Cell`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    /// `row * MAX_COLUMNS + column`.
    pub hash: u32,
    /// Ground slope, percent, clamped to `[0, 500]`, or
    /// [`SlopePercent::INVALID`] when the cell is an edge cell.
    pub slope: SlopePercent,
    /// Compass aspect, degrees `[0, 359]`.
    pub aspect: Degrees,
    /// Fuel reference, or `None` for unburnable/invalid.
    pub fuel: FuelCode,
}

/// Sentinel value used for `slope` on edge cells, where Horn's algorithm
/// has no full 3x3 window to work from (spec.md §4.3).
pub const INVALID_PERCENT: SlopePercent = SlopePercent::INVALID;
/// Sentinel value used for `aspect` on edge cells.
pub const INVALID_DEGREES: Degrees = Degrees::new(-1.0);

/// The raster-store collaborator contract (spec.md §1/§6.3): fuel codes,
/// elevation, grid geometry, and projection string for one tile. A real
/// implementation decodes GeoTIFF; this crate ships only the in-memory
/// test double, [`InMemoryRasterTile`].
pub trait RasterTile {
    /// This tile's grid geometry (extent, cell size, corner, projection).
    fn geometry(&self) -> &GridGeometry;
    /// Raw fuel code at `(row, column)`, or `None` if out of bounds.
    fn fuel_code(&self, row: u32, column: u32) -> Option<u16>;
    /// Elevation, metres, at `(row, column)`, or `None` if out of bounds.
    fn elevation(&self, row: u32, column: u32) -> Option<f64>;
}

/// A lat/lon point, used for ignition-location tile selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    /// Latitude, degrees.
    pub lat: f64,
    /// Longitude, degrees.
    pub lon: f64,
}

/// The fully built, immutable landscape (spec.md §3/§4.3 `Environment`).
pub struct Environment {
    geometry: GridGeometry,
    cells: Vec<Cell>,
    unburnable: BurnedData,
}

impl Environment {
    /// Build an `Environment` from a selected tile and fuel registry.
    ///
    /// Implements the tile-selection rule from spec.md §4.3: among
    /// `tiles`, pick the one that (a) matches `perimeter_projection`
    /// exactly if given, (b) contains `ignition`, and (c) maximises
    /// `min(dist_w, dist_e)^2 + min(dist_n, dist_s)^2` (the ignition as
    /// centred as possible, giving the fire room to spread).
    ///
    /// # Errors
    /// Returns [`crate::error::RasterError::NoTileContainsIgnition`] if no
    /// tile contains `ignition`, or
    /// [`crate::error::RasterError::GridTooLarge`] if the selected tile
    /// exceeds the 4096x4096 cap.
    pub fn build(
        tiles: &[&dyn RasterTile],
        ignition_row_col: (u32, u32),
        _ignition_lat_lon: LatLon,
        perimeter_projection: Option<&str>,
        registry: &FuelModelRegistry,
    ) -> Result<Self, crate::error::RasterError> {
        let selected = Self::select_tile(tiles, ignition_row_col, perimeter_projection)
            .ok_or(crate::error::RasterError::NoTileContainsIgnition)?;

        let geometry = selected.geometry().clone();
        if geometry.rows > crate::grid::MAX_ROWS || geometry.columns > crate::grid::MAX_COLUMNS {
            return Err(crate::error::RasterError::GridTooLarge {
                rows: geometry.rows,
                columns: geometry.columns,
                max: crate::grid::MAX_ROWS,
            });
        }

        let mut cells = Vec::with_capacity(geometry.cell_count());
        let mut unburnable = BurnedData::new(geometry.rows, geometry.columns);

        for row in 0..geometry.rows {
            for column in 0..geometry.columns {
                let idx = CellIndex::new(row, column);
                let raw_code = selected.fuel_code(row, column);
                let fuel = match raw_code {
                    Some(code) => match registry.lookup(code) {
                        FuelLookup::Combustible(id) => Some(id),
                        FuelLookup::NonCombustible | FuelLookup::Unknown => None,
                    },
                    None => None,
                };
                if fuel.is_none() {
                    unburnable.set(idx);
                }

                let (slope, aspect) = if row == 0
                    || column == 0
                    || row + 1 == geometry.rows
                    || column + 1 == geometry.columns
                {
                    (INVALID_PERCENT, INVALID_DEGREES)
                } else {
                    horn_slope_aspect(selected, row, column, geometry.cell_size_m)
                };

                cells.push(Cell {
                    hash: idx.hash(),
                    slope,
                    aspect,
                    fuel,
                });
            }
        }

        Ok(Self {
            geometry,
            cells,
            unburnable,
        })
    }

    fn select_tile<'a>(
        tiles: &[&'a dyn RasterTile],
        ignition_row_col: (u32, u32),
        perimeter_projection: Option<&str>,
    ) -> Option<&'a dyn RasterTile> {
        let (row, col) = ignition_row_col;

        let candidates: Vec<&&dyn RasterTile> = tiles
            .iter()
            .filter(|t| {
                let g = t.geometry();
                row < g.rows && col < g.columns
            })
            .collect();

        let pool: Vec<&&dyn RasterTile> = if let Some(proj) = perimeter_projection {
            let matching: Vec<_> = candidates
                .iter()
                .filter(|t| t.geometry().projection == proj)
                .copied()
                .collect();
            if matching.is_empty() {
                candidates
            } else {
                matching
            }
        } else {
            candidates
        };

        pool.into_iter()
            .max_by(|a, b| {
                centredness(a.geometry(), row, col)
                    .total_cmp(&centredness(b.geometry(), row, col))
            })
            .copied()
    }

    /// This environment's grid geometry.
    #[must_use]
    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    /// The cell at `(row, column)`.
    #[must_use]
    pub fn cell(&self, row: u32, column: u32) -> Option<Cell> {
        if row >= self.geometry.rows || column >= self.geometry.columns {
            return None;
        }
        self.cells.get((row * self.geometry.columns + column) as usize).copied()
    }

    /// The cell offset by `(dr, dc)` from `event`, or `None` if out of
    /// bounds (spec.md §4.3 `offset`).
    #[must_use]
    pub fn offset(&self, event: CellIndex, dr: i32, dc: i32) -> Option<Cell> {
        let moved = event.offset(dr, dc)?;
        self.cell(moved.row, moved.column)
    }

    /// Bitset with a `1` for every cell whose fuel lookup failed (unknown
    /// or explicitly non-combustible), precomputed at build time (spec.md
    /// §4.3 `unburnable`).
    #[must_use]
    pub fn unburnable(&self) -> &BurnedData {
        &self.unburnable
    }

    /// Every burnable cell's index, in row-major order (spec.md §4.8
    /// surface mode: "one iteration per distinct burnable start cell").
    #[must_use]
    pub fn burnable_cells(&self) -> Vec<CellIndex> {
        (0..self.geometry.rows)
            .flat_map(|row| (0..self.geometry.columns).map(move |col| CellIndex::new(row, col)))
            .filter(|c| !self.unburnable.get(*c))
            .collect()
    }
}

/// `min(dist_w,dist_e)^2 + min(dist_n,dist_s)^2` for `(row, col)` inside
/// `geometry` — higher is more centred (spec.md §4.3 tile-selection rule).
fn centredness(geometry: &GridGeometry, row: u32, col: u32) -> f64 {
    let dist_w = f64::from(col);
    let dist_e = f64::from(geometry.columns.saturating_sub(col + 1));
    let dist_n = f64::from(row);
    let dist_s = f64::from(geometry.rows.saturating_sub(row + 1));
    dist_w.min(dist_e).powi(2) + dist_n.min(dist_s).powi(2)
}

/// Horn's algorithm (Horn, 1981, "Hill shading and the reflectance map")
/// over the 3x3 elevation window centred on `(row, column)`, converting
/// the math-convention gradient into compass-degree aspect (spec.md
/// §4.3: `atan2(dy, -dx)`, north = 0, clockwise).
fn horn_slope_aspect(tile: &dyn RasterTile, row: u32, column: u32, cell_size_m: f64) -> (SlopePercent, Degrees) {
    let e = |dr: i32, dc: i32| -> f64 {
        let r = (row as i64 + i64::from(dr)) as u32;
        let c = (column as i64 + i64::from(dc)) as u32;
        tile.elevation(r, c).unwrap_or(0.0)
    };

    let z1 = e(-1, -1);
    let z2 = e(-1, 0);
    let z3 = e(-1, 1);
    let z4 = e(0, -1);
    let z6 = e(0, 1);
    let z7 = e(1, -1);
    let z8 = e(1, 0);
    let z9 = e(1, 1);

    let dz_dx = ((z3 + 2.0 * z6 + z9) - (z1 + 2.0 * z4 + z7)) / (8.0 * cell_size_m);
    let dz_dy = ((z7 + 2.0 * z8 + z9) - (z1 + 2.0 * z2 + z3)) / (8.0 * cell_size_m);

    let slope_pct = (dz_dx.hypot(dz_dy) * 100.0).clamp(0.0, 500.0);

    let aspect_math = dz_dy.atan2(-dz_dx).to_degrees();
    let mut compass = 90.0 - aspect_math;
    compass = ((compass % 360.0) + 360.0) % 360.0;
    let aspect = compass.clamp(0.0, 359.0);

    (SlopePercent::clamped(slope_pct), Degrees::new(aspect))
}

/// A plain in-memory [`RasterTile`] over `Vec<f64>`/`Vec<u16>` grids, for
/// tests that need a runnable [`Environment`] without a real GIS stack
/// (spec.md §1: GeoTIFF I/O stays out of scope).
pub struct InMemoryRasterTile {
    geometry: GridGeometry,
    fuel: Vec<Option<u16>>,
    elevation: Vec<f64>,
}

impl InMemoryRasterTile {
    /// Build a tile of `geometry.rows * geometry.columns` cells, all fuel
    /// code `default_fuel` and elevation `0.0`.
    #[must_use]
    pub fn flat(geometry: GridGeometry, default_fuel: Option<u16>) -> Self {
        let n = geometry.cell_count();
        Self {
            fuel: vec![default_fuel; n],
            elevation: vec![0.0; n],
            geometry,
        }
    }

    /// Override one cell's fuel code.
    pub fn set_fuel(&mut self, row: u32, column: u32, code: Option<u16>) {
        let idx = (row * self.geometry.columns + column) as usize;
        self.fuel[idx] = code;
    }

    /// Override one cell's elevation, metres.
    pub fn set_elevation(&mut self, row: u32, column: u32, elevation: f64) {
        let idx = (row * self.geometry.columns + column) as usize;
        self.elevation[idx] = elevation;
    }
}

impl RasterTile for InMemoryRasterTile {
    fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    fn fuel_code(&self, row: u32, column: u32) -> Option<u16> {
        if row >= self.geometry.rows || column >= self.geometry.columns {
            return None;
        }
        self.fuel[(row * self.geometry.columns + column) as usize]
    }

    fn elevation(&self, row: u32, column: u32) -> Option<f64> {
        if row >= self.geometry.rows || column >= self.geometry.columns {
            return None;
        }
        Some(self.elevation[(row * self.geometry.columns + column) as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_geometry(rows: u32, columns: u32) -> GridGeometry {
        GridGeometry {
            rows,
            columns,
            cell_size_m: 100.0,
            lower_left: (0.0, 0.0),
            upper_right: (f64::from(columns) * 100.0, f64::from(rows) * 100.0),
            projection: "EPSG:3857".to_string(),
        }
    }

    #[test]
    fn edge_cells_get_invalid_slope_and_aspect() {
        let tile = InMemoryRasterTile::flat(flat_geometry(5, 5), Some(1));
        let reg = FuelModelRegistry::reference();
        let env = Environment::build(
            &[&tile],
            (2, 2),
            LatLon { lat: 46.0, lon: -78.0 },
            None,
            &reg,
        )
        .unwrap();
        let corner = env.cell(0, 0).unwrap();
        assert!(corner.slope.value() < 0.0);
        assert!(corner.aspect.value() < 0.0);
        let centre = env.cell(2, 2).unwrap();
        assert!(centre.slope.value() >= 0.0);
    }

    #[test]
    fn unknown_fuel_code_is_marked_unburnable() {
        let mut tile = InMemoryRasterTile::flat(flat_geometry(5, 5), Some(1));
        tile.set_fuel(2, 2, Some(9999));
        let reg = FuelModelRegistry::reference();
        let env = Environment::build(
            &[&tile],
            (0, 0),
            LatLon { lat: 46.0, lon: -78.0 },
            None,
            &reg,
        )
        .unwrap();
        assert!(env.unburnable().get(CellIndex::new(2, 2)));
        assert!(env.cell(2, 2).unwrap().fuel.is_none());
    }

    #[test]
    fn tile_selection_prefers_more_centred_ignition() {
        let off_centre = InMemoryRasterTile::flat(flat_geometry(10, 10), Some(1));
        let centred = InMemoryRasterTile::flat(flat_geometry(20, 20), Some(1));
        let reg = FuelModelRegistry::reference();
        let tiles: Vec<&dyn RasterTile> = vec![&off_centre, &centred];
        let env = Environment::build(
            &tiles,
            (9, 9),
            LatLon { lat: 46.0, lon: -78.0 },
            None,
            &reg,
        )
        .unwrap();
        // (9,9) is a corner of the 10x10 tile but near-centre of the 20x20
        // tile; selection should prefer the latter.
        assert_eq!(env.geometry().rows, 20);
    }

    #[test]
    fn burnable_cells_excludes_non_fuel() {
        let mut tile = InMemoryRasterTile::flat(flat_geometry(3, 3), Some(1));
        tile.set_fuel(1, 1, None);
        let reg = FuelModelRegistry::reference();
        let env = Environment::build(
            &[&tile],
            (0, 0),
            LatLon { lat: 46.0, lon: -78.0 },
            None,
            &reg,
        )
        .unwrap();
        assert!(!env.burnable_cells().contains(&CellIndex::new(1, 1)));
    }
}
