//! Grid geometry and the row/column-addressed cell hash (spec.md §3 `Grid`).

/// Hard cap on both dimensions of any grid used by this engine.
pub const MAX_ROWS: u32 = 4096;
/// Hard cap on both dimensions of any grid used by this engine, and the
/// multiplier used by [`CellIndex::hash`].
pub const MAX_COLUMNS: u32 = 4096;

/// A cell's row/column location plus its precomputed hash.
///
/// `hash = row * MAX_COLUMNS + column`, matching spec.md §3 exactly so it
/// can be used directly as a dense array index or a hash-map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellIndex {
    /// Row, 0-indexed from the grid's top.
    pub row: u32,
    /// Column, 0-indexed from the grid's left.
    pub column: u32,
}

impl CellIndex {
    /// Build a cell index from a row and column.
    #[must_use]
    pub const fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    /// `row * MAX_COLUMNS + column`, per spec.md §3.
    #[must_use]
    pub const fn hash(self) -> u32 {
        self.row * MAX_COLUMNS + self.column
    }

    /// Rebuild a [`CellIndex`] from a previously computed `hash()`.
    #[must_use]
    pub const fn from_hash(hash: u32) -> Self {
        Self {
            row: hash / MAX_COLUMNS,
            column: hash % MAX_COLUMNS,
        }
    }

    /// This cell offset by `(dr, dc)`, or `None` if the result would have a
    /// negative row/column.
    #[must_use]
    pub fn offset(self, dr: i32, dc: i32) -> Option<Self> {
        let row = self.row as i64 + i64::from(dr);
        let column = self.column as i64 + i64::from(dc);
        if row < 0 || column < 0 {
            return None;
        }
        Some(Self::new(row as u32, column as u32))
    }

    /// The 8 compass neighbours of this cell, bounds-clipped against
    /// `rows`/`columns` (spec.md §4.4 `isSurrounded`).
    #[must_use]
    pub fn neighbours_clipped(self, rows: u32, columns: u32) -> Vec<Self> {
        let mut out = Vec::with_capacity(8);
        for dr in -1..=1i32 {
            for dc in -1..=1i32 {
                if dr == 0 && dc == 0 {
                    continue;
                }
                if let Some(n) = self.offset(dr, dc) {
                    if n.row < rows && n.column < columns {
                        out.push(n);
                    }
                }
            }
        }
        out
    }
}

/// Rectangular, row-major grid geometry shared by every raster/grid used in
/// one run (spec.md §3 `Grid`). All grids used together must share extent,
/// cell size, and corner — callers check this with [`GridGeometry::aligns_with`].
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry {
    /// Row count, `<= MAX_ROWS`.
    pub rows: u32,
    /// Column count, `<= MAX_COLUMNS`.
    pub columns: u32,
    /// Cell size, metres (square cells).
    pub cell_size_m: f64,
    /// Lower-left corner, projected XY.
    pub lower_left: (f64, f64),
    /// Upper-right corner, projected XY.
    pub upper_right: (f64, f64),
    /// Proj4 projection string.
    pub projection: String,
}

impl GridGeometry {
    /// True if `cell` is inside `[0, rows) x [0, columns)`.
    #[must_use]
    pub fn contains(&self, cell: CellIndex) -> bool {
        cell.row < self.rows && cell.column < self.columns
    }

    /// Area of one cell, hectares (`cell_size_m^2 / 10_000`).
    #[must_use]
    pub fn cell_area_ha(&self) -> f64 {
        (self.cell_size_m * self.cell_size_m) / 10_000.0
    }

    /// Total number of cells, `rows * columns`.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.rows as usize * self.columns as usize
    }

    /// True if `other` shares this grid's extent, cell size, and corner
    /// (spec.md §3 "All rasters used together must align").
    #[must_use]
    pub fn aligns_with(&self, other: &GridGeometry) -> bool {
        self.rows == other.rows
            && self.columns == other.columns
            && (self.cell_size_m - other.cell_size_m).abs() < 1e-6
            && (self.lower_left.0 - other.lower_left.0).abs() < 1e-6
            && (self.lower_left.1 - other.lower_left.1).abs() < 1e-6
    }
}
