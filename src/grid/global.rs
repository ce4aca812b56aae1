use crate::types::{BoundingBox, CellId, FireError, FireResult};
use serde::{Deserialize, Serialize};

/// Mean Earth radius used for cell areas (meters)
const EARTH_RADIUS_M: f64 = 6_371_007.181;

/// Global equal-angle reporting grid
///
/// Cells are counted from the origin (north-west corner) towards the south
/// (rows) and east (columns). Only the resolution is serialized; loading a
/// grid goes through [`GlobalGrid::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GlobalGridConfig", into = "GlobalGridConfig")]
pub struct GlobalGrid {
    /// Cell size in degrees
    resolution: f64,
    /// Longitude of the western edge (degrees)
    origin_lon: f64,
    /// Latitude of the northern edge (degrees)
    origin_lat: f64,
    rows: usize,
    cols: usize,
}

/// Serialized form of [`GlobalGrid`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalGridConfig {
    /// Cell size in degrees
    pub resolution: f64,
}

impl TryFrom<GlobalGridConfig> for GlobalGrid {
    type Error = FireError;

    fn try_from(config: GlobalGridConfig) -> FireResult<Self> {
        Self::new(config.resolution)
    }
}

impl From<GlobalGrid> for GlobalGridConfig {
    fn from(grid: GlobalGrid) -> Self {
        Self {
            resolution: grid.resolution,
        }
    }
}

impl GlobalGrid {
    /// Create a grid with the given resolution in degrees
    ///
    /// The resolution must divide 180° into a whole number of rows.
    pub fn new(resolution: f64) -> FireResult<Self> {
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(FireError::InvalidArgument(format!(
                "Grid resolution must be positive, got {}",
                resolution
            )));
        }

        let rows = (180.0 / resolution).round() as usize;
        if rows == 0 || (rows as f64 * resolution - 180.0).abs() > 1e-9 {
            return Err(FireError::InvalidArgument(format!(
                "Grid resolution {} does not divide 180 degrees",
                resolution
            )));
        }

        Ok(Self {
            resolution,
            origin_lon: -180.0,
            origin_lat: 90.0,
            rows,
            cols: rows * 2,
        })
    }

    /// The 0.25° grid of the monthly burned-area products
    pub fn quarter_degree() -> Self {
        Self {
            resolution: 0.25,
            origin_lon: -180.0,
            origin_lat: 90.0,
            rows: 720,
            cols: 1440,
        }
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn num_cells(&self) -> usize {
        self.rows * self.cols
    }

    /// Cell containing the given grid row/column
    ///
    /// Total over all inputs: columns wrap around the antimeridian and rows
    /// saturate at the poles.
    pub fn cell_of(&self, global_row: i64, global_col: i64) -> CellId {
        let row = global_row.clamp(0, self.rows as i64 - 1) as usize;
        let col = global_col.rem_euclid(self.cols as i64) as usize;
        CellId { row, col }
    }

    /// Cell containing a geographic position
    pub fn cell_at(&self, lat: f64, lon: f64) -> CellId {
        let row = ((self.origin_lat - lat) / self.resolution).floor() as i64;
        let col = ((lon - self.origin_lon) / self.resolution).floor() as i64;
        self.cell_of(row, col)
    }

    /// Cell for a row-major linear index
    pub fn cell_from_index(&self, index: usize) -> FireResult<CellId> {
        if index >= self.num_cells() {
            return Err(FireError::OutOfRange(format!(
                "Cell index {} outside grid of {} cells",
                index,
                self.num_cells()
            )));
        }
        Ok(CellId::new(index / self.cols, index % self.cols))
    }

    pub fn contains(&self, cell: CellId) -> bool {
        cell.row < self.rows && cell.col < self.cols
    }

    /// Geographic extent of a cell
    pub fn cell_bounds(&self, cell: CellId) -> BoundingBox {
        let max_lat = self.origin_lat - cell.row as f64 * self.resolution;
        let min_lon = self.origin_lon + cell.col as f64 * self.resolution;
        BoundingBox {
            min_lon,
            max_lon: min_lon + self.resolution,
            min_lat: max_lat - self.resolution,
            max_lat,
        }
    }

    /// Surface area of a cell on the sphere (square meters)
    pub fn cell_area_m2(&self, cell: CellId) -> f64 {
        let bounds = self.cell_bounds(cell);
        let dlon = self.resolution.to_radians();
        let band = bounds.max_lat.to_radians().sin() - bounds.min_lat.to_radians().sin();
        EARTH_RADIUS_M * EARTH_RADIUS_M * dlon * band.abs()
    }

    /// All cells in row-major order
    pub fn cells(&self) -> impl Iterator<Item = CellId> + '_ {
        (0..self.rows).flat_map(move |row| (0..self.cols).map(move |col| CellId { row, col }))
    }
}

impl Default for GlobalGrid {
    fn default() -> Self {
        Self::quarter_degree()
    }
}
