use serde::{Deserialize, Serialize};

/// Day-of-year of a burn detection, or one of the sentinels below
pub type DayOfYear = i32;

/// Pixel was not observed (cloud, no data, outside the acquisition)
pub const NOT_OBSERVED: DayOfYear = -1;

/// Pixel was observed but its land cover cannot burn
pub const UNBURNABLE: DayOfYear = -2;

/// Largest day-of-year a detection can carry
pub const MAX_DAY_OF_YEAR: DayOfYear = 366;

/// Land-cover code meaning "no land-cover information"
pub const LC_NO_DATA: i32 = 0;

/// Identifier of one cell of the global reporting grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId {
    pub row: usize,
    pub col: usize,
}

impl CellId {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Row-major linear index within a grid of `cols` columns
    pub fn linear_index(&self, cols: usize) -> usize {
        self.row * cols + self.col
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}c{}", self.row, self.col)
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

/// Error types for burned-area gridding
#[derive(Debug, thiserror::Error)]
pub enum FireError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Invalid tile id: {0}")]
    InvalidTileId(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for gridding operations
pub type FireResult<T> = Result<T, FireError>;
