//! Cinder: Monthly Burned-Area Gridding
//!
//! This library turns per-pixel burn detections from several satellite sensors
//! into monthly statistics on a global equal-angle grid: burned area, observed
//! and burnable fractions, a land-cover breakdown and the standard error of the
//! burned area derived from the per-pixel burn probabilities.

pub mod types;
pub mod grid;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    CellId, BoundingBox, DayOfYear, FireError, FireResult,
    NOT_OBSERVED, UNBURNABLE, MAX_DAY_OF_YEAR, LC_NO_DATA
};

pub use grid::{GlobalGrid, SensorGridProfile, TileDescriptor, MicroTileScheme};
pub use crate::core::{
    DayOfBurnAggregator, DetectionRecord, DoyWindow, ReportingPeriod, PeriodPart,
    UncertaintyEngine, GridCellReducer, GridCellResult, ReducerParams, TileObservations
};
