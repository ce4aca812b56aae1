//! Core burned-area processing modules

pub mod day_of_burn;
pub mod period;
pub mod uncertainty;
pub mod reducer;

// Re-export main types
pub use day_of_burn::{DayOfBurnAggregator, DetectionRecord, DoyWindow};
pub use period::{ReportingPeriod, PeriodPart};
pub use uncertainty::{UncertaintyEngine, UncertaintyParams, UncertaintyEstimate, PoissonBinomial, poisson_binomial};
pub use reducer::{GridCellReducer, GridCellResult, ReducerParams, LandCoverScheme, TileObservations};
