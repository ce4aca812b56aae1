//! Coordinate mapping between sensor tiles, the global grid and the bin partition

pub mod global;
pub mod tiles;
pub mod binning;

// Re-export main types
pub use global::{GlobalGrid, GlobalGridConfig};
pub use tiles::{TileDescriptor, SensorGridProfile, TileNaming, PixelWindow};
pub use binning::{MicroTileScheme, MicroTileSchemeConfig, BinAddress, MicroTileKey, linear_bin_to_micro_macro};
