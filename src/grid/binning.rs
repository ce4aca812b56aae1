use crate::types::{FireError, FireResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Two-level macro/micro tile partition of the global bin raster
///
/// The bin raster is stored column-major: a linear bin index splits into
/// `row = bin / num_rows_global` and `col = bin % num_rows_global`, giving
/// `2 * num_rows_global` rows of `num_rows_global` bins.
///
/// Deserialization goes through [`MicroTileScheme::new`], so a configured
/// scheme is validated like a constructed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MicroTileSchemeConfig", into = "MicroTileSchemeConfig")]
pub struct MicroTileScheme {
    num_rows_global: u64,
    micro_tile_width: u64,
    micro_tile_height: u64,
    macro_tile_width: u64,
    macro_tile_height: u64,
}

/// Unvalidated serialized form of [`MicroTileScheme`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroTileSchemeConfig {
    pub num_rows_global: u64,
    pub micro_tile_width: u64,
    pub micro_tile_height: u64,
    pub macro_tile_width: u64,
    pub macro_tile_height: u64,
}

impl TryFrom<MicroTileSchemeConfig> for MicroTileScheme {
    type Error = FireError;

    fn try_from(config: MicroTileSchemeConfig) -> FireResult<Self> {
        Self::new(
            config.num_rows_global,
            config.micro_tile_width,
            config.micro_tile_height,
            config.macro_tile_width,
            config.macro_tile_height,
        )
    }
}

impl From<MicroTileScheme> for MicroTileSchemeConfig {
    fn from(scheme: MicroTileScheme) -> Self {
        Self {
            num_rows_global: scheme.num_rows_global,
            micro_tile_width: scheme.micro_tile_width,
            micro_tile_height: scheme.micro_tile_height,
            macro_tile_width: scheme.macro_tile_width,
            macro_tile_height: scheme.macro_tile_height,
        }
    }
}

/// Location of one bin in the tile partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinAddress {
    pub macro_tile_x: u64,
    pub macro_tile_y: u64,
    /// Micro tile column
    pub tile_x: u64,
    /// Micro tile row
    pub tile_y: u64,
    /// Column of the bin inside its micro tile
    pub offset_x: u64,
    /// Row of the bin inside its micro tile
    pub offset_y: u64,
}

impl BinAddress {
    pub fn micro_tile(&self) -> MicroTileKey {
        MicroTileKey {
            tile_y: self.tile_y,
            tile_x: self.tile_x,
        }
    }
}

/// Key of one micro tile, ordered row-major
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MicroTileKey {
    pub tile_y: u64,
    pub tile_x: u64,
}

impl Default for MicroTileScheme {
    fn default() -> Self {
        Self {
            num_rows_global: 3240,  // 1/18° bins
            micro_tile_width: 18,   // 1° micro tiles
            micro_tile_height: 18,
            macro_tile_width: 180,  // 10° macro tiles
            macro_tile_height: 180,
        }
    }
}

impl MicroTileScheme {
    pub fn new(
        num_rows_global: u64,
        micro_tile_width: u64,
        micro_tile_height: u64,
        macro_tile_width: u64,
        macro_tile_height: u64,
    ) -> FireResult<Self> {
        if num_rows_global == 0
            || micro_tile_width == 0
            || micro_tile_height == 0
            || macro_tile_width == 0
            || macro_tile_height == 0
        {
            return Err(FireError::InvalidArgument(
                "Tile sizes and row count must be positive".to_string(),
            ));
        }

        if macro_tile_width % micro_tile_width != 0 || macro_tile_height % micro_tile_height != 0 {
            return Err(FireError::InvalidArgument(format!(
                "Macro tile {}x{} is not a multiple of micro tile {}x{}",
                macro_tile_width, macro_tile_height, micro_tile_width, micro_tile_height
            )));
        }

        Ok(Self {
            num_rows_global,
            micro_tile_width,
            micro_tile_height,
            macro_tile_width,
            macro_tile_height,
        })
    }

    /// Bins per row of the bin raster; the raster has twice as many rows
    pub fn num_rows_global(&self) -> u64 {
        self.num_rows_global
    }

    pub fn micro_tile_width(&self) -> u64 {
        self.micro_tile_width
    }

    pub fn micro_tile_height(&self) -> u64 {
        self.micro_tile_height
    }

    pub fn macro_tile_width(&self) -> u64 {
        self.macro_tile_width
    }

    pub fn macro_tile_height(&self) -> u64 {
        self.macro_tile_height
    }

    /// Size of the bin domain
    pub fn num_bins(&self) -> u64 {
        self.num_rows_global * 2 * self.num_rows_global
    }

    pub fn micro_tiles_per_macro_x(&self) -> u64 {
        self.macro_tile_width / self.micro_tile_width
    }

    pub fn micro_tiles_per_macro_y(&self) -> u64 {
        self.macro_tile_height / self.micro_tile_height
    }

    pub fn bin_address(&self, bin_index: u64) -> FireResult<BinAddress> {
        if bin_index >= self.num_bins() {
            return Err(FireError::OutOfRange(format!(
                "Bin {} outside [0, {})",
                bin_index,
                self.num_bins()
            )));
        }

        let row = bin_index / self.num_rows_global;
        let col = bin_index % self.num_rows_global;

        let tile_y = row / self.micro_tile_height;
        let tile_x = col / self.micro_tile_width;

        Ok(BinAddress {
            macro_tile_x: tile_x / self.micro_tiles_per_macro_x(),
            macro_tile_y: tile_y / self.micro_tiles_per_macro_y(),
            tile_x,
            tile_y,
            offset_x: col % self.micro_tile_width,
            offset_y: row % self.micro_tile_height,
        })
    }

    /// Inverse of [`bin_address`](Self::bin_address)
    pub fn bin_index(&self, address: &BinAddress) -> FireResult<u64> {
        if address.offset_x >= self.micro_tile_width || address.offset_y >= self.micro_tile_height {
            return Err(FireError::OutOfRange(format!(
                "Offset ({}, {}) outside micro tile",
                address.offset_x, address.offset_y
            )));
        }
        if address.macro_tile_x != address.tile_x / self.micro_tiles_per_macro_x()
            || address.macro_tile_y != address.tile_y / self.micro_tiles_per_macro_y()
        {
            return Err(FireError::OutOfRange(format!(
                "Micro tile ({}, {}) does not belong to macro tile ({}, {})",
                address.tile_x, address.tile_y, address.macro_tile_x, address.macro_tile_y
            )));
        }

        let row = address.tile_y * self.micro_tile_height + address.offset_y;
        let col = address.tile_x * self.micro_tile_width + address.offset_x;
        if col >= self.num_rows_global || row >= 2 * self.num_rows_global {
            return Err(FireError::OutOfRange(format!(
                "Bin row {} col {} outside the bin raster",
                row, col
            )));
        }

        Ok(row * self.num_rows_global + col)
    }

    /// Group bins by micro tile; bins keep their input order within a group
    pub fn partition<I>(&self, bins: I) -> FireResult<BTreeMap<MicroTileKey, Vec<u64>>>
    where
        I: IntoIterator<Item = u64>,
    {
        let mut groups: BTreeMap<MicroTileKey, Vec<u64>> = BTreeMap::new();
        for bin in bins {
            let address = self.bin_address(bin)?;
            groups.entry(address.micro_tile()).or_default().push(bin);
        }
        log::debug!("Partitioned bins into {} micro tiles", groups.len());
        Ok(groups)
    }
}

/// Free-function form of [`MicroTileScheme::bin_address`]
pub fn linear_bin_to_micro_macro(scheme: &MicroTileScheme, bin_index: u64) -> FireResult<BinAddress> {
    scheme.bin_address(bin_index)
}
