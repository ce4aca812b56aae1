use crate::grid::global::GlobalGrid;
use crate::types::{CellId, FireError, FireResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::RwLock;

/// Compiled tile-id patterns, keyed by pattern text
static PATTERN_CACHE: Lazy<RwLock<HashMap<String, Regex>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Compile a pattern once and reuse it for every later call
fn compiled_pattern(pattern: &str) -> FireResult<Regex> {
    {
        let cache = PATTERN_CACHE
            .read()
            .map_err(|_| FireError::Processing("Tile pattern cache poisoned".to_string()))?;
        if let Some(re) = cache.get(pattern) {
            return Ok(re.clone());
        }
    }

    let mut cache = PATTERN_CACHE
        .write()
        .map_err(|_| FireError::Processing("Tile pattern cache poisoned".to_string()))?;
    // another thread may have compiled it meanwhile
    if let Some(re) = cache.get(pattern) {
        return Ok(re.clone());
    }

    let re = Regex::new(pattern)
        .map_err(|e| FireError::InvalidArgument(format!("Regex error: {}", e)))?;
    log::debug!("Compiled tile pattern {}", pattern);
    cache.insert(pattern.to_string(), re.clone());
    Ok(re)
}

/// One sensor-native tile raster and its placement on the global pixel grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileDescriptor {
    pub tile_id: String,
    pub width: usize,
    pub height: usize,
    /// Global native-pixel row of the upper-left pixel
    pub row_offset: i64,
    /// Global native-pixel column of the upper-left pixel
    pub col_offset: i64,
}

impl TileDescriptor {
    pub fn new(
        tile_id: impl Into<String>,
        width: usize,
        height: usize,
        row_offset: i64,
        col_offset: i64,
    ) -> Self {
        Self {
            tile_id: tile_id.into(),
            width,
            height,
            row_offset,
            col_offset,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Translate a tile-local pixel into global native (row, col)
    pub fn tile_to_global(&self, local_x: usize, local_y: usize) -> FireResult<(i64, i64)> {
        if local_x >= self.width || local_y >= self.height {
            return Err(FireError::OutOfRange(format!(
                "Pixel ({}, {}) outside tile {} of {}x{}",
                local_x, local_y, self.tile_id, self.width, self.height
            )));
        }
        Ok((self.row_offset + local_y as i64, self.col_offset + local_x as i64))
    }
}

/// Range of global native pixels covered by one grid cell (half-open)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub row_start: i64,
    pub row_end: i64,
    pub col_start: i64,
    pub col_end: i64,
}

impl PixelWindow {
    pub fn contains(&self, row: i64, col: i64) -> bool {
        row >= self.row_start && row < self.row_end && col >= self.col_start && col < self.col_end
    }
}

/// How a sensor names its tiles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TileNaming {
    /// `v04h07`: tile row first, counted from the north
    VerticalHorizontal,
    /// `h31v10`: tile column first, rows counted from the north
    HorizontalVertical,
    /// `h39v19`: tile column first, rows counted from the south
    HorizontalVerticalFromSouth,
    /// Names without a geometric meaning (e.g. UTM `T30NUN`), resolved
    /// through a table of native-pixel offsets (row, col)
    Lookup {
        pattern: String,
        offsets: HashMap<String, (i64, i64)>,
    },
}

impl TileNaming {
    fn pattern(&self) -> &str {
        match self {
            TileNaming::VerticalHorizontal => r"v(\d{2})h(\d{2})",
            TileNaming::HorizontalVertical | TileNaming::HorizontalVerticalFromSouth => {
                r"h(\d{2})v(\d{2})"
            }
            TileNaming::Lookup { pattern, .. } => pattern,
        }
    }
}

/// Geometry and naming of one sensor's tiled products
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorGridProfile {
    pub sensor: String,
    /// Native pixel size in degrees
    pub pixel_resolution: f64,
    /// Nominal tile width in pixels
    pub tile_width: usize,
    /// Nominal tile height in pixels
    pub tile_height: usize,
    pub naming: TileNaming,
}

impl SensorGridProfile {
    /// MERIS 300 m land tiles, 10° x 10°
    pub fn meris() -> Self {
        Self {
            sensor: "MERIS".to_string(),
            pixel_resolution: 1.0 / 360.0,
            tile_width: 3600,
            tile_height: 3600,
            naming: TileNaming::VerticalHorizontal,
        }
    }

    /// MODIS 250 m tiles, 10° x 10°
    pub fn modis() -> Self {
        Self {
            sensor: "MODIS".to_string(),
            pixel_resolution: 1.0 / 480.0,
            tile_width: 4800,
            tile_height: 4800,
            naming: TileNaming::HorizontalVertical,
        }
    }

    /// Sentinel-2 20 m five-degree tiles
    pub fn sentinel2() -> Self {
        Self {
            sensor: "S2".to_string(),
            pixel_resolution: 1.0 / 5400.0,
            tile_width: 27000,
            tile_height: 27000,
            naming: TileNaming::HorizontalVerticalFromSouth,
        }
    }

    /// Profile for tiles named through a lookup table
    pub fn with_lookup(
        sensor: &str,
        pixel_resolution: f64,
        tile_width: usize,
        tile_height: usize,
        pattern: &str,
        offsets: HashMap<String, (i64, i64)>,
    ) -> Self {
        Self {
            sensor: sensor.to_string(),
            pixel_resolution,
            tile_width,
            tile_height,
            naming: TileNaming::Lookup {
                pattern: pattern.to_string(),
                offsets,
            },
        }
    }

    /// Number of tile rows and columns covering the globe
    pub fn tile_layout(&self) -> (i64, i64) {
        let rows = (180.0 / (self.tile_height as f64 * self.pixel_resolution)).round() as i64;
        let cols = (360.0 / (self.tile_width as f64 * self.pixel_resolution)).round() as i64;
        (rows, cols)
    }

    /// Native pixels along one side of a grid cell
    pub fn pixels_per_cell(&self, grid: &GlobalGrid) -> FireResult<i64> {
        if !self.pixel_resolution.is_finite() || self.pixel_resolution <= 0.0 {
            return Err(FireError::InvalidArgument(format!(
                "Pixel resolution of {} must be positive",
                self.sensor
            )));
        }

        let ratio = grid.resolution() / self.pixel_resolution;
        let rounded = ratio.round();
        if rounded < 1.0 || (ratio - rounded).abs() > 1e-6 {
            return Err(FireError::InvalidArgument(format!(
                "{} pixels ({:.6}°) do not tile the {}° grid",
                self.sensor,
                self.pixel_resolution,
                grid.resolution()
            )));
        }
        Ok(rounded as i64)
    }

    /// Grid cell of a global native pixel
    pub fn cell_of_pixel(
        &self,
        grid: &GlobalGrid,
        global_row: i64,
        global_col: i64,
    ) -> FireResult<CellId> {
        let ppc = self.pixels_per_cell(grid)?;
        Ok(grid.cell_of(global_row.div_euclid(ppc), global_col.div_euclid(ppc)))
    }

    /// Native pixel ranges covered by a grid cell
    pub fn cell_pixel_window(&self, grid: &GlobalGrid, cell: CellId) -> FireResult<PixelWindow> {
        if !grid.contains(cell) {
            return Err(FireError::OutOfRange(format!(
                "Cell {} outside {}x{} grid",
                cell,
                grid.rows(),
                grid.cols()
            )));
        }

        let ppc = self.pixels_per_cell(grid)?;
        let row_start = cell.row as i64 * ppc;
        let col_start = cell.col as i64 * ppc;
        Ok(PixelWindow {
            row_start,
            row_end: row_start + ppc,
            col_start,
            col_end: col_start + ppc,
        })
    }

    /// Grid cells intersected by a tile footprint, sorted
    pub fn cells_for_tile(&self, grid: &GlobalGrid, tile: &TileDescriptor) -> FireResult<Vec<CellId>> {
        if tile.pixel_count() == 0 {
            return Ok(Vec::new());
        }

        let ppc = self.pixels_per_cell(grid)?;
        let first_row = tile.row_offset.div_euclid(ppc);
        let last_row = (tile.row_offset + tile.height as i64 - 1).div_euclid(ppc);
        let first_col = tile.col_offset.div_euclid(ppc);
        let last_col = (tile.col_offset + tile.width as i64 - 1).div_euclid(ppc);

        let mut cells = BTreeSet::new();
        for row in first_row..=last_row {
            for col in first_col..=last_col {
                cells.insert(grid.cell_of(row, col));
            }
        }
        Ok(cells.into_iter().collect())
    }

    /// Extract the tile id from a product file path
    pub fn tile_id_from_path(&self, path: &str) -> FireResult<String> {
        let re = compiled_pattern(self.naming.pattern())?;

        let file_name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(path);

        re.find(file_name)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                FireError::InvalidTileId(format!("No {} tile id in '{}'", self.sensor, path))
            })
    }

    /// Parse a tile id and place the tile on the global native pixel grid
    pub fn describe_tile(&self, tile_id: &str) -> FireResult<TileDescriptor> {
        let (row_offset, col_offset) = self.tile_offset(tile_id)?;
        log::debug!(
            "Tile {} of {} at native pixel ({}, {})",
            tile_id,
            self.sensor,
            row_offset,
            col_offset
        );
        Ok(TileDescriptor::new(
            tile_id,
            self.tile_width,
            self.tile_height,
            row_offset,
            col_offset,
        ))
    }

    fn tile_offset(&self, tile_id: &str) -> FireResult<(i64, i64)> {
        if let TileNaming::Lookup { offsets, .. } = &self.naming {
            return offsets.get(tile_id).copied().ok_or_else(|| {
                FireError::InvalidTileId(format!("Unknown {} tile '{}'", self.sensor, tile_id))
            });
        }

        let re = compiled_pattern(&format!("^{}$", self.naming.pattern()))?;
        let caps = re.captures(tile_id).ok_or_else(|| {
            FireError::InvalidTileId(format!("'{}' is not a {} tile id", tile_id, self.sensor))
        })?;

        let first: i64 = caps[1]
            .parse()
            .map_err(|_| FireError::InvalidTileId(tile_id.to_string()))?;
        let second: i64 = caps[2]
            .parse()
            .map_err(|_| FireError::InvalidTileId(tile_id.to_string()))?;

        let (tile_rows, tile_cols) = self.tile_layout();
        let (tile_row, tile_col) = match self.naming {
            TileNaming::VerticalHorizontal => (first, second),
            TileNaming::HorizontalVertical => (second, first),
            TileNaming::HorizontalVerticalFromSouth => (tile_rows - 1 - second, first),
            TileNaming::Lookup { .. } => {
                return Err(FireError::InvalidTileId(tile_id.to_string()));
            }
        };

        if tile_row < 0 || tile_row >= tile_rows || tile_col < 0 || tile_col >= tile_cols {
            return Err(FireError::InvalidTileId(format!(
                "Tile '{}' outside the {}x{} {} tile layout",
                tile_id, tile_rows, tile_cols, self.sensor
            )));
        }

        Ok((
            tile_row * self.tile_height as i64,
            tile_col * self.tile_width as i64,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_to_global() {
        let tile = TileDescriptor::new("v04h07", 4, 3, 100, 200);
        assert_eq!(tile.pixel_count(), 12);
        assert_eq!(tile.tile_to_global(0, 0).unwrap(), (100, 200));
        assert_eq!(tile.tile_to_global(3, 2).unwrap(), (102, 203));
        assert!(matches!(tile.tile_to_global(4, 0), Err(FireError::OutOfRange(_))));
        assert!(matches!(tile.tile_to_global(0, 3), Err(FireError::OutOfRange(_))));
    }

    #[test]
    fn test_pixels_per_cell() {
        let grid = GlobalGrid::quarter_degree();
        assert_eq!(SensorGridProfile::meris().pixels_per_cell(&grid).unwrap(), 90);
        assert_eq!(SensorGridProfile::modis().pixels_per_cell(&grid).unwrap(), 120);
        assert_eq!(SensorGridProfile::sentinel2().pixels_per_cell(&grid).unwrap(), 1350);

        let mut odd = SensorGridProfile::meris();
        odd.pixel_resolution = 0.1;
        assert!(matches!(odd.pixels_per_cell(&grid), Err(FireError::InvalidArgument(_))));
    }

    #[test]
    fn test_describe_meris_tile() {
        let profile = SensorGridProfile::meris();
        let tile = profile.describe_tile("v04h07").unwrap();
        assert_eq!(tile.row_offset, 4 * 3600);
        assert_eq!(tile.col_offset, 7 * 3600);
        assert_eq!(tile.width, 3600);

        assert!(matches!(profile.describe_tile("v4h7"), Err(FireError::InvalidTileId(_))));
        assert!(matches!(profile.describe_tile("v18h00"), Err(FireError::InvalidTileId(_))));
        assert!(matches!(profile.describe_tile("h07v04"), Err(FireError::InvalidTileId(_))));
    }

    #[test]
    fn test_describe_modis_and_sentinel2_tiles() {
        let modis = SensorGridProfile::modis().describe_tile("h31v10").unwrap();
        assert_eq!(modis.row_offset, 10 * 4800);
        assert_eq!(modis.col_offset, 31 * 4800);

        let s2 = SensorGridProfile::sentinel2();
        assert_eq!(s2.tile_layout(), (36, 72));
        let tile = s2.describe_tile("h39v19").unwrap();
        assert_eq!(tile.row_offset, (35 - 19) * 27000);
        assert_eq!(tile.col_offset, 39 * 27000);
        // v00 is the southernmost row
        let south = s2.describe_tile("h00v00").unwrap();
        assert_eq!(south.row_offset, 35 * 27000);
    }

    #[test]
    fn test_lookup_naming() {
        let mut offsets = HashMap::new();
        offsets.insert("T30NUN".to_string(), (120_000, 1_000_000));
        let profile =
            SensorGridProfile::with_lookup("S2-UTM", 1.0 / 5400.0, 5490, 5490, r"T\d{2}[A-Z]{3}", offsets);

        let id = profile
            .tile_id_from_path("/data/BA/2019/T30NUN-Fire-2019-06.tif")
            .unwrap();
        assert_eq!(id, "T30NUN");
        let tile = profile.describe_tile(&id).unwrap();
        assert_eq!((tile.row_offset, tile.col_offset), (120_000, 1_000_000));
        assert!(matches!(profile.describe_tile("T31NUN"), Err(FireError::InvalidTileId(_))));
    }

    #[test]
    fn test_tile_id_from_path() {
        let profile = SensorGridProfile::meris();
        assert_eq!(
            profile
                .tile_id_from_path("/data/BA/2008/01/BA_PIX_MER_v04h07_200801_v4.0.tif")
                .unwrap(),
            "v04h07"
        );
        assert!(matches!(
            profile.tile_id_from_path("/data/BA/2008/readme.txt"),
            Err(FireError::InvalidTileId(_))
        ));
    }

    #[test]
    fn test_patterns_compiled_once() {
        let profile = SensorGridProfile::modis();
        for i in 0..50 {
            let path = format!("/data/MCD64A1.A2008001.h{:02}v10.061.hdf", i % 36);
            let id = profile.tile_id_from_path(&path).unwrap();
            assert_eq!(profile.describe_tile(&id).unwrap().col_offset, (i % 36) as i64 * 4800);
        }

        {
            let cache = PATTERN_CACHE.read().unwrap();
            let pattern = TileNaming::HorizontalVertical.pattern();
            assert!(cache.contains_key(pattern));
            assert!(cache.contains_key(&format!("^{}$", pattern)));
        }

        let first = compiled_pattern(r"h\d{2}").unwrap();
        let second = compiled_pattern(r"h\d{2}").unwrap();
        assert_eq!(first.as_str(), second.as_str());
        assert!(matches!(compiled_pattern("(unclosed"), Err(FireError::InvalidArgument(_))));
    }

    #[test]
    fn test_cell_of_pixel_and_window() {
        let grid = GlobalGrid::quarter_degree();
        let profile = SensorGridProfile::meris();

        assert_eq!(profile.cell_of_pixel(&grid, 0, 0).unwrap(), CellId::new(0, 0));
        assert_eq!(profile.cell_of_pixel(&grid, 89, 90).unwrap(), CellId::new(0, 1));
        // negative columns wrap around the antimeridian
        assert_eq!(profile.cell_of_pixel(&grid, 0, -1).unwrap(), CellId::new(0, 1439));

        let window = profile.cell_pixel_window(&grid, CellId::new(2, 3)).unwrap();
        assert_eq!((window.row_start, window.row_end), (180, 270));
        assert_eq!((window.col_start, window.col_end), (270, 360));
        for (row, col) in [(180, 270), (269, 359), (200, 300)] {
            assert!(window.contains(row, col));
            assert_eq!(profile.cell_of_pixel(&grid, row, col).unwrap(), CellId::new(2, 3));
        }
        assert!(profile.cell_pixel_window(&grid, CellId::new(720, 0)).is_err());
    }

    #[test]
    fn test_cells_for_tile() {
        let grid = GlobalGrid::quarter_degree();
        let profile = SensorGridProfile::meris();

        let tile = profile.describe_tile("v00h00").unwrap();
        let cells = profile.cells_for_tile(&grid, &tile).unwrap();
        // 10 degrees = 40 cells per side
        assert_eq!(cells.len(), 40 * 40);
        assert_eq!(cells[0], CellId::new(0, 0));
        assert_eq!(*cells.last().unwrap(), CellId::new(39, 39));

        let straddling = TileDescriptor::new("partial", 100, 10, 85, 0);
        let cells = profile.cells_for_tile(&grid, &straddling).unwrap();
        assert_eq!(cells, vec![CellId::new(0, 0), CellId::new(0, 1), CellId::new(1, 0), CellId::new(1, 1)]);

        let empty = TileDescriptor::new("empty", 0, 0, 0, 0);
        assert!(profile.cells_for_tile(&grid, &empty).unwrap().is_empty());
    }
}
