use crate::core::day_of_burn::{DayOfBurnAggregator, DetectionRecord};
use crate::core::period::ReportingPeriod;
use crate::core::uncertainty::{UncertaintyEngine, UncertaintyParams};
use crate::grid::{GlobalGrid, PixelWindow, SensorGridProfile, TileDescriptor};
use crate::types::{BoundingBox, CellId, DayOfYear, FireError, FireResult, LC_NO_DATA};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Burn observations of one tile for one period
///
/// All rasters have shape (height, width) of the tile.
#[derive(Debug, Clone)]
pub struct TileObservations {
    tile: TileDescriptor,
    day_of_burn: Array2<DayOfYear>,
    probability: Array2<f32>,
    land_cover: Array2<i32>,
    observed: Array2<bool>,
}

impl TileObservations {
    /// Build from row-major (`y * width + x`) buffers
    pub fn new(
        tile: TileDescriptor,
        day_of_burn: Vec<DayOfYear>,
        probability: Vec<f32>,
        land_cover: Vec<i32>,
        observed: Vec<bool>,
    ) -> FireResult<Self> {
        let expected = tile.pixel_count();
        for (name, len) in [
            ("day of burn", day_of_burn.len()),
            ("probability", probability.len()),
            ("land cover", land_cover.len()),
            ("observed", observed.len()),
        ] {
            if len != expected {
                return Err(FireError::InvalidArgument(format!(
                    "Tile {}: {} buffer has {} pixels, expected {}",
                    tile.tile_id, name, len, expected
                )));
            }
        }

        let shape = (tile.height, tile.width);
        let shape_err = |e: ndarray::ShapeError| FireError::InvalidArgument(format!("Shape error: {}", e));
        Ok(Self {
            day_of_burn: Array2::from_shape_vec(shape, day_of_burn).map_err(shape_err)?,
            probability: Array2::from_shape_vec(shape, probability).map_err(shape_err)?,
            land_cover: Array2::from_shape_vec(shape, land_cover).map_err(shape_err)?,
            observed: Array2::from_shape_vec(shape, observed).map_err(shape_err)?,
            tile,
        })
    }

    pub fn tile(&self) -> &TileDescriptor {
        &self.tile
    }
}

/// Land-cover classification used for the burned-area breakdown
///
/// Codes `first_code + i * class_width .. first_code + (i + 1) * class_width`
/// belong to class `i`; everything else cannot be mapped and is not burnable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandCoverScheme {
    pub name: String,
    pub first_code: i32,
    pub class_width: i32,
    pub num_classes: usize,
}

impl LandCoverScheme {
    /// ESA CCI land cover: classes 10 to 180, urban and above are not burnable
    pub fn cci() -> Self {
        Self {
            name: "CCI-LC".to_string(),
            first_code: 10,
            class_width: 10,
            num_classes: 18,
        }
    }

    /// Class index of a land-cover code
    pub fn class_of(&self, code: i32) -> Option<usize> {
        if self.class_width <= 0 || code < self.first_code {
            return None;
        }
        let class = ((code - self.first_code) / self.class_width) as usize;
        (class < self.num_classes).then_some(class)
    }

    pub fn is_burnable(&self, code: i32) -> bool {
        self.class_of(code).is_some()
    }
}

impl Default for LandCoverScheme {
    fn default() -> Self {
        Self::cci()
    }
}

/// Grid cell reduction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReducerParams {
    /// Area of one native pixel
    pub pixel_area: f64,
    pub land_cover: LandCoverScheme,
    /// Drop burned pixels whose land cover cannot be mapped to a class
    pub mask_unmappable_pixels: bool,
    /// Burned area below which the uncertainty is reported as 0
    pub min_burned_area: f64,
    /// Largest pixel count for which the full PMF is computed and checked
    /// against the closed form; 0 skips the PMF
    pub pmf_pixel_limit: usize,
}

impl Default for ReducerParams {
    fn default() -> Self {
        Self {
            pixel_area: 1.0,              // areas in pixel units
            land_cover: LandCoverScheme::cci(),
            mask_unmappable_pixels: false,
            min_burned_area: 1e-5,
            pmf_pixel_limit: 0,           // error from the closed form only
        }
    }
}

/// Monthly burned-area statistics of one grid cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCellResult {
    pub cell: CellId,
    pub bounds: BoundingBox,
    pub period: ReportingPeriod,
    pub total_pixels: usize,
    pub observed_pixels: usize,
    pub burnable_pixels: usize,
    pub burned_pixels: usize,
    /// Burned pixels with a land-cover code outside the scheme
    pub unmappable_burned_pixels: usize,
    pub burned_area: f64,
    pub observed_fraction: f64,
    pub burnable_fraction: f64,
    /// Observed share of the burnable area
    pub coverage: f64,
    /// Burned area per land-cover class
    pub burned_area_in_lc: Vec<f64>,
    /// Standard error of the burned area
    pub uncertainty: f64,
    /// Burned patches: 8-connected groups of burned positions inside the cell
    pub patch_count: usize,
}

impl GridCellResult {
    pub fn has_burned_area(&self) -> bool {
        self.burned_pixels > 0
    }
}

/// Merged state of one native pixel position
#[derive(Debug, Clone, Copy)]
struct PositionState {
    record: DetectionRecord,
    observed: bool,
    land_cover: i32,
    covered: bool,
}

impl Default for PositionState {
    fn default() -> Self {
        Self {
            record: DetectionRecord::IDENTITY,
            observed: false,
            land_cover: LC_NO_DATA,
            covered: false,
        }
    }
}

/// Running sums of one cell
#[derive(Debug, Default)]
struct CellAccumulator {
    total: usize,
    observed: usize,
    burnable: usize,
    observed_burnable: usize,
    burned: usize,
    unmappable: usize,
    burned_in_lc: Vec<usize>,
    confidences: Vec<f32>,
    patches: usize,
}

/// Share of `num` in `den`, clamped to [0, 1] and 0 for an empty denominator
fn fraction(num: usize, den: usize) -> f64 {
    if den == 0 {
        return 0.0;
    }
    (num as f64 / den as f64).min(1.0)
}

/// Number of 8-connected components of `true` positions
fn count_patches(burned: &Array2<bool>) -> usize {
    let (rows, cols) = burned.dim();
    let mut visited = Array2::from_elem((rows, cols), false);
    let mut stack = Vec::new();
    let mut patches = 0;

    for ((row, col), &is_burned) in burned.indexed_iter() {
        if !is_burned || visited[[row, col]] {
            continue;
        }
        patches += 1;
        visited[[row, col]] = true;
        stack.push((row, col));

        while let Some((r, c)) = stack.pop() {
            for nr in r.saturating_sub(1)..(r + 2).min(rows) {
                for nc in c.saturating_sub(1)..(c + 2).min(cols) {
                    if burned[[nr, nc]] && !visited[[nr, nc]] {
                        visited[[nr, nc]] = true;
                        stack.push((nr, nc));
                    }
                }
            }
        }
    }

    patches
}

/// Reduces sensor tile observations into grid cell statistics
pub struct GridCellReducer {
    grid: GlobalGrid,
    profile: SensorGridProfile,
    params: ReducerParams,
}

impl GridCellReducer {
    pub fn new(grid: GlobalGrid, profile: SensorGridProfile) -> FireResult<Self> {
        Self::with_params(grid, profile, ReducerParams::default())
    }

    pub fn with_params(
        grid: GlobalGrid,
        profile: SensorGridProfile,
        params: ReducerParams,
    ) -> FireResult<Self> {
        // fails early when the sensor pixels do not tile the grid
        profile.pixels_per_cell(&grid)?;
        if !params.pixel_area.is_finite() || params.pixel_area < 0.0 {
            return Err(FireError::InvalidArgument(format!(
                "Pixel area must be non-negative, got {}",
                params.pixel_area
            )));
        }
        Ok(Self {
            grid,
            profile,
            params,
        })
    }

    pub fn grid(&self) -> &GlobalGrid {
        &self.grid
    }

    pub fn params(&self) -> &ReducerParams {
        &self.params
    }

    /// Reduce all observations falling into one cell
    pub fn reduce_cell(
        &self,
        cell: CellId,
        period: &ReportingPeriod,
        sources: &[&TileObservations],
    ) -> FireResult<GridCellResult> {
        let aggregator = DayOfBurnAggregator::new(period.doy_window()?);
        let window = self.profile.cell_pixel_window(&self.grid, cell)?;

        let mut acc = CellAccumulator {
            burned_in_lc: vec![0; self.params.land_cover.num_classes],
            ..CellAccumulator::default()
        };

        if !sources.is_empty() {
            let positions = self.merge_positions(cell, &window, &aggregator, sources)?;
            let mut burned = Array2::from_elem(positions.dim(), false);
            for (index, state) in positions.indexed_iter().filter(|(_, s)| s.covered) {
                burned[index] = self.accumulate(&mut acc, state, &aggregator);
            }
            acc.patches = count_patches(&burned);
        }

        self.finish(cell, period, acc)
    }

    /// Fold every source pixel of the cell into its position state
    fn merge_positions(
        &self,
        cell: CellId,
        window: &PixelWindow,
        aggregator: &DayOfBurnAggregator,
        sources: &[&TileObservations],
    ) -> FireResult<Array2<PositionState>> {
        let side = (window.row_end - window.row_start) as usize;
        let mut positions = Array2::from_elem((side, side), PositionState::default());
        let wrap = (window.col_end - window.col_start) * self.grid.cols() as i64;

        for source in sources {
            let tile = &source.tile;
            let y_start = (window.row_start - tile.row_offset).max(0);
            let y_end = (window.row_end - tile.row_offset).min(tile.height as i64);

            // a tile may reach across the antimeridian
            for shift in [-wrap, 0, wrap] {
                let col_offset = tile.col_offset + shift;
                let x_start = (window.col_start - col_offset).max(0);
                let x_end = (window.col_end - col_offset).min(tile.width as i64);
                if x_start >= x_end || y_start >= y_end {
                    continue;
                }

                for y in y_start as usize..y_end as usize {
                    for x in x_start as usize..x_end as usize {
                        let (row, col) = tile.tile_to_global(x, y)?;
                        if self.profile.cell_of_pixel(&self.grid, row, col)? != cell {
                            return Err(FireError::Processing(format!(
                                "Pixel ({}, {}) of tile {} routed to the wrong cell {}",
                                x, y, tile.tile_id, cell
                            )));
                        }

                        let local = (
                            (row - window.row_start) as usize,
                            (col + shift - window.col_start) as usize,
                        );
                        let state = &mut positions[local];
                        aggregator.observe(
                            &mut state.record,
                            source.day_of_burn[[y, x]],
                            source.probability[[y, x]],
                        );
                        state.observed |= source.observed[[y, x]];
                        state.land_cover = state.land_cover.max(source.land_cover[[y, x]]);
                        state.covered = true;
                    }
                }
            }
        }

        Ok(positions)
    }

    /// Add one position to the sums; true when it counts as burned
    fn accumulate(
        &self,
        acc: &mut CellAccumulator,
        state: &PositionState,
        aggregator: &DayOfBurnAggregator,
    ) -> bool {
        acc.total += 1;
        if state.observed {
            acc.observed += 1;
        }

        let class = self.params.land_cover.class_of(state.land_cover);
        if class.is_some() && !state.record.is_unburnable() {
            acc.burnable += 1;
            if state.observed {
                acc.observed_burnable += 1;
            }
        }

        if !state.record.is_burned(aggregator.window()) {
            return false;
        }

        match class {
            Some(c) => acc.burned_in_lc[c] += 1,
            None if state.land_cover != LC_NO_DATA => {
                acc.unmappable += 1;
                if self.params.mask_unmappable_pixels {
                    return false;
                }
            }
            None => {}
        }
        acc.burned += 1;
        acc.confidences.push(state.record.confidence);
        true
    }

    fn finish(
        &self,
        cell: CellId,
        period: &ReportingPeriod,
        acc: CellAccumulator,
    ) -> FireResult<GridCellResult> {
        let pixel_area = self.params.pixel_area;
        let burned_area = acc.burned as f64 * pixel_area;
        let total_area = acc.total as f64 * pixel_area;

        if burned_area > total_area * 1.001 {
            return Err(FireError::Processing(format!(
                "Cell {}: burned area {} exceeds cell area {}",
                cell, burned_area, total_area
            )));
        }

        let burned_area_in_lc: Vec<f64> = acc
            .burned_in_lc
            .iter()
            .map(|&n| n as f64 * pixel_area)
            .collect();
        let lc_sum: f64 = burned_area_in_lc.iter().sum();
        if burned_area > 0.0 && (burned_area - lc_sum).abs() > burned_area * 0.05 {
            log::warn!(
                "Cell {} ({}): burned area {} but land-cover breakdown sums to {}",
                cell,
                period,
                burned_area,
                lc_sum
            );
        }
        if acc.unmappable > 0 {
            log::warn!(
                "Cell {} ({}): {} burned pixels with unmappable land cover",
                cell,
                period,
                acc.unmappable
            );
        }

        let engine = UncertaintyEngine::with_params(UncertaintyParams {
            pixel_area,
            pmf_pixel_limit: self.params.pmf_pixel_limit,
        });
        let uncertainty = if burned_area < self.params.min_burned_area {
            0.0
        } else if self.params.pmf_pixel_limit == 0 {
            engine.standard_error(&acc.confidences)?
        } else {
            engine.estimate(&acc.confidences)?.total_error
        };

        log::debug!(
            "Cell {} ({}): {} pixels, {} burned in {} patches, uncertainty {:.4}",
            cell,
            period,
            acc.total,
            acc.burned,
            acc.patches,
            uncertainty
        );

        Ok(GridCellResult {
            cell,
            bounds: self.grid.cell_bounds(cell),
            period: *period,
            total_pixels: acc.total,
            observed_pixels: acc.observed,
            burnable_pixels: acc.burnable,
            burned_pixels: acc.burned,
            unmappable_burned_pixels: acc.unmappable,
            burned_area,
            observed_fraction: fraction(acc.observed, acc.total),
            burnable_fraction: fraction(acc.burnable, acc.total),
            coverage: fraction(acc.observed_burnable, acc.burnable),
            burned_area_in_lc,
            uncertainty,
            patch_count: acc.patches,
        })
    }

    /// Cells intersected by each source, as source indices per cell
    fn index_sources(&self, sources: &[TileObservations]) -> FireResult<HashMap<CellId, Vec<usize>>> {
        let mut index: HashMap<CellId, Vec<usize>> = HashMap::new();
        for (i, source) in sources.iter().enumerate() {
            for cell in self.profile.cells_for_tile(&self.grid, &source.tile)? {
                index.entry(cell).or_default().push(i);
            }
        }
        Ok(index)
    }

    /// Reduce every cell of the grid, in row-major order
    pub fn reduce_grid(
        &self,
        period: &ReportingPeriod,
        sources: &[TileObservations],
    ) -> FireResult<Vec<GridCellResult>> {
        log::info!(
            "Reducing {} tiles onto {}x{} grid for {}",
            sources.len(),
            self.grid.rows(),
            self.grid.cols(),
            period
        );

        let index = self.index_sources(sources)?;
        let cells: Vec<CellId> = self.grid.cells().collect();

        let reduce = |cell: &CellId| {
            let cell_sources: Vec<&TileObservations> = index
                .get(cell)
                .map(|ids| ids.iter().map(|&i| &sources[i]).collect())
                .unwrap_or_default();
            self.reduce_cell(*cell, period, &cell_sources)
        };

        #[cfg(feature = "parallel")]
        let results: FireResult<Vec<GridCellResult>> = {
            use rayon::prelude::*;
            cells.par_iter().map(reduce).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let results: FireResult<Vec<GridCellResult>> = cells.iter().map(reduce).collect();

        let results = results?;
        log::info!(
            "Reduced {} cells, {} with burned area",
            results.len(),
            results.iter().filter(|r| r.has_burned_area()).count()
        );
        Ok(results)
    }
}
