use crate::projection::{Envelope, PixelRect};
use crate::{SdeRasterError, SdeRasterResult};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileRange {
    pub min_col: u32,
    pub min_row: u32,
    pub max_col: u32,
    pub max_row: u32,
}

impl TileRange {
    pub fn new(min_col: u32, min_row: u32, max_col: u32, max_row: u32) -> Self {
        Self {
            min_col,
            min_row,
            max_col,
            max_row,
        }
    }

    pub fn contains(&self, col: u32, row: u32) -> bool {
        (self.min_col..=self.max_col).contains(&col) && (self.min_row..=self.max_row).contains(&row)
    }

    pub fn cols(&self) -> u32 {
        self.max_col - self.min_col + 1
    }

    pub fn rows(&self) -> u32 {
        self.max_row - self.min_row + 1
    }

    pub fn count(&self) -> usize {
        self.cols() as usize * self.rows() as usize
    }
}

impl Display for TileRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tiles(cols {}..={}, rows {}..={})",
            self.min_col, self.max_col, self.min_row, self.max_row
        )
    }
}

/// One resolution level of a tiled raster
///
/// `offset` places the level's pixel (0, 0) inside the tile grid: a level whose
/// extent does not start on a tile boundary carries padding before its first
/// pixel in the leading row and column of tiles.
#[derive(Clone, Debug, PartialEq)]
pub struct PyramidLevel {
    pub index: usize,
    pub tile_dimensions: (u32, u32),
    pub tile_grid: (u32, u32),
    pub dimensions: (u32, u32),
    pub offset: (u32, u32),
    pub extent: Envelope,
}

impl PyramidLevel {
    pub fn new(
        index: usize,
        tile_dimensions: (u32, u32),
        tile_grid: (u32, u32),
        dimensions: (u32, u32),
        offset: (u32, u32),
        extent: Envelope,
    ) -> SdeRasterResult<Self> {
        let invalid =
            |msg: String| Err(SdeRasterError::InvalidLevel(format!("level {index}: {msg}")));

        let (tile_width, tile_height) = tile_dimensions;
        if tile_width == 0 || tile_height == 0 {
            return invalid(format!("zero tile size {tile_dimensions:?}"));
        }
        if dimensions.0 == 0 || dimensions.1 == 0 {
            return invalid(format!("zero pixel size {dimensions:?}"));
        }
        if offset.0 >= tile_width || offset.1 >= tile_height {
            return invalid(format!("offset {offset:?} not inside first tile"));
        }
        let grid_pixels = (
            tile_grid.0 as u64 * tile_width as u64,
            tile_grid.1 as u64 * tile_height as u64,
        );
        if dimensions.0 as u64 + offset.0 as u64 > grid_pixels.0
            || dimensions.1 as u64 + offset.1 as u64 > grid_pixels.1
        {
            return invalid(format!(
                "{dimensions:?} pixels at offset {offset:?} overflow a {tile_grid:?} grid of {tile_dimensions:?} tiles"
            ));
        }
        if extent.is_empty() {
            return invalid(format!("empty extent {extent}"));
        }
        Ok(Self {
            index,
            tile_dimensions,
            tile_grid,
            dimensions,
            offset,
            extent,
        })
    }

    pub fn from_dimensions(
        index: usize,
        tile_dimensions: (u32, u32),
        dimensions: (u32, u32),
        offset: (u32, u32),
        extent: Envelope,
    ) -> SdeRasterResult<Self> {
        let grid = |pixels: u32, offset: u32, tile: u32| {
            if tile == 0 {
                0
            } else {
                (pixels + offset).div_ceil(tile)
            }
        };
        let tile_grid = (
            grid(dimensions.0, offset.0, tile_dimensions.0),
            grid(dimensions.1, offset.1, tile_dimensions.1),
        );
        Self::new(index, tile_dimensions, tile_grid, dimensions, offset, extent)
    }

    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_dimensions.0
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_dimensions.1
    }

    pub fn tiles_wide(&self) -> u32 {
        self.tile_grid.0
    }

    pub fn tiles_high(&self) -> u32 {
        self.tile_grid.1
    }

    /// Ground units per pixel along (x, y)
    pub fn resolution(&self) -> (f64, f64) {
        (
            self.extent.width() / self.dimensions.0 as f64,
            self.extent.height() / self.dimensions.1 as f64,
        )
    }

    pub fn grid_end(&self) -> (u32, u32) {
        (
            self.offset.0 + self.dimensions.0,
            self.offset.1 + self.dimensions.1,
        )
    }

    /// Pixels of real data held by the last column / row of tiles
    pub fn trailing_remainder(&self) -> (u32, u32) {
        let remainder = |end: u32, tile: u32| match end % tile {
            0 => tile,
            r => r,
        };
        let (end_x, end_y) = self.grid_end();
        (
            remainder(end_x, self.tile_dimensions.0),
            remainder(end_y, self.tile_dimensions.1),
        )
    }

    pub fn contains_region(&self, region: &PixelRect) -> bool {
        !region.is_empty() && region.fits_within(self.dimensions)
    }

    /// Tiles covering `region` and the sub-tile offset of its leading edge
    pub fn tile_range(&self, region: &PixelRect) -> Option<(TileRange, (u32, u32))> {
        if region.is_empty() {
            return None;
        }
        let (tile_width, tile_height) = self.tile_dimensions;
        let start = (region.x + self.offset.0, region.y + self.offset.1);
        let last = (
            start.0 + region.width - 1,
            start.1 + region.height - 1,
        );
        let min_col = start.0 / tile_width;
        let min_row = start.1 / tile_height;
        if min_col >= self.tile_grid.0 || min_row >= self.tile_grid.1 {
            return None;
        }
        let range = TileRange::new(
            min_col,
            min_row,
            (last.0 / tile_width).min(self.tile_grid.0 - 1),
            (last.1 / tile_height).min(self.tile_grid.1 - 1),
        );
        let grid_offset = (start.0 % tile_width, start.1 % tile_height);
        Some((range, grid_offset))
    }
}

impl Display for PyramidLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (res_x, res_y) = self.resolution();
        write!(
            f,
            "Level {}({}x{}, {}x{} tiles of {}x{}, offset {:?}, {:.6}x{:.6} per pixel)",
            self.index,
            self.dimensions.0,
            self.dimensions.1,
            self.tile_grid.0,
            self.tile_grid.1,
            self.tile_dimensions.0,
            self.tile_dimensions.1,
            self.offset,
            res_x,
            res_y
        )
    }
}
