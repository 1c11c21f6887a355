use crate::projection::{Crs, Envelope, PixelRect};
use crate::store::RasterAttributes;
use crate::{SdeRasterError, SdeRasterResult};
use std::fmt::Display;
use tracing::*;

mod level;

pub use level::{PyramidLevel, TileRange};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterQueryInfo {
    pub requested: Envelope,
    pub level: usize,
    pub pixel_rect: PixelRect,
    /// Ground footprint of exactly `pixel_rect`
    pub envelope: Envelope,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pyramid {
    levels: Vec<PyramidLevel>,
    crs: Crs,
    extent: Envelope,
    tile_dimensions: (u32, u32),
}

impl Pyramid {
    pub fn new(
        crs: Crs,
        extent: Envelope,
        tile_dimensions: (u32, u32),
        levels: Vec<PyramidLevel>,
    ) -> SdeRasterResult<Self> {
        if levels.is_empty() {
            return Err(SdeRasterError::InvalidPyramid("no levels".into()));
        }
        for (i, level) in levels.iter().enumerate() {
            if level.index != i {
                return Err(SdeRasterError::InvalidPyramid(format!(
                    "level at position {i} has index {}",
                    level.index
                )));
            }
            if level.tile_dimensions != tile_dimensions {
                return Err(SdeRasterError::InvalidPyramid(format!(
                    "level {i} tiles {:?} differ from {tile_dimensions:?}",
                    level.tile_dimensions
                )));
            }
        }
        for pair in levels.windows(2) {
            if pair[1].width() > pair[0].width() || pair[1].height() > pair[0].height() {
                return Err(SdeRasterError::InvalidPyramid(format!(
                    "level {} is larger than level {}",
                    pair[1].index, pair[0].index
                )));
            }
        }
        Ok(Self {
            levels,
            crs,
            extent,
            tile_dimensions,
        })
    }

    pub fn from_attributes(attributes: &RasterAttributes) -> SdeRasterResult<Self> {
        let crs = Crs::resolve(&attributes.crs)?;
        let levels = attributes
            .levels
            .iter()
            .enumerate()
            .map(|(index, level)| {
                PyramidLevel::from_dimensions(
                    index,
                    attributes.tile_dimensions,
                    level.dimensions,
                    level.offset,
                    level.extent.unwrap_or(attributes.extent),
                )
            })
            .collect::<SdeRasterResult<Vec<_>>>()?;
        Self::new(crs, attributes.extent, attributes.tile_dimensions, levels)
    }

    pub fn levels(&self) -> &[PyramidLevel] {
        &self.levels
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn max_level(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn level(&self, index: usize) -> SdeRasterResult<&PyramidLevel> {
        self.levels
            .get(index)
            .ok_or(SdeRasterError::LevelOutOfRange((index, self.levels.len())))
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    pub fn extent(&self) -> &Envelope {
        &self.extent
    }

    pub fn tile_dimensions(&self) -> (u32, u32) {
        self.tile_dimensions
    }

    /// Coarsest level at least as fine as `image_size` pixels over `envelope`
    ///
    /// Levels are compared per axis against the requested ground units per
    /// pixel. Scanning from the coarsest level makes the coarser of two equal
    /// resolutions win. Requests finer than level 0, or with no pixels, get
    /// level 0.
    pub fn pick_optimal_level(&self, envelope: &Envelope, image_size: (u32, u32)) -> usize {
        if image_size.0 == 0 || image_size.1 == 0 || envelope.is_empty() {
            return 0;
        }
        let wanted = (
            envelope.width() / image_size.0 as f64,
            envelope.height() / image_size.1 as f64,
        );
        let index = self
            .levels
            .iter()
            .rev()
            .find(|level| {
                let (res_x, res_y) = level.resolution();
                res_x <= wanted.0 && res_y <= wanted.1
            })
            .map(|level| level.index)
            .unwrap_or(0);
        debug!("requested {wanted:?} per pixel, picked level {index}");
        index
    }

    /// Smallest whole-pixel window of `level` covering `envelope`
    ///
    /// The origin is floored and the far edge ceiled, so the window always
    /// contains the request, then clipped to the level's pixels. Rows count
    /// down from the top of the level extent.
    pub fn fit_extent_to_pixel_grid(
        &self,
        envelope: &Envelope,
        level: usize,
    ) -> SdeRasterResult<RasterQueryInfo> {
        let level = self.level(level)?;
        let extent = level.extent;
        if !extent.intersects(envelope) {
            return Err(SdeRasterError::NoOverlap((*envelope, extent)));
        }

        let (res_x, res_y) = level.resolution();
        let (width, height) = (level.width() as f64, level.height() as f64);
        let (min_col, max_col) = grid_span(
            (envelope.min_x() - extent.min_x()) / res_x,
            (envelope.max_x() - extent.min_x()) / res_x,
            width,
        );
        let (min_row, max_row) = grid_span(
            (extent.max_y() - envelope.max_y()) / res_y,
            (extent.max_y() - envelope.min_y()) / res_y,
            height,
        );
        if max_col <= min_col || max_row <= min_row {
            return Err(SdeRasterError::NoOverlap((*envelope, extent)));
        }

        let pixel_rect = PixelRect::new(
            min_col as u32,
            min_row as u32,
            (max_col - min_col) as u32,
            (max_row - min_row) as u32,
        );
        let snapped = Envelope::new(
            extent.min_x() + min_col * res_x,
            extent.max_y() - max_row * res_y,
            extent.min_x() + max_col * res_x,
            extent.max_y() - min_row * res_y,
        );
        trace!("fitted {envelope} to {pixel_rect} ({snapped}) on level {}", level.index);

        Ok(RasterQueryInfo {
            requested: *envelope,
            level: level.index,
            pixel_rect,
            envelope: snapped,
        })
    }
}

/// Whole pixels covering `start..end`, at least one, clipped to `0..limit`
fn grid_span(start: f64, end: f64, limit: f64) -> (f64, f64) {
    let first = start.floor();
    let last = end.ceil().max(first + 1.0);
    (first.max(0.0), last.min(limit))
}

impl Display for Pyramid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pyramid({} Levels, {}, {})",
            self.levels.len(),
            self.crs,
            self.extent
        )?;
        for level in self.levels.iter() {
            write!(f, "\n  {level}")?;
        }
        Ok(())
    }
}
