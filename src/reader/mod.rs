use crate::endian::Endian;
use crate::projection::{Envelope, PixelRect};
use crate::pyramid::{Pyramid, PyramidLevel, RasterQueryInfo, TileRange};
use crate::raster::{CellType, RasterImage};
use crate::store::{
    self, finish, BandAttributes, BandId, RasterAttributes, RasterTable, TileQuery, TileSource,
};
use crate::tile::TileReader;
use crate::{SdeRasterError, SdeRasterResult};
use std::fmt::Display;
use tracing::*;

mod copy;
mod params;

pub use copy::BandCopier;
pub use params::{BandMapper, ReadParams};

#[derive(Clone, Debug, PartialEq)]
pub struct RasterInfo {
    pub table: RasterTable,
    pub cell_type: CellType,
    pub bands: Vec<BandAttributes>,
    pub pyramid: Pyramid,
    pub endian: Endian,
}

impl RasterInfo {
    pub fn from_attributes(
        table: RasterTable,
        attributes: &RasterAttributes,
    ) -> SdeRasterResult<Self> {
        let cell_type = CellType::from_code(attributes.pixel_type);
        if cell_type == CellType::Unknown {
            return Err(SdeRasterError::UnsupportedCellType(cell_type));
        }
        let pyramid = Pyramid::from_attributes(attributes)?;
        Ok(Self {
            table,
            cell_type,
            bands: attributes.bands.clone(),
            pyramid,
            endian: attributes.endian,
        })
    }

    pub fn load(source: &dyn TileSource, table: &RasterTable) -> SdeRasterResult<Self> {
        let attributes = store::describe(source, table)?;
        let info = Self::from_attributes(table.clone(), &attributes)?;
        debug!("loaded {info}");
        Ok(info)
    }

    pub fn band(&self, id: BandId) -> Option<&BandAttributes> {
        self.bands.iter().find(|band| band.id == id)
    }

    pub fn band_ids(&self) -> Vec<BandId> {
        self.bands.iter().map(|band| band.id).collect()
    }
}

impl Display for RasterInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Raster({}, {}, {} bands, {:?} endian)\n{}",
            self.table,
            self.cell_type,
            self.bands.len(),
            self.endian,
            self.pyramid
        )
    }
}

/// Span of one tile along one axis of a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    intra: u32,
    dest: u32,
    len: u32,
}

#[derive(Debug, Clone, Copy)]
struct Axis {
    tile: u32,
    min_tile: u32,
    grid_offset: u32,
    region_len: u32,
    grid_end: u32,
}

impl Axis {
    /// Where tile `index` lands, or `None` when it holds nothing of the region
    fn place(&self, index: u32) -> Option<Span> {
        if index < self.min_tile {
            return None;
        }
        let (intra, dest) = if index == self.min_tile {
            (self.grid_offset, 0)
        } else {
            let dest = (index - self.min_tile) as u64 * self.tile as u64 - self.grid_offset as u64;
            (0, u32::try_from(dest).ok()?)
        };
        let start = index as u64 * self.tile as u64 + intra as u64;
        if dest >= self.region_len || start >= self.grid_end as u64 {
            return None;
        }
        let len = (self.tile - intra)
            .min(self.region_len - dest)
            .min((self.grid_end as u64 - start) as u32);
        Some(Span { intra, dest, len })
    }
}

struct ReadPlan<'a> {
    level: &'a PyramidLevel,
    tiles: TileRange,
    columns: Axis,
    rows: Axis,
    mapper: BandMapper,
    copier: BandCopier,
    destination: RasterImage,
    destination_offset: (u32, u32),
    no_data: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct RasterReader {
    info: RasterInfo,
}

impl RasterReader {
    pub fn new(info: RasterInfo) -> Self {
        Self { info }
    }

    pub fn open(source: &dyn TileSource, table: &RasterTable) -> SdeRasterResult<Self> {
        RasterInfo::load(source, table).map(Self::new)
    }

    pub fn info(&self) -> &RasterInfo {
        &self.info
    }

    pub fn pyramid(&self) -> &Pyramid {
        &self.info.pyramid
    }

    /// Read `params`' source region of `level` into one image
    ///
    /// Every precondition is checked before the backing store is queried. The
    /// connection handed over in `params` is consumed: it is closed when the
    /// read ends, whatever the outcome, together with the tile cursor.
    pub fn read(&self, level: usize, mut params: ReadParams) -> SdeRasterResult<RasterImage> {
        let validated = params.validate();
        let mut connection = match (validated, params.connection.take()) {
            (Ok(()), Some(connection)) => connection,
            (Ok(()), None) => return Err(SdeRasterError::MissingConnection),
            (Err(e), Some(mut connection)) => return finish(Err(e), connection.close()),
            (Err(e), None) => return Err(e),
        };

        let (mut plan, query) = match self.plan(level, &mut params) {
            Ok(planned) => planned,
            Err(e) => {
                debug!("read refused before querying: {e:?}");
                return finish(Err(e), connection.close());
            }
        };

        info!(
            "reading {} from {} level {} into {}",
            plan.columns.region_len as u64 * plan.rows.region_len as u64,
            self.info.table,
            level,
            plan.destination
        );
        let mut tiles = TileReader::open(connection, &query, self.info.cell_type)?;
        let stitched = self.stitch(&mut tiles, &mut plan);
        finish(stitched, tiles.close()).map(|()| plan.destination)
    }

    fn plan(
        &self,
        level: usize,
        params: &mut ReadParams,
    ) -> SdeRasterResult<(ReadPlan<'_>, TileQuery)> {
        let level = self.info.pyramid.level(level)?;
        let region = params
            .source_region
            .ok_or(SdeRasterError::MissingSourceRegion)?;
        if region.is_empty() {
            return Err(SdeRasterError::EmptyRequest(region.dimensions()));
        }
        if !level.contains_region(&region) {
            return Err(SdeRasterError::SourceRegionOutOfBounds((region, level.dimensions)));
        }

        let mapper = params
            .band_mapper
            .take()
            .ok_or(SdeRasterError::MissingBandMapper)?;
        let mut bands_needed = 0;
        for band in params.source_bands.iter() {
            if self.info.band(*band).is_none() {
                return Err(SdeRasterError::UnknownBand(*band));
            }
            let index = mapper.get(*band).ok_or(SdeRasterError::UnmappedBand(*band))?;
            bands_needed = bands_needed.max(index + 1);
        }

        let cell_type = self.info.cell_type;
        let sample_type = cell_type
            .sample_type()
            .ok_or(SdeRasterError::UnsupportedCellType(cell_type))?;
        let offset = params.destination_offset;
        let needed = (
            offset.0.saturating_add(region.width),
            offset.1.saturating_add(region.height),
        );
        let destination = match params.destination.take() {
            Some(image) => {
                if image.buffer.len() != image.required_len() {
                    return Err(SdeRasterError::DestinationBuffer((
                        image.required_len(),
                        image.buffer.len(),
                    )));
                }
                if image.sample_type() != sample_type {
                    return Err(SdeRasterError::DestinationSampleType((
                        sample_type,
                        image.sample_type(),
                    )));
                }
                if image.bands < bands_needed {
                    return Err(SdeRasterError::DestinationBands((bands_needed, image.bands)));
                }
                if needed.0 > image.width() || needed.1 > image.height() {
                    return Err(SdeRasterError::DestinationTooSmall((needed, image.dimensions)));
                }
                image
            }
            None => RasterImage::blank(needed, bands_needed, sample_type),
        };
        let copier = BandCopier::new(
            cell_type,
            sample_type,
            self.info.endian,
            level.tile_dimensions,
        )?;

        let (tiles, grid_offset) = level
            .tile_range(&region)
            .ok_or(SdeRasterError::SourceRegionOutOfBounds((region, level.dimensions)))?;
        let grid_end = level.grid_end();
        let columns = Axis {
            tile: level.tile_width(),
            min_tile: tiles.min_col,
            grid_offset: grid_offset.0,
            region_len: region.width,
            grid_end: grid_end.0,
        };
        let rows = Axis {
            tile: level.tile_height(),
            min_tile: tiles.min_row,
            grid_offset: grid_offset.1,
            region_len: region.height,
            grid_end: grid_end.1,
        };
        trace!("{region} on level {} covers {tiles}, grid offset {grid_offset:?}", level.index);

        let query = TileQuery {
            table: self.info.table.clone(),
            level: level.index,
            tiles,
            bands: params.source_bands.clone(),
            interpolation: params.interpolation,
        };
        let plan = ReadPlan {
            level,
            tiles,
            columns,
            rows,
            mapper,
            copier,
            destination,
            destination_offset: offset,
            no_data: params.no_data,
        };
        Ok((plan, query))
    }

    fn stitch(&self, tiles: &mut TileReader, plan: &mut ReadPlan) -> SdeRasterResult<()> {
        let mut placed = 0;
        while let Some(tile) = tiles.next_tile()? {
            if tile.level != plan.level.index || !plan.tiles.contains(tile.column, tile.row) {
                return Err(SdeRasterError::UnexpectedTile(format!(
                    "{tile} outside level {} {}",
                    plan.level.index, plan.tiles
                )));
            }
            let band = plan
                .mapper
                .get(tile.band)
                .ok_or(SdeRasterError::UnmappedBand(tile.band))?;
            let (Some(x), Some(y)) = (plan.columns.place(tile.column), plan.rows.place(tile.row))
            else {
                trace!("{tile} holds none of the region");
                continue;
            };
            let origin = (
                plan.destination_offset.0 + x.dest,
                plan.destination_offset.1 + y.dest,
            );
            trace!("{tile} -> {origin:?} {}x{} from ({}, {})", x.len, y.len, x.intra, y.intra);
            let no_data = plan
                .no_data
                .or_else(|| self.info.band(tile.band).and_then(|b| b.no_data));
            let mut view = plan.destination.view_mut(origin, (x.len, y.len))?;
            plan.copier
                .copy(&tile, &mut view, (x.intra, y.intra), band, no_data)?;
            placed += 1;
        }
        debug!("placed {placed} of {} tiles", tiles.tiles_read());
        Ok(())
    }

    /// Read whatever covers `envelope` at about `size` pixels
    ///
    /// Picks the level, fits the envelope to its pixel grid and reads the
    /// fitted region over a fresh connection from `source`. The image is at the
    /// level's resolution, not resampled to `size`.
    pub fn read_envelope(
        &self,
        source: &dyn TileSource,
        envelope: &Envelope,
        size: (u32, u32),
        bands: &[BandId],
    ) -> SdeRasterResult<(RasterImage, RasterQueryInfo)> {
        let level = self.info.pyramid.pick_optimal_level(envelope, size);
        let query_info = self.info.pyramid.fit_extent_to_pixel_grid(envelope, level)?;
        let params = ReadParams::new()
            .of_region(query_info.pixel_rect)
            .with_bands(bands.to_vec())
            .with_band_mapper(BandMapper::sequential(bands))
            .with_connection(source.connect()?);
        let image = self.read(level, params)?;
        Ok((image, query_info))
    }

    pub fn level_region(&self, level: usize) -> SdeRasterResult<PixelRect> {
        let (width, height) = self.info.pyramid.level(level)?.dimensions;
        Ok(PixelRect::new(0, 0, width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(min_tile: u32, grid_offset: u32, region_len: u32, grid_end: u32) -> Axis {
        Axis {
            tile: 4,
            min_tile,
            grid_offset,
            region_len,
            grid_end,
        }
    }

    #[test]
    fn aligned_region_takes_whole_tiles() {
        let a = axis(0, 0, 8, 8);
        assert_eq!(a.place(0), Some(Span { intra: 0, dest: 0, len: 4 }));
        assert_eq!(a.place(1), Some(Span { intra: 0, dest: 4, len: 4 }));
        assert_eq!(a.place(2), None);
    }

    #[test]
    fn leading_offset_shortens_first_tile_only() {
        // region pixels 5..12 of the grid
        let a = axis(1, 1, 7, 20);
        assert_eq!(a.place(1), Some(Span { intra: 1, dest: 0, len: 3 }));
        assert_eq!(a.place(2), Some(Span { intra: 0, dest: 3, len: 4 }));
        assert_eq!(a.place(3), None);
        assert_eq!(a.place(0), None);
    }

    #[test]
    fn trailing_tile_clipped_to_level_end() {
        // 10 pixel level: last tile holds 2 real pixels
        let a = axis(0, 0, 10, 10);
        assert_eq!(a.place(2), Some(Span { intra: 0, dest: 8, len: 2 }));
    }

    #[test]
    fn spans_tile_the_region_exactly() {
        for grid_offset in 0..4 {
            for region_len in 1..13 {
                let a = axis(0, grid_offset, region_len, 64);
                let mut next = 0;
                for index in 0..8 {
                    if let Some(span) = a.place(index) {
                        assert_eq!(span.dest, next);
                        next += span.len;
                    }
                }
                assert_eq!(next, region_len);
            }
        }
    }
}
