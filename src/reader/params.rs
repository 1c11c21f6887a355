use crate::projection::PixelRect;
use crate::raster::RasterImage;
use crate::store::{BandId, Interpolation, TileConnection};
use crate::{SdeRasterError, SdeRasterResult};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BandMapper {
    map: BTreeMap<BandId, usize>,
}

impl BandMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `bands` onto destination bands 0, 1, 2... in order
    pub fn sequential(bands: &[BandId]) -> Self {
        Self {
            map: bands.iter().enumerate().map(|(i, id)| (*id, i)).collect(),
        }
    }

    pub fn with(mut self, band: BandId, destination: usize) -> Self {
        self.map.insert(band, destination);
        self
    }

    pub fn get(&self, band: BandId) -> Option<usize> {
        self.map.get(&band).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Everything one tiled read needs
///
/// Built with the `of_*`/`with_*` methods. Required pieces are checked by
/// [`ReadParams::validate`] when the read starts, each with its own error.
#[derive(Default)]
pub struct ReadParams {
    pub(crate) source_region: Option<PixelRect>,
    pub(crate) source_bands: Vec<BandId>,
    pub(crate) band_mapper: Option<BandMapper>,
    pub(crate) connection: Option<Box<dyn TileConnection>>,
    pub(crate) destination: Option<RasterImage>,
    pub(crate) destination_offset: (u32, u32),
    pub(crate) interpolation: Interpolation,
    pub(crate) no_data: Option<f64>,
}

impl ReadParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_region(mut self, region: PixelRect) -> Self {
        self.source_region = Some(region);
        self
    }

    pub fn with_bands(mut self, bands: Vec<BandId>) -> Self {
        self.source_bands = bands;
        self
    }

    pub fn with_band_mapper(mut self, mapper: BandMapper) -> Self {
        self.band_mapper = Some(mapper);
        self
    }

    pub fn with_connection(mut self, connection: Box<dyn TileConnection>) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn with_destination(mut self, image: RasterImage) -> Self {
        self.destination = Some(image);
        self
    }

    pub fn with_destination_offset(mut self, offset: (u32, u32)) -> Self {
        self.destination_offset = offset;
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    /// Value written for masked or empty tile pixels, overriding band metadata
    pub fn with_no_data(mut self, value: f64) -> Self {
        self.no_data = Some(value);
        self
    }

    pub fn source_region(&self) -> Option<PixelRect> {
        self.source_region
    }

    pub fn source_bands(&self) -> &[BandId] {
        &self.source_bands
    }

    pub fn validate(&self) -> SdeRasterResult<()> {
        if self.source_bands.is_empty() {
            return Err(SdeRasterError::MissingSourceBands);
        }
        if self.connection.is_none() {
            return Err(SdeRasterError::MissingConnection);
        }
        if self.band_mapper.is_none() {
            return Err(SdeRasterError::MissingBandMapper);
        }
        if self.source_region.is_none() {
            return Err(SdeRasterError::MissingSourceRegion);
        }
        Ok(())
    }
}

impl fmt::Debug for ReadParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadParams")
            .field("source_region", &self.source_region)
            .field("source_bands", &self.source_bands)
            .field("band_mapper", &self.band_mapper)
            .field("connection", &self.connection.is_some())
            .field("destination", &self.destination.as_ref().map(|d| d.dimensions))
            .field("destination_offset", &self.destination_offset)
            .field("interpolation", &self.interpolation)
            .field("no_data", &self.no_data)
            .finish()
    }
}
