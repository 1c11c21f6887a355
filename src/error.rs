use crate::projection::{Envelope, PixelRect, ProjectionError};
use crate::raster::{CellType, RasterError, SampleType};
use crate::store::BandId;
use std::fmt;
use std::io;

pub type SdeRasterResult<T> = Result<T, SdeRasterError>;

#[derive(Debug)]
pub enum SdeRasterError {
    // Read parameter preconditions, raised before any backing-store call
    MissingSourceBands,
    MissingConnection,
    MissingBandMapper,
    MissingSourceRegion,
    LevelOutOfRange((usize, usize)),
    UnmappedBand(BandId),
    UnknownBand(BandId),
    SourceRegionOutOfBounds((PixelRect, (u32, u32))),
    DestinationTooSmall(((u32, u32), (u32, u32))),
    DestinationBands((usize, usize)),
    DestinationSampleType((SampleType, SampleType)),
    DestinationBuffer((usize, usize)),
    NoOverlap((Envelope, Envelope)),
    EmptyRequest((u32, u32)),

    // Pyramid metadata
    InvalidPyramid(String),
    InvalidLevel(String),

    // Backing store
    DataSource(io::Error),
    UnexpectedTile(String),
    TruncatedTile((usize, usize)),

    // Pixel configuration
    UnsupportedCellType(CellType),
    UnsupportedConfiguration(String),
    Raster(RasterError),
    Projection(ProjectionError),

    // Resource release
    ReleaseFailed(io::Error),
    ReleaseAfterFailure {
        cause: Box<SdeRasterError>,
        release: io::Error,
    },
}

impl SdeRasterError {
    /// Precondition violations never reach the backing store
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::MissingSourceBands
                | Self::MissingConnection
                | Self::MissingBandMapper
                | Self::MissingSourceRegion
                | Self::LevelOutOfRange(_)
                | Self::UnmappedBand(_)
                | Self::UnknownBand(_)
                | Self::SourceRegionOutOfBounds(_)
                | Self::DestinationTooSmall(_)
                | Self::DestinationBands(_)
                | Self::DestinationSampleType(_)
                | Self::DestinationBuffer(_)
                | Self::NoOverlap(_)
                | Self::EmptyRequest(_)
        )
    }
}

impl fmt::Display for SdeRasterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for SdeRasterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DataSource(e) | Self::ReleaseFailed(e) => Some(e),
            Self::Projection(e) => Some(e),
            Self::ReleaseAfterFailure { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for SdeRasterError {
    fn from(e: io::Error) -> Self {
        SdeRasterError::DataSource(e)
    }
}

impl From<RasterError> for SdeRasterError {
    fn from(e: RasterError) -> Self {
        SdeRasterError::Raster(e)
    }
}

impl From<ProjectionError> for SdeRasterError {
    fn from(e: ProjectionError) -> Self {
        SdeRasterError::Projection(e)
    }
}
