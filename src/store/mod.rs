// Backing-store contract
//   A TileSource hands out connections; a read owns exactly one connection and
//   one cursor for its whole duration and releases both on every path.
//   Cursors yield tiles until they return None; there is no sentinel tile.

use crate::endian::Endian;
use crate::projection::{CrsSource, Envelope};
use crate::pyramid::TileRange;
use crate::tile::Tile;
use crate::{SdeRasterError, SdeRasterResult};
use std::fmt::Display;
use std::io;
use tracing::*;

pub mod memory;

pub type BandId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RasterTable {
    pub table: String,
    pub column: String,
    pub raster_id: i64,
}

impl RasterTable {
    pub fn new(table: &str, column: &str, raster_id: i64) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            raster_id,
        }
    }
}

impl Display for RasterTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}#{}", self.table, self.column, self.raster_id)
    }
}

/// Resampling hint forwarded to the backing store untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Nearest,
    Bilinear,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileQuery {
    pub table: RasterTable,
    pub level: usize,
    pub tiles: TileRange,
    pub bands: Vec<BandId>,
    pub interpolation: Interpolation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BandAttributes {
    pub id: BandId,
    pub number: usize,
    pub name: String,
    pub no_data: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevelAttributes {
    pub dimensions: (u32, u32),
    pub offset: (u32, u32),
    /// Defaults to the raster extent
    pub extent: Option<Envelope>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RasterAttributes {
    pub pixel_type: u32,
    pub tile_dimensions: (u32, u32),
    pub extent: Envelope,
    pub crs: CrsSource,
    pub bands: Vec<BandAttributes>,
    pub levels: Vec<LevelAttributes>,
    pub endian: Endian,
}

pub trait TileSource: Send + Sync {
    fn connect(&self) -> io::Result<Box<dyn TileConnection>>;
}

pub trait TileConnection {
    fn describe_raster(&mut self, table: &RasterTable) -> io::Result<RasterAttributes>;

    fn query_tiles(&mut self, query: &TileQuery) -> io::Result<Box<dyn TileCursor>>;

    fn close(&mut self) -> io::Result<()>;
}

pub trait TileCursor {
    fn next_tile(&mut self) -> io::Result<Option<Tile>>;

    fn close(&mut self) -> io::Result<()>;
}

/// Combine the outcome of some work with the release of its resources
///
/// A release failure is never dropped: after success it becomes
/// `ReleaseFailed`, after a failure it is attached to the original cause.
pub fn finish<T>(result: SdeRasterResult<T>, released: io::Result<()>) -> SdeRasterResult<T> {
    match (result, released) {
        (result, Ok(())) => result,
        (Ok(_), Err(release)) => Err(SdeRasterError::ReleaseFailed(release)),
        (Err(cause), Err(release)) => {
            error!("release failed after {cause:?}: {release}");
            Err(SdeRasterError::ReleaseAfterFailure {
                cause: Box::new(cause),
                release,
            })
        }
    }
}

/// Fetch raster metadata over a connection of its own
pub fn describe(source: &dyn TileSource, table: &RasterTable) -> SdeRasterResult<RasterAttributes> {
    let mut connection = source.connect()?;
    let result = connection.describe_raster(table).map_err(SdeRasterError::from);
    finish(result, connection.close())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_escalates_release_failures() {
        let ok: SdeRasterResult<u8> = finish(Ok(1), Ok(()));
        assert_eq!(ok.unwrap(), 1);

        let released = finish(Ok(1_u8), Err(io::Error::other("close")));
        assert!(matches!(released, Err(SdeRasterError::ReleaseFailed(_))));

        let both: SdeRasterResult<u8> = finish(
            Err(SdeRasterError::DataSource(io::Error::other("fetch"))),
            Err(io::Error::other("close")),
        );
        match both {
            Err(SdeRasterError::ReleaseAfterFailure { cause, release }) => {
                assert!(matches!(*cause, SdeRasterError::DataSource(_)));
                assert_eq!(release.to_string(), "close");
            }
            other => panic!("unexpected {other:?}"),
        }

        let failed: SdeRasterResult<u8> = finish(Err(SdeRasterError::MissingConnection), Ok(()));
        assert!(matches!(failed, Err(SdeRasterError::MissingConnection)));
    }
}
