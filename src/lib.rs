mod endian;
mod error;
pub mod projection;
pub mod pyramid;
pub mod raster;
pub mod reader;
pub mod store;
pub mod tile;

pub use endian::Endian;
pub use error::{SdeRasterError, SdeRasterResult};
pub use projection::{Crs, CrsSource, Envelope, PixelRect};
pub use pyramid::{Pyramid, PyramidLevel, RasterQueryInfo, TileRange};
pub use raster::{CellType, RasterImage, SampleBuffer, SampleType};
pub use reader::{BandCopier, BandMapper, RasterInfo, RasterReader, ReadParams};
pub use store::memory::{MemoryTileStore, TilingOptions};
pub use store::{BandId, Interpolation, RasterTable, TileConnection, TileCursor, TileSource};
pub use tile::{Tile, TileReader, UnpackedSamples};
