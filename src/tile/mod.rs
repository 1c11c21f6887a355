use crate::raster::CellType;
use crate::store::BandId;
use std::fmt::Display;

pub mod bits;
mod reader;

pub use reader::{TileReader, UnpackedSamples};

/// One band of one tile grid cell as delivered by the backing store
///
/// The payload holds the packed pixel data for `num_pixels` samples, optionally
/// followed by a bitmask with one bit per pixel (most significant bit first, set
/// when the pixel carries data). A tile with no pixels carries no data at all.
#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    pub level: usize,
    pub column: u32,
    pub row: u32,
    pub band: BandId,
    pub num_pixels: usize,
    pub payload: Vec<u8>,
}

impl Tile {
    pub fn is_empty(&self) -> bool {
        self.num_pixels == 0 || self.payload.is_empty()
    }

    /// Packed pixel data with any trailing bitmask stripped
    pub fn pixel_bytes(&self, cell_type: CellType) -> &[u8] {
        let n = cell_type.payload_len(self.num_pixels).min(self.payload.len());
        &self.payload[..n]
    }

    pub fn bitmask(&self, cell_type: CellType) -> Option<&[u8]> {
        let start = cell_type.payload_len(self.num_pixels);
        let n = self.num_pixels.div_ceil(8);
        if n == 0 {
            return None;
        }
        self.payload.get(start..start + n)
    }

    pub fn has_data(&self, cell_type: CellType, index: usize) -> bool {
        match self.bitmask(cell_type) {
            Some(mask) => mask
                .get(index / 8)
                .is_some_and(|byte| byte & (0x80 >> (index % 8)) != 0),
            None => !self.is_empty(),
        }
    }
}

impl Display for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tile(level {}, col {}, row {}, band {}, {} pixels, {}Bytes)",
            self.level,
            self.column,
            self.row,
            self.band,
            self.num_pixels,
            self.payload.len()
        )
    }
}
