use crate::endian::Endian;
use crate::raster::{CellType, RasterView, Sample, SampleType};
use crate::tile::{bits, Tile};
use crate::{SdeRasterError, SdeRasterResult};
use num_traits::NumCast;

#[derive(Debug, Clone, Copy)]
pub struct BandCopier {
    cell_type: CellType,
    endian: Endian,
    tile_dimensions: (u32, u32),
}

impl BandCopier {
    pub fn new(
        cell_type: CellType,
        destination: SampleType,
        endian: Endian,
        tile_dimensions: (u32, u32),
    ) -> SdeRasterResult<Self> {
        let Some(expected) = cell_type.sample_type() else {
            return Err(SdeRasterError::UnsupportedCellType(cell_type));
        };
        if expected != destination {
            return Err(SdeRasterError::UnsupportedConfiguration(format!(
                "{cell_type} samples cannot be copied into a {destination:?} buffer"
            )));
        }
        Ok(Self {
            cell_type,
            endian,
            tile_dimensions,
        })
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    /// Copy the tile's samples from `intra_offset` on into band `band` of `view`
    ///
    /// The copied block is the view's size, limited by what remains of the tile
    /// past the offset. Empty tiles and pixels masked out by the tile bitmask
    /// are written as `no_data` when one is given, and left untouched otherwise.
    pub fn copy(
        &self,
        tile: &Tile,
        view: &mut RasterView,
        intra_offset: (u32, u32),
        band: usize,
        no_data: Option<f64>,
    ) -> SdeRasterResult<()> {
        let (tile_width, tile_height) = self.tile_dimensions;
        if band >= view.bands() {
            return Err(SdeRasterError::UnsupportedConfiguration(format!(
                "band index {band} outside a {} band destination",
                view.bands()
            )));
        }
        if intra_offset.0 >= tile_width || intra_offset.1 >= tile_height {
            return Err(SdeRasterError::UnexpectedTile(format!(
                "offset {intra_offset:?} outside {tile_width}x{tile_height} tile"
            )));
        }
        let block = (
            view.width().min(tile_width - intra_offset.0),
            view.height().min(tile_height - intra_offset.1),
        );

        let endian = self.endian;
        let bits_per_sample = self.cell_type.bits_per_sample();
        let copy = BlockCopy {
            tile,
            cell_type: self.cell_type,
            tile_width,
            intra_offset,
            block,
            band,
            no_data,
        };
        match self.cell_type {
            CellType::Bit1 | CellType::Bit4 => {
                copy.run(view, |b, i| bits::packed_sample(b, i, bits_per_sample))
            }
            CellType::U8 => copy.run(view, |b, i| b.get(i).copied()),
            CellType::I8 => copy.run(view, |b, i| b.get(i).map(|v| *v as i8)),
            CellType::U16 => copy.run(view, |b, i| endian.decode_at::<2, u16>(b, i)),
            CellType::I16 => copy.run(view, |b, i| endian.decode_at::<2, i16>(b, i)),
            CellType::U32 => copy.run(view, |b, i| endian.decode_at::<4, u32>(b, i)),
            CellType::I32 => copy.run(view, |b, i| endian.decode_at::<4, i32>(b, i)),
            CellType::F32 => copy.run(view, |b, i| endian.decode_at::<4, f32>(b, i)),
            CellType::F64 => copy.run(view, |b, i| endian.decode_at::<8, f64>(b, i)),
            CellType::Unknown => Err(SdeRasterError::UnsupportedCellType(self.cell_type)),
        }
    }
}

struct BlockCopy<'t> {
    tile: &'t Tile,
    cell_type: CellType,
    tile_width: u32,
    intra_offset: (u32, u32),
    block: (u32, u32),
    band: usize,
    no_data: Option<f64>,
}

impl BlockCopy<'_> {
    fn run<T: Sample>(
        &self,
        view: &mut RasterView,
        decode: impl Fn(&[u8], usize) -> Option<T>,
    ) -> SdeRasterResult<()> {
        let fill: Option<T> = self.no_data.and_then(|v| <T as NumCast>::from(v));
        let (width, height) = self.block;

        if self.tile.is_empty() {
            if let Some(fill) = fill {
                let row = vec![fill; width as usize];
                for y in 0..height {
                    view.put_row(0, y, self.band, &row)?;
                }
            }
            return Ok(());
        }

        let pixels = self.tile.pixel_bytes(self.cell_type);
        let mut row: Vec<Option<T>> = Vec::with_capacity(width as usize);
        for y in 0..height {
            row.clear();
            let tile_row = (self.intra_offset.1 + y) as usize * self.tile_width as usize;
            for x in 0..width {
                let index = tile_row + (self.intra_offset.0 + x) as usize;
                if !self.tile.has_data(self.cell_type, index) {
                    row.push(fill);
                    continue;
                }
                let value = decode(pixels, index).ok_or(SdeRasterError::TruncatedTile((
                    pixels.len(),
                    self.cell_type.payload_len(index + 1),
                )))?;
                row.push(Some(value));
            }
            if let Some(full) = row.iter().copied().collect::<Option<Vec<T>>>() {
                view.put_row(0, y, self.band, &full)?;
            } else {
                // masked without no-data: keep what the destination holds
                for (x, value) in row.iter().enumerate() {
                    if let Some(value) = value {
                        view.put(x as u32, y, self.band, *value)?;
                    }
                }
            }
        }
        Ok(())
    }
}
