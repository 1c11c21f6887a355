#![allow(dead_code)]

use sderaster::store::memory::TilingOptions;
use sderaster::{
    CellType, Envelope, MemoryTileStore, RasterImage, RasterReader, RasterTable, SampleType,
};

pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn table() -> RasterTable {
    RasterTable::new("imagery", "raster", 7)
}

/// Distinct value per pixel and band that fits `cell_type`
pub fn pattern(cell_type: CellType, x: u32, y: u32, band: usize) -> f64 {
    let (x, y, b) = (x as f64, y as f64, band as f64);
    match cell_type {
        CellType::Bit1 => ((x + y + b) as u32 % 2) as f64,
        CellType::Bit4 => ((x * 3.0 + y + b) as u32 % 16) as f64,
        CellType::U8 => ((x + y * 17.0 + b * 5.0) as u32 % 256) as f64,
        CellType::I8 => ((x + y * 13.0 + b) as i32 % 200 - 100) as f64,
        CellType::U16 => x * 100.0 + y + b * 7.0,
        CellType::I16 => x * 100.0 - y * 50.0 - b,
        CellType::U32 => x * 70_000.0 + y + b,
        CellType::I32 => y * 1000.0 - x * 70_000.0 + b,
        CellType::F32 => x * 0.5 - y + b * 0.25,
        CellType::F64 => x * 0.125 - y * 1e6 + b,
        CellType::Unknown => 0.0,
    }
}

pub fn patterned(cell_type: CellType, dimensions: (u32, u32), bands: usize) -> RasterImage {
    let sample_type = cell_type.sample_type().unwrap_or(SampleType::U8);
    let mut image = RasterImage::blank(dimensions, bands, sample_type);
    for band in 0..bands {
        for y in 0..dimensions.1 {
            for x in 0..dimensions.0 {
                image
                    .set_f64(x, y, band, pattern(cell_type, x, y, band))
                    .unwrap();
            }
        }
    }
    image
}

/// Extent of one ground unit per level 0 pixel
pub fn unit_extent(dimensions: (u32, u32)) -> Envelope {
    Envelope::new(0.0, 0.0, dimensions.0 as f64, dimensions.1 as f64)
}

pub fn stored(image: &RasterImage, options: &TilingOptions) -> (MemoryTileStore, RasterReader) {
    init_logging();
    let store = MemoryTileStore::new();
    store.insert_image(table(), image, options).unwrap();
    let reader = RasterReader::open(&store, &table()).unwrap();
    (store, reader)
}
