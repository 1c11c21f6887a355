#[cfg(not(feature = "image"))]
compile_error!("This example requires the ['image'] feature");

use image::DynamicImage;
use sderaster::store::memory::TilingOptions;
use sderaster::{
    CellType, Envelope, MemoryTileStore, RasterImage, RasterReader, RasterTable, SampleType,
};
use std::env;
use std::time::Instant;

const SIZE: (u32, u32) = (1000, 750);
const TILE: (u32, u32) = (128, 128);
const LEVELS: usize = 4;
const OUTPUT_FILE: &str = "data/stitch.png";

// Use
// cargo run --example stitch -- min_x min_y max_x max_y width height output.png

fn main() {
    println!("Example: sderaster stitch");

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let args: Vec<String> = env::args().collect();
    let request = if args.len() > 4 {
        Envelope::new(
            args[1].parse().unwrap(),
            args[2].parse().unwrap(),
            args[3].parse().unwrap(),
            args[4].parse().unwrap(),
        )
    } else {
        Envelope::new(120.0, 80.0, 620.0, 455.0)
    };
    let size = if args.len() > 6 {
        (args[5].parse().unwrap(), args[6].parse().unwrap())
    } else {
        (250, 188)
    };
    let output = args.get(7).cloned().unwrap_or(String::from(OUTPUT_FILE));

    // Synthetic RGB gradient tiled into a store
    let mut source = RasterImage::blank(SIZE, 3, SampleType::U8);
    for y in 0..SIZE.1 {
        for x in 0..SIZE.0 {
            let r = (x * 255 / SIZE.0) as u8;
            let g = (y * 255 / SIZE.1) as u8;
            let b = (((x / 50) + (y / 50)) % 2 * 255) as u8;
            for (band, value) in [r, g, b].into_iter().enumerate() {
                source.set_sample(x, y, band, value).unwrap();
            }
        }
    }
    let extent = Envelope::new(0.0, 0.0, SIZE.0 as f64, SIZE.1 as f64);
    let options = TilingOptions::new(CellType::U8, TILE, extent)
        .with_levels(LEVELS)
        .with_offset((17, 9));
    let table = RasterTable::new("demo", "raster", 1);
    let store = MemoryTileStore::new();

    let t0 = Instant::now();
    store.insert_image(table.clone(), &source, &options).unwrap();
    println!(
        "Tiled source in {:.3}ms",
        t0.elapsed().as_micros() as f64 / 1000.0
    );

    let reader = RasterReader::open(&store, &table).unwrap();
    println!("{}", reader.info());

    let t1 = Instant::now();
    let (stitched, info) = reader
        .read_envelope(&store, &request, size, &[1, 2, 3])
        .unwrap();
    println!(
        "Stitched level {} {} in {:.3}ms",
        info.level,
        info.pixel_rect,
        t1.elapsed().as_micros() as f64 / 1000.0
    );
    println!("Fitted {} to {}", info.requested, info.envelope);
    println!("{:?}", store.stats());

    let img: DynamicImage = stitched.try_into().unwrap();
    img.save(&output).unwrap();
    println!("Image saved to {output}");
}
