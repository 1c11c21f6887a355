// In-process tile store
//   Tiles a RasterImage into a pyramid the way a database raster column would
//   hold it, then serves it through the TileSource contract. Every connection,
//   query, tile and release is counted, and failures can be injected at each
//   backing-store call.

use super::{
    BandAttributes, BandId, LevelAttributes, RasterAttributes, RasterTable, TileConnection,
    TileCursor, TileQuery, TileSource,
};
use crate::endian::Endian;
use crate::projection::{CrsSource, Envelope};
use crate::raster::{CellType, RasterImage};
use crate::tile::{bits, Tile};
use crate::{SdeRasterError, SdeRasterResult};
use num_traits::NumCast;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileOrder {
    #[default]
    RowMajor,
    ColumnMajor,
    Reversed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Connect,
    Describe,
    Query,
    /// Fail the fetch following this many served tiles
    FetchAfter(usize),
    CursorClose,
    ConnectionClose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub connects: usize,
    pub describes: usize,
    pub queries: usize,
    pub cursors_opened: usize,
    pub tiles_served: usize,
    pub cursor_closes: usize,
    pub connection_closes: usize,
}

impl StoreStats {
    /// Calls that reach the raster data, as opposed to connection handling
    pub fn data_calls(&self) -> usize {
        self.describes + self.queries
    }

    pub fn all_released(&self) -> bool {
        self.connects == self.connection_closes && self.cursors_opened == self.cursor_closes
    }
}

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicUsize,
    describes: AtomicUsize,
    queries: AtomicUsize,
    cursors_opened: AtomicUsize,
    tiles_served: AtomicUsize,
    cursor_closes: AtomicUsize,
    connection_closes: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> StoreStats {
        let load = |c: &AtomicUsize| c.load(Ordering::SeqCst);
        StoreStats {
            connects: load(&self.connects),
            describes: load(&self.describes),
            queries: load(&self.queries),
            cursors_opened: load(&self.cursors_opened),
            tiles_served: load(&self.tiles_served),
            cursor_closes: load(&self.cursor_closes),
            connection_closes: load(&self.connection_closes),
        }
    }
}

type TileKey = (usize, u32, u32, BandId);

#[derive(Debug, Clone)]
struct StoredRaster {
    attributes: RasterAttributes,
    tiles: BTreeMap<TileKey, Tile>,
}

#[derive(Debug, Default)]
struct Inner {
    rasters: Mutex<HashMap<RasterTable, StoredRaster>>,
    faults: Mutex<Vec<Fault>>,
    order: Mutex<TileOrder>,
    counters: Counters,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Inner {
    fn faulty(&self, fault: Fault) -> bool {
        lock(&self.faults).contains(&fault)
    }

    fn fetch_limit(&self) -> Option<usize> {
        lock(&self.faults).iter().find_map(|f| match f {
            Fault::FetchAfter(n) => Some(*n),
            _ => None,
        })
    }
}

fn injected(call: &str) -> io::Error {
    io::Error::other(format!("injected {call} failure"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct TilingOptions {
    pub cell_type: CellType,
    pub tile_dimensions: (u32, u32),
    pub levels: usize,
    pub offset: (u32, u32),
    pub extent: Envelope,
    pub crs: CrsSource,
    pub endian: Endian,
    pub bitmask: bool,
    pub no_data: Option<f64>,
    pub band_ids: Option<Vec<BandId>>,
}

impl TilingOptions {
    pub fn new(cell_type: CellType, tile_dimensions: (u32, u32), extent: Envelope) -> Self {
        Self {
            cell_type,
            tile_dimensions,
            levels: 1,
            offset: (0, 0),
            extent,
            crs: CrsSource::Epsg(3857),
            endian: Endian::Big,
            bitmask: false,
            no_data: None,
            band_ids: None,
        }
    }

    /// Number of levels, each half the size of the one before
    pub fn with_levels(mut self, levels: usize) -> Self {
        self.levels = levels;
        self
    }

    /// Padding before the first pixel of every level's tile grid
    pub fn with_offset(mut self, offset: (u32, u32)) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_crs(mut self, crs: CrsSource) -> Self {
        self.crs = crs;
        self
    }

    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    /// Append a bitmask to every tile, clearing padding pixels
    pub fn with_bitmask(mut self, bitmask: bool) -> Self {
        self.bitmask = bitmask;
        self
    }

    /// Band no-data value; with a bitmask, pixels holding it are masked out
    pub fn with_no_data(mut self, no_data: f64) -> Self {
        self.no_data = Some(no_data);
        self
    }

    pub fn with_band_ids(mut self, band_ids: Vec<BandId>) -> Self {
        self.band_ids = Some(band_ids);
        self
    }
}

#[derive(Debug, Clone)]
struct LevelGrid {
    dimensions: (u32, u32),
    samples: Vec<f64>,
}

impl LevelGrid {
    fn from_band(image: &RasterImage, band: usize) -> Self {
        let (width, height) = image.dimensions;
        let samples = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| image.get_f64(x, y, band).unwrap_or_default())
            .collect();
        Self {
            dimensions: image.dimensions,
            samples,
        }
    }

    fn get(&self, x: u32, y: u32) -> f64 {
        self.samples[y as usize * self.dimensions.0 as usize + x as usize]
    }

    fn decimate(&self) -> Self {
        let dimensions = (self.dimensions.0.div_ceil(2), self.dimensions.1.div_ceil(2));
        let samples = (0..dimensions.1)
            .flat_map(|y| (0..dimensions.0).map(move |x| (x, y)))
            .map(|(x, y)| self.get(x * 2, y * 2))
            .collect();
        Self {
            dimensions,
            samples,
        }
    }
}

fn encode_samples(cell_type: CellType, endian: Endian, values: &[f64]) -> Vec<u8> {
    fn cast<T: NumCast + Default>(v: f64) -> T {
        <T as NumCast>::from(v).unwrap_or_default()
    }
    match cell_type {
        CellType::Bit1 | CellType::Bit4 => {
            let packed: Vec<u8> = values.iter().map(|v| cast::<u8>(*v)).collect();
            bits::pack_samples(&packed, cell_type.bits_per_sample())
        }
        CellType::U8 => values.iter().map(|v| cast::<u8>(*v)).collect(),
        CellType::I8 => values.iter().map(|v| cast::<i8>(*v) as u8).collect(),
        CellType::U16 => values.iter().flat_map(|v| endian.encode(cast::<u16>(*v))).collect(),
        CellType::I16 => values.iter().flat_map(|v| endian.encode(cast::<i16>(*v))).collect(),
        CellType::U32 => values.iter().flat_map(|v| endian.encode(cast::<u32>(*v))).collect(),
        CellType::I32 => values.iter().flat_map(|v| endian.encode(cast::<i32>(*v))).collect(),
        CellType::F32 => values.iter().flat_map(|v| endian.encode(*v as f32)).collect(),
        CellType::F64 => values.iter().flat_map(|v| endian.encode(*v)).collect(),
        CellType::Unknown => Vec::new(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryTileStore {
    inner: Arc<Inner>,
}

impl MemoryTileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_image(
        &self,
        table: RasterTable,
        image: &RasterImage,
        options: &TilingOptions,
    ) -> SdeRasterResult<()> {
        let cell_type = options.cell_type;
        if cell_type.sample_type().is_none() {
            return Err(SdeRasterError::UnsupportedCellType(cell_type));
        }
        let (tile_width, tile_height) = options.tile_dimensions;
        if tile_width == 0 || tile_height == 0 {
            return Err(SdeRasterError::InvalidLevel(format!(
                "zero tile size {:?}",
                options.tile_dimensions
            )));
        }
        if options.offset.0 >= tile_width || options.offset.1 >= tile_height {
            return Err(SdeRasterError::InvalidLevel(format!(
                "offset {:?} not inside first tile",
                options.offset
            )));
        }
        let band_ids = match &options.band_ids {
            Some(ids) if ids.len() == image.bands => ids.clone(),
            Some(ids) => {
                return Err(SdeRasterError::UnsupportedConfiguration(format!(
                    "{} band ids for {} bands",
                    ids.len(),
                    image.bands
                )))
            }
            None => (1..=image.bands as BandId).collect(),
        };

        let mut grids: Vec<LevelGrid> = (0..image.bands)
            .map(|band| LevelGrid::from_band(image, band))
            .collect();
        let mut levels = Vec::new();
        let mut tiles = BTreeMap::new();
        for level in 0..options.levels.max(1) {
            if level > 0 {
                if grids.iter().all(|g| g.dimensions == (1, 1)) {
                    break;
                }
                grids = grids.iter().map(LevelGrid::decimate).collect();
            }
            let dimensions = grids.first().map(|g| g.dimensions).unwrap_or(image.dimensions);
            for (grid, band) in grids.iter().zip(band_ids.iter()) {
                for tile in encode_level(level, *band, grid, options) {
                    tiles.insert((level, tile.column, tile.row, *band), tile);
                }
            }
            levels.push(LevelAttributes {
                dimensions,
                offset: options.offset,
                extent: None,
            });
        }

        let bands = band_ids
            .iter()
            .enumerate()
            .map(|(i, id)| BandAttributes {
                id: *id,
                number: i + 1,
                name: format!("band_{}", i + 1),
                no_data: options.no_data,
            })
            .collect();
        let attributes = RasterAttributes {
            pixel_type: cell_type.code(),
            tile_dimensions: options.tile_dimensions,
            extent: options.extent,
            crs: options.crs.clone(),
            bands,
            levels,
            endian: options.endian,
        };
        debug!(
            "stored {table} as {} levels, {} tiles of {cell_type}",
            attributes.levels.len(),
            tiles.len()
        );
        self.insert(table, attributes, tiles.into_values());
        Ok(())
    }

    pub fn insert(
        &self,
        table: RasterTable,
        attributes: RasterAttributes,
        tiles: impl IntoIterator<Item = Tile>,
    ) {
        let tiles = tiles
            .into_iter()
            .map(|t| ((t.level, t.column, t.row, t.band), t))
            .collect();
        lock(&self.inner.rasters).insert(table, StoredRaster { attributes, tiles });
    }

    /// Turn a stored tile into an empty one, returning whether it existed
    pub fn clear_tile(
        &self,
        table: &RasterTable,
        level: usize,
        column: u32,
        row: u32,
        band: BandId,
    ) -> bool {
        let mut rasters = lock(&self.inner.rasters);
        let Some(tile) = rasters
            .get_mut(table)
            .and_then(|r| r.tiles.get_mut(&(level, column, row, band)))
        else {
            return false;
        };
        tile.num_pixels = 0;
        tile.payload.clear();
        true
    }

    pub fn set_tile_order(&self, order: TileOrder) {
        *lock(&self.inner.order) = order;
    }

    pub fn inject(&self, fault: Fault) {
        lock(&self.inner.faults).push(fault);
    }

    pub fn clear_faults(&self) {
        lock(&self.inner.faults).clear();
    }

    pub fn stats(&self) -> StoreStats {
        self.inner.counters.snapshot()
    }
}

fn encode_level(
    level: usize,
    band: BandId,
    grid: &LevelGrid,
    options: &TilingOptions,
) -> Vec<Tile> {
    let (tile_width, tile_height) = options.tile_dimensions;
    let (offset_x, offset_y) = options.offset;
    let (width, height) = grid.dimensions;
    let cols = (width + offset_x).div_ceil(tile_width);
    let rows = (height + offset_y).div_ceil(tile_height);
    let num_pixels = tile_width as usize * tile_height as usize;

    let mut tiles = Vec::with_capacity(cols as usize * rows as usize);
    for row in 0..rows {
        for column in 0..cols {
            let mut values = Vec::with_capacity(num_pixels);
            let mut mask = vec![0_u8; num_pixels.div_ceil(8)];
            for ty in 0..tile_height {
                for tx in 0..tile_width {
                    let gx = (column * tile_width + tx).checked_sub(offset_x);
                    let gy = (row * tile_height + ty).checked_sub(offset_y);
                    let value = match (gx, gy) {
                        (Some(x), Some(y)) if x < width && y < height => Some(grid.get(x, y)),
                        _ => None,
                    };
                    let i = (ty * tile_width + tx) as usize;
                    let has_data = value.is_some_and(|v| Some(v) != options.no_data);
                    if has_data {
                        mask[i / 8] |= 0x80 >> (i % 8);
                    }
                    values.push(value.unwrap_or_default());
                }
            }
            let mut payload = encode_samples(options.cell_type, options.endian, &values);
            if options.bitmask {
                payload.extend(mask);
            }
            tiles.push(Tile {
                level,
                column,
                row,
                band,
                num_pixels,
                payload,
            });
        }
    }
    tiles
}

impl TileSource for MemoryTileStore {
    fn connect(&self) -> io::Result<Box<dyn TileConnection>> {
        if self.inner.faulty(Fault::Connect) {
            return Err(injected("connect"));
        }
        Counters::bump(&self.inner.counters.connects);
        Ok(Box::new(MemoryConnection {
            inner: self.inner.clone(),
            closed: false,
        }))
    }
}

struct MemoryConnection {
    inner: Arc<Inner>,
    closed: bool,
}

impl MemoryConnection {
    fn check_open(&self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"));
        }
        Ok(())
    }
}

impl TileConnection for MemoryConnection {
    fn describe_raster(&mut self, table: &RasterTable) -> io::Result<RasterAttributes> {
        self.check_open()?;
        Counters::bump(&self.inner.counters.describes);
        if self.inner.faulty(Fault::Describe) {
            return Err(injected("describe"));
        }
        lock(&self.inner.rasters)
            .get(table)
            .map(|r| r.attributes.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no raster {table}")))
    }

    fn query_tiles(&mut self, query: &TileQuery) -> io::Result<Box<dyn TileCursor>> {
        self.check_open()?;
        Counters::bump(&self.inner.counters.queries);
        if self.inner.faulty(Fault::Query) {
            return Err(injected("query"));
        }
        let rasters = lock(&self.inner.rasters);
        let raster = rasters.get(&query.table).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no raster {}", query.table))
        })?;
        if query.level >= raster.attributes.levels.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no level {} in {}", query.level, query.table),
            ));
        }

        let range = query.tiles;
        let mut keys: Vec<TileKey> = Vec::with_capacity(range.count() * query.bands.len());
        for row in range.min_row..=range.max_row {
            for column in range.min_col..=range.max_col {
                for band in query.bands.iter() {
                    keys.push((query.level, column, row, *band));
                }
            }
        }
        match *lock(&self.inner.order) {
            TileOrder::RowMajor => {}
            TileOrder::ColumnMajor => {
                keys.sort_by_key(|(_, column, row, band)| (*column, *row, *band))
            }
            TileOrder::Reversed => keys.reverse(),
        }
        let tiles = keys
            .into_iter()
            .map(|key| {
                raster.tiles.get(&key).cloned().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, format!("no tile {key:?}"))
                })
            })
            .collect::<io::Result<VecDeque<_>>>()?;

        Counters::bump(&self.inner.counters.cursors_opened);
        Ok(Box::new(MemoryCursor {
            inner: self.inner.clone(),
            tiles,
            served: 0,
        }))
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Counters::bump(&self.inner.counters.connection_closes);
        if self.inner.faulty(Fault::ConnectionClose) {
            return Err(injected("connection close"));
        }
        Ok(())
    }
}

struct MemoryCursor {
    inner: Arc<Inner>,
    tiles: VecDeque<Tile>,
    served: usize,
}

impl TileCursor for MemoryCursor {
    fn next_tile(&mut self) -> io::Result<Option<Tile>> {
        if self.inner.fetch_limit() == Some(self.served) {
            return Err(injected("fetch"));
        }
        let tile = self.tiles.pop_front();
        if tile.is_some() {
            self.served += 1;
            Counters::bump(&self.inner.counters.tiles_served);
        }
        Ok(tile)
    }

    fn close(&mut self) -> io::Result<()> {
        self.tiles.clear();
        Counters::bump(&self.inner.counters.cursor_closes);
        if self.inner.faulty(Fault::CursorClose) {
            return Err(injected("cursor close"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyramid::TileRange;
    use crate::raster::SampleType;

    fn store_with(
        options: &TilingOptions,
        dimensions: (u32, u32),
    ) -> (MemoryTileStore, RasterTable) {
        let mut image = RasterImage::blank(dimensions, 1, SampleType::U8);
        for y in 0..dimensions.1 {
            for x in 0..dimensions.0 {
                image.set_sample(x, y, 0, (y * dimensions.0 + x) as u8).unwrap();
            }
        }
        let store = MemoryTileStore::new();
        let table = RasterTable::new("images", "raster", 1);
        store.insert_image(table.clone(), &image, options).unwrap();
        (store, table)
    }

    #[test]
    fn tiles_every_level() {
        let options = TilingOptions::new(CellType::U8, (4, 4), Envelope::new(0.0, 0.0, 10.0, 10.0))
            .with_levels(3);
        let (store, table) = store_with(&options, (10, 10));
        let mut conn = store.connect().unwrap();
        let attributes = conn.describe_raster(&table).unwrap();
        let dims: Vec<_> = attributes.levels.iter().map(|l| l.dimensions).collect();
        assert_eq!(dims, vec![(10, 10), (5, 5), (3, 3)]);
        assert_eq!(attributes.pixel_type, 8);
        conn.close().unwrap();
        assert!(store.stats().all_released());
    }

    #[test]
    fn padding_is_masked_and_data_is_placed_after_offset() {
        let options = TilingOptions::new(CellType::U8, (4, 4), Envelope::new(0.0, 0.0, 6.0, 6.0))
            .with_offset((1, 2))
            .with_bitmask(true);
        let (store, table) = store_with(&options, (6, 6));
        let mut conn = store.connect().unwrap();
        let query = TileQuery {
            table,
            level: 0,
            tiles: TileRange::new(0, 0, 0, 0),
            bands: vec![1],
            interpolation: Default::default(),
        };
        let mut cursor = conn.query_tiles(&query).unwrap();
        let tile = cursor.next_tile().unwrap().unwrap();
        assert!(!tile.has_data(CellType::U8, 0));
        assert!(!tile.has_data(CellType::U8, 8));
        // first real pixel sits at (1, 2) in the tile
        assert!(tile.has_data(CellType::U8, 9));
        assert_eq!(tile.pixel_bytes(CellType::U8)[9], 0);
        assert_eq!(tile.pixel_bytes(CellType::U8)[10], 1);
        assert_eq!(cursor.next_tile().unwrap(), None);
        cursor.close().unwrap();
        conn.close().unwrap();
    }

    #[test]
    fn injected_faults_fail_their_call() {
        let options = TilingOptions::new(CellType::U8, (2, 2), Envelope::new(0.0, 0.0, 4.0, 4.0));
        let (store, table) = store_with(&options, (4, 4));
        store.inject(Fault::FetchAfter(1));
        let mut conn = store.connect().unwrap();
        let query = TileQuery {
            table,
            level: 0,
            tiles: TileRange::new(0, 0, 1, 1),
            bands: vec![1],
            interpolation: Default::default(),
        };
        let mut cursor = conn.query_tiles(&query).unwrap();
        assert!(cursor.next_tile().unwrap().is_some());
        assert!(cursor.next_tile().is_err());
        store.inject(Fault::ConnectionClose);
        cursor.close().unwrap();
        assert!(conn.close().is_err());
        assert_eq!(store.stats().tiles_served, 1);
        store.clear_faults();
        assert!(store.connect().is_ok());
    }

    #[test]
    fn cleared_tiles_are_empty() {
        let options = TilingOptions::new(CellType::U8, (2, 2), Envelope::new(0.0, 0.0, 4.0, 4.0));
        let (store, table) = store_with(&options, (4, 4));
        assert!(store.clear_tile(&table, 0, 1, 0, 1));
        assert!(!store.clear_tile(&table, 0, 9, 0, 1));
    }
}
