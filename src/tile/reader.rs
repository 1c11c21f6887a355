use super::{bits, Tile};
use crate::raster::CellType;
use crate::store::{finish, TileConnection, TileCursor, TileQuery};
use crate::SdeRasterResult;
use std::io::{self, Read};
use tracing::*;

#[derive(Debug)]
enum State {
    Empty,
    Current { tile: Tile, position: usize },
    Exhausted,
}

/// Sequential reader over the tiles of one query
pub struct TileReader {
    connection: Option<Box<dyn TileConnection>>,
    cursor: Option<Box<dyn TileCursor>>,
    cell_type: CellType,
    state: State,
    tiles_read: usize,
}

impl TileReader {
    pub fn open(
        mut connection: Box<dyn TileConnection>,
        query: &TileQuery,
        cell_type: CellType,
    ) -> SdeRasterResult<Self> {
        debug!(
            "querying {} level {} {} bands {:?}",
            query.table, query.level, query.tiles, query.bands
        );
        match connection.query_tiles(query) {
            Ok(cursor) => Ok(Self {
                connection: Some(connection),
                cursor: Some(cursor),
                cell_type,
                state: State::Empty,
                tiles_read: 0,
            }),
            Err(e) => finish(Err(e.into()), connection.close()),
        }
    }

    pub fn tiles_read(&self) -> usize {
        self.tiles_read
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, State::Exhausted)
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_none() && self.cursor.is_none()
    }

    /// Next whole tile, discarding any partly streamed one
    pub fn next_tile(&mut self) -> SdeRasterResult<Option<Tile>> {
        if let State::Current { .. } = self.state {
            self.state = State::Empty;
        }
        match self.fetch()? {
            Some(tile) => {
                self.state = State::Empty;
                Ok(Some(tile))
            }
            None => Ok(None),
        }
    }

    fn fetch(&mut self) -> io::Result<Option<Tile>> {
        if matches!(self.state, State::Exhausted) {
            return Ok(None);
        }
        let Some(cursor) = self.cursor.as_mut() else {
            self.state = State::Exhausted;
            return Ok(None);
        };
        match cursor.next_tile()? {
            Some(tile) => {
                self.tiles_read += 1;
                trace!("fetched {tile}");
                Ok(Some(tile))
            }
            None => {
                debug!("query exhausted after {} tiles", self.tiles_read);
                self.state = State::Exhausted;
                Ok(None)
            }
        }
    }

    /// Release the cursor, then the connection
    ///
    /// Both are attempted even if the first fails; the first failure is
    /// returned. Closing twice is a no-op.
    pub fn close(&mut self) -> io::Result<()> {
        let cursor = self.cursor.take().map(|mut c| c.close()).unwrap_or(Ok(()));
        let connection = self
            .connection
            .take()
            .map(|mut c| c.close())
            .unwrap_or(Ok(()));
        self.state = State::Exhausted;
        cursor.and(connection)
    }

    /// Stream one byte per sample instead of packed payload bytes
    pub fn unpacked(mut self) -> io::Result<UnpackedSamples> {
        if !self.cell_type.is_sub_byte() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} samples are not bit-packed", self.cell_type),
            ));
        }
        if let State::Current { .. } = self.state {
            self.state = State::Empty;
        }
        Ok(UnpackedSamples {
            inner: self,
            samples: Vec::new(),
            position: 0,
        })
    }
}

impl Read for TileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let cell_type = self.cell_type;
        loop {
            match &mut self.state {
                State::Exhausted => return Ok(0),
                State::Empty => match self.fetch()? {
                    Some(tile) => self.state = State::Current { tile, position: 0 },
                    None => return Ok(0),
                },
                State::Current { tile, position } => {
                    let bytes = tile.pixel_bytes(cell_type);
                    if *position >= bytes.len() {
                        self.state = State::Empty;
                        continue;
                    }
                    let n = buf.len().min(bytes.len() - *position);
                    buf[..n].copy_from_slice(&bytes[*position..*position + n]);
                    *position += n;
                    return Ok(n);
                }
            }
        }
    }
}

/// Byte-per-sample stream over the tiles of a bit-packed query
///
/// Each tile yields exactly `num_pixels` samples. The pad bits that complete
/// a tile's last payload byte and any trailing bitmask are skipped.
pub struct UnpackedSamples {
    inner: TileReader,
    samples: Vec<u8>,
    position: usize,
}

impl UnpackedSamples {
    pub fn into_inner(self) -> TileReader {
        self.inner
    }

    pub fn close(&mut self) -> io::Result<()> {
        self.samples.clear();
        self.position = 0;
        self.inner.close()
    }

    fn unpack(&mut self, tile: &Tile) -> io::Result<()> {
        let cell_type = self.inner.cell_type;
        let bits = cell_type.bits_per_sample();
        let pixels = tile.pixel_bytes(cell_type);
        self.samples.clear();
        self.position = 0;
        if tile.is_empty() {
            return Ok(());
        }
        for index in 0..tile.num_pixels {
            let Some(sample) = bits::packed_sample(pixels, index, bits) else {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "{tile} holds {} of {} payload bytes",
                        pixels.len(),
                        cell_type.payload_len(tile.num_pixels)
                    ),
                ));
            };
            self.samples.push(sample);
        }
        Ok(())
    }
}

impl Read for UnpackedSamples {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.position >= self.samples.len() {
            match self.inner.fetch()? {
                Some(tile) => self.unpack(&tile)?,
                None => return Ok(0),
            }
        }
        let n = buf.len().min(self.samples.len() - self.position);
        buf[..n].copy_from_slice(&self.samples[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

impl Drop for TileReader {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(e) = self.close() {
                warn!("failed to release tile query on drop: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyramid::TileRange;
    use crate::store::{RasterAttributes, RasterTable};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Calls {
        cursor_closes: AtomicUsize,
        connection_closes: AtomicUsize,
    }

    struct ListCursor {
        tiles: Vec<Tile>,
        calls: Arc<Calls>,
        fail_close: bool,
    }

    impl TileCursor for ListCursor {
        fn next_tile(&mut self) -> io::Result<Option<Tile>> {
            if self.tiles.is_empty() {
                Ok(None)
            } else {
                Ok(Some(self.tiles.remove(0)))
            }
        }

        fn close(&mut self) -> io::Result<()> {
            self.calls.cursor_closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err(io::Error::other("cursor close"))
            } else {
                Ok(())
            }
        }
    }

    struct ListConnection {
        tiles: Vec<Tile>,
        calls: Arc<Calls>,
        fail_query: bool,
        fail_cursor_close: bool,
    }

    impl TileConnection for ListConnection {
        fn describe_raster(&mut self, _table: &RasterTable) -> io::Result<RasterAttributes> {
            Err(io::Error::other("not described"))
        }

        fn query_tiles(&mut self, _query: &TileQuery) -> io::Result<Box<dyn TileCursor>> {
            if self.fail_query {
                return Err(io::Error::other("query"));
            }
            Ok(Box::new(ListCursor {
                tiles: std::mem::take(&mut self.tiles),
                calls: self.calls.clone(),
                fail_close: self.fail_cursor_close,
            }))
        }

        fn close(&mut self) -> io::Result<()> {
            self.calls.connection_closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn tile(column: u32, payload: Vec<u8>) -> Tile {
        Tile {
            level: 0,
            column,
            row: 0,
            band: 1,
            num_pixels: 4,
            payload,
        }
    }

    fn query() -> TileQuery {
        TileQuery {
            table: RasterTable::new("t", "raster", 1),
            level: 0,
            tiles: TileRange::new(0, 0, 2, 0),
            bands: vec![1],
            interpolation: Default::default(),
        }
    }

    fn connection(tiles: Vec<Tile>, calls: &Arc<Calls>) -> Box<ListConnection> {
        Box::new(ListConnection {
            tiles,
            calls: calls.clone(),
            fail_query: false,
            fail_cursor_close: false,
        })
    }

    #[test]
    fn streams_pixel_bytes_across_tiles() {
        let calls = Arc::new(Calls::default());
        let tiles = vec![
            tile(0, vec![1, 2, 3, 4, 0xFF]), // trailing mask byte
            tile(1, vec![]),
            tile(2, vec![5, 6, 7, 8]),
        ];
        let mut reader =
            TileReader::open(connection(tiles, &calls), &query(), CellType::U8).unwrap();
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(reader.is_exhausted());
        assert_eq!(reader.tiles_read(), 3);
        let mut more = [0_u8; 4];
        assert_eq!(reader.read(&mut more).unwrap(), 0);
    }

    #[test]
    fn short_buffers_walk_through_a_tile() {
        let calls = Arc::new(Calls::default());
        let tiles = vec![tile(0, vec![1, 2, 3, 4])];
        let mut reader =
            TileReader::open(connection(tiles, &calls), &query(), CellType::U8).unwrap();
        let mut buf = [0_u8; 3];
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 4);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn next_tile_yields_in_store_order() {
        let calls = Arc::new(Calls::default());
        let tiles = vec![tile(2, vec![0; 4]), tile(0, vec![0; 4])];
        let mut reader =
            TileReader::open(connection(tiles, &calls), &query(), CellType::U8).unwrap();
        assert_eq!(reader.next_tile().unwrap().map(|t| t.column), Some(2));
        assert_eq!(reader.next_tile().unwrap().map(|t| t.column), Some(0));
        assert_eq!(reader.next_tile().unwrap(), None);
        assert_eq!(reader.next_tile().unwrap(), None);
    }

    #[test]
    fn close_is_idempotent_and_releases_both() {
        let calls = Arc::new(Calls::default());
        let mut reader =
            TileReader::open(connection(vec![], &calls), &query(), CellType::U8).unwrap();
        reader.close().unwrap();
        reader.close().unwrap();
        drop(reader);
        assert_eq!(calls.cursor_closes.load(Ordering::SeqCst), 1);
        assert_eq!(calls.connection_closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases_unclosed_reader() {
        let calls = Arc::new(Calls::default());
        let reader = TileReader::open(connection(vec![], &calls), &query(), CellType::U8).unwrap();
        drop(reader);
        assert_eq!(calls.connection_closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_query_still_closes_connection() {
        let calls = Arc::new(Calls::default());
        let mut conn = connection(vec![], &calls);
        conn.fail_query = true;
        let result = TileReader::open(conn, &query(), CellType::U8);
        assert!(matches!(result, Err(crate::SdeRasterError::DataSource(_))));
        assert_eq!(calls.connection_closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cursor_close_failure_is_reported_after_connection_close() {
        let calls = Arc::new(Calls::default());
        let mut conn = connection(vec![], &calls);
        conn.fail_cursor_close = true;
        let mut reader = TileReader::open(conn, &query(), CellType::U8).unwrap();
        assert!(reader.close().is_err());
        assert_eq!(calls.connection_closes.load(Ordering::SeqCst), 1);
        assert!(reader.close().is_ok());
    }

    fn packed(column: u32, num_pixels: usize, payload: Vec<u8>) -> Tile {
        Tile {
            num_pixels,
            ..tile(column, payload)
        }
    }

    fn unpack_all(tiles: Vec<Tile>, cell_type: CellType) -> io::Result<Vec<u8>> {
        let calls = Arc::new(Calls::default());
        let reader = TileReader::open(connection(tiles, &calls), &query(), cell_type).unwrap();
        let mut samples = reader.unpacked()?;
        let mut out = Vec::new();
        samples.read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn one_bit_stream_unpacks_per_sample() {
        let out = unpack_all(vec![packed(0, 3, vec![0b1110_0000])], CellType::Bit1).unwrap();
        assert_eq!(out, vec![1, 1, 1]);
    }

    #[test]
    fn pad_bits_never_leak_between_tiles() {
        let tiles = vec![
            packed(0, 3, vec![0b1110_0000]),
            packed(1, 0, vec![]),
            packed(2, 3, vec![0b1111_1111, 0b0100_0000]), // pad bits set, then mask
        ];
        let out = unpack_all(tiles, CellType::Bit1).unwrap();
        assert_eq!(out, vec![1, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn four_bit_stream_unpacks_per_sample() {
        let out = unpack_all(vec![packed(0, 3, vec![0xAB, 0xC0])], CellType::Bit4).unwrap();
        assert_eq!(out, vec![0xA, 0xB, 0xC]);
    }

    #[test]
    fn unpacked_short_reads_resume_mid_tile() {
        let calls = Arc::new(Calls::default());
        let tiles = vec![packed(0, 3, vec![0xAB, 0xC0]), packed(1, 1, vec![0x70])];
        let reader = TileReader::open(connection(tiles, &calls), &query(), CellType::Bit4).unwrap();
        let mut samples = reader.unpacked().unwrap();
        let mut buf = [0_u8; 2];
        assert_eq!(samples.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [0xA, 0xB]);
        assert_eq!(samples.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 0xC);
        assert_eq!(samples.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 0x7);
        assert_eq!(samples.read(&mut buf).unwrap(), 0);
        samples.close().unwrap();
        assert!(samples.into_inner().is_closed());
        assert_eq!(calls.connection_closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn truncated_packed_tile_is_an_error() {
        let err = unpack_all(vec![packed(0, 12, vec![0xFF])], CellType::Bit1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn whole_byte_cell_types_are_not_unpacked() {
        let calls = Arc::new(Calls::default());
        let reader = TileReader::open(connection(vec![], &calls), &query(), CellType::U8).unwrap();
        assert!(reader.unpacked().is_err());
        assert_eq!(calls.connection_closes.load(Ordering::SeqCst), 1);
    }
}
