use eio::{FromBytes, ReadExt, ToBytes};
use std::io::Result;

/// Byte order of multi-byte samples inside a tile payload.
#[derive(PartialEq, Clone, Copy, Debug, Default)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

impl Endian {
    pub fn decode<const N: usize, T: FromBytes<N>>(&self, bytes: [u8; N]) -> Result<T> {
        match self {
            Endian::Big => bytes.as_slice().read_be(),
            Endian::Little => bytes.as_slice().read_le(),
        }
    }

    pub fn decode_at<const N: usize, T: FromBytes<N>>(
        &self,
        bytes: &[u8],
        index: usize,
    ) -> Option<T> {
        let start = index * N;
        let chunk: [u8; N] = bytes.get(start..start + N)?.try_into().ok()?;
        self.decode(chunk).ok()
    }

    pub fn encode<const N: usize, T: ToBytes<N>>(&self, value: T) -> [u8; N] {
        match self {
            Endian::Big => value.to_be_bytes(),
            Endian::Little => value.to_le_bytes(),
        }
    }

    pub fn encode_all<const N: usize, T: ToBytes<N> + Copy>(&self, values: &[T]) -> Vec<u8> {
        values.iter().flat_map(|v| self.encode(*v)).collect()
    }
}
