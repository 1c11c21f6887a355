use super::SampleType;
use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt::Display;

/// Native pixel encoding of a stored raster.
///
/// The discriminant is the backing store's pixel-type code: the bit depth,
/// plus 1 for signed integers and 2 for floating point.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u32)]
pub enum CellType {
    Bit1 = 1,
    Bit4 = 4,
    U8 = 8,
    I8 = 9,
    U16 = 16,
    I16 = 17,
    U32 = 32,
    I32 = 33,
    F32 = 34,
    F64 = 66,

    #[num_enum(default)]
    Unknown = 0,
}

impl CellType {
    pub const ALL: [CellType; 10] = [
        CellType::Bit1,
        CellType::Bit4,
        CellType::U8,
        CellType::I8,
        CellType::U16,
        CellType::I16,
        CellType::U32,
        CellType::I32,
        CellType::F32,
        CellType::F64,
    ];

    pub fn from_code(code: u32) -> Self {
        Self::from_primitive(code)
    }

    pub fn code(&self) -> u32 {
        (*self).into()
    }

    pub fn bits_per_sample(&self) -> u32 {
        match self {
            Self::Bit1 => 1,
            Self::Bit4 => 4,
            Self::U8 | Self::I8 => 8,
            Self::U16 | Self::I16 => 16,
            Self::U32 | Self::I32 | Self::F32 => 32,
            Self::F64 => 64,
            Self::Unknown => 0,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            Self::I8 | Self::I16 | Self::I32 | Self::F32 | Self::F64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    pub fn is_sub_byte(&self) -> bool {
        matches!(self, Self::Bit1 | Self::Bit4)
    }

    pub fn sample_type(&self) -> Option<SampleType> {
        Some(match self {
            Self::Bit1 | Self::Bit4 | Self::U8 => SampleType::U8,
            Self::I8 => SampleType::I8,
            Self::U16 => SampleType::U16,
            Self::I16 => SampleType::I16,
            Self::U32 => SampleType::U32,
            Self::I32 => SampleType::I32,
            Self::F32 => SampleType::F32,
            Self::F64 => SampleType::F64,
            Self::Unknown => return None,
        })
    }

    /// Bytes of packed pixel data for `pixels` samples, excluding any bitmask
    pub fn payload_len(&self, pixels: usize) -> usize {
        (pixels * self.bits_per_sample() as usize).div_ceil(8)
    }
}

impl Display for CellType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_float() {
            "float"
        } else if self.is_signed() {
            "signed"
        } else {
            "unsigned"
        };
        write!(f, "{}bit {kind}", self.bits_per_sample())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for cell_type in CellType::ALL {
            assert_eq!(CellType::from_code(cell_type.code()), cell_type);
        }
        assert_eq!(CellType::from_code(12345), CellType::Unknown);
    }

    #[test]
    fn payload_len_rounds_up_packed_bits() {
        assert_eq!(CellType::Bit1.payload_len(9), 2);
        assert_eq!(CellType::Bit4.payload_len(3), 2);
        assert_eq!(CellType::U16.payload_len(3), 6);
        assert_eq!(CellType::F64.payload_len(2), 16);
    }

    #[test]
    fn sample_semantics() {
        assert!(CellType::I16.is_signed());
        assert!(!CellType::U32.is_signed());
        assert!(CellType::F32.is_float());
        assert_eq!(CellType::Bit4.sample_type(), Some(SampleType::U8));
        assert!(CellType::Bit4.is_sub_byte());
        assert!(!CellType::U8.is_sub_byte());
        assert_eq!(CellType::Unknown.sample_type(), None);
    }
}
