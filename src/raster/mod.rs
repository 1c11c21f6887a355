use num_traits::NumCast;
use std::fmt::{Debug, Display};

mod cell_type;
mod image;
mod view;

pub use cell_type::CellType;
pub use view::RasterView;

#[derive(Debug)]
pub enum RasterError {
    BufferSize((usize, (u32, u32), usize)),
    OutOfBounds(((u32, u32), (u32, u32))),
    SampleTypeMismatch((SampleType, SampleType)),
    BandOutOfRange((usize, usize)),
    NotSupported(String),
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum SampleType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SampleBuffer {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl SampleBuffer {
    pub fn zeroed(sample_type: SampleType, len: usize) -> Self {
        match sample_type {
            SampleType::U8 => Self::U8(vec![0; len]),
            SampleType::I8 => Self::I8(vec![0; len]),
            SampleType::U16 => Self::U16(vec![0; len]),
            SampleType::I16 => Self::I16(vec![0; len]),
            SampleType::U32 => Self::U32(vec![0; len]),
            SampleType::I32 => Self::I32(vec![0; len]),
            SampleType::F32 => Self::F32(vec![0.0; len]),
            SampleType::F64 => Self::F64(vec![0.0; len]),
        }
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            Self::U8(_) => SampleType::U8,
            Self::I8(_) => SampleType::I8,
            Self::U16(_) => SampleType::U16,
            Self::I16(_) => SampleType::I16,
            Self::U32(_) => SampleType::U32,
            Self::I32(_) => SampleType::I32,
            Self::F32(_) => SampleType::F32,
            Self::F64(_) => SampleType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::I8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait Sample: Copy + Default + PartialEq + Debug + NumCast {
    const SAMPLE_TYPE: SampleType;

    fn samples(buffer: &SampleBuffer) -> Option<&[Self]>;
    fn samples_mut(buffer: &mut SampleBuffer) -> Option<&mut [Self]>;
}

macro_rules! impl_sample {
    ($t:ty, $variant:ident) => {
        impl Sample for $t {
            const SAMPLE_TYPE: SampleType = SampleType::$variant;

            fn samples(buffer: &SampleBuffer) -> Option<&[Self]> {
                match buffer {
                    SampleBuffer::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }

            fn samples_mut(buffer: &mut SampleBuffer) -> Option<&mut [Self]> {
                match buffer {
                    SampleBuffer::$variant(v) => Some(v.as_mut_slice()),
                    _ => None,
                }
            }
        }
    };
}

impl_sample!(u8, U8);
impl_sample!(i8, I8);
impl_sample!(u16, U16);
impl_sample!(i16, I16);
impl_sample!(u32, U32);
impl_sample!(i32, I32);
impl_sample!(f32, F32);
impl_sample!(f64, F64);

/// Pixel-interleaved multi-band image
#[derive(Clone, Debug, PartialEq)]
pub struct RasterImage {
    pub dimensions: (u32, u32),
    pub bands: usize,
    pub buffer: SampleBuffer,
}

impl RasterImage {
    pub fn new(
        dimensions: (u32, u32),
        bands: usize,
        buffer: SampleBuffer,
    ) -> Result<Self, RasterError> {
        let image = Self {
            dimensions,
            bands,
            buffer,
        };
        image.check_buffer()?;
        Ok(image)
    }

    pub fn blank(dimensions: (u32, u32), bands: usize, sample_type: SampleType) -> Self {
        let len = dimensions.0 as usize * dimensions.1 as usize * bands;
        Self {
            dimensions,
            bands,
            buffer: SampleBuffer::zeroed(sample_type, len),
        }
    }

    pub fn required_len(&self) -> usize {
        self.dimensions.0 as usize * self.dimensions.1 as usize * self.bands
    }

    pub fn check_buffer(&self) -> Result<(), RasterError> {
        if self.buffer.len() != self.required_len() {
            return Err(RasterError::BufferSize((
                self.buffer.len(),
                self.dimensions,
                self.bands,
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    pub fn sample_type(&self) -> SampleType {
        self.buffer.sample_type()
    }

    fn index(&self, x: u32, y: u32, band: usize) -> Option<usize> {
        if x >= self.dimensions.0 || y >= self.dimensions.1 || band >= self.bands {
            return None;
        }
        Some((y as usize * self.dimensions.0 as usize + x as usize) * self.bands + band)
    }

    pub fn get_sample<T: Sample>(&self, x: u32, y: u32, band: usize) -> Option<T> {
        let i = self.index(x, y, band)?;
        T::samples(&self.buffer)?.get(i).copied()
    }

    pub fn get_f64(&self, x: u32, y: u32, band: usize) -> Option<f64> {
        match &self.buffer {
            SampleBuffer::U8(_) => self.get_sample::<u8>(x, y, band).map(<f64 as From<_>>::from),
            SampleBuffer::I8(_) => self.get_sample::<i8>(x, y, band).map(<f64 as From<_>>::from),
            SampleBuffer::U16(_) => self.get_sample::<u16>(x, y, band).map(<f64 as From<_>>::from),
            SampleBuffer::I16(_) => self.get_sample::<i16>(x, y, band).map(<f64 as From<_>>::from),
            SampleBuffer::U32(_) => self.get_sample::<u32>(x, y, band).map(<f64 as From<_>>::from),
            SampleBuffer::I32(_) => self.get_sample::<i32>(x, y, band).map(<f64 as From<_>>::from),
            SampleBuffer::F32(_) => self.get_sample::<f32>(x, y, band).map(<f64 as From<_>>::from),
            SampleBuffer::F64(_) => self.get_sample::<f64>(x, y, band),
        }
    }

    pub fn set_sample<T: Sample>(
        &mut self,
        x: u32,
        y: u32,
        band: usize,
        value: T,
    ) -> Result<(), RasterError> {
        let Some(i) = self.index(x, y, band) else {
            return Err(RasterError::OutOfBounds(((x, y), self.dimensions)));
        };
        let (found, len) = (self.sample_type(), self.buffer.len());
        let samples = T::samples_mut(&mut self.buffer)
            .ok_or(RasterError::SampleTypeMismatch((T::SAMPLE_TYPE, found)))?;
        let sample = samples
            .get_mut(i)
            .ok_or(RasterError::BufferSize((len, self.dimensions, self.bands)))?;
        *sample = value;
        Ok(())
    }

    /// Set (x, y, band) from an `f64`, which must fit the buffer type
    pub fn set_f64(&mut self, x: u32, y: u32, band: usize, value: f64) -> Result<(), RasterError> {
        fn cast<T: Sample>(value: f64) -> Result<T, RasterError> {
            <T as NumCast>::from(value).ok_or_else(|| {
                RasterError::NotSupported(format!("{value} does not fit {:?}", T::SAMPLE_TYPE))
            })
        }
        match self.sample_type() {
            SampleType::U8 => self.set_sample(x, y, band, cast::<u8>(value)?),
            SampleType::I8 => self.set_sample(x, y, band, cast::<i8>(value)?),
            SampleType::U16 => self.set_sample(x, y, band, cast::<u16>(value)?),
            SampleType::I16 => self.set_sample(x, y, band, cast::<i16>(value)?),
            SampleType::U32 => self.set_sample(x, y, band, cast::<u32>(value)?),
            SampleType::I32 => self.set_sample(x, y, band, cast::<i32>(value)?),
            SampleType::F32 => self.set_sample(x, y, band, cast::<f32>(value)?),
            SampleType::F64 => self.set_sample(x, y, band, value),
        }
    }

    pub fn band_samples<T: Sample>(&self, band: usize) -> Option<Vec<T>> {
        if band >= self.bands {
            return None;
        }
        let samples = T::samples(&self.buffer)?;
        Some(samples.iter().skip(band).step_by(self.bands).copied().collect())
    }

    pub fn fill_band<T: Sample>(&mut self, band: usize, value: T) -> Result<(), RasterError> {
        let dimensions = self.dimensions;
        self.view_mut((0, 0), dimensions)?.fill(band, value)
    }

    pub fn view_mut(
        &mut self,
        origin: (u32, u32),
        dimensions: (u32, u32),
    ) -> Result<RasterView<'_>, RasterError> {
        RasterView::new(self, origin, dimensions)
    }
}

impl Display for RasterImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RasterImage({}x{}, {} bands, {:?})",
            self.dimensions.0,
            self.dimensions.1,
            self.bands,
            self.sample_type()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaves_bands() {
        let mut img = RasterImage::blank((3, 2), 2, SampleType::U16);
        img.set_sample(2, 1, 1, 500_u16).unwrap();
        img.set_sample(0, 0, 0, 7_u16).unwrap();
        match &img.buffer {
            SampleBuffer::U16(v) => {
                assert_eq!(v[0], 7);
                assert_eq!(v[(1 * 3 + 2) * 2 + 1], 500);
            }
            other => panic!("unexpected buffer {other:?}"),
        }
        assert_eq!(img.get_f64(2, 1, 1), Some(500.0));
        assert_eq!(img.band_samples::<u16>(1).unwrap(), vec![0, 0, 0, 0, 0, 500]);
    }

    #[test]
    fn rejects_wrong_sample_type_and_bounds() {
        let mut img = RasterImage::blank((2, 2), 1, SampleType::F32);
        assert!(matches!(
            img.set_sample(0, 0, 0, 1_u8),
            Err(RasterError::SampleTypeMismatch((SampleType::U8, SampleType::F32)))
        ));
        assert!(matches!(
            img.set_sample(2, 0, 0, 1.0_f32),
            Err(RasterError::OutOfBounds(_))
        ));
        assert_eq!(img.get_sample::<f32>(0, 0, 1), None);
    }

    #[test]
    fn new_checks_buffer_length() {
        let ok = RasterImage::new((2, 2), 1, SampleBuffer::I8(vec![0; 4]));
        assert!(ok.is_ok());
        let bad = RasterImage::new((2, 2), 2, SampleBuffer::I8(vec![0; 4]));
        assert!(matches!(bad, Err(RasterError::BufferSize((4, (2, 2), 2)))));

        let mut short = RasterImage::blank((2, 2), 2, SampleType::I8);
        short.buffer = SampleBuffer::I8(vec![0; 3]);
        assert!(short.check_buffer().is_err());
        assert_eq!(short.get_sample::<i8>(1, 1, 1), None);
        assert!(matches!(
            short.set_sample(1, 1, 1, 5_i8),
            Err(RasterError::BufferSize((3, (2, 2), 2)))
        ));
    }
}
