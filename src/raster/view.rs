use super::{RasterError, RasterImage, Sample, SampleType};

/// Mutable window into a [`RasterImage`]
#[derive(Debug)]
pub struct RasterView<'a> {
    image: &'a mut RasterImage,
    origin: (u32, u32),
    dimensions: (u32, u32),
}

impl<'a> RasterView<'a> {
    pub(super) fn new(
        image: &'a mut RasterImage,
        origin: (u32, u32),
        dimensions: (u32, u32),
    ) -> Result<Self, RasterError> {
        image.check_buffer()?;
        let right = origin.0 as u64 + dimensions.0 as u64;
        let bottom = origin.1 as u64 + dimensions.1 as u64;
        if right > image.dimensions.0 as u64 || bottom > image.dimensions.1 as u64 {
            return Err(RasterError::OutOfBounds((
                (right.min(u32::MAX as u64) as u32, bottom.min(u32::MAX as u64) as u32),
                image.dimensions,
            )));
        }
        Ok(Self {
            image,
            origin,
            dimensions,
        })
    }

    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    pub fn height(&self) -> u32 {
        self.dimensions.1
    }

    pub fn origin(&self) -> (u32, u32) {
        self.origin
    }

    pub fn bands(&self) -> usize {
        self.image.bands
    }

    pub fn sample_type(&self) -> SampleType {
        self.image.sample_type()
    }

    pub fn put<T: Sample>(
        &mut self,
        x: u32,
        y: u32,
        band: usize,
        value: T,
    ) -> Result<(), RasterError> {
        if x >= self.dimensions.0 || y >= self.dimensions.1 {
            return Err(RasterError::OutOfBounds(((x, y), self.dimensions)));
        }
        if band >= self.image.bands {
            return Err(RasterError::BandOutOfRange((band, self.image.bands)));
        }
        self.image
            .set_sample(self.origin.0 + x, self.origin.1 + y, band, value)
    }

    pub fn put_row<T: Sample>(
        &mut self,
        x: u32,
        y: u32,
        band: usize,
        values: &[T],
    ) -> Result<(), RasterError> {
        let n = values.len() as u32;
        if x + n > self.dimensions.0 || y >= self.dimensions.1 {
            return Err(RasterError::OutOfBounds(((x + n, y), self.dimensions)));
        }
        if band >= self.image.bands {
            return Err(RasterError::BandOutOfRange((band, self.image.bands)));
        }
        let bands = self.image.bands;
        let stride = self.image.dimensions.0 as usize;
        let pixel = (self.origin.1 + y) as usize * stride + (self.origin.0 + x) as usize;
        let start = pixel * bands + band;
        let found = self.image.sample_type();
        let samples = T::samples_mut(&mut self.image.buffer)
            .ok_or(RasterError::SampleTypeMismatch((T::SAMPLE_TYPE, found)))?;
        for (i, value) in values.iter().enumerate() {
            samples[start + i * bands] = *value;
        }
        Ok(())
    }

    pub fn fill<T: Sample>(&mut self, band: usize, value: T) -> Result<(), RasterError> {
        let row = vec![value; self.dimensions.0 as usize];
        for y in 0..self.dimensions.1 {
            self.put_row(0, y, band, &row)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::SampleBuffer;

    #[test]
    fn writes_relative_to_origin() {
        let mut img = RasterImage::blank((4, 4), 1, SampleType::U8);
        {
            let mut view = img.view_mut((1, 2), (2, 2)).unwrap();
            view.put_row(0, 1, 0, &[9_u8, 8]).unwrap();
            view.put(0, 0, 0, 5_u8).unwrap();
            assert!(view.put(2, 0, 0, 1_u8).is_err());
            assert!(view.put_row(1, 0, 0, &[1_u8, 1]).is_err());
        }
        assert_eq!(img.get_sample::<u8>(1, 2, 0), Some(5));
        assert_eq!(img.get_sample::<u8>(1, 3, 0), Some(9));
        assert_eq!(img.get_sample::<u8>(2, 3, 0), Some(8));
        assert_eq!(img.get_sample::<u8>(3, 3, 0), Some(0));
    }

    #[test]
    fn rejects_window_past_parent() {
        let mut img = RasterImage::blank((4, 4), 1, SampleType::U8);
        assert!(img.view_mut((3, 0), (2, 1)).is_err());
        assert!(img.view_mut((0, 0), (4, 4)).is_ok());
    }

    #[test]
    fn rejects_buffer_out_of_step_with_dimensions() {
        let mut img = RasterImage::blank((4, 4), 2, SampleType::U8);
        img.buffer = SampleBuffer::U8(vec![0; 5]);
        assert!(matches!(
            img.view_mut((0, 0), (1, 1)),
            Err(RasterError::BufferSize((5, (4, 4), 2)))
        ));
        assert!(img.fill_band(0, 1_u8).is_err());
    }

    #[test]
    fn fill_stays_inside_window() {
        let mut img = RasterImage::blank((3, 3), 2, SampleType::I16);
        img.view_mut((1, 1), (2, 2)).unwrap().fill(1, -1_i16).unwrap();
        assert_eq!(img.get_sample::<i16>(1, 1, 1), Some(-1));
        assert_eq!(img.get_sample::<i16>(2, 2, 1), Some(-1));
        assert_eq!(img.get_sample::<i16>(0, 0, 1), Some(0));
        assert_eq!(img.get_sample::<i16>(1, 1, 0), Some(0));
    }
}
