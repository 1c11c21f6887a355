#![cfg(feature = "image")]

use super::{RasterError, RasterImage, SampleBuffer};
use image::{DynamicImage, ImageBuffer};

impl TryFrom<RasterImage> for DynamicImage {
    type Error = RasterError;

    fn try_from(raster: RasterImage) -> Result<Self, Self::Error> {
        let RasterImage {
            dimensions: (width, height),
            bands,
            buffer,
        } = raster;

        let not_supported = |buffer: &SampleBuffer| {
            RasterError::NotSupported(format!(
                "{bands} band {:?} raster has no image equivalent",
                buffer.sample_type()
            ))
        };

        match (bands, buffer) {
            (1, SampleBuffer::U8(v)) => {
                ImageBuffer::from_raw(width, height, v).map(DynamicImage::ImageLuma8)
            }
            (2, SampleBuffer::U8(v)) => {
                ImageBuffer::from_raw(width, height, v).map(DynamicImage::ImageLumaA8)
            }
            (3, SampleBuffer::U8(v)) => {
                ImageBuffer::from_raw(width, height, v).map(DynamicImage::ImageRgb8)
            }
            (4, SampleBuffer::U8(v)) => {
                ImageBuffer::from_raw(width, height, v).map(DynamicImage::ImageRgba8)
            }
            (1, SampleBuffer::U16(v)) => {
                ImageBuffer::from_raw(width, height, v).map(DynamicImage::ImageLuma16)
            }
            (2, SampleBuffer::U16(v)) => {
                ImageBuffer::from_raw(width, height, v).map(DynamicImage::ImageLumaA16)
            }
            (3, SampleBuffer::U16(v)) => {
                ImageBuffer::from_raw(width, height, v).map(DynamicImage::ImageRgb16)
            }
            (4, SampleBuffer::U16(v)) => {
                ImageBuffer::from_raw(width, height, v).map(DynamicImage::ImageRgba16)
            }
            (3, SampleBuffer::F32(v)) => {
                ImageBuffer::from_raw(width, height, v).map(DynamicImage::ImageRgb32F)
            }
            (4, SampleBuffer::F32(v)) => {
                ImageBuffer::from_raw(width, height, v).map(DynamicImage::ImageRgba32F)
            }
            (_, other) => return Err(not_supported(&other)),
        }
        .ok_or(RasterError::BufferSize((
            width as usize * height as usize * bands,
            (width, height),
            bands,
        )))
    }
}

impl RasterImage {
    pub fn into_image(self) -> Result<DynamicImage, RasterError> {
        self.try_into()
    }
}
