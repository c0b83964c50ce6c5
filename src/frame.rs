use crate::error::GeometryError;
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

/// Shape of every frame in a run: height x width x channels scalar samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl FrameGeometry {
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    /// Colour geometry as discovered from a camera
    pub fn rgb(height: usize, width: usize) -> Self {
        Self::new(height, width, 3)
    }

    /// Number of scalar samples in one flattened frame
    pub fn samples(&self) -> usize {
        self.height * self.width * self.channels
    }

    /// Size of one frame in bytes, `None` if it overflows `usize`
    pub fn checked_bytes(&self) -> Option<usize> {
        self.height
            .checked_mul(self.width)?
            .checked_mul(self.channels)?
            .checked_mul(std::mem::size_of::<f32>())
    }

    /// Rejects empty shapes and shapes whose byte size overflows.
    /// `samples()` is exact for any geometry that passes.
    pub fn validate(&self) -> Result<(), GeometryError> {
        match self.checked_bytes() {
            Some(0) => Err(GeometryError::Empty {
                height: self.height,
                width: self.width,
                channels: self.channels,
            }),
            Some(_) => Ok(()),
            None => Err(GeometryError::TooLarge {
                height: self.height,
                width: self.width,
                channels: self.channels,
            }),
        }
    }
}

impl std::fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.channels)
    }
}

/// One captured image as a flat run of samples. No header, no timestamp:
/// a frame is identified only by the slot it occupies.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    samples: Vec<f32>,
}

impl Frame {
    pub fn zeroed(len: usize) -> Self {
        Self {
            samples: vec![0.0; len],
        }
    }

    pub fn from_samples(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    /// Frame with every sample set to `value`
    pub fn filled(len: usize, value: f32) -> Self {
        Self {
            samples: vec![value; len],
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    /// Overwrite this frame with `src`, resizing first if the lengths differ
    pub fn copy_from(&mut self, src: &[f32]) {
        if self.samples.len() != src.len() {
            self.samples.resize(src.len(), 0.0);
        }
        self.samples.copy_from_slice(src);
    }
}

/// A frame reshaped to its geometry and converted to 8-bit samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    geometry: FrameGeometry,
    data: Vec<u8>,
}

impl Image {
    /// Reshape a flat frame into `geometry`. Samples are saturated into `0..=255`.
    pub fn reshape(frame: &Frame, geometry: FrameGeometry) -> Result<Self, GeometryError> {
        geometry.validate()?;
        if frame.len() != geometry.samples() {
            return Err(GeometryError::Reshape {
                actual: frame.len(),
                height: geometry.height,
                width: geometry.width,
                channels: geometry.channels,
            });
        }

        // `as` saturates and maps NaN to zero
        let data = frame.as_slice().iter().map(|&s| s as u8).collect();
        Ok(Self { geometry, data })
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Pixel at (row, col) as a channel slice
    pub fn pixel(&self, row: usize, col: usize) -> Option<&[u8]> {
        if row >= self.geometry.height || col >= self.geometry.width {
            return None;
        }
        let c = self.geometry.channels;
        let start = (row * self.geometry.width + col) * c;
        self.data.get(start..start + c)
    }

    /// Convert to an encodable image; only 1, 3 and 4 channel layouts are supported
    pub fn to_dynamic(&self) -> Result<DynamicImage, GeometryError> {
        let width = self.geometry.width as u32;
        let height = self.geometry.height as u32;
        let data = self.data.clone();
        let mismatch = || GeometryError::Reshape {
            actual: self.data.len(),
            height: self.geometry.height,
            width: self.geometry.width,
            channels: self.geometry.channels,
        };

        match self.geometry.channels {
            1 => GrayImage::from_raw(width, height, data)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(mismatch),
            3 => RgbImage::from_raw(width, height, data)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(mismatch),
            4 => RgbaImage::from_raw(width, height, data)
                .map(DynamicImage::ImageRgba8)
                .ok_or_else(mismatch),
            channels => Err(GeometryError::Channels { channels }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_samples() {
        let geometry = FrameGeometry::rgb(480, 640);
        assert_eq!(geometry.samples(), 480 * 640 * 3);
        assert!(geometry.validate().is_ok());
        assert!(FrameGeometry::new(0, 640, 3).validate().is_err());
    }

    #[test]
    fn test_oversized_geometry_rejected() {
        let geometry = FrameGeometry::new(usize::MAX / 2, 3, 3);
        assert_eq!(geometry.checked_bytes(), None);
        assert_eq!(
            geometry.validate().unwrap_err(),
            GeometryError::TooLarge {
                height: usize::MAX / 2,
                width: 3,
                channels: 3
            }
        );

        // Sample count fits, byte size does not
        let bytes_overflow = FrameGeometry::new(usize::MAX / 4 + 1, 1, 1);
        assert!(matches!(
            bytes_overflow.validate(),
            Err(GeometryError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_reshape_saturates_samples() {
        let geometry = FrameGeometry::new(1, 2, 3);
        let frame = Frame::from_samples(vec![-4.0, 0.0, 12.7, 255.0, 300.0, f32::NAN]);

        let image = Image::reshape(&frame, geometry).unwrap();
        assert_eq!(image.as_bytes(), &[0, 0, 12, 255, 255, 0]);
        assert_eq!(image.pixel(0, 1), Some(&[255u8, 255, 0][..]));
        assert_eq!(image.pixel(1, 0), None);
    }

    #[test]
    fn test_reshape_rejects_wrong_length() {
        let geometry = FrameGeometry::rgb(2, 2);
        let frame = Frame::zeroed(11);

        let err = Image::reshape(&frame, geometry).unwrap_err();
        assert_eq!(
            err,
            GeometryError::Reshape {
                actual: 11,
                height: 2,
                width: 2,
                channels: 3
            }
        );
    }

    #[test]
    fn test_dynamic_image_channels() {
        let rgb = Image::reshape(&Frame::filled(12, 7.0), FrameGeometry::rgb(2, 2)).unwrap();
        let dynamic = rgb.to_dynamic().unwrap();
        assert_eq!(dynamic.width(), 2);
        assert_eq!(dynamic.height(), 2);

        let two = Image::reshape(&Frame::zeroed(8), FrameGeometry::new(2, 2, 2)).unwrap();
        assert_eq!(
            two.to_dynamic().unwrap_err(),
            GeometryError::Channels { channels: 2 }
        );
    }
}
