use image::{DynamicImage, GrayImage, RgbImage};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Channel layout of a [`Frame`]. Samples are always 8-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Gray,
    Rgb,
}

impl ChannelLayout {
    pub fn channels(self) -> usize {
        match self {
            ChannelLayout::Gray => 1,
            ChannelLayout::Rgb => 3,
        }
    }
}

/// Pixel storage of a [`Frame`].
#[derive(Debug, Clone, PartialEq)]
pub enum Pixels {
    Gray(GrayImage),
    Rgb(RgbImage),
}

/// A 2-D image buffer with value semantics.
///
/// Cloning is cheap: clones share the pixel storage until one of them is
/// mutated through [`Frame::pixels_mut`], at which point the mutating side
/// gets its own copy. A frame handed out to a caller can therefore never be
/// changed by later processing.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pixels: Arc<Pixels>,
}

impl Frame {
    pub fn from_gray(image: GrayImage) -> Self {
        Self::from_pixels(Pixels::Gray(image))
    }

    pub fn from_rgb(image: RgbImage) -> Self {
        Self::from_pixels(Pixels::Rgb(image))
    }

    pub fn from_pixels(pixels: Pixels) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    /// Gray frame with every sample set to `value`.
    pub fn filled_gray(width: u32, height: u32, value: u8) -> Self {
        Self::from_gray(GrayImage::from_pixel(width, height, image::Luma([value])))
    }

    /// RGB frame with every pixel set to `rgb`.
    pub fn filled_rgb(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::from_rgb(RgbImage::from_pixel(width, height, image::Rgb(rgb)))
    }

    /// Build an RGB frame from packed `rgb24` bytes, as produced by a raw video pipe.
    pub fn from_raw_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 3;
        let got = data.len();
        if got != expected {
            return Err(FrameError::RawSize { expected, got });
        }
        RgbImage::from_raw(width, height, data)
            .map(Self::from_rgb)
            .ok_or(FrameError::RawSize { expected, got })
    }

    /// Decode an image file. Grayscale files stay single-channel, everything
    /// else is converted to 8-bit RGB.
    pub fn open(path: &Path) -> Result<Self, FrameError> {
        let img = image::open(path).map_err(|e| FrameError::Open {
            path: path.display().to_string(),
            source: e,
        })?;
        let frame = Self::from_dynamic(img)?;
        debug!(
            path = %path.display(),
            width = frame.width(),
            height = frame.height(),
            "image file decoded"
        );
        Ok(frame)
    }

    /// Decode an in-memory encoded image (PNG, JPEG, ...).
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        let img = image::load_from_memory(data).map_err(FrameError::Decode)?;
        Self::from_dynamic(img)
    }

    pub fn from_dynamic(img: DynamicImage) -> Result<Self, FrameError> {
        let frame = match img {
            DynamicImage::ImageLuma8(gray) => Self::from_gray(gray),
            other => Self::from_rgb(other.to_rgb8()),
        };
        if frame.is_empty() {
            return Err(FrameError::Empty);
        }
        Ok(frame)
    }

    pub fn to_dynamic(&self) -> DynamicImage {
        match self.pixels.as_ref() {
            Pixels::Gray(gray) => DynamicImage::ImageLuma8(gray.clone()),
            Pixels::Rgb(rgb) => DynamicImage::ImageRgb8(rgb.clone()),
        }
    }

    /// Encode to `path`; the format follows the file extension.
    pub fn save(&self, path: &Path) -> Result<(), FrameError> {
        self.to_dynamic().save(path).map_err(|e| FrameError::Encode {
            path: path.display().to_string(),
            source: e,
        })
    }

    // -- Accessors --------------------------------------------------------------

    pub fn width(&self) -> u32 {
        match self.pixels.as_ref() {
            Pixels::Gray(gray) => gray.width(),
            Pixels::Rgb(rgb) => rgb.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self.pixels.as_ref() {
            Pixels::Gray(gray) => gray.height(),
            Pixels::Rgb(rgb) => rgb.height(),
        }
    }

    pub fn layout(&self) -> ChannelLayout {
        match self.pixels.as_ref() {
            Pixels::Gray(_) => ChannelLayout::Gray,
            Pixels::Rgb(_) => ChannelLayout::Rgb,
        }
    }

    /// A zero-sized frame carries no image data.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn pixels(&self) -> &Pixels {
        &self.pixels
    }

    /// Mutable access to the samples. Copies the storage first if it is
    /// shared with another frame.
    pub fn pixels_mut(&mut self) -> &mut Pixels {
        Arc::make_mut(&mut self.pixels)
    }

    /// Raw interleaved samples, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        match self.pixels.as_ref() {
            Pixels::Gray(gray) => gray.as_raw(),
            Pixels::Rgb(rgb) => rgb.as_raw(),
        }
    }

    /// Whether `self` and `other` currently share pixel storage.
    pub fn shares_storage_with(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("failed to open image {path}: {source}")]
    Open {
        path: String,
        source: image::ImageError,
    },
    #[error("failed to decode image: {0}")]
    Decode(image::ImageError),
    #[error("failed to encode image {path}: {source}")]
    Encode {
        path: String,
        source: image::ImageError,
    },
    #[error("raw frame has {got} bytes, expected {expected}")]
    RawSize { expected: usize, got: usize },
    #[error("image has no pixels")]
    Empty,
}
