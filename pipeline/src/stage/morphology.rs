use image::{GrayImage, Luma};
use imageproc::morphology::{grayscale_erode, Mask};
use imago_common::frame::{Frame, Pixels};

use super::channels::map_channels;
use super::traits::Transform;
use super::StageError;

/// Shape of the erosion structuring element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelShape {
    Rect,
    Cross,
    Ellipse,
}

impl KernelShape {
    /// Numeric shape ids: 0 = rect, 1 = cross, 2 = ellipse.
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(KernelShape::Rect),
            1 => Some(KernelShape::Cross),
            2 => Some(KernelShape::Ellipse),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "rect" => Some(KernelShape::Rect),
            "cross" => Some(KernelShape::Cross),
            "ellipse" => Some(KernelShape::Ellipse),
            _ => None,
        }
    }
}

/// Largest accepted kernel side.
pub const MAX_ERODE_SIZE: u32 = 63;

/// Grayscale erosion: every output sample is the minimum of the input
/// samples covered by the structuring element.
///
/// The element is `size` x `size` with its anchor at `size / 2`, so even
/// sizes reach one pixel further up/left than down/right. Samples falling
/// outside the image are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErodeParams {
    pub shape: KernelShape,
    pub size: u32,
}

impl ErodeParams {
    pub fn new(shape: KernelShape, size: u32) -> Self {
        Self { shape, size }
    }

    pub fn validate(&self) -> Result<(), StageError> {
        if self.size == 0 || self.size > MAX_ERODE_SIZE {
            return Err(StageError::InvalidParams {
                stage: "erode",
                reason: format!(
                    "kernel size must be between 1 and {MAX_ERODE_SIZE}, got {}",
                    self.size
                ),
            });
        }
        Ok(())
    }

    /// The structuring element as an image: non-zero cells are active.
    fn element(&self) -> GrayImage {
        let size = self.size.clamp(1, MAX_ERODE_SIZE);
        let anchor = size / 2;
        GrayImage::from_fn(size, size, |col, row| {
            let (start, end) = match self.shape {
                KernelShape::Rect => (0, size),
                KernelShape::Cross if row == anchor => (0, size),
                KernelShape::Cross => (anchor, anchor + 1),
                KernelShape::Ellipse => ellipse_span(row, size),
            };
            Luma([if (start..end).contains(&col) { u8::MAX } else { 0 }])
        })
    }

    fn mask(&self) -> Mask {
        let element = self.element();
        // element side is capped well below the u8 anchor range
        let anchor = (element.width() / 2) as u8;
        Mask::from_image(&element, anchor, anchor)
    }
}

/// Horizontal extent `[start, end)` of ellipse row `row` in a `size` x `size` box.
fn ellipse_span(row: u32, size: u32) -> (u32, u32) {
    let r = i64::from(size / 2);
    if r == 0 {
        return (0, size);
    }
    let dy = i64::from(row) - r;
    if dy.abs() > r {
        return (0, 0);
    }
    let dx = (r as f64 * (((r * r - dy * dy) as f64) / (r * r) as f64).sqrt()).round() as i64;
    let start = (r - dx).max(0) as u32;
    let end = ((r + dx + 1) as u32).min(size);
    (start, end)
}

impl Transform for ErodeParams {
    fn apply(&self, input: &Frame) -> Frame {
        let mask = self.mask();
        match input.pixels() {
            Pixels::Gray(gray) => Frame::from_gray(grayscale_erode(gray, &mask)),
            Pixels::Rgb(rgb) => {
                Frame::from_rgb(map_channels(rgb, |channel| grayscale_erode(channel, &mask)))
            }
        }
    }

    fn name(&self) -> &str {
        "erode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    fn row(values: &[u8]) -> Frame {
        Frame::from_gray(GrayImage::from_raw(values.len() as u32, 1, values.to_vec()).unwrap())
    }

    #[test]
    fn even_kernel_reaches_left() {
        let out = ErodeParams::new(KernelShape::Rect, 2).apply(&row(&[10, 20, 30, 40]));
        assert_eq!(out.as_bytes(), &[10, 10, 20, 30]);
    }

    #[test]
    fn size_one_is_identity() {
        let input = row(&[5, 1, 9]);
        assert_eq!(ErodeParams::new(KernelShape::Ellipse, 1).apply(&input), input);
    }

    #[test]
    fn dark_pixel_spreads_to_rect_neighbourhood() {
        let mut img = GrayImage::from_pixel(5, 5, image::Luma([200]));
        img.put_pixel(2, 2, image::Luma([0]));
        let out = ErodeParams::new(KernelShape::Rect, 3).apply(&Frame::from_gray(img));
        let Pixels::Gray(out) = out.pixels() else {
            panic!("layout changed")
        };
        for y in 1..=3 {
            for x in 1..=3 {
                assert_eq!(out.get_pixel(x, y)[0], 0);
            }
        }
        assert_eq!(out.get_pixel(0, 0)[0], 200);
    }

    #[test]
    fn cross_skips_diagonals() {
        let mut img = GrayImage::from_pixel(3, 3, image::Luma([200]));
        img.put_pixel(1, 1, image::Luma([0]));
        let out = ErodeParams::new(KernelShape::Cross, 3).apply(&Frame::from_gray(img));
        let Pixels::Gray(out) = out.pixels() else {
            panic!("layout changed")
        };
        assert_eq!(out.get_pixel(1, 0)[0], 0);
        assert_eq!(out.get_pixel(0, 1)[0], 0);
        assert_eq!(out.get_pixel(0, 0)[0], 200);
    }

    fn active_cells(params: ErodeParams) -> usize {
        params.element().pixels().filter(|p| p[0] != 0).count()
    }

    #[test]
    fn small_ellipse_is_a_cross() {
        assert_eq!(active_cells(ErodeParams::new(KernelShape::Ellipse, 3)), 5);
        assert_eq!(active_cells(ErodeParams::new(KernelShape::Cross, 5)), 9);
        assert_eq!(active_cells(ErodeParams::new(KernelShape::Rect, 4)), 16);
    }

    #[test]
    fn even_kernel_reaches_up() {
        let column = Frame::from_gray(GrayImage::from_raw(1, 4, vec![10, 20, 30, 40]).unwrap());
        let out = ErodeParams::new(KernelShape::Rect, 2).apply(&column);
        assert_eq!(out.as_bytes(), &[10, 10, 20, 30]);
    }

    #[test]
    fn rgb_channels_erode_independently() {
        let mut img = image::RgbImage::from_pixel(2, 1, image::Rgb([100, 100, 100]));
        img.put_pixel(0, 0, image::Rgb([10, 200, 100]));
        let out = ErodeParams::new(KernelShape::Rect, 2).apply(&Frame::from_rgb(img));
        assert_eq!(out.as_bytes(), &[10, 200, 100, 10, 100, 100]);
    }

    #[test]
    fn kernel_size_is_bounded() {
        assert!(ErodeParams::new(KernelShape::Rect, 0).validate().is_err());
        assert!(ErodeParams::new(KernelShape::Rect, 1).validate().is_ok());
        assert!(ErodeParams::new(KernelShape::Ellipse, MAX_ERODE_SIZE)
            .validate()
            .is_ok());
        for size in [MAX_ERODE_SIZE + 1, 1500, u32::MAX] {
            let err = ErodeParams::new(KernelShape::Rect, size).validate().unwrap_err();
            assert!(matches!(err, StageError::InvalidParams { stage: "erode", .. }));
        }
    }

    #[test]
    fn largest_kernel_erodes_whole_small_image() {
        let mut img = GrayImage::from_pixel(8, 8, Luma([180]));
        img.put_pixel(7, 7, Luma([3]));
        let out = ErodeParams::new(KernelShape::Rect, MAX_ERODE_SIZE).apply(&Frame::from_gray(img));
        assert!(out.as_bytes().iter().all(|&v| v == 3));
    }

    #[test]
    fn shape_lookup() {
        assert_eq!(KernelShape::from_id(1), Some(KernelShape::Cross));
        assert_eq!(KernelShape::from_id(9), None);
        assert_eq!(KernelShape::from_name("ellipse"), Some(KernelShape::Ellipse));
    }
}
