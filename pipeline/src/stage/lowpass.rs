use imageproc::filter::{box_filter, gaussian_blur_f32, median_filter};
use imago_common::frame::{Frame, Pixels};

use super::channels::map_channels;
use super::traits::Transform;
use super::StageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowPassKind {
    Box,
    Gaussian,
    Median,
}

impl LowPassKind {
    /// Numeric filter ids: 0 = box, 1 = gaussian, 2 = median.
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(LowPassKind::Box),
            1 => Some(LowPassKind::Gaussian),
            2 => Some(LowPassKind::Median),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "box" => Some(LowPassKind::Box),
            "gaussian" => Some(LowPassKind::Gaussian),
            "median" => Some(LowPassKind::Median),
            _ => None,
        }
    }
}

/// Smoothing over a `size` x `size` window. `size` must be odd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowPassParams {
    pub filter: LowPassKind,
    pub size: u32,
}

impl LowPassParams {
    pub fn new(filter: LowPassKind, size: u32) -> Self {
        Self { filter, size }
    }

    pub fn validate(&self) -> Result<(), StageError> {
        if self.size == 0 || self.size % 2 == 0 {
            return Err(StageError::InvalidParams {
                stage: "low_pass",
                reason: format!("kernel size {} must be odd and positive", self.size),
            });
        }
        Ok(())
    }

    fn radius(&self) -> u32 {
        self.size / 2
    }

    /// Sigma derived from the window size, as the usual
    /// `0.3 * ((size - 1) * 0.5 - 1) + 0.8` rule.
    fn sigma(&self) -> f32 {
        0.3 * ((self.size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    }
}

impl Transform for LowPassParams {
    fn apply(&self, input: &Frame) -> Frame {
        if self.size <= 1 {
            return input.clone();
        }
        let r = self.radius();
        match (input.pixels(), self.filter) {
            (Pixels::Gray(gray), LowPassKind::Box) => Frame::from_gray(box_filter(gray, r, r)),
            (Pixels::Rgb(rgb), LowPassKind::Box) => {
                Frame::from_rgb(map_channels(rgb, |plane| box_filter(plane, r, r)))
            }
            (Pixels::Gray(gray), LowPassKind::Gaussian) => {
                Frame::from_gray(gaussian_blur_f32(gray, self.sigma()))
            }
            (Pixels::Rgb(rgb), LowPassKind::Gaussian) => {
                Frame::from_rgb(gaussian_blur_f32(rgb, self.sigma()))
            }
            (Pixels::Gray(gray), LowPassKind::Median) => {
                Frame::from_gray(median_filter(gray, r, r))
            }
            (Pixels::Rgb(rgb), LowPassKind::Median) => Frame::from_rgb(median_filter(rgb, r, r)),
        }
    }

    fn name(&self) -> &str {
        "low_pass"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    fn speckled() -> Frame {
        let mut img = GrayImage::from_pixel(9, 9, image::Luma([50]));
        img.put_pixel(4, 4, image::Luma([250]));
        Frame::from_gray(img)
    }

    #[test]
    fn median_removes_isolated_speck() {
        let out = LowPassParams::new(LowPassKind::Median, 3).apply(&speckled());
        assert!(out.as_bytes().iter().all(|&v| v == 50));
    }

    #[test]
    fn box_and_gaussian_spread_the_speck() {
        for filter in [LowPassKind::Box, LowPassKind::Gaussian] {
            let out = LowPassParams::new(filter, 3).apply(&speckled());
            let centre = out.as_bytes()[4 * 9 + 4];
            let neighbour = out.as_bytes()[4 * 9 + 3];
            assert!(centre < 250, "{filter:?} left the centre untouched");
            assert!(neighbour > 50, "{filter:?} did not spread to neighbours");
        }
    }

    #[test]
    fn flat_rgb_is_unchanged() {
        let flat = Frame::filled_rgb(6, 6, [30, 60, 90]);
        for filter in [LowPassKind::Box, LowPassKind::Median] {
            assert_eq!(LowPassParams::new(filter, 5).apply(&flat), flat);
        }
    }

    #[test]
    fn even_or_zero_size_is_rejected() {
        assert!(LowPassParams::new(LowPassKind::Box, 4).validate().is_err());
        assert!(LowPassParams::new(LowPassKind::Box, 0).validate().is_err());
        assert!(LowPassParams::new(LowPassKind::Gaussian, 5).validate().is_ok());
    }
}
