use image::imageops;
use imago_common::frame::{Frame, Pixels};

use super::traits::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipAxis {
    /// Mirror left/right (around the vertical axis).
    Horizontal,
    /// Mirror top/bottom (around the horizontal axis).
    Vertical,
    Both,
}

impl FlipAxis {
    /// Flip codes: `0` flips top/bottom, positive flips left/right,
    /// negative flips both.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => FlipAxis::Vertical,
            c if c > 0 => FlipAxis::Horizontal,
            _ => FlipAxis::Both,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "horizontal" => Some(FlipAxis::Horizontal),
            "vertical" => Some(FlipAxis::Vertical),
            "both" => Some(FlipAxis::Both),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlipParams {
    pub axis: FlipAxis,
}

impl FlipParams {
    pub fn new(axis: FlipAxis) -> Self {
        Self { axis }
    }
}

impl Transform for FlipParams {
    fn apply(&self, input: &Frame) -> Frame {
        match (input.pixels(), self.axis) {
            (Pixels::Gray(gray), FlipAxis::Horizontal) => {
                Frame::from_gray(imageops::flip_horizontal(gray))
            }
            (Pixels::Gray(gray), FlipAxis::Vertical) => {
                Frame::from_gray(imageops::flip_vertical(gray))
            }
            (Pixels::Gray(gray), FlipAxis::Both) => Frame::from_gray(imageops::rotate180(gray)),
            (Pixels::Rgb(rgb), FlipAxis::Horizontal) => {
                Frame::from_rgb(imageops::flip_horizontal(rgb))
            }
            (Pixels::Rgb(rgb), FlipAxis::Vertical) => Frame::from_rgb(imageops::flip_vertical(rgb)),
            (Pixels::Rgb(rgb), FlipAxis::Both) => Frame::from_rgb(imageops::rotate180(rgb)),
        }
    }

    fn name(&self) -> &str {
        "flip"
    }
}
