use imageproc::contrast::equalize_histogram;
use imago_common::frame::{Frame, Pixels};

use super::channels::map_channels;
use super::traits::Transform;

/// Histogram equalisation. RGB frames are equalised per channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EqualizeParams;

impl Transform for EqualizeParams {
    fn apply(&self, input: &Frame) -> Frame {
        match input.pixels() {
            Pixels::Gray(gray) => Frame::from_gray(equalize_histogram(gray)),
            Pixels::Rgb(rgb) => Frame::from_rgb(map_channels(rgb, equalize_histogram)),
        }
    }

    fn name(&self) -> &str {
        "equalize"
    }
}
