use image::{GrayImage, Luma, Rgb, RgbImage};

/// Run a single-channel operation on each channel of an RGB image and
/// recombine the results.
pub(crate) fn map_channels<F>(rgb: &RgbImage, op: F) -> RgbImage
where
    F: Fn(&GrayImage) -> GrayImage,
{
    let (width, height) = rgb.dimensions();
    let planes: Vec<GrayImage> = (0..3)
        .map(|c| {
            let plane = GrayImage::from_fn(width, height, |x, y| Luma([rgb.get_pixel(x, y)[c]]));
            op(&plane)
        })
        .collect();

    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            planes[0].get_pixel(x, y)[0],
            planes[1].get_pixel(x, y)[0],
            planes[2].get_pixel(x, y)[0],
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_are_processed_independently() {
        let rgb = RgbImage::from_pixel(2, 2, Rgb([10, 20, 30]));
        let out = map_channels(&rgb, |plane| {
            GrayImage::from_fn(plane.width(), plane.height(), |x, y| {
                Luma([plane.get_pixel(x, y)[0] + 1])
            })
        });
        assert_eq!(out.get_pixel(1, 1), &Rgb([11, 21, 31]));
    }
}
