use image::Pixel;
use imago_common::frame::{Frame, Pixels};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use super::traits::Transform;
use super::StageError;

/// Seed used when none is configured.
pub const DEFAULT_NOISE_SEED: u64 = 0x5A17_9E99;

/// Impulse noise: each pixel is, with `probability`, replaced by pure white
/// or pure black (even odds).
///
/// The generator is re-seeded from `seed` on every call, so repeated runs
/// over the same input produce identical noise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaltAndPepperParams {
    pub probability: f64,
    pub seed: u64,
}

impl SaltAndPepperParams {
    pub fn new(probability: f64) -> Self {
        Self {
            probability,
            seed: DEFAULT_NOISE_SEED,
        }
    }

    pub fn validate(&self) -> Result<(), StageError> {
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(StageError::InvalidParams {
                stage: "salt_and_pepper",
                reason: format!("probability {} is outside [0, 1]", self.probability),
            });
        }
        Ok(())
    }
}

impl Transform for SaltAndPepperParams {
    fn apply(&self, input: &Frame) -> Frame {
        if self.probability <= 0.0 {
            return input.clone();
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut output = input.clone();
        let mut flipped = 0u64;
        match output.pixels_mut() {
            Pixels::Gray(gray) => {
                for pixel in gray.pixels_mut() {
                    if let Some(value) = sample(&mut rng, self.probability) {
                        pixel.channels_mut()[0] = value;
                        flipped += 1;
                    }
                }
            }
            Pixels::Rgb(rgb) => {
                for pixel in rgb.pixels_mut() {
                    if let Some(value) = sample(&mut rng, self.probability) {
                        pixel.channels_mut().fill(value);
                        flipped += 1;
                    }
                }
            }
        }
        trace!(flipped, probability = self.probability, "salt and pepper applied");
        output
    }

    fn name(&self) -> &str {
        "salt_and_pepper"
    }
}

fn sample(rng: &mut StdRng, probability: f64) -> Option<u8> {
    if rng.gen::<f64>() < probability {
        Some(if rng.gen_bool(0.5) { u8::MAX } else { 0 })
    } else {
        None
    }
}
