//! Pipeline stages.
//!
//! A stage is a tagged set of parameters. The tag ([`StageKind`]) is fixed
//! when the stage is created; parameters can be replaced in place as long as
//! the replacement carries the same tag.

mod channels;
pub mod flip;
pub mod histogram;
pub mod lowpass;
pub mod morphology;
pub mod noise;
pub mod traits;

use std::fmt;

use imago_common::config::{Selector, StageConfig};
use imago_common::frame::Frame;

pub use flip::{FlipAxis, FlipParams};
pub use histogram::EqualizeParams;
pub use lowpass::{LowPassKind, LowPassParams};
pub use morphology::{ErodeParams, KernelShape};
pub use noise::{SaltAndPepperParams, DEFAULT_NOISE_SEED};
pub use traits::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    SaltAndPepper,
    MorphologyErode,
    FlipImage,
    HistogramEqualize,
    LowPassFilter,
}

impl StageKind {
    /// Initial parameters offered when a stage of this kind is added.
    pub fn default_params(self) -> StageParams {
        match self {
            StageKind::SaltAndPepper => StageParams::SaltAndPepper(SaltAndPepperParams::new(0.05)),
            StageKind::MorphologyErode => {
                StageParams::MorphologyErode(ErodeParams::new(KernelShape::Rect, 3))
            }
            StageKind::FlipImage => StageParams::FlipImage(FlipParams::new(FlipAxis::Horizontal)),
            StageKind::HistogramEqualize => StageParams::HistogramEqualize,
            StageKind::LowPassFilter => {
                StageParams::LowPassFilter(LowPassParams::new(LowPassKind::Box, 3))
            }
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::SaltAndPepper => "salt_and_pepper",
            StageKind::MorphologyErode => "erode",
            StageKind::FlipImage => "flip",
            StageKind::HistogramEqualize => "equalize",
            StageKind::LowPassFilter => "low_pass",
        };
        f.write_str(name)
    }
}

/// Parameters of one stage, tagged by kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StageParams {
    SaltAndPepper(SaltAndPepperParams),
    MorphologyErode(ErodeParams),
    FlipImage(FlipParams),
    HistogramEqualize,
    LowPassFilter(LowPassParams),
}

impl StageParams {
    pub fn kind(&self) -> StageKind {
        match self {
            StageParams::SaltAndPepper(_) => StageKind::SaltAndPepper,
            StageParams::MorphologyErode(_) => StageKind::MorphologyErode,
            StageParams::FlipImage(_) => StageKind::FlipImage,
            StageParams::HistogramEqualize => StageKind::HistogramEqualize,
            StageParams::LowPassFilter(_) => StageKind::LowPassFilter,
        }
    }

    pub fn validate(&self) -> Result<(), StageError> {
        match self {
            StageParams::SaltAndPepper(p) => p.validate(),
            StageParams::MorphologyErode(p) => p.validate(),
            StageParams::LowPassFilter(p) => p.validate(),
            StageParams::FlipImage(_) | StageParams::HistogramEqualize => Ok(()),
        }
    }

    fn transform(&self) -> &dyn Transform {
        match self {
            StageParams::SaltAndPepper(p) => p,
            StageParams::MorphologyErode(p) => p,
            StageParams::FlipImage(p) => p,
            StageParams::HistogramEqualize => &EqualizeParams,
            StageParams::LowPassFilter(p) => p,
        }
    }
}

impl TryFrom<&StageConfig> for StageParams {
    type Error = StageError;

    fn try_from(config: &StageConfig) -> Result<Self, Self::Error> {
        let params = match config {
            StageConfig::SaltAndPepper { probability, seed } => {
                StageParams::SaltAndPepper(SaltAndPepperParams {
                    probability: *probability,
                    seed: seed.unwrap_or(DEFAULT_NOISE_SEED),
                })
            }
            StageConfig::Erode { shape, size } => {
                let shape = resolve(shape, "erode.shape", KernelShape::from_name, |id| {
                    u32::try_from(id).ok().and_then(KernelShape::from_id)
                })?;
                StageParams::MorphologyErode(ErodeParams::new(shape, *size))
            }
            StageConfig::Flip { axis } => {
                let axis = resolve(axis, "flip.axis", FlipAxis::from_name, |code| {
                    Some(FlipAxis::from_code(code))
                })?;
                StageParams::FlipImage(FlipParams::new(axis))
            }
            StageConfig::Equalize => StageParams::HistogramEqualize,
            StageConfig::LowPass { filter, size } => {
                let filter = resolve(filter, "low_pass.filter", LowPassKind::from_name, |id| {
                    u32::try_from(id).ok().and_then(LowPassKind::from_id)
                })?;
                StageParams::LowPassFilter(LowPassParams::new(filter, *size))
            }
        };
        params.validate()?;
        Ok(params)
    }
}

fn resolve<T>(
    selector: &Selector,
    field: &'static str,
    by_name: impl Fn(&str) -> Option<T>,
    by_id: impl Fn(i64) -> Option<T>,
) -> Result<T, StageError> {
    let found = match selector {
        Selector::Name(name) => by_name(name),
        Selector::Id(id) => by_id(*id),
    };
    found.ok_or_else(|| StageError::UnknownName {
        field,
        value: selector.to_string(),
    })
}

/// One pipeline stage. Its kind is fixed for its whole life.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    params: StageParams,
}

impl Stage {
    pub fn new(params: StageParams) -> Result<Self, StageError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn kind(&self) -> StageKind {
        self.params.kind()
    }

    pub fn params(&self) -> &StageParams {
        &self.params
    }

    /// Replace the parameters in place. Fails without touching the stage if
    /// `params` is of another kind or does not validate.
    pub fn update(&mut self, params: StageParams) -> Result<(), StageError> {
        if params.kind() != self.kind() {
            return Err(StageError::TypeMismatch {
                expected: params.kind(),
                found: self.kind(),
            });
        }
        params.validate()?;
        self.params = params;
        Ok(())
    }

    pub fn apply(&self, input: &Frame) -> Frame {
        self.params.transform().apply(input)
    }

    pub fn name(&self) -> &str {
        self.params.transform().name()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageError {
    #[error("stage type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: StageKind, found: StageKind },
    #[error("invalid {stage} parameters: {reason}")]
    InvalidParams { stage: &'static str, reason: String },
    #[error("unknown {field} value {value:?}")]
    UnknownName { field: &'static str, value: String },
}
