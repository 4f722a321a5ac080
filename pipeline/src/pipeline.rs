use imago_common::frame::Frame;
use tracing::trace;

use crate::stage::{Stage, StageError, StageKind, StageParams};

/// Ordered list of stages. Insertion order is execution order.
///
/// `run` is a pure function of the stage list and the input: nothing is
/// cached between runs, so callers re-run the whole list after any edit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn get(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    /// Add `stage` at the end and return its index.
    pub fn append(&mut self, stage: Stage) -> usize {
        self.stages.push(stage);
        self.stages.len() - 1
    }

    /// Replace the parameters of the stage at `index`.
    ///
    /// The stage must already be of the kind `params` describes; a stage
    /// never changes kind. On error the pipeline is left untouched.
    pub fn update_params(
        &mut self,
        index: usize,
        params: StageParams,
    ) -> Result<(), PipelineError> {
        let len = self.stages.len();
        let stage = self
            .stages
            .get_mut(index)
            .ok_or(PipelineError::IndexOutOfRange { index, len })?;
        stage.update(params).map_err(|e| match e {
            StageError::TypeMismatch { expected, found } => PipelineError::TypeMismatch {
                index,
                expected,
                found,
            },
            other => PipelineError::Stage(other),
        })
    }

    pub fn remove(&mut self, index: usize) -> Result<Stage, PipelineError> {
        self.check_index(index)?;
        Ok(self.stages.remove(index))
    }

    /// Swap the stage at `index` with the one before it. The first stage
    /// stays where it is.
    pub fn move_up(&mut self, index: usize) -> Result<(), PipelineError> {
        self.check_index(index)?;
        if index > 0 {
            self.stages.swap(index - 1, index);
        }
        Ok(())
    }

    /// Swap the stage at `index` with the one after it. The last stage
    /// stays where it is.
    pub fn move_down(&mut self, index: usize) -> Result<(), PipelineError> {
        self.check_index(index)?;
        if index + 1 < self.stages.len() {
            self.stages.swap(index, index + 1);
        }
        Ok(())
    }

    /// Apply every stage in order, feeding each output into the next stage.
    pub fn run(&self, input: &Frame) -> Frame {
        self.stages
            .iter()
            .enumerate()
            .fold(input.clone(), |frame, (index, stage)| {
                trace!(index, stage = stage.name(), "applying stage");
                stage.apply(&frame)
            })
    }

    fn check_index(&self, index: usize) -> Result<(), PipelineError> {
        if index >= self.stages.len() {
            return Err(PipelineError::IndexOutOfRange {
                index,
                len: self.stages.len(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("stage index {index} out of range (pipeline has {len} stages)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("stage {index} is {found}, not {expected}")]
    TypeMismatch {
        index: usize,
        expected: StageKind,
        found: StageKind,
    },
    #[error(transparent)]
    Stage(#[from] StageError),
}
