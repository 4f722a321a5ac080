use imago_common::frame::Frame;
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::pipeline::{Pipeline, PipelineError};
use crate::source::{FrameSource, PullError, SourceError};
use crate::stage::{Stage, StageParams};

const NOTIFICATION_CAPACITY: usize = 64;

/// The two events observable from outside. Consumers pull the buffers
/// through [`ProcessManager::input`] / [`ProcessManager::output`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    InputReady,
    OutputReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// No input frame yet.
    Idle,
    Ready,
}

/// Result of one acquisition tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Delivered,
    EndOfStream,
    DeviceError(String),
}

/// Ties a frame source, the current input/output pair and the pipeline
/// together.
///
/// Every path that changes the input or the pipeline ends in [`process`],
/// which rebuilds `output` from `input` with the whole pipeline. `output` is
/// never derived from a previous `output`.
///
/// [`process`]: ProcessManager::process
pub struct ProcessManager {
    source: FrameSource,
    pipeline: Pipeline,
    input: Option<Frame>,
    output: Option<Frame>,
    last_tick: Option<TickOutcome>,
    notifier: broadcast::Sender<Notification>,
}

impl ProcessManager {
    pub fn new(source: FrameSource) -> Self {
        let (notifier, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            source,
            pipeline: Pipeline::new(),
            input: None,
            output: None,
            last_tick: None,
            notifier,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    pub(crate) fn notifier(&self) -> broadcast::Sender<Notification> {
        self.notifier.clone()
    }

    pub fn state(&self) -> ManagerState {
        if self.input.is_some() {
            ManagerState::Ready
        } else {
            ManagerState::Idle
        }
    }

    pub fn input(&self) -> Option<Frame> {
        self.input.clone()
    }

    pub fn output(&self) -> Option<Frame> {
        self.output.clone()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn source(&self) -> &FrameSource {
        &self.source
    }

    /// Outcome of the most recent acquisition tick, if any.
    pub fn last_tick(&self) -> Option<&TickOutcome> {
        self.last_tick.as_ref()
    }

    // -- Input --------------------------------------------------------------------

    /// Store `frame` as the new input and re-run the pipeline.
    ///
    /// Returns `false` without touching any state when there is no frame or
    /// the frame has no pixels.
    pub fn set_input(&mut self, frame: Option<Frame>) -> bool {
        let Some(frame) = frame.filter(|f| !f.is_empty()) else {
            debug!("no input data, keeping previous frames");
            return false;
        };
        self.output = Some(frame.clone());
        self.input = Some(frame);
        self.notify(Notification::InputReady);
        self.process();
        true
    }

    /// Decode `path` and use it as the new input. Does not change the source.
    pub fn set_input_from_path(&mut self, path: &Path) -> bool {
        match Frame::open(path) {
            Ok(frame) => self.set_input(Some(frame)),
            Err(e) => {
                warn!(error = %e, "could not read input image");
                false
            }
        }
    }

    // -- Sources ------------------------------------------------------------------

    pub fn load_image(&mut self, path: &Path) -> Result<(), SourceError> {
        let frame = self.source.load_static_image(path)?;
        self.set_input(Some(frame));
        Ok(())
    }

    pub fn load_image_bytes(&mut self, data: &[u8]) -> Result<(), SourceError> {
        let frame = self.source.load_static_bytes(data)?;
        self.set_input(Some(frame));
        Ok(())
    }

    pub fn load_video(&mut self, path: &Path) -> Result<Duration, SourceError> {
        self.last_tick = None;
        self.source.load_video(path)
    }

    pub fn load_live_camera(&mut self) -> Result<Duration, SourceError> {
        self.last_tick = None;
        self.source.load_live_camera()
    }

    pub fn pause(&mut self) {
        self.source.pause();
    }

    pub fn resume(&mut self) {
        self.source.resume();
    }

    /// Release the source. The last input and output stay available.
    pub fn stop(&mut self) {
        self.source.stop();
    }

    /// Wait for the source's next tick and feed the pulled frame in.
    ///
    /// A failed pull raises no event and leaves the previous frames in
    /// place. Never resolves while no stream is running.
    pub async fn tick(&mut self) -> TickOutcome {
        let outcome = match self.source.tick().await {
            Ok(frame) => {
                if self.set_input(Some(frame)) {
                    TickOutcome::Delivered
                } else {
                    TickOutcome::DeviceError("empty frame".into())
                }
            }
            Err(PullError::EndOfStream) => {
                if self.last_tick != Some(TickOutcome::EndOfStream) {
                    info!("stream reached its end");
                }
                TickOutcome::EndOfStream
            }
            Err(PullError::Device(reason)) => {
                warn!(reason, "frame pull failed, skipping tick");
                TickOutcome::DeviceError(reason)
            }
        };
        self.last_tick = Some(outcome.clone());
        outcome
    }

    // -- Pipeline edits -----------------------------------------------------------

    pub fn add_stage(&mut self, params: StageParams) -> Result<usize, PipelineError> {
        let stage = Stage::new(params)?;
        let index = self.pipeline.append(stage);
        info!(index, kind = %params.kind(), "stage added");
        self.process();
        Ok(index)
    }

    pub fn update_stage(&mut self, index: usize, params: StageParams) -> Result<(), PipelineError> {
        self.pipeline.update_params(index, params)?;
        debug!(index, kind = %params.kind(), "stage parameters updated");
        self.process();
        Ok(())
    }

    pub fn remove_stage(&mut self, index: usize) -> Result<(), PipelineError> {
        let removed = self.pipeline.remove(index)?;
        info!(index, kind = %removed.kind(), "stage removed");
        self.process();
        Ok(())
    }

    pub fn move_stage_up(&mut self, index: usize) -> Result<(), PipelineError> {
        self.pipeline.move_up(index)?;
        self.process();
        Ok(())
    }

    pub fn move_stage_down(&mut self, index: usize) -> Result<(), PipelineError> {
        self.pipeline.move_down(index)?;
        self.process();
        Ok(())
    }

    /// Re-run the pipeline without any change.
    pub fn refresh(&mut self) {
        self.process();
    }

    /// Rebuild `output` from `input` through the whole pipeline and raise
    /// `OutputReady`. Nothing happens before the first input arrives.
    pub fn process(&mut self) {
        let Some(input) = self.input.as_ref() else {
            debug!("no input yet, nothing to process");
            return;
        };
        let output = self.pipeline.run(input);
        debug!(
            stages = self.pipeline.len(),
            width = output.width(),
            height = output.height(),
            "pipeline run complete"
        );
        self.output = Some(output);
        self.notify(Notification::OutputReady);
    }

    fn notify(&self, event: Notification) {
        // no subscribers is not an error
        let _ = self.notifier.send(event);
    }
}
