use imago_common::frame::Frame;
use std::path::Path;

use super::SourceError;

/// An open acquisition handle (video file or camera).
///
/// The handle is owned by [`super::FrameSource`] and never shared. Dropping
/// it must release the underlying device or stream.
pub trait Capture: Send {
    /// Pull the next frame. Blocks until a frame is available or the pull fails.
    fn read_frame(&mut self) -> Result<Frame, PullError>;

    /// Frame rate reported by the stream, if any.
    fn frame_rate(&self) -> Option<f64>;

    /// Release the device or stream early. Must be safe to call twice.
    fn release(&mut self) {}
}

/// Opens captures. The production implementation is
/// [`super::ffmpeg::FfmpegBackend`].
pub trait CaptureBackend: Send {
    fn open_video(&self, path: &Path) -> Result<Box<dyn Capture>, SourceError>;

    /// Open the default camera device.
    fn open_camera(&self) -> Result<Box<dyn Capture>, SourceError>;
}

/// Why a single tick produced no frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PullError {
    #[error("end of stream")]
    EndOfStream,
    #[error("device read failed: {0}")]
    Device(String),
}
