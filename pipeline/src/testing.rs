//! In-memory capture backend for tests.

use imago_common::frame::Frame;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::source::{Capture, CaptureBackend, PullError, SourceError};

/// Number of captures currently open.
#[derive(Debug, Clone, Default)]
pub(crate) struct OpenHandles(Arc<AtomicUsize>);

impl OpenHandles {
    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FailOpens(Arc<AtomicBool>);

impl FailOpens {
    pub(crate) fn set(&self, fail: bool) {
        self.0.store(fail, Ordering::SeqCst);
    }
}

/// Hands out captures producing 4x4 gray frames whose samples count up
/// from 1, one value per frame.
pub(crate) struct MockBackend {
    handles: OpenHandles,
    fail: FailOpens,
    frame_rate: Option<f64>,
    frames: Option<usize>,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self {
            handles: OpenHandles::default(),
            fail: FailOpens::default(),
            frame_rate: Some(25.0),
            frames: None,
        }
    }

    pub(crate) fn frame_rate(mut self, rate: Option<f64>) -> Self {
        self.frame_rate = rate;
        self
    }

    /// End every stream after `count` frames.
    pub(crate) fn frames(mut self, count: usize) -> Self {
        self.frames = Some(count);
        self
    }

    pub(crate) fn open_handles(&self) -> OpenHandles {
        self.handles.clone()
    }

    pub(crate) fn fail_opens(&self) -> FailOpens {
        self.fail.clone()
    }

    fn open(&self, target: &str, frame_rate: Option<f64>) -> Result<Box<dyn Capture>, SourceError> {
        if self.fail.0.load(Ordering::SeqCst) {
            return Err(SourceError::Open {
                target: target.into(),
                reason: "mock open failure".into(),
            });
        }
        self.handles.0.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockCapture {
            handles: self.handles.clone(),
            frame_rate,
            remaining: self.frames,
            next_value: 1,
        }))
    }
}

impl CaptureBackend for MockBackend {
    fn open_video(&self, path: &Path) -> Result<Box<dyn Capture>, SourceError> {
        self.open(&path.display().to_string(), self.frame_rate)
    }

    fn open_camera(&self) -> Result<Box<dyn Capture>, SourceError> {
        self.open("camera", None)
    }
}

struct MockCapture {
    handles: OpenHandles,
    frame_rate: Option<f64>,
    remaining: Option<usize>,
    next_value: u8,
}

impl Capture for MockCapture {
    fn read_frame(&mut self) -> Result<Frame, PullError> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Err(PullError::EndOfStream);
            }
            *remaining -= 1;
        }
        let frame = Frame::filled_gray(4, 4, self.next_value);
        self.next_value = self.next_value.wrapping_add(1);
        Ok(frame)
    }

    fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }
}

impl Drop for MockCapture {
    fn drop(&mut self) {
        self.handles.0.fetch_sub(1, Ordering::SeqCst);
    }
}
