//! Frame acquisition: still images, video files and live cameras.
//!
//! [`FrameSource`] holds at most one open capture. Opening anything new
//! first stops the tick timer and releases the previous capture, so two
//! acquisition loops can never run at once.

pub mod capture;
pub mod ffmpeg;
mod ticker;

use imago_common::frame::{Frame, FrameError};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub use capture::{Capture, CaptureBackend, PullError};
pub use ffmpeg::FfmpegBackend;

use ticker::Ticker;

/// Tick interval used for live cameras: pull as fast as the loop allows.
pub const LIVE_FRAME_INTERVAL: Duration = Duration::ZERO;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    VideoFile,
    LiveCamera,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Idle,
    StaticImage,
    Streaming(StreamKind),
}

struct ActiveStream {
    kind: StreamKind,
    capture: Box<dyn Capture>,
    ticker: Ticker,
}

enum Acquisition {
    Idle,
    StaticImage,
    Streaming(ActiveStream),
}

pub struct FrameSource {
    backend: Box<dyn CaptureBackend>,
    acquisition: Acquisition,
}

impl FrameSource {
    pub fn new(backend: impl CaptureBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            acquisition: Acquisition::Idle,
        }
    }

    pub fn state(&self) -> SourceState {
        match &self.acquisition {
            Acquisition::Idle => SourceState::Idle,
            Acquisition::StaticImage => SourceState::StaticImage,
            Acquisition::Streaming(stream) => SourceState::Streaming(stream.kind),
        }
    }

    /// Whether a stream is open and its timer is ticking.
    pub fn is_running(&self) -> bool {
        matches!(&self.acquisition, Acquisition::Streaming(s) if s.ticker.is_running())
    }

    /// Tick interval of the open stream.
    pub fn frame_interval(&self) -> Option<Duration> {
        match &self.acquisition {
            Acquisition::Streaming(stream) => Some(stream.ticker.period()),
            _ => None,
        }
    }

    /// Decode a still image from disk. Any open stream is stopped first.
    pub fn load_static_image(&mut self, path: &Path) -> Result<Frame, SourceError> {
        self.stop();
        let frame = Frame::open(path)?;
        self.acquisition = Acquisition::StaticImage;
        info!(path = %path.display(), "static image loaded");
        Ok(frame)
    }

    /// Decode a still image from encoded bytes. Any open stream is stopped first.
    pub fn load_static_bytes(&mut self, data: &[u8]) -> Result<Frame, SourceError> {
        self.stop();
        let frame = Frame::decode(data)?;
        self.acquisition = Acquisition::StaticImage;
        info!(bytes = data.len(), "static image decoded");
        Ok(frame)
    }

    /// Open a video file and start ticking at its frame rate.
    ///
    /// Returns the tick interval. A stream without a usable frame rate is
    /// rejected and released rather than played at a guessed speed.
    pub fn load_video(&mut self, path: &Path) -> Result<Duration, SourceError> {
        self.stop();
        let capture = self.backend.open_video(path)?;
        let rate = capture.frame_rate();
        let interval = frame_interval(rate)?;
        info!(
            path = %path.display(),
            frame_rate = rate,
            interval_ms = interval.as_millis() as u64,
            "video stream opened"
        );
        self.start_stream(StreamKind::VideoFile, capture, interval);
        Ok(interval)
    }

    /// Open the default camera and start ticking as fast as possible.
    pub fn load_live_camera(&mut self) -> Result<Duration, SourceError> {
        self.stop();
        let capture = self.backend.open_camera()?;
        info!("live camera opened");
        self.start_stream(StreamKind::LiveCamera, capture, LIVE_FRAME_INTERVAL);
        Ok(LIVE_FRAME_INTERVAL)
    }

    /// Stop ticking but keep the capture open. No-op unless streaming.
    pub fn pause(&mut self) {
        if let Acquisition::Streaming(stream) = &mut self.acquisition {
            if stream.ticker.is_running() {
                stream.ticker.stop();
                debug!(kind = ?stream.kind, "stream paused");
            }
        }
    }

    /// Restart ticking on the open capture. No-op unless paused.
    pub fn resume(&mut self) {
        if let Acquisition::Streaming(stream) = &mut self.acquisition {
            if !stream.ticker.is_running() {
                stream.ticker.start();
                debug!(kind = ?stream.kind, "stream resumed");
            }
        }
    }

    /// Stop the timer, release any capture and go idle.
    pub fn stop(&mut self) {
        let previous = std::mem::replace(&mut self.acquisition, Acquisition::Idle);
        if let Acquisition::Streaming(mut stream) = previous {
            stream.ticker.stop();
            stream.capture.release();
            info!(kind = ?stream.kind, "stream stopped and capture released");
        }
    }

    /// Wait for the next tick, then pull one frame.
    ///
    /// Never resolves while idle, showing a still image, or paused.
    /// Cancel-safe: dropping the future before it resolves loses no tick.
    pub async fn tick(&mut self) -> Result<Frame, PullError> {
        let Acquisition::Streaming(stream) = &mut self.acquisition else {
            return std::future::pending().await;
        };
        stream.ticker.wait().await;
        stream.capture.read_frame()
    }

    fn start_stream(&mut self, kind: StreamKind, capture: Box<dyn Capture>, interval: Duration) {
        let mut ticker = Ticker::new(interval);
        ticker.start();
        self.acquisition = Acquisition::Streaming(ActiveStream {
            kind,
            capture,
            ticker,
        });
    }
}

/// Tick interval for a stream reporting `rate` frames per second:
/// `1000 / rate` whole milliseconds.
pub fn frame_interval(rate: Option<f64>) -> Result<Duration, SourceError> {
    match rate {
        Some(fps) if fps.is_finite() && fps > 0.0 => {
            Ok(Duration::from_millis((1000.0 / fps) as u64))
        }
        other => Err(SourceError::InvalidFrameRate(other)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Image(#[from] FrameError),
    #[error("failed to open {target}: {reason}")]
    Open { target: String, reason: String },
    #[error("stream reported no usable frame rate ({0:?})")]
    InvalidFrameRate(Option<f64>),
}
