use imago_common::config::{CameraConfig, Config, FfmpegConfig};
use imago_common::frame::Frame;
use serde::Deserialize;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, info, warn};

use super::capture::{Capture, CaptureBackend, PullError};
use super::SourceError;

/// Opens video files and cameras through an `ffmpeg` child process that
/// writes packed `rgb24` frames to its stdout.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: FfmpegConfig,
    camera: CameraConfig,
}

impl FfmpegBackend {
    pub fn new(ffmpeg: FfmpegConfig, camera: CameraConfig) -> Self {
        Self { ffmpeg, camera }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.ffmpeg.clone(), config.camera.clone())
    }
}

impl CaptureBackend for FfmpegBackend {
    fn open_video(&self, path: &Path) -> Result<Box<dyn Capture>, SourceError> {
        let target = path.display().to_string();
        let info = probe_stream(&self.ffmpeg.ffprobe, path).map_err(|reason| SourceError::Open {
            target: target.clone(),
            reason,
        })?;

        let mut cmd = Command::new(&self.ffmpeg.ffmpeg);
        cmd.args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"]);

        let capture = FfmpegCapture::spawn(cmd, target, info.width, info.height, info.frame_rate)?;
        Ok(Box::new(capture))
    }

    fn open_camera(&self) -> Result<Box<dyn Capture>, SourceError> {
        let CameraConfig {
            device,
            input_format,
            width,
            height,
        } = &self.camera;
        let size = format!("{width}x{height}");
        let scale = format!("scale={width}:{height}");

        let mut cmd = Command::new(&self.ffmpeg.ffmpeg);
        cmd.args([
            "-v", "error",
            "-nostdin",
            "-f", input_format.as_str(),
            "-video_size", size.as_str(),
            "-i", device.as_str(),
            "-vf", scale.as_str(),
            "-f", "rawvideo",
            "-pix_fmt", "rgb24",
            "pipe:1",
        ]);

        let capture = FfmpegCapture::spawn(cmd, device.clone(), *width, *height, None)?;
        Ok(Box::new(capture))
    }
}

/// A running ffmpeg decoder.
///
/// The first frame is read while opening so that undecodable files and busy
/// devices surface as open errors instead of as silent empty streams.
pub struct FfmpegCapture {
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
    target: String,
    width: u32,
    height: u32,
    frame_rate: Option<f64>,
    pending: Option<Frame>,
}

impl FfmpegCapture {
    fn spawn(
        mut cmd: Command,
        target: String,
        width: u32,
        height: u32,
        frame_rate: Option<f64>,
    ) -> Result<Self, SourceError> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|e| SourceError::Open {
            target: target.clone(),
            reason: format!("failed to spawn ffmpeg: {e}"),
        })?;
        let stdout = child.stdout.take().map(BufReader::new);

        let mut capture = Self {
            child: Some(child),
            stdout,
            target,
            width,
            height,
            frame_rate,
            pending: None,
        };

        match capture.read_raw() {
            Ok(frame) => {
                info!(
                    input = capture.target,
                    width,
                    height,
                    frame_rate,
                    "ffmpeg capture opened"
                );
                capture.pending = Some(frame);
                Ok(capture)
            }
            Err(e) => {
                capture.release();
                Err(SourceError::Open {
                    target: capture.target.clone(),
                    reason: format!("no frame could be read: {e}"),
                })
            }
        }
    }

    fn read_raw(&mut self) -> Result<Frame, PullError> {
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| PullError::Device("capture already released".into()))?;

        let mut buf = vec![0u8; self.width as usize * self.height as usize * 3];
        match stdout.read_exact(&mut buf) {
            Ok(()) => Frame::from_raw_rgb(self.width, self.height, buf)
                .map_err(|e| PullError::Device(e.to_string())),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(PullError::EndOfStream),
            Err(e) => Err(PullError::Device(e.to_string())),
        }
    }
}

impl Capture for FfmpegCapture {
    fn read_frame(&mut self) -> Result<Frame, PullError> {
        match self.pending.take() {
            Some(frame) => Ok(frame),
            None => self.read_raw(),
        }
    }

    fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    fn release(&mut self) {
        self.stdout = None;
        self.pending = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!(input = self.target, error = %e, "ffmpeg already exited");
            }
            if let Err(e) = child.wait() {
                warn!(input = self.target, error = %e, "failed to reap ffmpeg");
            }
            debug!(input = self.target, "ffmpeg capture released");
        }
    }
}

impl Drop for FfmpegCapture {
    fn drop(&mut self) {
        self.release();
    }
}

// -- Probing ------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<f64>,
}

fn probe_stream(ffprobe: &str, path: &Path) -> Result<StreamInfo, String> {
    let output = Command::new(ffprobe)
        .args([
            "-v", "error",
            "-select_streams", "v:0",
            "-show_entries", "stream=width,height,avg_frame_rate,r_frame_rate",
            "-of", "json",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| format!("failed to run {ffprobe}: {e}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("ffprobe failed: {}", stderr.trim()));
    }

    let info = parse_probe(&output.stdout)?;
    debug!(
        path = %path.display(),
        width = info.width,
        height = info.height,
        frame_rate = info.frame_rate,
        "probed video stream"
    );
    Ok(info)
}

pub(crate) fn parse_probe(json: &[u8]) -> Result<StreamInfo, String> {
    let probe: ProbeOutput =
        serde_json::from_slice(json).map_err(|e| format!("unreadable ffprobe output: {e}"))?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| "no video stream".to_string())?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err("video stream has no frame size".into()),
    };

    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate));

    Ok(StreamInfo {
        width,
        height,
        frame_rate,
    })
}

/// Parse an ffprobe rate such as `25/1`, `30000/1001` or `25`.
/// Zero or malformed rates yield `None`.
pub(crate) fn parse_rate(raw: &str) -> Option<f64> {
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// Check whether ffmpeg is available. Logs a warning if not found.
pub fn check_ffmpeg_available(ffmpeg: &str) -> bool {
    match Command::new(ffmpeg).arg("-version").output() {
        Ok(out) if out.status.success() => {
            debug!(ffmpeg, "ffmpeg is available");
            true
        }
        Ok(_) => {
            warn!(
                ffmpeg,
                "ffmpeg returned non-zero for -version; video and camera sources may fail"
            );
            false
        }
        Err(e) => {
            warn!(
                ffmpeg,
                error = %e,
                "ffmpeg not found; video and camera sources will fail. \
                 Install ffmpeg or set [ffmpeg] paths in the config."
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates() {
        assert_eq!(parse_rate("25/1"), Some(25.0));
        assert_eq!(parse_rate("30"), Some(30.0));
        let ntsc = parse_rate("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("0/1"), None);
        assert_eq!(parse_rate("n/a"), None);
    }

    #[test]
    fn probe_json() {
        let json = br#"{"streams":[{"width":320,"height":240,
            "r_frame_rate":"25/1","avg_frame_rate":"0/0"}]}"#;
        let info = parse_probe(json).unwrap();
        assert_eq!(
            info,
            StreamInfo {
                width: 320,
                height: 240,
                frame_rate: Some(25.0),
            }
        );
    }

    #[test]
    fn probe_without_rate_reports_none() {
        let json = br#"{"streams":[{"width":2,"height":2}]}"#;
        assert_eq!(parse_probe(json).unwrap().frame_rate, None);
    }

    #[test]
    fn probe_without_video_stream_fails() {
        assert!(parse_probe(br#"{"streams":[]}"#).is_err());
        assert!(parse_probe(br#"{}"#).is_err());
        assert!(parse_probe(b"not json").is_err());
    }

    #[test]
    fn missing_binaries_fail_to_open() {
        let backend = FfmpegBackend::new(
            FfmpegConfig {
                ffmpeg: "imago-test-no-such-ffmpeg".into(),
                ffprobe: "imago-test-no-such-ffprobe".into(),
            },
            CameraConfig::default(),
        );
        assert!(matches!(
            backend.open_video(Path::new("clip.mp4")),
            Err(SourceError::Open { .. })
        ));
        assert!(matches!(backend.open_camera(), Err(SourceError::Open { .. })));
    }
}
