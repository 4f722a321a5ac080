mod sink;

use imago_common::config::{Config, SourceConfig};
use imago_pipeline::source::ffmpeg::check_ffmpeg_available;
use imago_pipeline::source::FfmpegBackend;
use imago_pipeline::{
    FrameSource, PipelineError, ProcessManager, Session, SessionError, SessionHandle, SourceError,
    StageError, StageParams, TickOutcome,
};
use sink::Sink;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{error, info};

const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("stage {index} in config: {source}")]
    Stage { index: usize, source: StageError },
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("source error: {0}")]
    Source(#[from] SourceError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("unknown source kind '{0}', expected 'image', 'video' or 'camera'")]
    UnknownSource(String),
    #[error("source kind '{0}' needs a path")]
    MissingPath(String),
}

#[derive(Debug)]
enum StopReason {
    Interrupted,
    EndOfStream,
    SinkFinished(u64),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        source = config.source.kind,
        stages = config.stages.len(),
        output_dir = %config.output.dir.display(),
        "starting imago runner"
    );

    if let Err(e) = run(config).await {
        error!(error = %e, "runner failed");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), RunnerError> {
    if config.source.kind != "image" {
        // Video and camera sources fail to open without it.
        check_ffmpeg_available(&config.ffmpeg.ffmpeg);
    }

    let mut manager = ProcessManager::new(FrameSource::new(FfmpegBackend::from_config(&config)));
    for (index, stage) in config.stages.iter().enumerate() {
        let params =
            StageParams::try_from(stage).map_err(|source| RunnerError::Stage { index, source })?;
        manager.add_stage(params)?;
    }

    // Subscribe before opening so the first output of a still image is seen.
    let events = manager.subscribe();
    let is_static = open_source(&mut manager, &config.source)?;

    let (session, handle) = Session::new(manager);
    let session_task = tokio::spawn(session.run());

    let limit = if is_static {
        Some(1)
    } else {
        config.output.max_frames
    };
    let (stop_tx, stop_rx) = oneshot::channel();
    let sink = Sink::new(config.output.dir.clone(), limit, handle.clone(), events);
    let mut sink_task = tokio::spawn(sink.run(stop_rx));

    let reason = wait_for_stop(
        &handle,
        &mut sink_task,
        !is_static && config.output.stop_at_end_of_stream,
    )
    .await?;
    info!(?reason, "stopping");

    let written = match reason {
        StopReason::SinkFinished(written) => written,
        StopReason::Interrupted | StopReason::EndOfStream => {
            let _ = stop_tx.send(());
            sink_task.await?
        }
    };

    handle.shutdown().await?;
    session_task.await?;
    info!(written, "runner finished");
    Ok(())
}

/// Open the configured source. Returns whether it is a still image.
fn open_source(manager: &mut ProcessManager, source: &SourceConfig) -> Result<bool, RunnerError> {
    let path = || {
        source
            .path
            .as_deref()
            .ok_or_else(|| RunnerError::MissingPath(source.kind.clone()))
    };

    match source.kind.as_str() {
        "image" => {
            manager.load_image(path()?)?;
            Ok(true)
        }
        "video" => {
            manager.load_video(path()?)?;
            Ok(false)
        }
        "camera" => {
            manager.load_live_camera()?;
            Ok(false)
        }
        other => Err(RunnerError::UnknownSource(other.to_string())),
    }
}

async fn wait_for_stop(
    handle: &SessionHandle,
    sink_task: &mut tokio::task::JoinHandle<u64>,
    stop_at_end_of_stream: bool,
) -> Result<StopReason, RunnerError> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut poll = tokio::time::interval(STATUS_POLL_INTERVAL);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => return Ok(StopReason::Interrupted),
            written = &mut *sink_task => return Ok(StopReason::SinkFinished(written?)),
            _ = poll.tick(), if stop_at_end_of_stream => {
                let status = handle.status().await?;
                if status.last_tick == Some(TickOutcome::EndOfStream) {
                    return Ok(StopReason::EndOfStream);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imago_common::config::{CameraConfig, FfmpegConfig};
    use imago_common::frame::Frame;
    use imago_pipeline::source::{Capture, CaptureBackend, PullError};
    use imago_pipeline::{SourceState, StreamKind};
    use std::path::Path;

    fn ffmpeg_manager() -> ProcessManager {
        let backend = FfmpegBackend::new(FfmpegConfig::default(), CameraConfig::default());
        ProcessManager::new(FrameSource::new(backend))
    }

    fn source(kind: &str, path: Option<PathBuf>) -> SourceConfig {
        SourceConfig {
            kind: kind.into(),
            path,
        }
    }

    /// Opens streams that end before their first frame.
    struct EmptyStreams;

    struct EmptyCapture;

    impl Capture for EmptyCapture {
        fn read_frame(&mut self) -> Result<Frame, PullError> {
            Err(PullError::EndOfStream)
        }

        fn frame_rate(&self) -> Option<f64> {
            Some(25.0)
        }
    }

    impl CaptureBackend for EmptyStreams {
        fn open_video(&self, _path: &Path) -> Result<Box<dyn Capture>, SourceError> {
            Ok(Box::new(EmptyCapture))
        }

        fn open_camera(&self) -> Result<Box<dyn Capture>, SourceError> {
            Ok(Box::new(EmptyCapture))
        }
    }

    #[test]
    fn image_source_is_static() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("still.png");
        Frame::filled_gray(4, 4, 20).save(&path).unwrap();

        let mut manager = ffmpeg_manager();
        assert!(open_source(&mut manager, &source("image", Some(path))).unwrap());
        assert_eq!(manager.source().state(), SourceState::StaticImage);
        assert_eq!(manager.output(), Some(Frame::filled_gray(4, 4, 20)));
    }

    #[test]
    fn video_source_is_streaming() {
        let mut manager = ProcessManager::new(FrameSource::new(EmptyStreams));
        let clip = source("video", Some(PathBuf::from("clip.mp4")));
        assert!(!open_source(&mut manager, &clip).unwrap());
        assert_eq!(
            manager.source().state(),
            SourceState::Streaming(StreamKind::VideoFile)
        );
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut manager = ffmpeg_manager();
        let err = open_source(&mut manager, &source("webcam", None)).unwrap_err();
        assert!(matches!(err, RunnerError::UnknownSource(kind) if kind == "webcam"));
        assert_eq!(manager.source().state(), SourceState::Idle);
    }

    #[test]
    fn path_is_required_for_files() {
        let mut manager = ffmpeg_manager();
        for kind in ["image", "video"] {
            let err = open_source(&mut manager, &source(kind, None)).unwrap_err();
            assert!(matches!(err, RunnerError::MissingPath(k) if k == kind));
        }
        assert_eq!(manager.source().state(), SourceState::Idle);
    }

    #[test]
    fn missing_image_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ffmpeg_manager();
        let missing = source("image", Some(dir.path().join("missing.png")));
        assert!(matches!(
            open_source(&mut manager, &missing),
            Err(RunnerError::Source(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_end_of_stream() {
        let mut manager = ProcessManager::new(FrameSource::new(EmptyStreams));
        open_source(&mut manager, &source("video", Some(PathBuf::from("clip.mp4")))).unwrap();
        let (session, handle) = Session::new(manager);
        let session_task = tokio::spawn(session.run());
        let mut sink_task = tokio::spawn(std::future::pending::<u64>());

        let reason = wait_for_stop(&handle, &mut sink_task, true).await.unwrap();
        assert!(matches!(reason, StopReason::EndOfStream));

        sink_task.abort();
        handle.shutdown().await.unwrap();
        session_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_sink_is_done() {
        let manager = ffmpeg_manager();
        let (session, handle) = Session::new(manager);
        let session_task = tokio::spawn(session.run());
        let mut sink_task = tokio::spawn(async { 3u64 });

        let reason = wait_for_stop(&handle, &mut sink_task, true).await.unwrap();
        assert!(matches!(reason, StopReason::SinkFinished(3)));

        handle.shutdown().await.unwrap();
        session_task.await.unwrap();
    }
}
