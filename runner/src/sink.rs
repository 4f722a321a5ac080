use chrono::{DateTime, TimeZone, Utc};
use imago_common::frame::{Frame, FrameError};
use imago_pipeline::{Notification, SessionHandle};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};

/// Writes every new output frame to disk as PNG.
pub struct Sink {
    dir: PathBuf,
    limit: Option<u64>,
    handle: SessionHandle,
    events: broadcast::Receiver<Notification>,
    last: Option<Frame>,
    written: u64,
}

impl Sink {
    pub fn new(
        dir: PathBuf,
        limit: Option<u64>,
        handle: SessionHandle,
        events: broadcast::Receiver<Notification>,
    ) -> Self {
        Self {
            dir,
            limit,
            handle,
            events,
            last: None,
            written: 0,
        }
    }

    /// Run until `limit` frames are written, the session goes away or `stop`
    /// fires. Events already queued when `stop` fires are still written.
    /// Returns the number of frames written.
    pub async fn run(mut self, mut stop: oneshot::Receiver<()>) -> u64 {
        info!(dir = %self.dir.display(), limit = self.limit, "output sink started");

        while !self.limit_reached() {
            tokio::select! {
                biased;
                _ = &mut stop => {
                    self.drain().await;
                    break;
                }
                event = self.events.recv() => match event {
                    Ok(Notification::OutputReady) => {
                        if !self.write_output().await {
                            break;
                        }
                    }
                    Ok(Notification::InputReady) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "output sink fell behind, skipping notifications");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        info!(written = self.written, "output sink finished");
        self.written
    }

    fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|limit| self.written >= limit)
    }

    async fn drain(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(Notification::OutputReady) => {
                    if self.limit_reached() || !self.write_output().await {
                        return;
                    }
                }
                Ok(Notification::InputReady) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return,
            }
        }
    }

    /// Fetch the current output and write it unless it was already written.
    /// Returns `false` once the session is gone.
    async fn write_output(&mut self) -> bool {
        let frame = match self.handle.output().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return true,
            Err(e) => {
                debug!(error = %e, "session closed, stopping sink");
                return false;
            }
        };
        if self
            .last
            .as_ref()
            .is_some_and(|last| last.shares_storage_with(&frame))
        {
            return true;
        }

        let seq = self.written + 1;
        let path = output_path(&self.dir, Utc::now().timestamp_millis(), seq);
        let to_save = frame.clone();
        let target = path.clone();
        match tokio::task::spawn_blocking(move || save_frame(&to_save, &target)).await {
            Ok(Ok(())) => {
                self.written = seq;
                self.last = Some(frame);
                debug!(path = %path.display(), seq, "output frame written");
            }
            Ok(Err(e)) => {
                error!(path = %path.display(), error = %e, "failed to write output frame")
            }
            Err(e) => error!(error = %e, "spawn_blocking failed"),
        }
        true
    }
}

fn save_frame(frame: &Frame, path: &Path) -> Result<(), SinkError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| SinkError::CreateDir(parent.display().to_string(), e))?;
    }
    frame.save(path)?;
    Ok(())
}

fn timestamp(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

/// Path for output frame `seq` captured at `ms`.
/// e.g. "output/2026-02-18/20260218T093000123Z_000001.png"
pub fn output_path(dir: &Path, ms: i64, seq: u64) -> PathBuf {
    let dt = timestamp(ms);
    dir.join(dt.format("%Y-%m-%d").to_string())
        .join(format!("{}_{seq:06}.png", dt.format("%Y%m%dT%H%M%S%3fZ")))
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to create output directory {0}: {1}")]
    CreateDir(String, std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use imago_common::config::{CameraConfig, FfmpegConfig};
    use imago_pipeline::source::FfmpegBackend;
    use imago_pipeline::{FrameSource, ProcessManager, Session};

    #[test]
    fn path_layout() {
        // 2026-02-18T09:30:00.123Z
        let path = output_path(Path::new("out"), 1_771_407_000_123, 7);
        assert_eq!(
            path,
            Path::new("out/2026-02-18/20260218T093000123Z_000007.png")
        );
    }

    #[tokio::test]
    async fn writes_static_image_once() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.png");
        Frame::filled_rgb(8, 6, [10, 200, 30]).save(&input).unwrap();

        let backend = FfmpegBackend::new(FfmpegConfig::default(), CameraConfig::default());
        let mut manager = ProcessManager::new(FrameSource::new(backend));
        let events = manager.subscribe();
        manager.load_image(&input).unwrap();

        let (session, handle) = Session::new(manager);
        let session_task = tokio::spawn(session.run());

        let out_dir = dir.path().join("out");
        let (_stop_tx, stop_rx) = oneshot::channel();
        let written = Sink::new(out_dir.clone(), Some(1), handle.clone(), events)
            .run(stop_rx)
            .await;
        assert_eq!(written, 1);

        let day = std::fs::read_dir(&out_dir).unwrap().next().unwrap().unwrap();
        let files: Vec<_> = std::fs::read_dir(day.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        let saved = Frame::open(&files[0].as_ref().unwrap().path()).unwrap();
        assert_eq!(saved, Frame::filled_rgb(8, 6, [10, 200, 30]));

        handle.shutdown().await.unwrap();
        session_task.await.unwrap();
    }

    #[tokio::test]
    async fn stops_on_request() {
        let backend = FfmpegBackend::new(FfmpegConfig::default(), CameraConfig::default());
        let manager = ProcessManager::new(FrameSource::new(backend));
        let events = manager.subscribe();
        let (session, handle) = Session::new(manager);
        let session_task = tokio::spawn(session.run());

        let dir = tempfile::tempdir().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel();
        let sink = Sink::new(dir.path().to_path_buf(), None, handle.clone(), events);
        let sink = tokio::spawn(sink.run(stop_rx));

        handle.shutdown().await.unwrap();
        session_task.await.unwrap();
        stop_tx.send(()).unwrap();
        assert_eq!(sink.await.unwrap(), 0);
    }
}
