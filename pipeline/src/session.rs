//! Runs a [`ProcessManager`] on its own task.
//!
//! Commands and acquisition ticks are handled one at a time on that task, so
//! an edit can never interleave with a pipeline run.

use imago_common::frame::Frame;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

use crate::manager::{ManagerState, Notification, ProcessManager, TickOutcome};
use crate::pipeline::PipelineError;
use crate::source::{SourceError, SourceState};
use crate::stage::StageParams;

const COMMAND_CAPACITY: usize = 32;

type Reply<T> = oneshot::Sender<T>;

pub enum Command {
    SetInput {
        frame: Option<Frame>,
        reply: Reply<bool>,
    },
    SetInputFromPath {
        path: PathBuf,
        reply: Reply<bool>,
    },
    LoadImage {
        path: PathBuf,
        reply: Reply<Result<(), SourceError>>,
    },
    LoadImageBytes {
        data: Vec<u8>,
        reply: Reply<Result<(), SourceError>>,
    },
    LoadVideo {
        path: PathBuf,
        reply: Reply<Result<Duration, SourceError>>,
    },
    LoadLiveCamera {
        reply: Reply<Result<Duration, SourceError>>,
    },
    Pause {
        reply: Reply<()>,
    },
    Resume {
        reply: Reply<()>,
    },
    AddStage {
        params: StageParams,
        reply: Reply<Result<usize, PipelineError>>,
    },
    UpdateStage {
        index: usize,
        params: StageParams,
        reply: Reply<Result<(), PipelineError>>,
    },
    RemoveStage {
        index: usize,
        reply: Reply<Result<(), PipelineError>>,
    },
    MoveStageUp {
        index: usize,
        reply: Reply<Result<(), PipelineError>>,
    },
    MoveStageDown {
        index: usize,
        reply: Reply<Result<(), PipelineError>>,
    },
    Refresh {
        reply: Reply<()>,
    },
    Input {
        reply: Reply<Option<Frame>>,
    },
    Output {
        reply: Reply<Option<Frame>>,
    },
    Status {
        reply: Reply<Status>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Snapshot of a running session.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub state: ManagerState,
    pub source: SourceState,
    pub running: bool,
    pub frame_interval: Option<Duration>,
    pub stages: Vec<StageParams>,
    pub last_tick: Option<TickOutcome>,
}

impl Status {
    fn of(manager: &ProcessManager) -> Self {
        Self {
            state: manager.state(),
            source: manager.source().state(),
            running: manager.source().is_running(),
            frame_interval: manager.source().frame_interval(),
            stages: manager.pipeline().stages().iter().map(|s| *s.params()).collect(),
            last_tick: manager.last_tick().cloned(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session has shut down")]
    Closed,
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

pub struct Session {
    manager: ProcessManager,
    commands: mpsc::Receiver<Command>,
}

enum Event {
    Command(Option<Command>),
    Tick(TickOutcome),
}

impl Session {
    pub fn new(manager: ProcessManager) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let handle = SessionHandle {
            commands: tx,
            notifier: manager.notifier(),
        };
        (
            Self {
                manager,
                commands: rx,
            },
            handle,
        )
    }

    /// Serve commands and ticks until `Shutdown` arrives or every handle is
    /// dropped. The source is released before the manager is handed back.
    pub async fn run(self) -> ProcessManager {
        let Session {
            mut manager,
            mut commands,
        } = self;
        info!("session started");

        loop {
            let event = tokio::select! {
                biased;
                cmd = commands.recv() => Event::Command(cmd),
                outcome = manager.tick() => Event::Tick(outcome),
            };

            match event {
                Event::Tick(outcome) => {
                    debug!(?outcome, "tick handled");
                }
                Event::Command(None) => {
                    debug!("all session handles dropped");
                    break;
                }
                Event::Command(Some(Command::Shutdown { reply })) => {
                    manager.stop();
                    let _ = reply.send(());
                    info!("session shut down");
                    return manager;
                }
                Event::Command(Some(cmd)) => handle_command(&mut manager, cmd),
            }
        }

        manager.stop();
        info!("session shut down");
        manager
    }
}

fn handle_command(manager: &mut ProcessManager, cmd: Command) {
    // A dropped reply receiver only means the caller stopped waiting.
    match cmd {
        Command::SetInput { frame, reply } => {
            let _ = reply.send(manager.set_input(frame));
        }
        Command::SetInputFromPath { path, reply } => {
            let _ = reply.send(manager.set_input_from_path(&path));
        }
        Command::LoadImage { path, reply } => {
            let _ = reply.send(manager.load_image(&path));
        }
        Command::LoadImageBytes { data, reply } => {
            let _ = reply.send(manager.load_image_bytes(&data));
        }
        Command::LoadVideo { path, reply } => {
            let _ = reply.send(manager.load_video(&path));
        }
        Command::LoadLiveCamera { reply } => {
            let _ = reply.send(manager.load_live_camera());
        }
        Command::Pause { reply } => {
            manager.pause();
            let _ = reply.send(());
        }
        Command::Resume { reply } => {
            manager.resume();
            let _ = reply.send(());
        }
        Command::AddStage { params, reply } => {
            let _ = reply.send(manager.add_stage(params));
        }
        Command::UpdateStage {
            index,
            params,
            reply,
        } => {
            let _ = reply.send(manager.update_stage(index, params));
        }
        Command::RemoveStage { index, reply } => {
            let _ = reply.send(manager.remove_stage(index));
        }
        Command::MoveStageUp { index, reply } => {
            let _ = reply.send(manager.move_stage_up(index));
        }
        Command::MoveStageDown { index, reply } => {
            let _ = reply.send(manager.move_stage_down(index));
        }
        Command::Refresh { reply } => {
            manager.refresh();
            let _ = reply.send(());
        }
        Command::Input { reply } => {
            let _ = reply.send(manager.input());
        }
        Command::Output { reply } => {
            let _ = reply.send(manager.output());
        }
        Command::Status { reply } => {
            let _ = reply.send(Status::of(manager));
        }
        Command::Shutdown { reply } => {
            // handled by the run loop
            let _ = reply.send(());
        }
    }
}

/// Cloneable front end of a [`Session`].
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    notifier: broadcast::Sender<Notification>,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Feed an already decoded frame. `Ok(false)` when there is no data.
    pub async fn set_input(&self, frame: Option<Frame>) -> Result<bool, SessionError> {
        self.request(|reply| Command::SetInput { frame, reply }).await
    }

    /// Decode `path` and feed it without changing the source.
    pub async fn set_input_from_path(
        &self,
        path: impl Into<PathBuf>,
    ) -> Result<bool, SessionError> {
        let path = path.into();
        self.request(|reply| Command::SetInputFromPath { path, reply })
            .await
    }

    pub async fn load_image(&self, path: impl Into<PathBuf>) -> Result<(), SessionError> {
        let path = path.into();
        Ok(self.request(|reply| Command::LoadImage { path, reply }).await??)
    }

    pub async fn load_image_bytes(&self, data: Vec<u8>) -> Result<(), SessionError> {
        Ok(self
            .request(|reply| Command::LoadImageBytes { data, reply })
            .await??)
    }

    pub async fn load_video(&self, path: impl Into<PathBuf>) -> Result<Duration, SessionError> {
        let path = path.into();
        Ok(self.request(|reply| Command::LoadVideo { path, reply }).await??)
    }

    pub async fn load_live_camera(&self) -> Result<Duration, SessionError> {
        Ok(self
            .request(|reply| Command::LoadLiveCamera { reply })
            .await??)
    }

    pub async fn pause(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Resume { reply }).await
    }

    pub async fn add_stage(&self, params: StageParams) -> Result<usize, SessionError> {
        Ok(self
            .request(|reply| Command::AddStage { params, reply })
            .await??)
    }

    pub async fn update_stage(
        &self,
        index: usize,
        params: StageParams,
    ) -> Result<(), SessionError> {
        Ok(self
            .request(|reply| Command::UpdateStage {
                index,
                params,
                reply,
            })
            .await??)
    }

    pub async fn remove_stage(&self, index: usize) -> Result<(), SessionError> {
        Ok(self
            .request(|reply| Command::RemoveStage { index, reply })
            .await??)
    }

    pub async fn move_stage_up(&self, index: usize) -> Result<(), SessionError> {
        Ok(self
            .request(|reply| Command::MoveStageUp { index, reply })
            .await??)
    }

    pub async fn move_stage_down(&self, index: usize) -> Result<(), SessionError> {
        Ok(self
            .request(|reply| Command::MoveStageDown { index, reply })
            .await??)
    }

    pub async fn refresh(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Refresh { reply }).await
    }

    pub async fn input(&self) -> Result<Option<Frame>, SessionError> {
        self.request(|reply| Command::Input { reply }).await
    }

    pub async fn output(&self) -> Result<Option<Frame>, SessionError> {
        self.request(|reply| Command::Output { reply }).await
    }

    pub async fn status(&self) -> Result<Status, SessionError> {
        self.request(|reply| Command::Status { reply }).await
    }

    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}
