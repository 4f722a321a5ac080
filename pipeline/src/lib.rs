pub mod manager;
pub mod pipeline;
pub mod session;
pub mod source;
pub mod stage;

#[cfg(test)]
pub(crate) mod testing;

pub use manager::{ManagerState, Notification, ProcessManager, TickOutcome};
pub use pipeline::{Pipeline, PipelineError};
pub use session::{Command, Session, SessionError, SessionHandle, Status};
pub use source::{FrameSource, SourceError, SourceState, StreamKind};
pub use stage::{Stage, StageError, StageKind, StageParams};
