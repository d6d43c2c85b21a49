use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Lifecycle state of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStatus {
    Created,
    Connecting,
    Running,
    /// Recovering from a transport failure, returns to [`PipelineStatus::Running`].
    Reconnecting,
    /// Dispatch stopped on a handler error, the pipeline stays here until it is disposed.
    Failed,
    Stopping,
    Stopped,
}

impl PipelineStatus {
    fn is_active(&self) -> bool {
        matches!(self, PipelineStatus::Running | PipelineStatus::Reconnecting)
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStatus::Created => "created",
            PipelineStatus::Connecting => "connecting",
            PipelineStatus::Running => "running",
            PipelineStatus::Reconnecting => "reconnecting",
            PipelineStatus::Failed => "failed",
            PipelineStatus::Stopping => "stopping",
            PipelineStatus::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Publishes [`PipelineStatus`] transitions to any number of observers.
#[derive(Debug, Clone)]
pub struct StatusTx(Arc<watch::Sender<PipelineStatus>>);

impl StatusTx {
    pub fn new() -> Self {
        Self(Arc::new(watch::channel(PipelineStatus::Created).0))
    }

    /// Returns the latest published status.
    pub fn current(&self) -> PipelineStatus {
        *self.0.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineStatus> {
        self.0.subscribe()
    }

    /// Publishes `status` unconditionally.
    pub fn set(&self, status: PipelineStatus) {
        self.0.send_replace(status);
    }

    /// Moves between running and reconnecting; ignored once the pipeline is stopping.
    pub fn set_if_active(&self, status: PipelineStatus) {
        self.0.send_if_modified(|current| {
            if current.is_active() && *current != status {
                *current = status;
                return true;
            }
            false
        });
    }
}

impl Default for StatusTx {
    fn default() -> Self {
        Self::new()
    }
}
