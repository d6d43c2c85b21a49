use std::fmt;
use std::future::Future;

use tokio::task::JoinHandle;

use crate::error::{ErrorKind, RelayResult};
use crate::relay_error;

/// Kind of a pipeline worker.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WorkerType {
    /// Fetches batches and queues them for dispatch.
    Fetch,
    /// Hands queued batches to the handlers.
    Dispatch,
    /// Acknowledges dispatched batch ids.
    Acknowledge,
    /// Fetches, dispatches and acknowledges in one loop.
    Sync,
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerType::Fetch => "fetch",
            WorkerType::Dispatch => "dispatch",
            WorkerType::Acknowledge => "acknowledge",
            WorkerType::Sync => "sync",
        };
        f.write_str(name)
    }
}

/// A worker that can be started in the background.
pub trait Worker {
    fn start(self) -> WorkerHandle;
}

/// Handle to a spawned worker task.
#[derive(Debug)]
pub struct WorkerHandle {
    worker_type: WorkerType,
    handle: JoinHandle<RelayResult<()>>,
}

impl WorkerHandle {
    /// Spawns `future` on the runtime as a worker of type `worker_type`.
    pub fn spawn<F>(worker_type: WorkerType, future: F) -> Self
    where
        F: Future<Output = RelayResult<()>> + Send + 'static,
    {
        Self {
            worker_type,
            handle: tokio::spawn(future),
        }
    }

    pub fn worker_type(&self) -> WorkerType {
        self.worker_type
    }

    /// Returns `true` if the worker task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the worker to finish and returns its result.
    ///
    /// A panic or cancellation of the task is turned into an error, so that no worker
    /// failure goes unnoticed.
    pub async fn wait(self) -> RelayResult<()> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(relay_error!(
                ErrorKind::WorkerPanic,
                "Worker panicked",
                format!("{} worker panicked: {err}", self.worker_type)
            )),
            Err(err) => Err(relay_error!(
                ErrorKind::WorkerCancelled,
                "Worker was cancelled",
                format!("{} worker was cancelled: {err}", self.worker_type)
            )),
        }
    }
}
