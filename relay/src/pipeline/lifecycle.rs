use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use relay_config::shared::PipelineOptions;
use tokio::sync::{Mutex, watch};
use tracing::{error, info, warn};

use crate::bail;
use crate::concurrency::shutdown::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::connection::ConnectionPort;
use crate::conversions::ChangeNormalizer;
use crate::error::{ErrorKind, RelayError, RelayResult};
use crate::handler::HandlerRegistry;
use crate::pipeline::status::{PipelineStatus, StatusTx};
use crate::workers::base::WorkerHandle;

#[derive(Debug)]
enum State {
    NotStarted,
    Running(Vec<WorkerHandle>),
    Stopped(Option<RelayError>),
}

/// Start and dispose sequencing shared by both pipeline variants.
#[derive(Debug)]
pub(crate) struct PipelineCore<P> {
    pub(crate) options: Arc<PipelineOptions>,
    pub(crate) port: Arc<P>,
    pub(crate) registry: HandlerRegistry,
    pub(crate) normalizer: ChangeNormalizer,
    pub(crate) status: StatusTx,
    shutdown_tx: ShutdownTx,
    // Kept so the channel stays open until the pipeline is dropped.
    _shutdown_rx: ShutdownRx,
    disposed: AtomicBool,
    state: Mutex<State>,
}

impl<P> PipelineCore<P>
where
    P: ConnectionPort,
{
    pub(crate) fn new(
        options: PipelineOptions,
        port: P,
        registry: HandlerRegistry,
        normalizer: ChangeNormalizer,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        Self {
            options: Arc::new(options),
            port: Arc::new(port),
            registry,
            normalizer,
            status: StatusTx::new(),
            shutdown_tx,
            _shutdown_rx: shutdown_rx,
            disposed: AtomicBool::new(false),
            state: Mutex::new(State::NotStarted),
        }
    }

    pub(crate) fn shutdown_rx(&self) -> ShutdownRx {
        self.shutdown_tx.subscribe()
    }

    pub(crate) fn subscribe_status(&self) -> watch::Receiver<PipelineStatus> {
        self.status.subscribe()
    }

    /// Opens the connection, then spawns the workers built by `spawn_workers`.
    pub(crate) async fn start<F>(&self, spawn_workers: F) -> RelayResult<()>
    where
        F: FnOnce() -> Vec<WorkerHandle>,
    {
        let mut state = self.state.lock().await;
        if !matches!(*state, State::NotStarted) || self.disposed.load(Ordering::SeqCst) {
            bail!(
                ErrorKind::InvalidState,
                "Pipeline cannot be started",
                "a pipeline can only be started once and not after it was disposed"
            );
        }

        info!(
            destination = %self.options.destination,
            mode = %self.port.mode(),
            filter = %self.options.filter,
            "connecting to the change-capture server"
        );
        self.status.set(PipelineStatus::Connecting);

        if let Err(err) = self.port.open(&self.options.filter).await {
            *state = State::Stopped(None);
            self.status.set(PipelineStatus::Stopped);
            return Err(err);
        }

        self.status.set(PipelineStatus::Running);
        *state = State::Running(spawn_workers());

        info!(destination = %self.options.destination, "pipeline started");

        Ok(())
    }

    /// Signals shutdown, releases the connection, joins the workers, then releases the handlers.
    ///
    /// Runs once; later calls return immediately. Failures are logged.
    pub(crate) async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(destination = %self.options.destination, "disposing pipeline");
        self.status.set(PipelineStatus::Stopping);
        self.shutdown_tx.shutdown();

        if let Err(err) = self.port.unsubscribe(&self.options.filter).await {
            warn!(error = %err, "failed to unsubscribe");
        }
        if let Err(err) = self.port.disconnect().await {
            warn!(error = %err, "failed to disconnect");
        }

        let mut state = self.state.lock().await;
        let workers = match std::mem::replace(&mut *state, State::Stopped(None)) {
            State::Running(workers) => workers,
            State::NotStarted | State::Stopped(_) => Vec::new(),
        };

        let results = join_all(workers.into_iter().map(|worker| async move {
            let worker_type = worker.worker_type();
            (worker_type, worker.wait().await)
        }))
        .await;

        let mut errors = Vec::new();
        for (worker_type, result) in results {
            if let Err(err) = result {
                error!(worker = %worker_type, error = %err, "worker finished with an error");
                errors.push(err);
            }
        }

        if !errors.is_empty() {
            *state = State::Stopped(Some(errors.into()));
        }
        drop(state);

        // Handlers are released only once no worker can still be inside `handle`.
        self.registry.release().await;

        self.status.set(PipelineStatus::Stopped);
        info!(destination = %self.options.destination, "pipeline disposed");
    }

    /// Waits until the pipeline is disposed and returns the errors its workers ended with.
    pub(crate) async fn wait(&self) -> RelayResult<()> {
        let mut status = self.status.subscribe();
        let _ = status
            .wait_for(|status| *status == PipelineStatus::Stopped)
            .await;

        match &*self.state.lock().await {
            State::Stopped(Some(err)) => Err(err.clone()),
            _ => Ok(()),
        }
    }
}
