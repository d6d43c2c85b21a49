use std::sync::Arc;

use relay_config::shared::PipelineOptions;
use tracing::{Instrument, debug, error, info, info_span};

use crate::bail;
use crate::concurrency::shutdown::ShutdownRx;
use crate::connection::ConnectionPort;
use crate::conversions::ChangeNormalizer;
use crate::error::{ErrorKind, RelayResult};
use crate::handler::HandlerRegistry;
use crate::pipeline::status::StatusTx;
use crate::workers::base::{Worker, WorkerHandle, WorkerType};
use crate::workers::reconnect::reconnect;

/// Outcome of one fetch, dispatch and acknowledge round.
enum Round {
    Processed,
    Idle,
}

/// Fetches, dispatches and acknowledges one batch at a time.
///
/// Any failure in a round, including a handler error, is logged and followed by a
/// reconnect, after which the loop carries on with the next batch. The server redelivers
/// the unacknowledged batch after the rollback performed by the reconnect.
#[derive(Debug)]
pub struct SyncWorker<P> {
    port: Arc<P>,
    options: Arc<PipelineOptions>,
    normalizer: ChangeNormalizer,
    registry: HandlerRegistry,
    status: StatusTx,
    shutdown_rx: ShutdownRx,
}

impl<P> SyncWorker<P>
where
    P: ConnectionPort,
{
    pub fn new(
        port: Arc<P>,
        options: Arc<PipelineOptions>,
        normalizer: ChangeNormalizer,
        registry: HandlerRegistry,
        status: StatusTx,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            port,
            options,
            normalizer,
            registry,
            status,
            shutdown_rx,
        }
    }

    async fn run(mut self) -> RelayResult<()> {
        info!("sync worker started");

        let fetch = self.options.fetch.clone();
        while !self.shutdown_rx.is_shutdown() {
            match self.process_round().await {
                Ok(Round::Processed) => {}
                Ok(Round::Idle) => {
                    if self.shutdown_rx.sleep(fetch.idle_interval()).await {
                        break;
                    }
                }
                Err(err) => {
                    error!(error = %err, "sync round failed, reconnecting");
                    if self.shutdown_rx.is_shutdown() {
                        break;
                    }

                    let reconnected =
                        reconnect(self.port.as_ref(), &self.options.filter, &self.status).await;
                    if reconnected.is_err() && self.shutdown_rx.sleep(fetch.reconnect_delay()).await
                    {
                        break;
                    }
                }
            }
        }

        info!("sync worker stopped");

        Ok(())
    }

    async fn process_round(&self) -> RelayResult<Round> {
        if !self.port.is_valid() {
            bail!(ErrorKind::ConnectionFailed, "Connection is not valid");
        }

        let fetched = self.port.fetch(self.options.batch_size).await?;
        if !fetched.is_available() {
            return Ok(Round::Idle);
        }

        let batch_id = fetched.batch_id;
        if !fetched.entries.is_empty() {
            let batch = self.normalizer.normalize(batch_id, &fetched.entries);
            if batch.is_empty() {
                debug!(batch_id, "batch has no changes");
            } else {
                info!(batch_id, changes = batch.len(), "dispatching batch");
                self.registry.dispatch(&batch).await?;
            }
        }

        self.port.acknowledge(batch_id).await?;
        debug!(batch_id, "batch acknowledged");

        Ok(Round::Processed)
    }
}

impl<P> Worker for SyncWorker<P>
where
    P: ConnectionPort,
{
    fn start(self) -> WorkerHandle {
        let span = info_span!(
            "sync_worker",
            destination = %self.options.destination,
            mode = %self.options.mode
        );

        WorkerHandle::spawn(WorkerType::Sync, self.run().instrument(span))
    }
}
