use std::sync::Arc;

use relay_config::shared::PipelineOptions;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, info_span};

use crate::concurrency::backpressure::BatchQueue;
use crate::concurrency::shutdown::ShutdownRx;
use crate::connection::ConnectionPort;
use crate::conversions::time::format_elapsed;
use crate::error::RelayResult;
use crate::handler::HandlerRegistry;
use crate::pipeline::status::{PipelineStatus, StatusTx};
use crate::types::QueuedBatch;
use crate::workers::base::{Worker, WorkerHandle, WorkerType};

/// Hands queued batches to the handlers and forwards their ids for acknowledgement.
///
/// A handler error stops this worker for good: the failing batch is not acknowledged and no
/// later batch is dispatched, so nothing is skipped past the failure. Batches without
/// changes are forwarded without calling any handler.
#[derive(Debug)]
pub struct DispatchWorker<P> {
    port: Arc<P>,
    options: Arc<PipelineOptions>,
    queue: Arc<BatchQueue<QueuedBatch>>,
    registry: HandlerRegistry,
    ack_tx: mpsc::UnboundedSender<i64>,
    status: StatusTx,
    shutdown_rx: ShutdownRx,
}

impl<P> DispatchWorker<P>
where
    P: ConnectionPort,
{
    pub fn new(
        port: Arc<P>,
        options: Arc<PipelineOptions>,
        queue: Arc<BatchQueue<QueuedBatch>>,
        registry: HandlerRegistry,
        ack_tx: mpsc::UnboundedSender<i64>,
        status: StatusTx,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            port,
            options,
            queue,
            registry,
            ack_tx,
            status,
            shutdown_rx,
        }
    }

    async fn run(mut self) -> RelayResult<()> {
        info!("dispatch worker started");

        while !self.shutdown_rx.is_shutdown() {
            // Batches stay queued while the fetch side re-establishes the connection.
            if !self.port.is_valid() {
                if self
                    .shutdown_rx
                    .sleep(self.options.fetch.idle_interval())
                    .await
                {
                    break;
                }
                continue;
            }

            let queued = tokio::select! {
                biased;

                _ = self.shutdown_rx.wait() => break,
                queued = self.queue.pop() => queued,
            };

            let batch = queued.batch;
            let batch_id = batch.batch_id;

            if batch.is_empty() {
                debug!(batch_id, "batch has no changes, forwarding for acknowledgement");
                if self.ack_tx.send(batch_id).is_err() {
                    break;
                }
                continue;
            }

            info!(
                batch_id,
                changes = batch.len(),
                fetch_latency = %format_elapsed(queued.fetch_latency),
                "dispatching batch"
            );

            if let Err(err) = self.registry.dispatch(&batch).await {
                error!(
                    batch_id,
                    error = %err,
                    "handler failed, dispatch stopped until the pipeline is restarted"
                );
                self.status.set_if_active(PipelineStatus::Failed);
                return Err(err);
            }

            if self.ack_tx.send(batch_id).is_err() {
                break;
            }
        }

        info!("dispatch worker stopped");

        Ok(())
    }
}

impl<P> Worker for DispatchWorker<P>
where
    P: ConnectionPort,
{
    fn start(self) -> WorkerHandle {
        let span = info_span!(
            "dispatch_worker",
            destination = %self.options.destination,
            mode = %self.options.mode
        );

        WorkerHandle::spawn(WorkerType::Dispatch, self.run().instrument(span))
    }
}
