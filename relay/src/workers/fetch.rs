use std::sync::Arc;
use std::time::Instant;

use relay_config::shared::PipelineOptions;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::concurrency::backpressure::BatchQueue;
use crate::concurrency::shutdown::ShutdownRx;
use crate::connection::ConnectionPort;
use crate::conversions::ChangeNormalizer;
use crate::error::RelayResult;
use crate::pipeline::status::StatusTx;
use crate::types::{ChangeBatch, QueuedBatch};
use crate::workers::base::{Worker, WorkerHandle, WorkerType};
use crate::workers::reconnect::reconnect;

/// Fetches batches from the port, normalizes them and queues them for dispatch.
///
/// Transport failures are logged and followed by a reconnect; the worker only stops on
/// shutdown. After queuing a batch with changes, the worker pauses while the queue is
/// under backpressure.
#[derive(Debug)]
pub struct FetchWorker<P> {
    port: Arc<P>,
    options: Arc<PipelineOptions>,
    normalizer: ChangeNormalizer,
    queue: Arc<BatchQueue<QueuedBatch>>,
    status: StatusTx,
    shutdown_rx: ShutdownRx,
}

impl<P> FetchWorker<P>
where
    P: ConnectionPort,
{
    pub fn new(
        port: Arc<P>,
        options: Arc<PipelineOptions>,
        normalizer: ChangeNormalizer,
        queue: Arc<BatchQueue<QueuedBatch>>,
        status: StatusTx,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            port,
            options,
            normalizer,
            queue,
            status,
            shutdown_rx,
        }
    }

    async fn run(mut self) -> RelayResult<()> {
        info!("fetch worker started");

        let fetch = self.options.fetch.clone();
        while !self.shutdown_rx.is_shutdown() {
            if !self.port.is_valid() {
                warn!("connection is not valid, reconnecting");
                if self.shutdown_rx.sleep(fetch.reconnect_delay()).await {
                    break;
                }
                if let Err(err) =
                    reconnect(self.port.as_ref(), &self.options.filter, &self.status).await
                {
                    debug!(error = %err, "reconnect will be retried on the next iteration");
                }
                continue;
            }

            let started = Instant::now();
            let fetched = match self.port.fetch(self.options.batch_size).await {
                Ok(fetched) => fetched,
                Err(err) => {
                    error!(error = %err, "failed to fetch batch");
                    if self.shutdown_rx.sleep(fetch.reconnect_delay()).await {
                        break;
                    }
                    if let Err(err) =
                        reconnect(self.port.as_ref(), &self.options.filter, &self.status).await
                    {
                        debug!(error = %err, "reconnect will be retried on the next iteration");
                    }
                    continue;
                }
            };

            if !fetched.is_available() {
                if self.shutdown_rx.sleep(fetch.idle_interval()).await {
                    break;
                }
                continue;
            }

            let batch_id = fetched.batch_id;
            let batch = if fetched.entries.is_empty() {
                ChangeBatch::empty(batch_id)
            } else {
                self.normalizer.normalize(batch_id, &fetched.entries)
            };

            debug!(
                batch_id,
                entries = fetched.entries.len(),
                changes = batch.len(),
                "queuing batch"
            );

            // Batches without changes only carry an id to acknowledge and never pause fetching.
            let has_changes = !batch.is_empty();
            let queued = QueuedBatch::new(batch, started.elapsed());
            if self.queue.push(queued, has_changes).await {
                info!(batch_id, "dispatch is behind, pausing fetch");
                tokio::select! {
                    biased;

                    _ = self.shutdown_rx.wait() => break,
                    _ = self.queue.wait_for_release() => {
                        info!("dispatch caught up, resuming fetch");
                    }
                }
            }

            if self.shutdown_rx.sleep(fetch.poll_interval()).await {
                break;
            }
        }

        info!("fetch worker stopped");

        Ok(())
    }
}

impl<P> Worker for FetchWorker<P>
where
    P: ConnectionPort,
{
    fn start(self) -> WorkerHandle {
        let span = info_span!(
            "fetch_worker",
            destination = %self.options.destination,
            mode = %self.options.mode
        );

        WorkerHandle::spawn(WorkerType::Fetch, self.run().instrument(span))
    }
}
