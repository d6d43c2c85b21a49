use std::sync::Arc;

use relay_config::shared::PipelineOptions;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::connection::ConnectionPort;
use crate::error::RelayResult;
use crate::workers::base::{Worker, WorkerHandle, WorkerType};

/// Acknowledges dispatched batch ids in the order they were dispatched.
///
/// A failed acknowledgement is logged and dropped. The server redelivers the batch from
/// the last acknowledged position on the next rollback, so handlers may see it again.
#[derive(Debug)]
pub struct AckWorker<P> {
    port: Arc<P>,
    options: Arc<PipelineOptions>,
    ack_rx: mpsc::UnboundedReceiver<i64>,
    shutdown_rx: ShutdownRx,
}

impl<P> AckWorker<P>
where
    P: ConnectionPort,
{
    pub fn new(
        port: Arc<P>,
        options: Arc<PipelineOptions>,
        ack_rx: mpsc::UnboundedReceiver<i64>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            port,
            options,
            ack_rx,
            shutdown_rx,
        }
    }

    async fn run(mut self) -> RelayResult<()> {
        info!("acknowledge worker started");

        while !self.shutdown_rx.is_shutdown() {
            let batch_id = tokio::select! {
                biased;

                _ = self.shutdown_rx.wait() => break,
                batch_id = self.ack_rx.recv() => match batch_id {
                    Some(batch_id) => batch_id,
                    None => break,
                },
            };

            if batch_id <= 0 {
                continue;
            }

            match self.port.acknowledge(batch_id).await {
                Ok(()) => debug!(batch_id, "batch acknowledged"),
                Err(err) => warn!(
                    batch_id,
                    error = %err,
                    "failed to acknowledge batch, it will be redelivered"
                ),
            }
        }

        info!("acknowledge worker stopped");

        Ok(())
    }
}

impl<P> Worker for AckWorker<P>
where
    P: ConnectionPort,
{
    fn start(self) -> WorkerHandle {
        let span = info_span!(
            "ack_worker",
            destination = %self.options.destination,
            mode = %self.options.mode
        );

        WorkerHandle::spawn(WorkerType::Acknowledge, self.run().instrument(span))
    }
}
