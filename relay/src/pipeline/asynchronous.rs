use std::sync::Arc;

use async_trait::async_trait;
use relay_config::shared::{PipelineMode, PipelineOptions};
use tokio::sync::{mpsc, watch};

use crate::concurrency::backpressure::BatchQueue;
use crate::connection::ConnectionPort;
use crate::conversions::{ChangeNormalizer, RowChangeDecoder};
use crate::error::RelayResult;
use crate::handler::HandlerRegistry;
use crate::pipeline::lifecycle::PipelineCore;
use crate::pipeline::{PipelineStatus, ProcessingServer};
use crate::types::QueuedBatch;
use crate::workers::ack::AckWorker;
use crate::workers::base::Worker;
use crate::workers::dispatch::DispatchWorker;
use crate::workers::fetch::FetchWorker;

/// Pipeline running fetch, dispatch and acknowledgement as three concurrent workers.
///
/// Fetched batches travel through a bounded-by-backpressure queue to the dispatch worker,
/// whose successfully handled batch ids are acknowledged in dispatch order. A handler error
/// stops dispatch until the pipeline is disposed; [`AsyncPipeline::wait`] reports it.
#[derive(Debug)]
pub struct AsyncPipeline<P> {
    core: PipelineCore<P>,
    queue: Arc<BatchQueue<QueuedBatch>>,
}

impl<P> AsyncPipeline<P>
where
    P: ConnectionPort,
{
    /// Creates a pipeline decoding row payloads as JSON.
    pub fn new(options: PipelineOptions, port: P, registry: HandlerRegistry) -> Self {
        let normalizer = ChangeNormalizer::with_json_decoder(options.destination.clone());
        Self::with_normalizer(options, port, registry, normalizer)
    }

    /// Creates a pipeline that decodes row payloads with `decoder`.
    pub fn with_decoder(
        options: PipelineOptions,
        port: P,
        registry: HandlerRegistry,
        decoder: Arc<dyn RowChangeDecoder>,
    ) -> Self {
        let normalizer = ChangeNormalizer::new(options.destination.clone(), decoder);
        Self::with_normalizer(options, port, registry, normalizer)
    }

    fn with_normalizer(
        options: PipelineOptions,
        port: P,
        registry: HandlerRegistry,
        normalizer: ChangeNormalizer,
    ) -> Self {
        Self {
            core: PipelineCore::new(options, port, registry, normalizer),
            queue: Arc::new(BatchQueue::new()),
        }
    }

    pub fn port(&self) -> &P {
        &self.core.port
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.core.options
    }

    /// Returns `true` while fetching is paused waiting for dispatch.
    pub fn is_backpressure_active(&self) -> bool {
        self.queue.is_backpressure_active()
    }

    /// Subscribes to backpressure transitions, `true` meaning fetching is paused.
    pub fn subscribe_backpressure(&self) -> watch::Receiver<bool> {
        self.queue.subscribe_backpressure()
    }

    /// Waits until the pipeline is disposed.
    ///
    /// Returns the handler error that stopped dispatch, if any.
    pub async fn wait(&self) -> RelayResult<()> {
        self.core.wait().await
    }
}

#[async_trait]
impl<P> ProcessingServer for AsyncPipeline<P>
where
    P: ConnectionPort,
{
    fn mode(&self) -> PipelineMode {
        self.core.port.mode()
    }

    fn is_async(&self) -> bool {
        true
    }

    async fn start(&self) -> RelayResult<()> {
        let core = &self.core;

        core.start(|| {
            let (ack_tx, ack_rx) = mpsc::unbounded_channel();

            let fetch = FetchWorker::new(
                core.port.clone(),
                core.options.clone(),
                core.normalizer.clone(),
                self.queue.clone(),
                core.status.clone(),
                core.shutdown_rx(),
            );
            let dispatch = DispatchWorker::new(
                core.port.clone(),
                core.options.clone(),
                self.queue.clone(),
                core.registry.clone(),
                ack_tx,
                core.status.clone(),
                core.shutdown_rx(),
            );
            let ack = AckWorker::new(
                core.port.clone(),
                core.options.clone(),
                ack_rx,
                core.shutdown_rx(),
            );

            vec![fetch.start(), dispatch.start(), ack.start()]
        })
        .await
    }

    async fn dispose(&self) {
        self.core.dispose().await;
    }

    fn status(&self) -> watch::Receiver<PipelineStatus> {
        self.core.subscribe_status()
    }
}
