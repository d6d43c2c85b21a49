use std::sync::Arc;

use async_trait::async_trait;
use relay_config::shared::{PipelineMode, PipelineOptions};
use tokio::sync::watch;

use crate::connection::ConnectionPort;
use crate::conversions::{ChangeNormalizer, RowChangeDecoder};
use crate::error::RelayResult;
use crate::handler::HandlerRegistry;
use crate::pipeline::lifecycle::PipelineCore;
use crate::pipeline::{PipelineStatus, ProcessingServer};
use crate::workers::base::Worker;
use crate::workers::sync::SyncWorker;

/// Pipeline fetching, dispatching and acknowledging one batch at a time on a single worker.
///
/// Every failure leads to a reconnect and the batch being fetched again, so a handler error
/// is retried until it succeeds or the pipeline is disposed.
#[derive(Debug)]
pub struct SyncPipeline<P> {
    core: PipelineCore<P>,
}

impl<P> SyncPipeline<P>
where
    P: ConnectionPort,
{
    /// Creates a pipeline decoding row payloads as JSON.
    pub fn new(options: PipelineOptions, port: P, registry: HandlerRegistry) -> Self {
        let normalizer = ChangeNormalizer::with_json_decoder(options.destination.clone());
        Self {
            core: PipelineCore::new(options, port, registry, normalizer),
        }
    }

    /// Creates a pipeline that decodes row payloads with `decoder`.
    pub fn with_decoder(
        options: PipelineOptions,
        port: P,
        registry: HandlerRegistry,
        decoder: Arc<dyn RowChangeDecoder>,
    ) -> Self {
        let normalizer = ChangeNormalizer::new(options.destination.clone(), decoder);
        Self {
            core: PipelineCore::new(options, port, registry, normalizer),
        }
    }

    pub fn port(&self) -> &P {
        &self.core.port
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.core.options
    }

    /// Waits until the pipeline is disposed.
    pub async fn wait(&self) -> RelayResult<()> {
        self.core.wait().await
    }
}

#[async_trait]
impl<P> ProcessingServer for SyncPipeline<P>
where
    P: ConnectionPort,
{
    fn mode(&self) -> PipelineMode {
        self.core.port.mode()
    }

    fn is_async(&self) -> bool {
        false
    }

    async fn start(&self) -> RelayResult<()> {
        let core = &self.core;

        core.start(|| {
            let worker = SyncWorker::new(
                core.port.clone(),
                core.options.clone(),
                core.normalizer.clone(),
                core.registry.clone(),
                core.status.clone(),
                core.shutdown_rx(),
            );

            vec![worker.start()]
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
