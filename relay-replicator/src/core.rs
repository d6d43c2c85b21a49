use relay::bootstrap::Bootstrapper;
use relay::connection::memory::MemoryConnection;
use relay::handler::HandlerRegistry;
use relay::pipeline::{AsyncPipeline, SyncPipeline};
use relay_config::shared::{PipelineOptions, PipelineOptionsWithoutSecrets};
use tracing::info;

use crate::error::ReplicatorResult;
use crate::handler::LogHandler;

/// Wires both pipeline variants and runs the configured one until ctrl-c.
///
/// The pipelines read from the in-memory transport; a network transport plugs in by
/// implementing [`relay::connection::ConnectionPort`] and replacing it here.
pub async fn start_replicator_with_config(options: PipelineOptions) -> ReplicatorResult<()> {
    info!(
        options = ?PipelineOptionsWithoutSecrets::from(options.clone()),
        "starting replicator"
    );

    let connection = MemoryConnection::new(options.mode);
    let registry = HandlerRegistry::builder().shared(LogHandler).build()?;

    let bootstrapper = Bootstrapper::new(options.clone())
        .register(AsyncPipeline::new(
            options.clone(),
            connection.clone(),
            registry.clone(),
        ))
        .register(SyncPipeline::new(options, connection, registry));

    bootstrapper.run_until_signal().await?;

    info!("replicator stopped");

    Ok(())
}
