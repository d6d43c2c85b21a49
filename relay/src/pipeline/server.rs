use async_trait::async_trait;
use relay_config::shared::PipelineMode;
use tokio::sync::watch;

use crate::error::RelayResult;
use crate::pipeline::PipelineStatus;

/// A pipeline variant that can be selected and driven by the bootstrapper.
#[async_trait]
pub trait ProcessingServer: Send + Sync {
    /// Transport variant the server reads from.
    fn mode(&self) -> PipelineMode;

    /// Whether this is the concurrent three stage variant.
    fn is_async(&self) -> bool;

    /// Connects and starts the workers. Fails if called more than once.
    async fn start(&self) -> RelayResult<()>;

    /// Stops the workers and releases the connection.
    ///
    /// Idempotent, and failures are logged rather than returned.
    async fn dispose(&self);

    /// Observes lifecycle transitions, including [`PipelineStatus::Failed`] once dispatch stopped.
    fn status(&self) -> watch::Receiver<PipelineStatus>;
}
