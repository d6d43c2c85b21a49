use std::future::Future;

use relay_config::shared::PipelineMode;
use tracing::warn;

use crate::error::RelayResult;
use crate::types::FetchedBatch;

/// Position passed to [`ConnectionPort::rollback`] to resume from the last acknowledged batch.
pub const LAST_ACKNOWLEDGED_POSITION: i64 = 0;

/// Operations the pipeline needs from a change-capture server connection.
///
/// A single port instance is shared by the stages of a pipeline: the fetch stage calls
/// [`ConnectionPort::fetch`] and [`ConnectionPort::reconnect`] while the acknowledge stage
/// concurrently calls [`ConnectionPort::acknowledge`]. Implementations must therefore be
/// safe to use from several tasks at once.
pub trait ConnectionPort: Send + Sync + 'static {
    /// Returns the transport variant this port talks to.
    fn mode(&self) -> PipelineMode;

    /// Returns `true` while the port holds a usable connection.
    fn is_valid(&self) -> bool;

    fn connect(&self) -> impl Future<Output = RelayResult<()>> + Send;

    /// Restricts the stream to tables matching `filter`.
    fn subscribe(&self, filter: &str) -> impl Future<Output = RelayResult<()>> + Send;

    /// Rewinds the stream to `position`, discarding fetched but unacknowledged batches.
    fn rollback(&self, position: i64) -> impl Future<Output = RelayResult<()>> + Send;

    /// Fetches up to `max_entries` entries without acknowledging them.
    ///
    /// A returned batch id below `1` means nothing is available yet.
    fn fetch(&self, max_entries: usize) -> impl Future<Output = RelayResult<FetchedBatch>> + Send;

    /// Marks `batch_id` as consumed. This is the durable commit point of the pipeline.
    fn acknowledge(&self, batch_id: i64) -> impl Future<Output = RelayResult<()>> + Send;

    fn unsubscribe(&self, filter: &str) -> impl Future<Output = RelayResult<()>> + Send;

    fn disconnect(&self) -> impl Future<Output = RelayResult<()>> + Send;

    /// Connects, subscribes to `filter` and resumes from the last acknowledged batch.
    fn open(&self, filter: &str) -> impl Future<Output = RelayResult<()>> + Send {
        async move {
            self.connect().await?;
            self.subscribe(filter).await?;
            self.rollback(LAST_ACKNOWLEDGED_POSITION).await
        }
    }

    /// Re-establishes the connection after a transport failure.
    ///
    /// Defaults to [`reopen`], which fits a single server. Transports with their own
    /// failover handling override this.
    fn reconnect(&self, filter: &str) -> impl Future<Output = RelayResult<()>> + Send {
        reopen(self, filter)
    }
}

/// Drops the current connection and opens a fresh one.
///
/// A failure to disconnect is only logged since the old connection is abandoned anyway.
pub async fn reopen<P>(port: &P, filter: &str) -> RelayResult<()>
where
    P: ConnectionPort + ?Sized,
{
    if let Err(err) = port.disconnect().await {
        warn!(error = %err, "failed to disconnect before reconnecting");
    }

    port.open(filter).await
}
