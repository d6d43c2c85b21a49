use async_trait::async_trait;

use crate::error::RelayResult;
use crate::types::ChangeBatch;

/// A consumer of normalized change batches.
///
/// Delivery is at-least-once: after a crash or restart a handler may see the same batch,
/// or an overlapping one, again. Handlers publishing downstream should be idempotent.
///
/// An error returned from [`ChangeHandler::handle`] stops the asynchronous pipeline for
/// good, while the synchronous pipeline reconnects and carries on.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn handle(&self, batch: &ChangeBatch) -> RelayResult<()>;

    /// Releases resources held by the handler when the pipeline is disposed.
    async fn shutdown(&self) -> RelayResult<()> {
        Ok(())
    }
}
