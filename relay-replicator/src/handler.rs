use async_trait::async_trait;
use relay::error::RelayResult;
use relay::handler::ChangeHandler;
use relay::types::ChangeBatch;
use tracing::info;

/// Logs every received change as a JSON line.
#[derive(Debug, Default)]
pub struct LogHandler;

#[async_trait]
impl ChangeHandler for LogHandler {
    fn name(&self) -> &str {
        "log"
    }

    async fn handle(&self, batch: &ChangeBatch) -> RelayResult<()> {
        for change in &batch.changes {
            info!(
                batch_id = batch.batch_id,
                change = %serde_json::to_string(change)?,
                "received change"
            );
        }

        Ok(())
    }
}
