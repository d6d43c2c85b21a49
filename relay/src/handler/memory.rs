use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::RelayResult;
use crate::handler::ChangeHandler;
use crate::types::{ChangeBatch, DataChange};

/// Handler that keeps every batch it receives in memory.
///
/// Useful for development and for inspecting what a pipeline delivered. Clones share the
/// same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryHandler {
    batches: Arc<Mutex<Vec<ChangeBatch>>>,
}

impl MemoryHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every batch received so far.
    pub async fn batches(&self) -> Vec<ChangeBatch> {
        self.batches.lock().await.clone()
    }

    /// Returns the changes of all received batches, flattened in delivery order.
    pub async fn changes(&self) -> Vec<DataChange> {
        self.batches
            .lock()
            .await
            .iter()
            .flat_map(|batch| batch.changes.iter().cloned())
            .collect()
    }

    pub async fn clear(&self) {
        self.batches.lock().await.clear();
    }
}

#[async_trait]
impl ChangeHandler for MemoryHandler {
    fn name(&self) -> &str {
        "memory"
    }

    async fn handle(&self, batch: &ChangeBatch) -> RelayResult<()> {
        info!(
            batch_id = batch.batch_id,
            changes = batch.len(),
            "storing batch in memory"
        );
        self.batches.lock().await.push(batch.clone());

        Ok(())
    }
}
