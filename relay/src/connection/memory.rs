use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use relay_config::shared::PipelineMode;
use tokio::sync::{Mutex, Notify};
use tracing::info;

use crate::bail;
use crate::connection::{ConnectionPort, reopen};
use crate::error::{ErrorKind, RelayError, RelayResult};
use crate::types::FetchedBatch;

/// A scripted reply to [`ConnectionPort::fetch`].
#[derive(Debug, Clone)]
pub enum FetchReply {
    Batch(FetchedBatch),
    Error(RelayError),
}

/// Calls received by a [`MemoryConnection`], in the order they were made.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionCalls {
    pub connects: u64,
    pub subscriptions: Vec<String>,
    pub rollbacks: Vec<i64>,
    pub fetches: u64,
    /// Batch ids acknowledged successfully.
    pub acknowledged: Vec<i64>,
    /// Batch ids whose acknowledgement was attempted, successful or not.
    pub acknowledge_attempts: Vec<i64>,
    pub unsubscriptions: Vec<String>,
    pub disconnects: u64,
    pub reconnects: u64,
}

#[derive(Debug, Default)]
struct Inner {
    replies: VecDeque<FetchReply>,
    /// Batches fetched but not acknowledged, redelivered by the next rollback.
    unacknowledged: VecDeque<FetchedBatch>,
    failing_connects: u32,
    failing_acknowledgements: u32,
    calls: ConnectionCalls,
}

/// In-memory connection port for development and testing.
///
/// Fetches replay the replies queued with [`MemoryConnection::push_batch`] and
/// [`MemoryConnection::push_fetch_error`]; once the script runs out the port reports that
/// nothing is available. Batches fetched but never acknowledged go back to the front of
/// the script on [`ConnectionPort::rollback`], the way a server redelivers from the last
/// acknowledged position. Every call is recorded and can be inspected with
/// [`MemoryConnection::calls`] or awaited with [`MemoryConnection::wait_until`].
///
/// In [`PipelineMode::Cluster`] a reconnect restores the connection in place, as a
/// failover-aware client would, instead of running the disconnect and open sequence.
#[derive(Debug, Clone)]
pub struct MemoryConnection {
    mode: PipelineMode,
    connected: Arc<AtomicBool>,
    inner: Arc<Mutex<Inner>>,
    changed: Arc<Notify>,
}

impl MemoryConnection {
    /// Creates a disconnected connection for `mode` with no scripted replies.
    pub fn new(mode: PipelineMode) -> Self {
        Self {
            mode,
            connected: Arc::new(AtomicBool::new(false)),
            inner: Arc::new(Mutex::new(Inner::default())),
            changed: Arc::new(Notify::new()),
        }
    }

    /// Queues `batch` as the reply to a later `fetch`.
    pub async fn push_batch(&self, batch: FetchedBatch) {
        self.inner
            .lock()
            .await
            .replies
            .push_back(FetchReply::Batch(batch));
    }

    /// Queues `error` as the reply to a later `fetch`.
    pub async fn push_fetch_error(&self, error: RelayError) {
        self.inner
            .lock()
            .await
            .replies
            .push_back(FetchReply::Error(error));
    }

    /// Makes the next `count` connects fail.
    pub async fn fail_connects(&self, count: u32) {
        self.inner.lock().await.failing_connects = count;
    }

    /// Makes the next `count` acknowledgements fail.
    pub async fn fail_acknowledgements(&self, count: u32) {
        self.inner.lock().await.failing_acknowledgements = count;
    }

    /// Returns the number of scripted replies not fetched yet.
    pub async fn pending_replies(&self) -> usize {
        self.inner.lock().await.replies.len()
    }

    /// Returns a snapshot of every call recorded so far.
    pub async fn calls(&self) -> ConnectionCalls {
        self.inner.lock().await.calls.clone()
    }

    /// Waits until the recorded calls satisfy `condition` and returns them.
    pub async fn wait_until<F>(&self, condition: F) -> ConnectionCalls
    where
        F: Fn(&ConnectionCalls) -> bool,
    {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Registers interest before checking so a concurrent change is not missed.
            notified.as_mut().enable();

            {
                let inner = self.inner.lock().await;
                if condition(&inner.calls) {
                    return inner.calls.clone();
                }
            }

            notified.await;
        }
    }

    async fn record<F>(&self, record: F)
    where
        F: FnOnce(&mut ConnectionCalls),
    {
        record(&mut self.inner.lock().await.calls);
        self.changed.notify_waiters();
    }
}

impl ConnectionPort for MemoryConnection {
    fn mode(&self) -> PipelineMode {
        self.mode
    }

    fn is_valid(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> RelayResult<()> {
        let failed = {
            let mut inner = self.inner.lock().await;
            inner.calls.connects += 1;
            let failed = inner.failing_connects > 0;
            inner.failing_connects = inner.failing_connects.saturating_sub(1);
            failed
        };
        self.changed.notify_waiters();

        if failed {
            bail!(
                ErrorKind::ConnectionFailed,
                "Failed to connect to the change-capture server"
            );
        }

        self.connected.store(true, Ordering::SeqCst);

        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> RelayResult<()> {
        self.record(|calls| calls.subscriptions.push(filter.to_owned()))
            .await;

        Ok(())
    }

    async fn rollback(&self, position: i64) -> RelayResult<()> {
        {
            let mut inner = self.inner.lock().await;
            while let Some(batch) = inner.unacknowledged.pop_back() {
                inner.replies.push_front(FetchReply::Batch(batch));
            }
        }
        self.record(|calls| calls.rollbacks.push(position)).await;

        Ok(())
    }

    async fn fetch(&self, _max_entries: usize) -> RelayResult<FetchedBatch> {
        let connected = self.is_valid();
        let reply = {
            let mut inner = self.inner.lock().await;
            inner.calls.fetches += 1;
            // Scripted replies are kept for the next fetch on a live connection.
            connected.then(|| inner.replies.pop_front()).flatten()
        };
        self.changed.notify_waiters();

        if !connected {
            bail!(ErrorKind::FetchFailed, "Fetch attempted while disconnected");
        }

        match reply {
            Some(FetchReply::Batch(batch)) => {
                self.inner
                    .lock()
                    .await
                    .unacknowledged
                    .push_back(batch.clone());
                Ok(batch)
            }
            Some(FetchReply::Error(err)) => Err(err),
            None => Ok(FetchedBatch::nothing_available()),
        }
    }

    async fn acknowledge(&self, batch_id: i64) -> RelayResult<()> {
        let failed = {
            let mut inner = self.inner.lock().await;
            inner.calls.acknowledge_attempts.push(batch_id);
            let failed = inner.failing_acknowledgements > 0 || !self.is_valid();
            if failed {
                inner.failing_acknowledgements = inner.failing_acknowledgements.saturating_sub(1);
            } else {
                inner.calls.acknowledged.push(batch_id);
                inner
                    .unacknowledged
                    .retain(|batch| batch.batch_id > batch_id);
            }
            failed
        };
        self.changed.notify_waiters();

        if failed {
            bail!(
                ErrorKind::AcknowledgeFailed,
                "Failed to acknowledge batch",
                format!("batch {batch_id}")
            );
        }

        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> RelayResult<()> {
        self.record(|calls| calls.unsubscriptions.push(filter.to_owned()))
            .await;

        Ok(())
    }

    async fn disconnect(&self) -> RelayResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.record(|calls| calls.disconnects += 1).await;

        Ok(())
    }

    async fn reconnect(&self, filter: &str) -> RelayResult<()> {
        self.record(|calls| calls.reconnects += 1).await;

        match self.mode {
            PipelineMode::Standalone => reopen(self, filter).await,
            PipelineMode::Cluster => {
                info!("restoring cluster connection");
                self.connect().await
            }
        }
    }
}
