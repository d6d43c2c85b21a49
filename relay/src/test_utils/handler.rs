use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::bail;
use crate::error::{ErrorKind, RelayResult};
use crate::handler::ChangeHandler;
use crate::test_utils::notify::TimedNotify;
use crate::types::{ChangeBatch, DataChange};

type BatchCondition = Box<dyn Fn(&[ChangeBatch]) -> bool + Send + Sync>;

struct Inner {
    batches: Vec<ChangeBatch>,
    attempts: u64,
    shutdown_called: bool,
    conditions: Vec<(BatchCondition, Arc<Notify>)>,
}

impl Inner {
    fn check_conditions(&mut self) {
        let batches = &self.batches;
        self.conditions.retain(|(condition, notify)| {
            let should_retain = !condition(batches);
            if !should_retain {
                notify.notify_one();
            }
            should_retain
        });
    }
}

/// Test wrapper for [`ChangeHandler`] implementations that records every call.
///
/// Batches are recorded only when the wrapped handler accepts them, while attempts count
/// every call. Tests register conditions on the accepted batches and await the returned
/// [`TimedNotify`].
pub struct TestHandlerWrapper<H> {
    wrapped_handler: Arc<H>,
    inner: Arc<Mutex<Inner>>,
}

impl<H> TestHandlerWrapper<H> {
    pub fn wrap(handler: H) -> Self {
        Self {
            wrapped_handler: Arc::new(handler),
            inner: Arc::new(Mutex::new(Inner {
                batches: Vec::new(),
                attempts: 0,
                shutdown_called: false,
                conditions: Vec::new(),
            })),
        }
    }

    pub fn wrapped(&self) -> &H {
        &self.wrapped_handler
    }

    pub async fn batches(&self) -> Vec<ChangeBatch> {
        self.inner.lock().await.batches.clone()
    }

    pub async fn batch_ids(&self) -> Vec<i64> {
        self.inner
            .lock()
            .await
            .batches
            .iter()
            .map(|batch| batch.batch_id)
            .collect()
    }

    pub async fn changes(&self) -> Vec<DataChange> {
        self.inner
            .lock()
            .await
            .batches
            .iter()
            .flat_map(|batch| batch.changes.iter().cloned())
            .collect()
    }

    /// Number of times the handler was invoked, including failed invocations.
    pub async fn attempts(&self) -> u64 {
        self.inner.lock().await.attempts
    }

    pub async fn shutdown_called(&self) -> bool {
        self.inner.lock().await.shutdown_called
    }

    /// Registers a notification that fires once the accepted batches match `condition`.
    pub async fn notify_on_batches<F>(&self, condition: F) -> TimedNotify
    where
        F: Fn(&[ChangeBatch]) -> bool + Send + Sync + 'static,
    {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.lock().await;
        inner.conditions.push((Box::new(condition), notify.clone()));

        // The condition may already hold.
        inner.check_conditions();

        TimedNotify::new(notify)
    }

    /// Registers a notification that fires once `count` batches were accepted.
    pub async fn wait_for_batches(&self, count: usize) -> TimedNotify {
        self.notify_on_batches(move |batches| batches.len() >= count)
            .await
    }
}

impl<H> Clone for TestHandlerWrapper<H> {
    fn clone(&self) -> Self {
        Self {
            wrapped_handler: self.wrapped_handler.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<H> fmt::Debug for TestHandlerWrapper<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestHandlerWrapper").finish_non_exhaustive()
    }
}

#[async_trait]
impl<H> ChangeHandler for TestHandlerWrapper<H>
where
    H: ChangeHandler + 'static,
{
    fn name(&self) -> &str {
        self.wrapped_handler.name()
    }

    async fn handle(&self, batch: &ChangeBatch) -> RelayResult<()> {
        self.inner.lock().await.attempts += 1;

        let result = self.wrapped_handler.handle(batch).await;

        if result.is_ok() {
            let mut inner = self.inner.lock().await;
            inner.batches.push(batch.clone());
            inner.check_conditions();
        }

        result
    }

    async fn shutdown(&self) -> RelayResult<()> {
        self.inner.lock().await.shutdown_called = true;
        self.wrapped_handler.shutdown().await
    }
}

/// Handler that fails its first `failures` invocations and accepts every later one.
///
/// Use [`FaultyHandler::always`] for a handler that never succeeds.
#[derive(Debug, Clone)]
pub struct FaultyHandler {
    failures: u64,
    attempts: Arc<AtomicU64>,
}

impl FaultyHandler {
    pub fn failing(failures: u64) -> Self {
        Self {
            failures,
            attempts: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn always() -> Self {
        Self::failing(u64::MAX)
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangeHandler for FaultyHandler {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn handle(&self, batch: &ChangeBatch) -> RelayResult<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            bail!(
                ErrorKind::Unknown,
                "Injected handler failure",
                detail = format!("attempt {attempt} on batch {}", batch.batch_id)
            );
        }

        Ok(())
    }
}
