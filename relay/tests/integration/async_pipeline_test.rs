use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use relay::connection::ConnectionPort;
use relay::connection::memory::{ConnectionCalls, MemoryConnection};
use relay::conversions::time::execute_time_to_datetime;
use relay::error::{ErrorKind, RelayResult};
use relay::handler::memory::MemoryHandler;
use relay::handler::{ChangeHandler, HandlerRegistry};
use relay::pipeline::{AsyncPipeline, PipelineStatus, ProcessingServer};
use relay::relay_error;
use relay::test_utils::entry::{
    TEST_EXECUTE_TIME_MS, insert_entry, keyed_insert_batch, transaction_begin, transaction_end,
};
use relay::test_utils::handler::{FaultyHandler, TestHandlerWrapper};
use relay::test_utils::pipeline::{TEST_DESTINATION, test_options, wait_for_status};
use relay::types::{ChangeBatch, Column, EventType, FetchedBatch};
use relay_config::shared::PipelineMode;
use relay_telemetry::tracing::init_test_tracing;
use tokio::sync::{Notify, Semaphore};
use tokio::time::timeout;

const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Blocks every batch until a permit is added to the gate.
#[derive(Debug, Clone)]
struct GatedHandler {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl ChangeHandler for GatedHandler {
    async fn handle(&self, _batch: &ChangeBatch) -> RelayResult<()> {
        self.gate.acquire().await.unwrap().forget();
        Ok(())
    }
}

/// Takes a while per batch and records whether `shutdown` ever ran during `handle`.
#[derive(Debug, Clone, Default)]
struct SlowHandler {
    started: Arc<Notify>,
    in_flight: Arc<AtomicBool>,
    shutdown_overlapped: Arc<AtomicBool>,
    shutdown_called: Arc<AtomicBool>,
}

#[async_trait]
impl ChangeHandler for SlowHandler {
    async fn handle(&self, _batch: &ChangeBatch) -> RelayResult<()> {
        self.in_flight.store(true, Ordering::SeqCst);
        self.started.notify_one();
        tokio::time::sleep(Duration::from_millis(300)).await;
        self.in_flight.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> RelayResult<()> {
        if self.in_flight.load(Ordering::SeqCst) {
            self.shutdown_overlapped.store(true, Ordering::SeqCst);
        }
        self.shutdown_called.store(true, Ordering::SeqCst);
        Ok(())
    }
}

async fn wait_for_calls<F>(connection: &MemoryConnection, condition: F) -> ConnectionCalls
where
    F: Fn(&ConnectionCalls) -> bool,
{
    timeout(WAIT_TIMEOUT, connection.wait_until(condition))
        .await
        .expect("connection never reached the expected calls")
}

fn memory_pipeline(
    mode: PipelineMode,
    handler: impl ChangeHandler + 'static,
) -> (AsyncPipeline<MemoryConnection>, MemoryConnection) {
    let connection = MemoryConnection::new(mode);
    let registry = HandlerRegistry::builder().shared(handler).build().unwrap();
    let pipeline = AsyncPipeline::new(test_options(mode, true), connection.clone(), registry);

    (pipeline, connection)
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_is_handled_then_acknowledged() {
    init_test_tracing();
    let handler = TestHandlerWrapper::wrap(MemoryHandler::new());
    let (pipeline, connection) = memory_pipeline(PipelineMode::Standalone, handler.clone());
    connection.push_batch(keyed_insert_batch(42, "1")).await;

    let handled = handler.wait_for_batches(1).await;
    pipeline.start().await.unwrap();
    handled.notified().await;
    wait_for_calls(&connection, |calls| calls.acknowledged.contains(&42)).await;

    pipeline.dispose().await;
    pipeline.wait().await.unwrap();

    let calls = connection.calls().await;
    assert_eq!(calls.acknowledged, vec![42]);
    assert_eq!(calls.subscriptions, vec![pipeline.options().filter.clone()]);

    let changes = handler.changes().await;
    assert_eq!(changes.len(), 1);
    let change = &changes[0];
    assert_eq!(change.db_name, "s");
    assert_eq!(change.table_name, "t");
    assert_eq!(change.event_type, EventType::Insert);
    assert_eq!(change.destination, TEST_DESTINATION);
    assert_eq!(change.primary_key(), Some("1"));
    assert_eq!(
        change.execute_time,
        execute_time_to_datetime(TEST_EXECUTE_TIME_MS).unwrap()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_without_changes_is_acknowledged_without_calling_handlers() {
    init_test_tracing();
    let handler = TestHandlerWrapper::wrap(MemoryHandler::new());
    let (pipeline, connection) = memory_pipeline(PipelineMode::Standalone, handler.clone());
    connection
        .push_batch(FetchedBatch::new(
            7,
            vec![transaction_begin(), transaction_end()],
        ))
        .await;
    connection.push_batch(keyed_insert_batch(8, "1")).await;

    pipeline.start().await.unwrap();
    let calls = wait_for_calls(&connection, |calls| calls.acknowledged.contains(&8)).await;
    pipeline.dispose().await;

    assert_eq!(calls.acknowledged, vec![7, 8]);
    assert_eq!(handler.batch_ids().await, vec![8]);
    assert_eq!(handler.attempts().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn row_without_primary_key_is_dropped_and_the_rest_is_delivered() {
    init_test_tracing();
    let handler = TestHandlerWrapper::wrap(MemoryHandler::new());
    let (pipeline, connection) = memory_pipeline(PipelineMode::Standalone, handler.clone());
    connection
        .push_batch(FetchedBatch::new(
            3,
            vec![
                insert_entry("s", "t", vec![Column::new("name", "no key")]),
                insert_entry("s", "t", vec![Column::key("id", "9")]),
            ],
        ))
        .await;

    pipeline.start().await.unwrap();
    wait_for_calls(&connection, |calls| calls.acknowledged.contains(&3)).await;
    pipeline.dispose().await;

    let changes = handler.changes().await;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].primary_key(), Some("9"));
}

#[tokio::test(flavor = "multi_thread")]
async fn backpressure_pauses_fetch_until_dispatch_catches_up() {
    init_test_tracing();
    let gate = Arc::new(Semaphore::new(0));
    let handler = TestHandlerWrapper::wrap(GatedHandler { gate: gate.clone() });
    let (pipeline, connection) = memory_pipeline(PipelineMode::Standalone, handler.clone());
    for batch_id in 1..=10 {
        connection
            .push_batch(keyed_insert_batch(batch_id, &batch_id.to_string()))
            .await;
    }

    let mut backpressure = pipeline.subscribe_backpressure();
    pipeline.start().await.unwrap();
    timeout(WAIT_TIMEOUT, backpressure.wait_for(|active| *active))
        .await
        .unwrap()
        .unwrap();

    // Fetching stays paused while the handler is blocked.
    let pending = connection.pending_replies().await;
    assert!(pending >= 4, "fetch ran ahead, {pending} replies left");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(connection.pending_replies().await, pending);
    assert!(connection.calls().await.acknowledged.is_empty());

    gate.add_permits(10);
    let calls = wait_for_calls(&connection, |calls| calls.acknowledged.len() == 10).await;
    pipeline.dispose().await;
    pipeline.wait().await.unwrap();

    assert_eq!(calls.acknowledged, (1..=10).collect::<Vec<_>>());
    assert_eq!(handler.batch_ids().await, (1..=10).collect::<Vec<_>>());
    assert!(!pipeline.is_backpressure_active());
}

#[tokio::test(flavor = "multi_thread")]
async fn handler_failure_stops_dispatch_and_is_reported_on_wait() {
    init_test_tracing();
    let handler = FaultyHandler::always();
    let (pipeline, connection) = memory_pipeline(PipelineMode::Standalone, handler.clone());
    for batch_id in 1..=10 {
        connection
            .push_batch(keyed_insert_batch(batch_id, &batch_id.to_string()))
            .await;
    }

    let mut backpressure = pipeline.subscribe_backpressure();
    let mut status = pipeline.status();
    pipeline.start().await.unwrap();
    wait_for_status(&mut status, PipelineStatus::Failed).await;

    // Nothing drains the queue anymore, so fetch ends up paused for good.
    timeout(WAIT_TIMEOUT, backpressure.wait_for(|active| *active))
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(handler.attempts(), 1);
    let calls = connection.calls().await;
    assert!(calls.acknowledged.is_empty());
    assert!(calls.acknowledge_attempts.is_empty());
    assert!(connection.pending_replies().await >= 4);

    timeout(WAIT_TIMEOUT, pipeline.dispose()).await.unwrap();
    assert_eq!(*status.borrow(), PipelineStatus::Stopped);
    let err = pipeline.wait().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HandlerFailed);
    assert_eq!(handler.attempts(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_acknowledgement_is_logged_and_not_retried() {
    init_test_tracing();
    let handler = TestHandlerWrapper::wrap(MemoryHandler::new());
    let (pipeline, connection) = memory_pipeline(PipelineMode::Standalone, handler.clone());
    connection.fail_acknowledgements(1).await;
    connection.push_batch(keyed_insert_batch(1, "1")).await;
    connection.push_batch(keyed_insert_batch(2, "2")).await;

    pipeline.start().await.unwrap();
    let calls = wait_for_calls(&connection, |calls| calls.acknowledge_attempts.len() == 2).await;
    pipeline.dispose().await;
    pipeline.wait().await.unwrap();

    assert_eq!(calls.acknowledge_attempts, vec![1, 2]);
    assert_eq!(calls.acknowledged, vec![2]);
    assert_eq!(handler.batch_ids().await, vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_failure_reconnects_and_resumes() {
    init_test_tracing();
    let handler = TestHandlerWrapper::wrap(MemoryHandler::new());
    let (pipeline, connection) = memory_pipeline(PipelineMode::Standalone, handler.clone());
    connection
        .push_fetch_error(relay_error!(ErrorKind::FetchFailed, "Socket closed"))
        .await;
    connection.push_batch(keyed_insert_batch(5, "1")).await;

    pipeline.start().await.unwrap();
    let calls = wait_for_calls(&connection, |calls| calls.acknowledged.contains(&5)).await;

    assert_eq!(calls.reconnects, 1);
    assert_eq!(calls.disconnects, 1);
    assert_eq!(calls.rollbacks, vec![0, 0]);
    assert_eq!(*pipeline.status().borrow(), PipelineStatus::Running);

    pipeline.dispose().await;
    assert_eq!(handler.batch_ids().await, vec![5]);
}

#[tokio::test(flavor = "multi_thread")]
async fn cluster_fetch_failure_uses_the_transport_reconnect() {
    init_test_tracing();
    let handler = TestHandlerWrapper::wrap(MemoryHandler::new());
    let (pipeline, connection) = memory_pipeline(PipelineMode::Cluster, handler.clone());
    connection
        .push_fetch_error(relay_error!(ErrorKind::FetchFailed, "Leader changed"))
        .await;
    connection.push_batch(keyed_insert_batch(5, "1")).await;

    assert_eq!(pipeline.mode(), PipelineMode::Cluster);
    pipeline.start().await.unwrap();
    let calls = wait_for_calls(&connection, |calls| calls.acknowledged.contains(&5)).await;
    pipeline.dispose().await;

    assert_eq!(calls.reconnects, 1);
    assert_eq!(calls.disconnects, 0);
    assert_eq!(calls.connects, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn dispose_is_idempotent_and_releases_everything() {
    init_test_tracing();
    let handler = TestHandlerWrapper::wrap(MemoryHandler::new());
    let (pipeline, connection) = memory_pipeline(PipelineMode::Standalone, handler.clone());
    let mut status = pipeline.status();

    pipeline.start().await.unwrap();
    wait_for_status(&mut status, PipelineStatus::Running).await;

    pipeline.dispose().await;
    pipeline.dispose().await;
    wait_for_status(&mut status, PipelineStatus::Stopped).await;
    pipeline.wait().await.unwrap();

    let calls = connection.calls().await;
    assert_eq!(calls.unsubscriptions.len(), 1);
    assert_eq!(calls.disconnects, 1);
    assert!(!connection.is_valid());
    assert!(handler.shutdown_called().await);

    let err = pipeline.start().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test(flavor = "multi_thread")]
async fn second_start_is_rejected() {
    init_test_tracing();
    let (pipeline, connection) = memory_pipeline(PipelineMode::Standalone, MemoryHandler::new());

    pipeline.start().await.unwrap();
    let err = pipeline.start().await.unwrap_err();
    pipeline.dispose().await;

    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(connection.calls().await.connects, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_connect_fails_start() {
    init_test_tracing();
    let (pipeline, connection) = memory_pipeline(PipelineMode::Standalone, MemoryHandler::new());
    connection.fail_connects(1).await;

    let err = pipeline.start().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
    assert_eq!(*pipeline.status().borrow(), PipelineStatus::Stopped);

    pipeline.dispose().await;
    pipeline.wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn dispose_waits_for_the_batch_in_flight_before_releasing_handlers() {
    init_test_tracing();
    let handler = SlowHandler::default();
    let (pipeline, connection) = memory_pipeline(PipelineMode::Standalone, handler.clone());
    connection.push_batch(keyed_insert_batch(1, "1")).await;

    let started = handler.started.notified();
    pipeline.start().await.unwrap();
    timeout(WAIT_TIMEOUT, started).await.unwrap();

    timeout(WAIT_TIMEOUT, pipeline.dispose()).await.unwrap();
    pipeline.wait().await.unwrap();

    assert!(handler.shutdown_called.load(Ordering::SeqCst));
    assert!(!handler.shutdown_overlapped.load(Ordering::SeqCst));
    assert!(!handler.in_flight.load(Ordering::SeqCst));
}
