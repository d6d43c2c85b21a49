use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use relay::connection::memory::{ConnectionCalls, MemoryConnection};
use relay::error::ErrorKind;
use relay::handler::memory::MemoryHandler;
use relay::handler::{ChangeHandler, HandlerRegistry};
use relay::pipeline::{PipelineStatus, ProcessingServer, SyncPipeline};
use relay::relay_error;
use relay::test_utils::entry::{keyed_insert_batch, transaction_begin, transaction_end};
use relay::test_utils::handler::{FaultyHandler, TestHandlerWrapper};
use relay::test_utils::pipeline::{test_options, wait_for_status};
use relay::types::FetchedBatch;
use relay_config::shared::PipelineMode;
use relay_telemetry::tracing::init_test_tracing;
use tokio::time::timeout;

const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

async fn wait_for_calls<F>(connection: &MemoryConnection, condition: F) -> ConnectionCalls
where
    F: Fn(&ConnectionCalls) -> bool,
{
    timeout(WAIT_TIMEOUT, connection.wait_until(condition))
        .await
        .expect("connection never reached the expected calls")
}

fn memory_pipeline(
    handler: impl ChangeHandler + 'static,
) -> (SyncPipeline<MemoryConnection>, MemoryConnection) {
    let connection = MemoryConnection::new(PipelineMode::Standalone);
    let registry = HandlerRegistry::builder().shared(handler).build().unwrap();
    let pipeline = SyncPipeline::new(
        test_options(PipelineMode::Standalone, false),
        connection.clone(),
        registry,
    );

    (pipeline, connection)
}

#[tokio::test(flavor = "multi_thread")]
async fn batches_are_handled_and_acknowledged_in_order() {
    init_test_tracing();
    let handler = TestHandlerWrapper::wrap(MemoryHandler::new());
    let (pipeline, connection) = memory_pipeline(handler.clone());
    for batch_id in 1..=5 {
        connection
            .push_batch(keyed_insert_batch(batch_id, &batch_id.to_string()))
            .await;
    }

    assert!(!pipeline.is_async());
    pipeline.start().await.unwrap();
    let calls = wait_for_calls(&connection, |calls| calls.acknowledged.len() == 5).await;
    pipeline.dispose().await;
    pipeline.wait().await.unwrap();

    assert_eq!(calls.acknowledged, vec![1, 2, 3, 4, 5]);
    assert_eq!(handler.batch_ids().await, vec![1, 2, 3, 4, 5]);
    assert_eq!(calls.reconnects, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_without_changes_is_acknowledged_without_calling_handlers() {
    init_test_tracing();
    let handler = TestHandlerWrapper::wrap(MemoryHandler::new());
    let (pipeline, connection) = memory_pipeline(handler.clone());
    connection
        .push_batch(FetchedBatch::new(
            7,
            vec![transaction_begin(), transaction_end()],
        ))
        .await;

    pipeline.start().await.unwrap();
    wait_for_calls(&connection, |calls| calls.acknowledged.contains(&7)).await;
    pipeline.dispose().await;

    assert_eq!(handler.attempts().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn handler_failure_reconnects_and_retries_the_batch() {
    init_test_tracing();
    let handler = TestHandlerWrapper::wrap(FaultyHandler::failing(2));
    let (pipeline, connection) = memory_pipeline(handler.clone());
    connection.push_batch(keyed_insert_batch(5, "1")).await;
    let mut status = pipeline.status();

    pipeline.start().await.unwrap();
    let calls = wait_for_calls(&connection, |calls| calls.acknowledged.contains(&5)).await;
    pipeline.dispose().await;
    wait_for_status(&mut status, PipelineStatus::Stopped).await;
    pipeline.wait().await.unwrap();

    assert_eq!(handler.attempts().await, 3);
    assert_eq!(handler.batch_ids().await, vec![5]);
    assert_eq!(calls.reconnects, 2);
    assert_eq!(calls.rollbacks, vec![0, 0, 0]);
    assert_eq!(calls.acknowledged, vec![5]);
    assert_eq!(calls.acknowledge_attempts, vec![5]);
}

#[tokio::test(flavor = "multi_thread")]
async fn acknowledge_failure_redelivers_the_batch() {
    init_test_tracing();
    let handler = TestHandlerWrapper::wrap(MemoryHandler::new());
    let (pipeline, connection) = memory_pipeline(handler.clone());
    connection.fail_acknowledgements(1).await;
    connection.push_batch(keyed_insert_batch(5, "1")).await;

    pipeline.start().await.unwrap();
    let calls = wait_for_calls(&connection, |calls| calls.acknowledged.contains(&5)).await;
    pipeline.dispose().await;

    // Delivery is at least once, the handler sees the batch again after the rollback.
    assert_eq!(handler.batch_ids().await, vec![5, 5]);
    assert_eq!(calls.acknowledge_attempts, vec![5, 5]);
    assert_eq!(calls.reconnects, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_failure_reconnects_and_resumes() {
    init_test_tracing();
    let handler = TestHandlerWrapper::wrap(MemoryHandler::new());
    let (pipeline, connection) = memory_pipeline(handler.clone());
    connection
        .push_fetch_error(relay_error!(ErrorKind::FetchFailed, "Socket closed"))
        .await;
    connection.push_batch(keyed_insert_batch(9, "1")).await;

    pipeline.start().await.unwrap();
    let calls = wait_for_calls(&connection, |calls| calls.acknowledged.contains(&9)).await;
    pipeline.dispose().await;

    assert_eq!(calls.reconnects, 1);
    assert_eq!(handler.batch_ids().await, vec![9]);
}

#[tokio::test(flavor = "multi_thread")]
async fn per_dispatch_handlers_are_created_for_every_batch() {
    init_test_tracing();
    let created = Arc::new(AtomicUsize::new(0));
    let registry = HandlerRegistry::builder()
        .per_dispatch("memory", {
            let created = created.clone();
            move || {
                created.fetch_add(1, Ordering::SeqCst);
                MemoryHandler::new()
            }
        })
        .build()
        .unwrap();
    let connection = MemoryConnection::new(PipelineMode::Standalone);
    let pipeline = SyncPipeline::new(
        test_options(PipelineMode::Standalone, false),
        connection.clone(),
        registry,
    );
    for batch_id in 1..=3 {
        connection
            .push_batch(keyed_insert_batch(batch_id, &batch_id.to_string()))
            .await;
    }

    pipeline.start().await.unwrap();
    wait_for_calls(&connection, |calls| calls.acknowledged.len() == 3).await;
    pipeline.dispose().await;

    assert_eq!(created.load(Ordering::SeqCst), 3);
}
