use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use relay::bail;
use relay::bootstrap::Bootstrapper;
use relay::concurrency::shutdown::create_shutdown_channel;
use relay::connection::memory::MemoryConnection;
use relay::error::{ErrorKind, RelayResult};
use relay::handler::HandlerRegistry;
use relay::handler::memory::MemoryHandler;
use relay::pipeline::status::StatusTx;
use relay::pipeline::{AsyncPipeline, PipelineStatus, ProcessingServer, SyncPipeline};
use relay::test_utils::notify::TimedNotify;
use relay::test_utils::pipeline::test_options;
use relay_config::shared::PipelineMode;
use relay_telemetry::tracing::init_test_tracing;
use tokio::sync::{Notify, watch};

/// Server counting lifecycle calls, optionally failing its start.
struct RecordingServer {
    mode: PipelineMode,
    is_async: bool,
    fail_start: bool,
    starts: AtomicU32,
    disposes: AtomicU32,
    started: Arc<Notify>,
    status: StatusTx,
}

impl RecordingServer {
    fn new(mode: PipelineMode, is_async: bool) -> Self {
        Self {
            mode,
            is_async,
            fail_start: false,
            starts: AtomicU32::new(0),
            disposes: AtomicU32::new(0),
            started: Arc::new(Notify::new()),
            status: StatusTx::new(),
        }
    }

    fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    fn started(&self) -> TimedNotify {
        TimedNotify::new(self.started.clone())
    }
}

#[async_trait]
impl ProcessingServer for RecordingServer {
    fn mode(&self) -> PipelineMode {
        self.mode
    }

    fn is_async(&self) -> bool {
        self.is_async
    }

    async fn start(&self) -> RelayResult<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();

        if self.fail_start {
            bail!(ErrorKind::ConnectionFailed, "Server unreachable");
        }

        self.status.set(PipelineStatus::Running);
        Ok(())
    }

    async fn dispose(&self) {
        self.disposes.fetch_add(1, Ordering::SeqCst);
        self.status.set(PipelineStatus::Stopped);
    }

    fn status(&self) -> watch::Receiver<PipelineStatus> {
        self.status.subscribe()
    }
}

fn registry() -> HandlerRegistry {
    HandlerRegistry::builder()
        .shared(MemoryHandler::new())
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn selects_the_server_matching_mode_and_async_flag() {
    init_test_tracing();
    let mut options = test_options(PipelineMode::Standalone, false);

    let bootstrapper = Bootstrapper::new(options.clone())
        .register(AsyncPipeline::new(
            options.clone(),
            MemoryConnection::new(PipelineMode::Standalone),
            registry(),
        ))
        .register(SyncPipeline::new(
            options.clone(),
            MemoryConnection::new(PipelineMode::Standalone),
            registry(),
        ));
    let selected = bootstrapper.select_server().unwrap();
    assert_eq!(selected.mode(), PipelineMode::Standalone);
    assert!(!selected.is_async());

    options.mode = PipelineMode::Cluster;
    let bootstrapper = Bootstrapper::new(options).register(SyncPipeline::new(
        test_options(PipelineMode::Standalone, false),
        MemoryConnection::new(PipelineMode::Standalone),
        registry(),
    ));
    let err = bootstrapper.select_server().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigError);
}

#[tokio::test(flavor = "multi_thread")]
async fn run_starts_and_disposes_the_selected_server_once() {
    init_test_tracing();
    let selected = Arc::new(RecordingServer::new(PipelineMode::Cluster, true));
    let other = Arc::new(RecordingServer::new(PipelineMode::Cluster, false));
    let bootstrapper = Bootstrapper::new(test_options(PipelineMode::Cluster, true))
        .register_arc(other.clone())
        .register_arc(selected.clone());

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let started = selected.started();
    let (result, _) = tokio::join!(bootstrapper.run(shutdown_rx), async {
        started.notified().await;
        shutdown_tx.shutdown();
    });

    result.unwrap();
    assert_eq!(selected.starts.load(Ordering::SeqCst), 1);
    assert_eq!(selected.disposes.load(Ordering::SeqCst), 1);
    assert_eq!(other.starts.load(Ordering::SeqCst), 0);
    assert_eq!(other.disposes.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_start_is_still_disposed_on_shutdown() {
    init_test_tracing();
    let server = Arc::new(RecordingServer::new(PipelineMode::Standalone, true).failing_start());
    let bootstrapper = Bootstrapper::new(test_options(PipelineMode::Standalone, true))
        .register_arc(server.clone());

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let started = server.started();
    let (result, _) = tokio::join!(bootstrapper.run(shutdown_rx), async {
        started.notified().await;
        shutdown_tx.shutdown();
    });

    result.unwrap();
    assert_eq!(server.starts.load(Ordering::SeqCst), 1);
    assert_eq!(server.disposes.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_options_are_rejected_before_starting() {
    init_test_tracing();
    let mut options = test_options(PipelineMode::Standalone, true);
    options.batch_size = 0;
    let server = Arc::new(RecordingServer::new(PipelineMode::Standalone, true));
    let bootstrapper = Bootstrapper::new(options).register_arc(server.clone());

    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let err = bootstrapper.run(shutdown_rx).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
    assert_eq!(server.starts.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn run_drives_a_real_pipeline() {
    init_test_tracing();
    let connection = MemoryConnection::new(PipelineMode::Standalone);
    let options = test_options(PipelineMode::Standalone, true);
    let bootstrapper = Bootstrapper::new(options.clone()).register(AsyncPipeline::new(
        options,
        connection.clone(),
        registry(),
    ));

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let (result, _) = tokio::join!(bootstrapper.run(shutdown_rx), async {
        connection.wait_until(|calls| calls.fetches > 0).await;
        shutdown_tx.shutdown();
    });

    result.unwrap();
    let calls = connection.calls().await;
    assert_eq!(calls.connects, 1);
    assert_eq!(calls.unsubscriptions.len(), 1);
    assert_eq!(calls.disconnects, 1);
}
