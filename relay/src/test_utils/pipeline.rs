use relay_config::shared::{
    ClusterEndpoint, FetchConfig, PipelineMode, PipelineOptions, StandaloneEndpoint,
};
use tokio::sync::watch;
use tokio::time::timeout;

use crate::pipeline::PipelineStatus;
use crate::test_utils::notify::DEFAULT_NOTIFY_TIMEOUT;

/// Destination stamped on changes by pipelines built from [`test_options`].
pub const TEST_DESTINATION: &str = "test";

/// Returns valid options with millisecond intervals so tests do not wait on timers.
pub fn test_options(mode: PipelineMode, is_async: bool) -> PipelineOptions {
    let mut options = PipelineOptions::new(TEST_DESTINATION, mode, is_async);
    options.fetch = FetchConfig {
        poll_interval_ms: 1,
        idle_interval_ms: 5,
        reconnect_delay_ms: 5,
    };
    options.standalone = Some(StandaloneEndpoint {
        host: "127.0.0.1".to_owned(),
        port: 11111,
        username: None,
        password: None,
        so_timeout_ms: 60_000,
        idle_timeout_ms: 3_600_000,
    });
    options.cluster = Some(ClusterEndpoint {
        zk_address: "127.0.0.1:2181".to_owned(),
        username: None,
        password: None,
        so_timeout_ms: 60_000,
        idle_timeout_ms: 3_600_000,
    });

    options
}

/// Waits until `status_rx` reports `expected`, panicking after the default notify timeout.
pub async fn wait_for_status(
    status_rx: &mut watch::Receiver<PipelineStatus>,
    expected: PipelineStatus,
) {
    let reached = timeout(
        DEFAULT_NOTIFY_TIMEOUT,
        status_rx.wait_for(|status| *status == expected),
    )
    .await;

    match reached {
        Ok(Ok(_)) => {}
        Ok(Err(_)) => panic!("status channel closed before reaching `{expected}`"),
        Err(_) => panic!("timed out waiting for status `{expected}`"),
    }
}
