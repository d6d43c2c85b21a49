//! Relay service binary.
//!
//! Loads the pipeline options, initializes logging, and runs the configured pipeline
//! variant until the process receives ctrl-c.

use relay_telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::load_replicator_config;
use crate::core::start_replicator_with_config;
use crate::error::{ReplicatorError, ReplicatorResult};

mod config;
mod core;
mod error;
mod handler;

/// Directory the rolling log files are written to.
const LOG_DIR: &str = "logs";

fn main() -> ReplicatorResult<()> {
    let options = load_replicator_config()?;

    let _log_flusher =
        init_tracing(env!("CARGO_BIN_NAME"), LOG_DIR).map_err(ReplicatorError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(options))?;

    Ok(())
}

async fn async_main(options: relay_config::shared::PipelineOptions) -> ReplicatorResult<()> {
    if let Err(err) = start_replicator_with_config(options).await {
        error!("{err}");
        return Err(err);
    }

    Ok(())
}
