//! Selects the configured pipeline variant and drives its lifecycle.

use std::fmt;
use std::sync::Arc;

use relay_config::shared::PipelineOptions;
use tracing::{error, info};

use crate::bail;
use crate::concurrency::shutdown::{ShutdownRx, create_shutdown_channel};
use crate::error::{ErrorKind, RelayResult};
use crate::pipeline::ProcessingServer;

/// Picks the one registered server matching the configured mode and async flag.
pub struct Bootstrapper {
    options: PipelineOptions,
    servers: Vec<Arc<dyn ProcessingServer>>,
}

impl Bootstrapper {
    /// Creates a bootstrapper with no servers registered.
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            servers: Vec::new(),
        }
    }

    /// Registers a server candidate for selection.
    pub fn register<S>(self, server: S) -> Self
    where
        S: ProcessingServer + 'static,
    {
        self.register_arc(Arc::new(server))
    }

    pub fn register_arc(mut self, server: Arc<dyn ProcessingServer>) -> Self {
        self.servers.push(server);
        self
    }

    /// Returns the server whose `(mode, async)` pair matches the options.
    pub fn select_server(&self) -> RelayResult<Arc<dyn ProcessingServer>> {
        let selected = self.servers.iter().find(|server| {
            server.mode() == self.options.mode && server.is_async() == self.options.is_async
        });

        match selected {
            Some(server) => Ok(server.clone()),
            None => bail!(
                ErrorKind::ConfigError,
                "No pipeline matches the configuration",
                detail = format!(
                    "no registered server runs in {} mode with async set to {}",
                    self.options.mode, self.options.is_async
                )
            ),
        }
    }

    /// Starts the selected server, waits for `shutdown_rx` and disposes it.
    ///
    /// A failed start is logged and the server is still disposed on shutdown, so both
    /// `start` and `dispose` run exactly once.
    pub async fn run(&self, mut shutdown_rx: ShutdownRx) -> RelayResult<()> {
        self.options.validate()?;
        let server = self.select_server()?;

        info!(
            destination = %self.options.destination,
            mode = %self.options.mode,
            is_async = self.options.is_async,
            "starting pipeline"
        );
        if let Err(err) = server.start().await {
            error!(error = %err, "failed to start pipeline");
        }

        shutdown_rx.wait().await;

        info!("shutdown requested, stopping pipeline");
        server.dispose().await;

        Ok(())
    }

    /// Runs until the process receives ctrl-c.
    pub async fn run_until_signal(&self) -> RelayResult<()> {
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let signal = tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "failed to listen for the shutdown signal");
            }
            shutdown_tx.shutdown();
        });

        let result = self.run(shutdown_rx).await;
        signal.abort();

        result
    }
}

impl fmt::Debug for Bootstrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrapper")
            .field("options", &self.options)
            .field("servers", &self.servers.len())
            .finish()
    }
}
