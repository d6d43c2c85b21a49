//! Pipelines moving batches from a [`crate::connection::ConnectionPort`] to the handlers.
//!
//! Two variants exist. [`AsyncPipeline`] runs fetch, dispatch and acknowledgement
//! concurrently and stops dispatching for good on a handler error. [`SyncPipeline`] runs
//! them in sequence and reconnects and retries on any error.

pub mod asynchronous;
mod lifecycle;
mod server;
pub mod status;
pub mod synchronous;

pub use asynchronous::AsyncPipeline;
pub use server::ProcessingServer;
pub use status::PipelineStatus;
pub use synchronous::SyncPipeline;
