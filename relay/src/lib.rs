//! Change-data-capture relay.
//!
//! Pulls row-level change batches from a change-capture server through a
//! [`connection::ConnectionPort`], normalizes them into [`types::DataChange`] records and
//! hands them to the [`handler::ChangeHandler`]s of a [`handler::HandlerRegistry`],
//! acknowledging each batch once it was handled.
//!
//! [`pipeline::AsyncPipeline`] overlaps fetching, dispatching and acknowledging with
//! backpressure between them; [`pipeline::SyncPipeline`] does one batch at a time.
//! [`bootstrap::Bootstrapper`] picks between them from the configuration.

pub mod bootstrap;
pub mod concurrency;
pub mod connection;
pub mod conversions;
pub mod error;
pub mod handler;
mod macros;
pub mod pipeline;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;
