//! Builders and doubles for testing pipelines without a change-capture server.
//!
//! Pair [`crate::connection::memory::MemoryConnection`] with the entry builders in
//! [`entry`] to script what the server returns, and wrap handlers in
//! [`handler::TestHandlerWrapper`] to await what reaches them.

pub mod entry;
pub mod handler;
pub mod notify;
pub mod pipeline;
