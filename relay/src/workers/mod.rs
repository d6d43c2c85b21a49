//! Long-running tasks that make up the pipelines.
//!
//! The asynchronous pipeline runs a [`fetch::FetchWorker`], a [`dispatch::DispatchWorker`]
//! and an [`ack::AckWorker`] concurrently, while the synchronous pipeline runs a single
//! [`sync::SyncWorker`].

pub mod ack;
pub mod base;
pub mod dispatch;
pub mod fetch;
mod reconnect;
pub mod sync;
