//! Consumers of normalized change batches.

mod base;
pub mod memory;
pub mod registry;

pub use base::*;
pub use registry::{HandlerRegistry, HandlerRegistryBuilder};
