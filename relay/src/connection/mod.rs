//! Access to the change-capture server.

mod base;
pub mod memory;

pub use base::*;
