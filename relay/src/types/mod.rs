//! Core data types of the relay.
//!
//! Entries hold what the change-capture server hands out, changes the normalized
//! model delivered to handlers.

mod change;
mod entry;

pub use change::*;
pub use entry::*;
