mod base;
mod endpoint;
mod pipeline;

pub use base::*;
pub use endpoint::*;
pub use pipeline::*;
