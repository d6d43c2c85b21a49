//! Conversion of replication log entries into the normalized change model.

pub mod decoder;
pub mod normalizer;
pub mod time;

pub use decoder::{JsonRowChangeDecoder, RowChangeDecoder};
pub use normalizer::ChangeNormalizer;
