use std::fmt;

use crate::error::RelayResult;
use crate::types::{RawEntry, RowChange};

/// Decodes the payload of a [`RawEntry`] into a [`RowChange`].
///
/// The binary format of the replication log is owned by the transport, so each
/// [`crate::connection::ConnectionPort`] implementation pairs with a decoder.
pub trait RowChangeDecoder: fmt::Debug + Send + Sync {
    fn decode(&self, entry: &RawEntry) -> RelayResult<RowChange>;
}

/// Decodes payloads stored as JSON serialized [`RowChange`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRowChangeDecoder;

impl RowChangeDecoder for JsonRowChangeDecoder {
    fn decode(&self, entry: &RawEntry) -> RelayResult<RowChange> {
        Ok(serde_json::from_slice(&entry.store_value)?)
    }
}
