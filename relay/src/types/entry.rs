use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::Column;

/// Kind of an entry in the replication log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    TransactionBegin,
    RowData,
    TransactionEnd,
    Heartbeat,
    GtidLog,
}

impl EntryType {
    /// Returns `true` for transaction boundary markers, which never carry row data.
    pub fn is_transaction_marker(&self) -> bool {
        matches!(self, EntryType::TransactionBegin | EntryType::TransactionEnd)
    }
}

/// Position and origin of a replication log entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntryHeader {
    pub logfile_name: String,
    pub logfile_offset: i64,
    pub schema_name: String,
    pub table_name: String,
    /// Milliseconds since the Unix epoch at which the statement executed on the source.
    pub execute_time: i64,
}

/// An undecoded entry as returned by the change-capture server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub header: EntryHeader,
    pub entry_type: EntryType,
    /// Encoded [`RowChange`] payload.
    pub store_value: Bytes,
}

/// Event kind carried by a decoded row change.
///
/// Only inserts, updates and deletes are turned into [`crate::types::DataChange`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowEventType {
    Insert,
    Update,
    Delete,
    Create,
    Alter,
    Erase,
    Query,
    Truncate,
    Rename,
    #[serde(rename = "CINDEX")]
    CIndex,
    #[serde(rename = "DINDEX")]
    DIndex,
    Gtid,
    XaCommit,
    XaRollback,
    #[serde(rename = "MHEARTBEAT")]
    MHeartbeat,
}

/// Before and after images of a single row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowData {
    #[serde(default)]
    pub before_columns: Vec<Column>,
    #[serde(default)]
    pub after_columns: Vec<Column>,
}

/// Decoded payload of a [`RawEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowChange {
    pub event_type: RowEventType,
    #[serde(default)]
    pub is_ddl: bool,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub row_datas: Vec<RowData>,
}

/// Result of one fetch against the change-capture server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBatch {
    /// Identifier to acknowledge. Values below `1` mean nothing was available.
    pub batch_id: i64,
    pub entries: Vec<RawEntry>,
}

impl FetchedBatch {
    /// Batch id reported by the server when nothing is available.
    pub const NOTHING_AVAILABLE: i64 = -1;

    /// Creates a fetch result for `batch_id`.
    pub fn new(batch_id: i64, entries: Vec<RawEntry>) -> Self {
        Self { batch_id, entries }
    }

    /// Creates the reply used when the server has nothing to hand out.
    pub fn nothing_available() -> Self {
        Self::new(Self::NOTHING_AVAILABLE, Vec::new())
    }

    /// Returns `true` if the batch carries an id that must be acknowledged.
    pub fn is_available(&self) -> bool {
        self.batch_id >= 1
    }
}
