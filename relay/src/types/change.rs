use std::fmt;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Broad SQL type family of a column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Boolean,
    Integer,
    BigInt,
    Decimal,
    Float,
    Double,
    Char,
    Varchar,
    Text,
    Binary,
    Date,
    Time,
    Timestamp,
    Json,
    #[default]
    Other,
}

/// A single column of a row image, with its value rendered as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// `None` when the column is SQL `NULL`.
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub is_key: bool,
    #[serde(default, rename = "type")]
    pub column_type: ColumnType,
    /// Whether the column changed in this event. Only meaningful for updates.
    #[serde(default)]
    pub updated: bool,
}

impl Column {
    /// Creates a non-key column with a value and [`ColumnType::Other`].
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            is_key: false,
            column_type: ColumnType::Other,
            updated: false,
        }
    }

    /// Creates a primary key column.
    pub fn key(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            is_key: true,
            ..Self::new(name, value)
        }
    }

    /// Overrides the SQL type of the column.
    pub fn with_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = column_type;
        self
    }

    /// Returns `true` if the column carries a non-empty value.
    pub fn has_value(&self) -> bool {
        self.value.as_deref().is_some_and(|value| !value.is_empty())
    }
}

/// Kind of a normalized row change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Insert,
    Update,
    Delete,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Insert => "INSERT",
            EventType::Update => "UPDATE",
            EventType::Delete => "DELETE",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row-level change delivered to handlers.
///
/// Inserts carry only `after_columns`, deletes only `before_columns`, updates both. The
/// effective columns (see [`DataChange::columns`]) always contain a key column with a
/// non-empty value; changes that would violate this are dropped during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataChange {
    pub db_name: String,
    pub table_name: String,
    pub event_type: EventType,
    pub execute_time: NaiveDateTime,
    /// Logical name of the source the change was read from.
    pub destination: String,
    pub before_columns: Option<Vec<Column>>,
    pub after_columns: Option<Vec<Column>>,
}

impl DataChange {
    /// Returns the effective columns: the after image when non-empty, the before image otherwise.
    pub fn columns(&self) -> &[Column] {
        match (&self.after_columns, &self.before_columns) {
            (Some(after), _) if !after.is_empty() => after.as_slice(),
            (_, Some(before)) => before.as_slice(),
            _ => &[],
        }
    }

    /// Returns the first key column of the effective columns.
    pub fn primary_key_column(&self) -> Option<&Column> {
        self.columns().iter().find(|column| column.is_key)
    }

    /// Returns the primary key value when it is present and non-empty.
    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key_column()
            .and_then(|column| column.value.as_deref())
            .filter(|value| !value.is_empty())
    }
}

/// The normalized changes of one fetched batch.
///
/// `changes` may be empty; the `batch_id` still has to be acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBatch {
    pub batch_id: i64,
    pub changes: Vec<DataChange>,
}

impl ChangeBatch {
    /// Creates a batch holding `changes` under the upstream `batch_id`.
    pub fn new(batch_id: i64, changes: Vec<DataChange>) -> Self {
        Self { batch_id, changes }
    }

    /// Creates a batch that only carries an id to acknowledge.
    pub fn empty(batch_id: i64) -> Self {
        Self::new(batch_id, Vec::new())
    }

    /// Returns `true` if the batch carries no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Returns the number of changes in the batch.
    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

/// A batch waiting between the fetch and dispatch stages.
#[derive(Debug, Clone)]
pub struct QueuedBatch {
    pub batch: ChangeBatch,
    /// Time spent fetching and normalizing the batch.
    pub fetch_latency: Duration,
}

impl QueuedBatch {
    pub fn new(batch: ChangeBatch, fetch_latency: Duration) -> Self {
        Self {
            batch,
            fetch_latency,
        }
    }
}
