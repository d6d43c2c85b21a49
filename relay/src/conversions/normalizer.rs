use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{debug, error, warn};

use crate::conversions::decoder::{JsonRowChangeDecoder, RowChangeDecoder};
use crate::conversions::time::execute_time_to_datetime;
use crate::types::{
    ChangeBatch, DataChange, EntryHeader, EventType, RawEntry, RowData, RowEventType,
};

/// Turns the raw entries of a fetched batch into a [`ChangeBatch`].
///
/// Normalization never fails as a whole. Entries that are transaction markers, lack a
/// schema or table name, or cannot be decoded are skipped. Rows whose event is not an
/// insert, update or delete are skipped, and rows without a non-empty primary key are
/// dropped with an error log. Everything else is kept in input order.
///
/// The normalizer holds no mutable state, so normalizing the same input twice yields
/// equal batches.
#[derive(Debug, Clone)]
pub struct ChangeNormalizer {
    destination: String,
    decoder: Arc<dyn RowChangeDecoder>,
}

impl ChangeNormalizer {
    /// Creates a normalizer stamping `destination` on every change it produces.
    pub fn new(destination: impl Into<String>, decoder: Arc<dyn RowChangeDecoder>) -> Self {
        Self {
            destination: destination.into(),
            decoder,
        }
    }

    /// Creates a normalizer for payloads encoded with [`JsonRowChangeDecoder`].
    pub fn with_json_decoder(destination: impl Into<String>) -> Self {
        Self::new(destination, Arc::new(JsonRowChangeDecoder))
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Turns the raw entries of one fetch into a [`ChangeBatch`].
    ///
    /// Only decodable row data with a primary key ends up in the batch.
    pub fn normalize(&self, batch_id: i64, entries: &[RawEntry]) -> ChangeBatch {
        let mut changes = Vec::new();
        for entry in entries {
            self.normalize_entry(batch_id, entry, &mut changes);
        }

        ChangeBatch::new(batch_id, changes)
    }

    fn normalize_entry(&self, batch_id: i64, entry: &RawEntry, changes: &mut Vec<DataChange>) {
        if entry.entry_type.is_transaction_marker() {
            return;
        }

        let header = &entry.header;
        if header.schema_name.is_empty() || header.table_name.is_empty() {
            return;
        }

        let row_change = match self.decoder.decode(entry) {
            Ok(row_change) => row_change,
            Err(err) => {
                warn!(
                    batch_id,
                    schema = %header.schema_name,
                    table = %header.table_name,
                    error = %err,
                    "failed to decode row change, skipping entry"
                );
                return;
            }
        };

        debug!(
            batch_id,
            binlog = %format!("{}:{}", header.logfile_name, header.logfile_offset),
            schema = %header.schema_name,
            table = %header.table_name,
            event_type = ?row_change.event_type,
            "decoded row change"
        );

        let execute_time = match execute_time_to_datetime(header.execute_time) {
            Ok(execute_time) => execute_time,
            Err(err) => {
                warn!(
                    batch_id,
                    schema = %header.schema_name,
                    table = %header.table_name,
                    error = %err,
                    "invalid execute time, skipping entry"
                );
                return;
            }
        };

        let Some(event_type) = classify(row_change.event_type) else {
            return;
        };

        for row in row_change.row_datas {
            let change = self.build_change(header, event_type, execute_time, row);
            if change.primary_key().is_none() {
                error!(
                    batch_id,
                    schema = %header.schema_name,
                    table = %header.table_name,
                    change = %serde_json::to_string(&change).unwrap_or_default(),
                    "row has no primary key value, dropping it"
                );
                continue;
            }

            changes.push(change);
        }
    }

    fn build_change(
        &self,
        header: &EntryHeader,
        event_type: EventType,
        execute_time: NaiveDateTime,
        row: RowData,
    ) -> DataChange {
        let (before_columns, after_columns) = match event_type {
            EventType::Insert => (None, Some(row.after_columns)),
            EventType::Update => (Some(row.before_columns), Some(row.after_columns)),
            EventType::Delete => (Some(row.before_columns), None),
        };

        DataChange {
            db_name: header.schema_name.clone(),
            table_name: header.table_name.clone(),
            event_type,
            execute_time,
            destination: self.destination.clone(),
            before_columns,
            after_columns,
        }
    }
}

/// Maps row events that describe data changes; DDL and control events yield `None`.
fn classify(event_type: RowEventType) -> Option<EventType> {
    match event_type {
        RowEventType::Insert => Some(EventType::Insert),
        RowEventType::Update => Some(EventType::Update),
        RowEventType::Delete => Some(EventType::Delete),
        _ => None,
    }
}
