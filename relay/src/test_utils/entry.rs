use bytes::Bytes;

use crate::types::{
    Column, EntryHeader, EntryType, FetchedBatch, RawEntry, RowChange, RowData, RowEventType,
};

/// Execute time stamped on entries built by this module.
pub const TEST_EXECUTE_TIME_MS: i64 = 1_700_000_000_000;

fn header(schema: &str, table: &str) -> EntryHeader {
    EntryHeader {
        logfile_name: "mysql-bin.000001".to_owned(),
        logfile_offset: 4,
        schema_name: schema.to_owned(),
        table_name: table.to_owned(),
        execute_time: TEST_EXECUTE_TIME_MS,
    }
}

/// Builds a row data entry whose payload is a JSON encoded [`RowChange`].
pub fn row_entry(
    schema: &str,
    table: &str,
    event_type: RowEventType,
    rows: Vec<RowData>,
) -> RawEntry {
    let row_change = RowChange {
        event_type,
        is_ddl: false,
        sql: None,
        row_datas: rows,
    };
    let payload = serde_json::to_vec(&row_change).expect("row change serializes to json");

    RawEntry {
        header: header(schema, table),
        entry_type: EntryType::RowData,
        store_value: Bytes::from(payload),
    }
}

pub fn insert_entry(schema: &str, table: &str, after: Vec<Column>) -> RawEntry {
    row_entry(
        schema,
        table,
        RowEventType::Insert,
        vec![RowData {
            before_columns: vec![],
            after_columns: after,
        }],
    )
}

pub fn update_entry(
    schema: &str,
    table: &str,
    before: Vec<Column>,
    after: Vec<Column>,
) -> RawEntry {
    row_entry(
        schema,
        table,
        RowEventType::Update,
        vec![RowData {
            before_columns: before,
            after_columns: after,
        }],
    )
}

pub fn delete_entry(schema: &str, table: &str, before: Vec<Column>) -> RawEntry {
    row_entry(
        schema,
        table,
        RowEventType::Delete,
        vec![RowData {
            before_columns: before,
            after_columns: vec![],
        }],
    )
}

/// Builds a row data entry whose payload cannot be decoded.
pub fn undecodable_entry(schema: &str, table: &str) -> RawEntry {
    RawEntry {
        header: header(schema, table),
        entry_type: EntryType::RowData,
        store_value: Bytes::from_static(b"\x00not a row change"),
    }
}

fn marker(entry_type: EntryType) -> RawEntry {
    RawEntry {
        header: header("", ""),
        entry_type,
        store_value: Bytes::new(),
    }
}

pub fn transaction_begin() -> RawEntry {
    marker(EntryType::TransactionBegin)
}

pub fn transaction_end() -> RawEntry {
    marker(EntryType::TransactionEnd)
}

/// Builds a fetch reply holding a single keyed insert into `s.t`.
pub fn keyed_insert_batch(batch_id: i64, key: &str) -> FetchedBatch {
    FetchedBatch::new(
        batch_id,
        vec![
            transaction_begin(),
            insert_entry("s", "t", vec![Column::key("id", key)]),
            transaction_end(),
        ],
    )
}
