//! Record-oriented store interface consumed by the sync engine.
//!
//! Rows are JSON objects keyed by column name. The production implementation
//! is D1 (see `d1_store`); `InMemoryStore` backs tests and local runs.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

use crate::utils::SyncError;

pub type Row = Map<String, Value>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("No row in {table} where {column} = {key}")]
    NotFound {
        table: String,
        column: String,
        key: String,
    },
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Store query failed: {0}")]
    Query(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => SyncError::not_found(err.to_string()),
            StoreError::InvalidRecord(msg) => SyncError::validation_failure(msg),
            StoreError::Query(msg) => SyncError::database_error(msg),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::InvalidRecord(err.to_string())
    }
}

#[async_trait(?Send)]
pub trait RecordStore {
    /// Single row by key. Missing rows are `StoreError::NotFound`.
    async fn select_one(&self, table: &str, key_column: &str, key: &str) -> StoreResult<Row>;

    /// All rows whose columns equal every `(column, value)` filter.
    async fn select_many(&self, table: &str, filters: &[(&str, Value)]) -> StoreResult<Vec<Row>>;

    /// Insert, or overwrite the given columns of the row sharing `conflict_key`.
    async fn upsert(&self, table: &str, record: &Row, conflict_key: &str) -> StoreResult<()>;

    async fn insert(&self, table: &str, record: &Row) -> StoreResult<()>;

    /// Returns the number of rows changed.
    async fn update(&self, table: &str, key_column: &str, key: &str, patch: &Row)
        -> StoreResult<u64>;

    async fn delete(&self, table: &str, key_column: &str, key: &str) -> StoreResult<u64>;
}

/// Converts a JSON object into a row, rejecting other shapes.
pub fn to_row(value: &Value) -> StoreResult<Row> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| StoreError::InvalidRecord("record must be a JSON object".to_string()))
}

fn key_matches(row: &Row, column: &str, key: &str) -> bool {
    match row.get(column) {
        Some(Value::String(s)) => s == key,
        Some(Value::Number(n)) => n.to_string() == key,
        _ => false,
    }
}

fn value_matches(stored: Option<&Value>, expected: &Value) -> bool {
    match (stored, expected) {
        (Some(a), b) if a == b => true,
        // Bool columns round-trip as 0/1 in SQL-backed stores
        (Some(Value::Number(n)), Value::Bool(b)) => n.as_i64() == Some(i64::from(*b)),
        (None, Value::Null) => true,
        _ => false,
    }
}

/// Process-local store with SQL-like upsert semantics.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn count(&self, table: &str) -> usize {
        self.rows(table).len()
    }
}

#[async_trait(?Send)]
impl RecordStore for InMemoryStore {
    async fn select_one(&self, table: &str, key_column: &str, key: &str) -> StoreResult<Row> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables
            .get(table)
            .and_then(|rows| rows.iter().find(|row| key_matches(row, key_column, key)))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                table: table.to_string(),
                column: key_column.to_string(),
                key: key.to_string(),
            })
    }

    async fn select_many(&self, table: &str, filters: &[(&str, Value)]) -> StoreResult<Vec<Row>> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        filters
                            .iter()
                            .all(|(column, expected)| value_matches(row.get(*column), expected))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert(&self, table: &str, record: &Row, conflict_key: &str) -> StoreResult<()> {
        let key = match record.get(conflict_key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(StoreError::InvalidRecord(format!(
                    "upsert into {} requires a '{}' value",
                    table, conflict_key
                )))
            }
        };

        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let rows = tables.entry(table.to_string()).or_default();
        match rows.iter_mut().find(|row| key_matches(row, conflict_key, &key)) {
            Some(existing) => {
                for (column, value) in record {
                    existing.insert(column.clone(), value.clone());
                }
            }
            None => rows.push(record.clone()),
        }
        Ok(())
    }

    async fn insert(&self, table: &str, record: &Row) -> StoreResult<()> {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn update(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
        patch: &Row,
    ) -> StoreResult<u64> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let mut changed = 0;
        if let Some(rows) = tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| key_matches(row, key_column, key)) {
                for (column, value) in patch {
                    row.insert(column.clone(), value.clone());
                }
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete(&self, table: &str, key_column: &str, key: &str) -> StoreResult<u64> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| !key_matches(row, key_column, key));
        Ok((before - rows.len()) as u64)
    }
}
