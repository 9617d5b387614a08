//! D1-backed `RecordStore`.
//!
//! Builds parameterized statements from row columns. Table and column names
//! cannot be bound, so they are checked against a strict identifier pattern
//! before being spliced into SQL. Objects and arrays are stored as JSON text,
//! booleans as 0/1.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use worker::wasm_bindgen::JsValue;
use worker::D1Database;

use super::record_store::{RecordStore, Row, StoreError, StoreResult};

fn identifier_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").ok())
        .as_ref()
}

fn ident(name: &str) -> StoreResult<&str> {
    if identifier_pattern().is_some_and(|pattern| pattern.is_match(name)) {
        Ok(name)
    } else {
        Err(StoreError::InvalidRecord(format!(
            "invalid identifier '{}'",
            name
        )))
    }
}

fn to_js(value: &Value) -> JsValue {
    match value {
        Value::Null => JsValue::NULL,
        Value::Bool(b) => JsValue::from_f64(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n
            .as_f64()
            .map(JsValue::from_f64)
            .unwrap_or_else(|| JsValue::from_str(&n.to_string())),
        Value::String(s) => JsValue::from_str(s),
        other => JsValue::from_str(&other.to_string()),
    }
}

pub struct D1RecordStore {
    database: D1Database,
}

impl D1RecordStore {
    pub fn new(database: D1Database) -> Self {
        Self { database }
    }

    async fn run(&self, sql: &str, params: &[JsValue]) -> StoreResult<u64> {
        let statement = self
            .database
            .prepare(sql)
            .bind(params)
            .map_err(|e| StoreError::Query(format!("D1 bind failed: {}", e)))?;

        let result = statement
            .run()
            .await
            .map_err(|e| StoreError::Query(format!("D1 execute failed: {}", e)))?;

        let changes = result
            .meta()
            .ok()
            .flatten()
            .and_then(|meta| meta.changes)
            .unwrap_or(0);
        Ok(changes as u64)
    }

    async fn query(&self, sql: &str, params: &[JsValue]) -> StoreResult<Vec<Row>> {
        let statement = self
            .database
            .prepare(sql)
            .bind(params)
            .map_err(|e| StoreError::Query(format!("D1 bind failed: {}", e)))?;

        let result = statement
            .all()
            .await
            .map_err(|e| StoreError::Query(format!("D1 query failed: {}", e)))?;

        result
            .results::<Row>()
            .map_err(|e| StoreError::Query(format!("D1 result parsing failed: {}", e)))
    }

    fn columns(record: &Row) -> StoreResult<(Vec<&str>, Vec<JsValue>)> {
        if record.is_empty() {
            return Err(StoreError::InvalidRecord("record has no columns".to_string()));
        }
        let mut columns = Vec::with_capacity(record.len());
        let mut values = Vec::with_capacity(record.len());
        for (column, value) in record {
            columns.push(ident(column)?);
            values.push(to_js(value));
        }
        Ok((columns, values))
    }
}

#[async_trait(?Send)]
impl RecordStore for D1RecordStore {
    async fn select_one(&self, table: &str, key_column: &str, key: &str) -> StoreResult<Row> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1 LIMIT 1",
            ident(table)?,
            ident(key_column)?
        );
        self.query(&sql, &[JsValue::from_str(key)])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound {
                table: table.to_string(),
                column: key_column.to_string(),
                key: key.to_string(),
            })
    }

    async fn select_many(&self, table: &str, filters: &[(&str, Value)]) -> StoreResult<Vec<Row>> {
        let mut sql = format!("SELECT * FROM {}", ident(table)?);
        let mut params = Vec::with_capacity(filters.len());
        for (index, (column, value)) in filters.iter().enumerate() {
            sql.push_str(if index == 0 { " WHERE " } else { " AND " });
            sql.push_str(&format!("{} = ?{}", ident(column)?, index + 1));
            params.push(to_js(value));
        }
        self.query(&sql, &params).await
    }

    async fn upsert(&self, table: &str, record: &Row, conflict_key: &str) -> StoreResult<()> {
        if !record.contains_key(conflict_key) {
            return Err(StoreError::InvalidRecord(format!(
                "upsert into {} requires a '{}' value",
                table, conflict_key
            )));
        }
        let (columns, values) = Self::columns(record)?;
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let updates: Vec<String> = columns
            .iter()
            .filter(|column| **column != conflict_key)
            .map(|column| format!("{} = excluded.{}", column, column))
            .collect();
        let on_conflict = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
            ident(table)?,
            columns.join(", "),
            placeholders.join(", "),
            ident(conflict_key)?,
            on_conflict
        );
        self.run(&sql, &values).await.map(|_| ())
    }

    async fn insert(&self, table: &str, record: &Row) -> StoreResult<()> {
        let (columns, values) = Self::columns(record)?;
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            ident(table)?,
            columns.join(", "),
            placeholders.join(", ")
        );
        self.run(&sql, &values).await.map(|_| ())
    }

    async fn update(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
        patch: &Row,
    ) -> StoreResult<u64> {
        let (columns, mut values) = Self::columns(patch)?;
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", column, i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            ident(table)?,
            assignments.join(", "),
            ident(key_column)?,
            columns.len() + 1
        );
        values.push(JsValue::from_str(key));
        self.run(&sql, &values).await
    }

    async fn delete(&self, table: &str, key_column: &str, key: &str) -> StoreResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            ident(table)?,
            ident(key_column)?
        );
        self.run(&sql, &[JsValue::from_str(key)]).await
    }
}
