use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::services::core::infrastructure::alerting::AlertSink;
use crate::services::core::infrastructure::record_store::{
    InMemoryStore, RecordStore, Row, StoreError, StoreResult,
};

/// In-memory store with switchable faults.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: InMemoryStore,
    fail_tables: Mutex<HashSet<String>>,
    fail_upsert_ids: Mutex<HashSet<String>>,
    fail_reads: AtomicBool,
    upserts: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation on `table` fails with a query error.
    pub fn fail_table(&self, table: &str) {
        self.fail_tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(table.to_string());
    }

    pub fn heal_table(&self, table: &str) {
        self.fail_tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(table);
    }

    /// Upserts of rows whose `id` equals `id` fail.
    pub fn fail_upsert_for(&self, id: &str) {
        self.fail_upsert_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
    }

    pub fn heal_upserts(&self) {
        self.fail_upsert_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// `select_one` fails with a non-not-found error.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    fn check_table(&self, table: &str) -> StoreResult<()> {
        if self
            .fail_tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(table)
        {
            return Err(StoreError::Query(format!("{} is unavailable", table)));
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl RecordStore for FaultyStore {
    async fn select_one(&self, table: &str, key_column: &str, key: &str) -> StoreResult<Row> {
        self.check_table(table)?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Query("read timeout".to_string()));
        }
        self.inner.select_one(table, key_column, key).await
    }

    async fn select_many(&self, table: &str, filters: &[(&str, Value)]) -> StoreResult<Vec<Row>> {
        self.check_table(table)?;
        self.inner.select_many(table, filters).await
    }

    async fn upsert(&self, table: &str, record: &Row, conflict_key: &str) -> StoreResult<()> {
        self.check_table(table)?;
        if let Some(Value::String(id)) = record.get("id") {
            if self
                .fail_upsert_ids
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(id)
            {
                return Err(StoreError::Query(format!("constraint violation for {}", id)));
            }
        }
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(table, record, conflict_key).await
    }

    async fn insert(&self, table: &str, record: &Row) -> StoreResult<()> {
        self.check_table(table)?;
        self.inner.insert(table, record).await
    }

    async fn update(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
        patch: &Row,
    ) -> StoreResult<u64> {
        self.check_table(table)?;
        self.inner.update(table, key_column, key, patch).await
    }

    async fn delete(&self, table: &str, key_column: &str, key: &str) -> StoreResult<u64> {
        self.check_table(table)?;
        self.inner.delete(table, key_column, key).await
    }
}

/// Alert sink that keeps every message.
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait(?Send)]
impl AlertSink for RecordingAlertSink {
    async fn send_alert(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}
