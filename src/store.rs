//! The hosted record store the pipeline writes to, plus an in-process implementation.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("{table} record {id} not found")]
    NotFound { table: String, id: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
}

impl Pagination {
    pub fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }

    pub fn next(self) -> Self {
        Self {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }
}

/// Generic create/update/query over named tables.
///
/// Records are JSON objects; `create_record` assigns an `"id"` when the payload has none.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_record(&self, table: &str, data: Value) -> Result<Value, StoreError>;

    /// Shallow-merges the keys of `patch` into the stored record.
    async fn update_record(&self, table: &str, id: &str, patch: Value) -> Result<Value, StoreError>;

    /// Records whose fields equal every entry of `filters`, in insertion order.
    async fn fetch_data(
        &self,
        table: &str,
        page: Pagination,
        filters: &Map<String, Value>,
    ) -> Result<Vec<Value>, StoreError>;
}

struct Injected {
    table: String,
    column: String,
    value: Value,
    error: StoreError,
}

/// Table-per-`Vec` store with optional unique columns, injected failures and latency.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<HashMap<String, Vec<Map<String, Value>>>>,
    unique: Vec<(String, String)>,
    failures: Vec<Injected>,
    latency: Option<Duration>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject creates that repeat an existing value of `column` in `table`.
    pub fn with_unique(mut self, table: &str, column: &str) -> Self {
        self.unique.push((table.into(), column.into()));
        self
    }

    /// Fail creates in `table` whose `column` equals `value`.
    pub fn with_failure(
        mut self,
        table: &str,
        column: &str,
        value: Value,
        error: StoreError,
    ) -> Self {
        self.failures.push(Injected {
            table: table.into(),
            column: column.into(),
            value,
            error,
        });
        self
    }

    /// Delay every create by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn records(&self, table: &str) -> Vec<Value> {
        self.lock()
            .get(table)
            .map(|rows| rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    pub fn count(&self, table: &str) -> usize {
        self.lock().get(table).map_or(0, Vec::len)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Map<String, Value>>>> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn as_object(data: Value) -> Result<Map<String, Value>, StoreError> {
    match data {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Constraint(format!(
            "record must be an object, got {other}"
        ))),
    }
}

fn matches_filters(record: &Map<String, Value>, filters: &Map<String, Value>) -> bool {
    filters.iter().all(|(k, v)| record.get(k) == Some(v))
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn create_record(&self, table: &str, data: Value) -> Result<Value, StoreError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut record = as_object(data)?;

        if let Some(injected) = self
            .failures
            .iter()
            .find(|f| f.table == table && record.get(&f.column) == Some(&f.value))
        {
            return Err(injected.error.clone());
        }

        let id = match record.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        record.insert("id".into(), Value::String(id.clone()));

        let mut tables = self.lock();
        let rows = tables.entry(table.to_string()).or_default();
        if rows.iter().any(|r| r.get("id") == record.get("id")) {
            return Err(StoreError::Constraint(format!("duplicate id {id} in {table}")));
        }
        for (_, column) in self.unique.iter().filter(|(t, _)| t == table) {
            let Some(value) = record.get(column).filter(|v| !v.is_null()) else {
                continue;
            };
            if rows.iter().any(|r| r.get(column) == Some(value)) {
                return Err(StoreError::Constraint(format!(
                    "duplicate value {value} for unique column {table}.{column}"
                )));
            }
        }
        rows.push(record.clone());
        Ok(Value::Object(record))
    }

    async fn update_record(&self, table: &str, id: &str, patch: Value) -> Result<Value, StoreError> {
        let patch = as_object(patch)?;
        let mut tables = self.lock();
        let record = tables
            .get_mut(table)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
            })
            .ok_or_else(|| StoreError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            })?;
        for (k, v) in patch {
            if k != "id" {
                record.insert(k, v);
            }
        }
        Ok(Value::Object(record.clone()))
    }

    async fn fetch_data(
        &self,
        table: &str,
        page: Pagination,
        filters: &Map<String, Value>,
    ) -> Result<Vec<Value>, StoreError> {
        let tables = self.lock();
        Ok(tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| matches_filters(r, filters))
                    .skip(page.offset)
                    .take(page.limit)
                    .cloned()
                    .map(Value::Object)
                    .collect()
            })
            .unwrap_or_default())
    }
}
