use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use super::{DataStore, Query};
use crate::errors::{LeaddeskError, LeaddeskResult};
use crate::models::scalar_string;

/// In-process store evaluating queries with the same semantics as the REST
/// store. Backs tests and `--memory` runs.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    next_id: AtomicU64,
    failing: AtomicBool,
    selects: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows to `table` as-is.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        let mut tables = self.lock();
        tables.entry(table.to_string()).or_default().extend(rows);
    }

    /// Snapshot of every row in `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.lock().get(table).cloned().unwrap_or_default()
    }

    /// Make every subsequent call fail with a retryable store error until
    /// switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `select` calls served so far, failed ones included.
    pub fn select_count(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Value>>> {
        self.tables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check_available(&self) -> LeaddeskResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LeaddeskError::Store {
                message: "memory store is unavailable".to_string(),
                retryable: true,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn select(&self, query: &Query) -> LeaddeskResult<Vec<Value>> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let tables = self.lock();
        Ok(tables
            .get(&query.table)
            .map(|rows| query.apply(rows))
            .unwrap_or_default())
    }

    async fn insert(&self, table: &str, mut row: Value) -> LeaddeskResult<Value> {
        self.check_available()?;
        let Some(fields) = row.as_object_mut() else {
            return Err(LeaddeskError::Store {
                message: format!("insert into {} expects a JSON object", table),
                retryable: false,
            });
        };
        if fields.get("id").is_none_or(Value::is_null) {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            fields.insert("id".to_string(), Value::from(id));
        }
        self.lock()
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, id: &str, patch: Value) -> LeaddeskResult<Value> {
        self.check_available()?;
        let Value::Object(patch) = patch else {
            return Err(LeaddeskError::Store {
                message: format!("update {} expects a JSON object", table),
                retryable: false,
            });
        };
        let mut tables = self.lock();
        let row = tables
            .get_mut(table)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|r| r.get("id").and_then(scalar_string).as_deref() == Some(id))
            })
            .ok_or_else(|| LeaddeskError::Store {
                message: format!("update {} id={} returned no rows", table, id),
                retryable: false,
            })?;
        if let Some(fields) = row.as_object_mut() {
            fields.extend(patch);
        }
        Ok(row.clone())
    }
}
