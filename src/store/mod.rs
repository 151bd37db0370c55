//! Data-store seam.
//!
//! Every read and write in leaddesk is a generic select/insert/update against
//! one of three tables. `RestStore` talks to a hosted PostgREST endpoint;
//! `MemoryStore` evaluates the same queries in-process.

pub mod memory;
pub mod query;
pub mod rest;

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::config::StoreConfig;
use crate::errors::{LeaddeskError, LeaddeskResult};

pub use memory::MemoryStore;
pub use query::{Direction, Query};
pub use rest::RestStore;

#[async_trait]
pub trait DataStore: Send + Sync {
    /// Rows matching `query`, in the query's order.
    async fn select(&self, query: &Query) -> LeaddeskResult<Vec<Value>>;

    /// Insert one row and return it as stored.
    async fn insert(&self, table: &str, row: Value) -> LeaddeskResult<Value>;

    /// Apply `patch` to the row with `id` and return the updated row.
    async fn update(&self, table: &str, id: &str, patch: Value) -> LeaddeskResult<Value>;
}

static STORE: OnceLock<Arc<RestStore>> = OnceLock::new();

/// Create the process-wide store client on first call; later calls return
/// the same instance. Missing credentials are an initialization error.
pub fn init(config: &StoreConfig) -> LeaddeskResult<Arc<RestStore>> {
    if let Some(existing) = STORE.get() {
        return Ok(existing.clone());
    }
    let store = Arc::new(RestStore::new(config)?);
    let shared = STORE.get_or_init(|| {
        info!("data store client initialized for {}", store.base_url());
        store
    });
    Ok(shared.clone())
}

/// The store created by [`init`].
pub fn global() -> LeaddeskResult<Arc<RestStore>> {
    STORE
        .get()
        .cloned()
        .ok_or_else(|| LeaddeskError::Config("data store not initialized".to_string()))
}
