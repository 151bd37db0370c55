use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::debug;

use super::{DataStore, Query};
use crate::config::StoreConfig;
use crate::errors::{LeaddeskError, LeaddeskResult};
use crate::utils::http::{DEFAULT_MAX_BODY_BYTES, default_http_client, read_capped};

/// Longest error body echoed into a `Store` error.
const MAX_ERROR_BODY_CHARS: usize = 300;

/// PostgREST client (`{url}/rest/v1/{table}`).
pub struct RestStore {
    http: Client,
    base_url: String,
    api_key: String,
}

impl RestStore {
    pub fn new(config: &StoreConfig) -> LeaddeskResult<Self> {
        if config.url.trim().is_empty() {
            return Err(LeaddeskError::Config(
                "store.url is required (set LEADDESK_STORE_URL)".to_string(),
            ));
        }
        if config.anon_key.trim().is_empty() {
            return Err(LeaddeskError::Config(
                "store.anonKey is required (set LEADDESK_STORE_KEY)".to_string(),
            ));
        }
        Ok(Self {
            http: default_http_client(),
            base_url: crate::utils::trim_base_url(config.url.trim()).to_string(),
            api_key: config.anon_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> LeaddeskResult<Vec<Value>> {
        let resp = self
            .authed(req)
            .send()
            .await
            .map_err(|e| LeaddeskError::Store {
                message: format!("{} request failed: {}", what, e),
                retryable: true,
            })?;
        decode_rows(resp, what).await
    }
}

async fn decode_rows(resp: Response, what: &str) -> LeaddeskResult<Vec<Value>> {
    let status = resp.status();
    let body = read_capped(resp, DEFAULT_MAX_BODY_BYTES)
        .await
        .map_err(|e| LeaddeskError::Store {
            message: format!("{} response unreadable: {}", what, e),
            retryable: true,
        })?;

    if !status.is_success() {
        let text = String::from_utf8_lossy(&body);
        return Err(LeaddeskError::Store {
            message: format!(
                "{} returned HTTP {}: {}",
                what,
                status.as_u16(),
                crate::utils::truncate_chars(&text, MAX_ERROR_BODY_CHARS)
            ),
            retryable: status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
        });
    }

    match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Array(rows)) => Ok(rows),
        Ok(Value::Null) => Ok(Vec::new()),
        Ok(single) => Ok(vec![single]),
        Err(e) => Err(LeaddeskError::Store {
            message: format!("{} returned invalid JSON: {}", what, e),
            retryable: false,
        }),
    }
}

fn first_row(rows: Vec<Value>, what: &str) -> LeaddeskResult<Value> {
    rows.into_iter().next().ok_or_else(|| LeaddeskError::Store {
        message: format!("{} returned no rows", what),
        retryable: false,
    })
}

#[async_trait]
impl DataStore for RestStore {
    async fn select(&self, query: &Query) -> LeaddeskResult<Vec<Value>> {
        debug!("store select {} {:?}", query.table, query.filters);
        let req = self
            .http
            .get(self.table_url(&query.table))
            .query(&query.to_params());
        self.send(req, &format!("select {}", query.table)).await
    }

    async fn insert(&self, table: &str, row: Value) -> LeaddeskResult<Value> {
        let what = format!("insert into {}", table);
        let req = self
            .http
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&Value::Array(vec![row]));
        first_row(self.send(req, &what).await?, &what)
    }

    async fn update(&self, table: &str, id: &str, patch: Value) -> LeaddeskResult<Value> {
        let what = format!("update {} id={}", table, id);
        let req = self
            .http
            .patch(self.table_url(table))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&patch);
        first_row(self.send(req, &what).await?, &what)
    }
}
