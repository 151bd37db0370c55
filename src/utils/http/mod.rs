use anyhow::{Result, bail};
use reqwest::{Client, Response};
use std::time::Duration;

/// Largest response body relayed or decoded (10 MB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Build a `reqwest::Client` with standard timeouts (10 s connect, 30 s overall).
///
/// Falls back to the default client if the builder fails.
pub fn default_http_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Client for long-lived streaming responses: 10 s connect timeout and no
/// overall deadline.
pub fn streaming_http_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Read a whole response body, refusing anything larger than `max_bytes`.
///
/// Relayed bodies must arrive intact, so an oversized body is an error
/// rather than a truncation. `Content-Length` is checked up front; chunked
/// bodies are counted while streaming.
pub async fn read_capped(resp: Response, max_bytes: usize) -> Result<Vec<u8>> {
    if let Some(cl) = resp.content_length()
        && cl as usize > max_bytes
    {
        bail!(
            "response body too large: Content-Length {} exceeds limit {}",
            cl,
            max_bytes
        );
    }

    let mut buf = Vec::new();
    let mut stream = resp;
    while let Some(chunk) = stream.chunk().await? {
        if buf.len() + chunk.len() > max_bytes {
            bail!("response body too large: exceeds limit {}", max_bytes);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// The response's `Content-Type`, or `fallback` when absent or not ASCII.
pub fn content_type_or(resp: &Response, fallback: &str) -> String {
    resp.headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(fallback)
        .to_string()
}
