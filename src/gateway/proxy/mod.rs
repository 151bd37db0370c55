use anyhow::Result;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::Client;
use tracing::{debug, error};

use super::GatewayState;
use crate::utils::http::{DEFAULT_MAX_BODY_BYTES, content_type_or, default_http_client, read_capped};

const FALLBACK_CONTENT_TYPE: &str = "application/json";

/// The backend webhook every proxied POST is forwarded to.
pub struct ProxyTarget {
    http: Client,
    url: String,
}

/// Backend reply relayed to the caller unchanged.
pub struct Relayed {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl ProxyTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: default_http_client(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Forward `body` with `content_type` and collect the reply.
    pub async fn forward(&self, content_type: &str, body: Bytes) -> Result<Relayed> {
        let resp = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let content_type = content_type_or(&resp, FALLBACK_CONTENT_TYPE);
        let body = read_capped(resp, DEFAULT_MAX_BODY_BYTES).await?;
        Ok(Relayed {
            status,
            content_type,
            body,
        })
    }
}

/// GET /api/webhook: liveness of the proxy route.
pub(crate) async fn status_handler() -> impl IntoResponse {
    Json(serde_json::json!({"ok": true, "route": "webhook", "mode": "proxy"}))
}

/// POST /api/webhook: pass the body through to the backend and relay its reply.
pub(crate) async fn forward_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string();
    debug!(
        "proxy: forwarding {} bytes ({}) to {}",
        body.len(),
        content_type,
        state.proxy.url()
    );

    match state.proxy.forward(&content_type, body).await {
        Ok(relayed) => relay_response(relayed),
        Err(e) => {
            error!("proxy: backend call failed: {:#}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({
                    "ok": false,
                    "error": "proxy_failed",
                    "detail": format!("{:#}", e),
                })),
            )
                .into_response()
        }
    }
}

fn relay_response(relayed: Relayed) -> Response {
    let status = StatusCode::from_u16(relayed.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = HeaderValue::from_str(&relayed.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_CONTENT_TYPE));
    let mut response = Response::new(Body::from(relayed.body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, content_type);
    response
}
