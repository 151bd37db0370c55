//! HTTP gateway for the dashboard.
//!
//! Serves the webhook proxy, the dashboard JSON API, the database-webhook
//! ingress that feeds the change feed, and a stream of accepted changes for
//! synchronizers running in other processes.

pub mod api;
pub mod proxy;

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use futures_util::stream::{self, Stream};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::store::DataStore;
use crate::sync::relay::{CHANGE_STREAM_EVENT, CHANGES_STREAM_PATH, LAGGED_STREAM_EVENT};
use crate::sync::{ChangeEvent, ChangeFeed, RecentConversations, SyncSettings};
use crate::utils::http::DEFAULT_MAX_BODY_BYTES;

type HmacSha256 = Hmac<Sha256>;

/// Max change-event payload size: 1 MB.
const CHANGES_MAX_BODY: usize = 1_048_576;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct GatewayState {
    store: Arc<dyn DataStore>,
    feed: ChangeFeed,
    recent: Arc<RecentConversations>,
    proxy: Arc<proxy::ProxyTarget>,
    changes_secret: Arc<str>,
}

impl GatewayState {
    pub fn new(config: &Config, store: Arc<dyn DataStore>, feed: ChangeFeed) -> Self {
        let settings = SyncSettings::from(&config.sync);
        Self {
            recent: Arc::new(RecentConversations::new(store.clone(), settings)),
            store,
            feed,
            proxy: Arc::new(proxy::ProxyTarget::new(config.backend.webhook_url())),
            changes_secret: Arc::from(config.gateway.changes_secret.as_str()),
        }
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn recent(&self) -> &Arc<RecentConversations> {
        &self.recent
    }
}

/// Build the gateway router.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route(
            "/api/webhook",
            get(proxy::status_handler).post(proxy::forward_handler),
        )
        .route("/api/health", get(health_handler))
        .route("/api/changes", post(changes_handler))
        .route(CHANGES_STREAM_PATH, get(changes_stream_handler))
        .route("/api/leads", get(api::list_leads_handler))
        .route("/api/leads/{id}", patch(api::update_lead_handler))
        .route("/api/leads/{id}/qualify", post(api::qualify_lead_handler))
        .route("/api/leads/{id}/messages", get(api::lead_messages_handler))
        .route("/api/conversations/recent", get(api::recent_handler))
        .route(
            "/api/campaigns",
            get(api::list_campaigns_handler).post(api::create_campaign_handler),
        )
        .route("/api/campaigns/active", get(api::active_campaigns_handler))
        .route("/api/campaigns/{id}/audience", get(api::audience_handler))
        .layer(DefaultBodyLimit::max(DEFAULT_MAX_BODY_BYTES))
        .with_state(state)
}

/// GET /api/health: health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION
    }))
}

/// Validate HMAC-SHA256 signature against a payload.
pub(crate) fn validate_webhook_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    // Raw hex or "sha256=<hex>"
    let sig = signature.strip_prefix("sha256=").unwrap_or(signature);
    expected.as_bytes().ct_eq(sig.as_bytes()).into()
}

/// POST /api/changes: database webhook reporting a row change.
async fn changes_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if body.len() > CHANGES_MAX_BODY {
        warn!("changes: payload too large ({} bytes)", body.len());
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    if !state.changes_secret.is_empty() {
        let signature = headers
            .get("X-Signature-256")
            .or_else(|| headers.get("X-Webhook-Signature"))
            .and_then(|v| v.to_str().ok());
        let Some(signature) = signature else {
            warn!("changes: missing signature header");
            return StatusCode::FORBIDDEN.into_response();
        };
        if !validate_webhook_signature(&state.changes_secret, signature, &body) {
            warn!("changes: invalid signature");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let event = match ChangeEvent::parse(&body) {
        Ok(event) => event,
        Err(e) => {
            debug!("changes: rejected payload: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": format!("invalid change payload: {}", e)})),
            )
                .into_response();
        }
    };

    debug!(
        "changes: {:?} on {} (lead {:?})",
        event.kind, event.table, event.lead_id
    );
    let delivered = state.feed.publish(event);
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"accepted": true, "subscribers": delivered})),
    )
        .into_response()
}

/// GET /api/changes/stream: every accepted change event as Server-Sent Events.
async fn changes_stream_handler(
    State(state): State<GatewayState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("changes stream: follower connected");
    let events = stream::unfold(state.feed.subscribe(), |mut rx| async move {
        let frame = match rx.recv().await {
            Ok(event) => Event::default()
                .event(CHANGE_STREAM_EVENT)
                .data(event.to_payload().to_string()),
            Err(RecvError::Lagged(skipped)) => {
                warn!("changes stream: follower lagged by {} events", skipped);
                Event::default()
                    .event(LAGGED_STREAM_EVENT)
                    .data(skipped.to_string())
            }
            Err(RecvError::Closed) => return None,
        };
        Some((Ok::<_, Infallible>(frame), rx))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Start the gateway. Returns the server task and the shared state.
pub async fn start(
    config: &Config,
    store: Arc<dyn DataStore>,
    feed: ChangeFeed,
) -> Result<(tokio::task::JoinHandle<()>, GatewayState)> {
    let state = GatewayState::new(config, store, feed);
    state.recent.spawn_invalidator(&state.feed);
    info!("webhook proxy forwarding to {}", state.proxy.url());

    let app = build_router(state.clone());
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP gateway listening on {}", addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP gateway error: {}", e);
        }
    });

    Ok((handle, state))
}
