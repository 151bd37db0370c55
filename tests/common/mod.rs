// Shared test helpers; not all items used by every test binary.
#![allow(unused)]

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use leaddesk::config::Config;
use leaddesk::gateway::{GatewayState, build_router};
use leaddesk::models::{LEADS_TABLE, MESSAGES_TABLE, Message, MessageKind};
use leaddesk::store::MemoryStore;
use leaddesk::sync::ChangeFeed;
use serde_json::{Value, json};

pub fn lead_row(id: u32, name: &str, score: u8, status: &str) -> Value {
    json!({
        "id": id,
        "nome": name,
        "telefone": format!("55119000000{:02}", id),
        "lead_score": score,
        "lead_status": status,
        "updated_at": "2025-03-01T10:00:00Z"
    })
}

pub fn message_row(id: u32, lead_id: u32, text: &str, at: DateTime<Utc>) -> Value {
    json!({
        "id": id,
        "cliente_id": lead_id,
        "mensagem_cliente": text,
        "timestamp": at.to_rfc3339()
    })
}

/// Store with three leads (scores 9, 6, 2) and a short conversation for lead 1.
pub fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.seed(
        LEADS_TABLE,
        vec![
            lead_row(1, "Ana", 9, "interessado"),
            lead_row(2, "Bruno", 6, "novo"),
            lead_row(3, "Carla", 2, "novo"),
        ],
    );
    let now = Utc::now();
    store.seed(
        MESSAGES_TABLE,
        vec![
            message_row(101, 1, "oi", now - Duration::minutes(3)),
            message_row(102, 1, "tem picanha?", now - Duration::minutes(2)),
        ],
    );
    store
}

/// Config whose backend points at `backend_url`, with sync timings at
/// their shortest allowed values.
pub fn config_with_backend(backend_url: &str) -> Config {
    let mut config = Config::default();
    config.backend.url = backend_url.to_string();
    config.sync.refetch_interval_ms = 2_000;
    config.sync.stale_time_ms = 1_000;
    config
}

/// Serve the gateway router on an ephemeral local port.
pub async fn spawn_gateway(state: GatewayState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A message at `secs` seconds past a fixed epoch.
pub fn message_at(id: &str, secs: i64) -> Message {
    Message {
        id: id.to_string(),
        lead_id: "1".to_string(),
        customer_text: format!("text {}", id),
        bot_text: None,
        kind: MessageKind::Text,
        responded_by: None,
        special_action: None,
        timestamp: Utc.timestamp_opt(1_740_000_000 + secs, 0).unwrap(),
    }
}
