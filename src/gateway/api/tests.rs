use super::*;
use crate::config::Config;
use crate::gateway::build_router;
use crate::models::{CAMPAIGNS_TABLE, LEADS_TABLE, MESSAGES_TABLE};
use crate::store::MemoryStore;
use crate::sync::ChangeFeed;
use axum::body::Body;
use axum::http::Request;
use chrono::Duration;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

fn seeded() -> (Arc<MemoryStore>, axum::Router) {
    let store = Arc::new(MemoryStore::new());
    let now = Utc::now();
    store.seed(
        LEADS_TABLE,
        vec![
            json!({"id": 1, "nome": "Ana Souza", "telefone": "5511900000001", "lead_score": 9,
                   "lead_status": "interessado", "interesse_declarado": "queijos",
                   "updated_at": "2025-03-03T00:00:00Z"}),
            json!({"id": 2, "nome": "Bruno", "telefone": "5511900000002", "lead_score": 5,
                   "lead_status": "novo", "interesse_declarado": "vinhos",
                   "updated_at": "2025-03-02T00:00:00Z"}),
            json!({"id": 3, "nome": "Carla", "telefone": "5511900000003", "lead_score": 2,
                   "lead_status": "novo", "updated_at": "2025-03-01T00:00:00Z"}),
        ],
    );
    store.seed(
        MESSAGES_TABLE,
        vec![
            json!({"id": 10, "cliente_id": 2, "mensagem_cliente": "tem vinho?",
                   "timestamp": (now - Duration::minutes(10)).to_rfc3339()}),
            json!({"id": 11, "cliente_id": 2, "mensagem_cliente": "e queijo?",
                   "timestamp": (now - Duration::minutes(5)).to_rfc3339()}),
        ],
    );
    store.seed(
        CAMPAIGNS_TABLE,
        vec![
            json!({"id": "c1", "nome": "Queijos", "produtos": ["Minas"], "oferta": "20%",
                   "data_inicio": (now - Duration::days(1)).to_rfc3339(),
                   "data_fim": (now + Duration::days(1)).to_rfc3339(),
                   "segmento": {"lead_score": ">5", "interesse": "contains queijo"},
                   "created_at": (now - Duration::days(1)).to_rfc3339()}),
            json!({"id": "c2", "nome": "Frios", "produtos": ["Salame"], "oferta": "15%",
                   "data_inicio": (now - Duration::days(5)).to_rfc3339(),
                   "data_fim": (now - Duration::days(1)).to_rfc3339(),
                   "segmento": null,
                   "created_at": (now - Duration::days(5)).to_rfc3339()}),
        ],
    );
    let state = GatewayState::new(&Config::default(), store.clone(), ChangeFeed::default());
    (store, build_router(state))
}

async fn call(app: axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let resp = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn ids(json: &Value) -> Vec<String> {
    json.as_array()
        .unwrap()
        .iter()
        .map(|v| crate::models::scalar_string(&v["id"]).unwrap())
        .collect()
}

#[tokio::test]
async fn test_list_leads_with_tier() {
    let (_, app) = seeded();
    let (status, json) = call(app, "GET", "/api/leads", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&json), vec!["1", "2", "3"]);
    assert_eq!(json[0]["tier"], "hot");
    assert_eq!(json[0]["nome"], "Ana Souza");
}

#[tokio::test]
async fn test_list_leads_filters() {
    let (_, app) = seeded();
    let (_, high) = call(app.clone(), "GET", "/api/leads?score=high", None).await;
    assert_eq!(ids(&high), vec!["1"]);
    let (_, low) = call(app.clone(), "GET", "/api/leads?score=low", None).await;
    assert_eq!(ids(&low), vec!["3"]);
    let (_, novo) = call(app.clone(), "GET", "/api/leads?status=novo&q=carl", None).await;
    assert_eq!(ids(&novo), vec!["3"]);
    let (_, chatting) = call(app, "GET", "/api/leads?withConversations=true", None).await;
    assert_eq!(ids(&chatting), vec!["2"]);
}

#[tokio::test]
async fn test_list_leads_bad_filter_is_422() {
    let (_, app) = seeded();
    let (status, json) = call(app.clone(), "GET", "/api/leads?score=extreme", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["field"], "score");
    let (status, json) = call(app, "GET", "/api/leads?status=perdido", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["field"], "status");
}

#[tokio::test]
async fn test_list_leads_degrades_on_store_failure() {
    let (store, app) = seeded();
    store.set_failing(true);
    let (status, json) = call(app, "GET", "/api/leads", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([]));
}

#[tokio::test]
async fn test_patch_lead() {
    let (store, app) = seeded();
    let (status, json) = call(
        app,
        "PATCH",
        "/api/leads/3",
        Some(json!({"score": 6, "status": "interessado"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["lead_score"], 6);
    assert_eq!(json["tier"], "warm");
    assert_eq!(store.rows(LEADS_TABLE)[2]["lead_status"], "interessado");
}

#[tokio::test]
async fn test_patch_lead_invalid_score_is_422() {
    let (_, app) = seeded();
    let (status, json) = call(app, "PATCH", "/api/leads/3", Some(json!({"score": 42}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["field"], "score");
}

#[tokio::test]
async fn test_patch_lead_store_failure_is_502() {
    let (store, app) = seeded();
    store.set_failing(true);
    let (status, json) = call(app, "PATCH", "/api/leads/3", Some(json!({"score": 4}))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(json["error"].as_str().unwrap().contains("Store error"));
}

#[tokio::test]
async fn test_qualify_lead() {
    let (_, app) = seeded();
    let (status, json) = call(app, "POST", "/api/leads/2/qualify", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["lead_score"], 10);
    assert_eq!(json["lead_status"], "pronto_para_comprar");
}

#[tokio::test]
async fn test_lead_messages_ascending() {
    let (_, app) = seeded();
    let (status, json) = call(app, "GET", "/api/leads/2/messages", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&json), vec!["10", "11"]);
    assert_eq!(json[0]["customer_text"], "tem vinho?");
}

#[tokio::test]
async fn test_recent_conversations_newest_first() {
    let (_, app) = seeded();
    let (_, json) = call(app, "GET", "/api/conversations/recent", None).await;
    assert_eq!(ids(&json), vec!["11", "10"]);
}

#[tokio::test]
async fn test_campaign_lists() {
    let (_, app) = seeded();
    let (_, all) = call(app.clone(), "GET", "/api/campaigns", None).await;
    assert_eq!(ids(&all), vec!["c1", "c2"]);
    assert_eq!(all[0]["active"], true);
    assert_eq!(all[1]["active"], false);
    assert_eq!(all[1]["segmento"], json!({}));

    let (_, active) = call(app, "GET", "/api/campaigns/active", None).await;
    assert_eq!(ids(&active), vec!["c1"]);
}

#[tokio::test]
async fn test_create_campaign() {
    let (store, app) = seeded();
    let draft = json!({
        "name": "Kit Churrasco",
        "products": "Picanha, Linguiça",
        "offer": "R$ 399",
        "startsAt": "2025-03-01T00:00",
        "endsAt": "2025-03-08T00:00",
        "segment": "{\"lead_score\": \">7\"}"
    });
    let (status, json) = call(app, "POST", "/api/campaigns", Some(draft)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["nome"], "Kit Churrasco");
    assert_eq!(json["produtos"], json!(["Picanha", "Linguiça"]));
    assert_eq!(store.rows(CAMPAIGNS_TABLE).len(), 3);
}

#[tokio::test]
async fn test_create_campaign_invalid_segment_never_hits_store() {
    let (store, app) = seeded();
    let draft = json!({
        "name": "X", "products": "a", "offer": "b",
        "startsAt": "2025-03-01T00:00", "endsAt": "2025-03-08T00:00",
        "segment": "{not json"
    });
    let (status, json) = call(app, "POST", "/api/campaigns", Some(draft)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["field"], "segment");
    assert_eq!(store.rows(CAMPAIGNS_TABLE).len(), 2);
}

#[tokio::test]
async fn test_campaign_audience() {
    let (_, app) = seeded();
    let (status, json) = call(app.clone(), "GET", "/api/campaigns/c1/audience", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&json), vec!["1"]);

    let (status, _) = call(app, "GET", "/api/campaigns/nope/audience", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
