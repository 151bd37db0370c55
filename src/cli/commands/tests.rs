use super::load_seed;
use super::subcommands::{ChatCommand, campaign_line, lead_line, message_lines, unseen_lines};
use crate::overlay::merge;
use crate::models::{Campaign, LEADS_TABLE, Lead, MESSAGES_TABLE, Message, MessageKind};
use crate::store::MemoryStore;
use chrono::{TimeZone, Utc};
use std::collections::HashSet;
use serde_json::json;

#[test]
fn test_chat_command_parse() {
    assert_eq!(ChatCommand::parse("   "), ChatCommand::Empty);
    assert_eq!(ChatCommand::parse("/quit"), ChatCommand::Quit);
    assert_eq!(ChatCommand::parse("/manual"), ChatCommand::ToggleManual);
    assert_eq!(ChatCommand::parse("/reprocess"), ChatCommand::Reprocess(None));
    assert_eq!(
        ChatCommand::parse("/reprocess  tem picanha? "),
        ChatCommand::Reprocess(Some("tem picanha?".to_string()))
    );
    assert_eq!(
        ChatCommand::parse("/reprocessed"),
        ChatCommand::Send("/reprocessed".to_string())
    );
    assert_eq!(
        ChatCommand::parse(" olá "),
        ChatCommand::Send("olá".to_string())
    );
}

#[test]
fn test_lead_line_shows_tier_and_status() {
    let lead: Lead = serde_json::from_value(json!({
        "id": 7, "nome": "Maria", "telefone": "5511999990000",
        "lead_score": 8, "lead_status": "pronto_para_comprar"
    }))
    .unwrap();
    let line = lead_line(&lead);
    assert!(line.starts_with("7 "));
    assert!(line.contains("Maria"));
    assert!(line.contains("hot"));
    assert!(line.ends_with("pronto_para_comprar"));
}

#[test]
fn test_campaign_line_marks_active() {
    let campaign: Campaign = serde_json::from_value(json!({
        "id": "c1", "nome": "Kit Churrasco", "produtos": ["Picanha", "Linguiça"],
        "oferta": "R$ 399",
        "data_inicio": "2025-03-01T00:00:00Z", "data_fim": "2025-03-08T00:00:00Z"
    }))
    .unwrap();
    let during = Utc.with_ymd_and_hms(2025, 3, 4, 0, 0, 0).unwrap();
    let after = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
    let line = campaign_line(&campaign, during);
    assert!(line.contains(" active"));
    assert!(line.ends_with("Picanha, Linguiça"));
    assert!(!campaign_line(&campaign, after).contains(" active"));
}

fn message(id: &str, customer: &str, bot: Option<&str>) -> Message {
    Message {
        id: id.to_string(),
        lead_id: "1".to_string(),
        customer_text: customer.to_string(),
        bot_text: bot.map(str::to_string),
        kind: MessageKind::Text,
        responded_by: None,
        special_action: None,
        timestamp: Utc::now(),
    }
}

#[test]
fn test_message_lines_both_sides() {
    let lines = message_lines(&message("1", "oi", Some("Olá! Como posso ajudar?")));
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("customer: oi"));
    assert!(lines[1].ends_with("bot: Olá! Como posso ajudar?"));
}

#[test]
fn test_message_lines_pending_operator_reply() {
    let mut reply = message("tmp-abc-bot", "", Some("já envio"));
    reply.responded_by = Some("Operador".to_string());
    let lines = message_lines(&reply);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("Operador: já envio (sending)"));
}

#[test]
fn test_unseen_lines_include_rows_sorted_before_shown_ones() {
    let base = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
    let mut first = message("1", "oi", None);
    first.timestamp = base;
    let mut pending = message("tmp-abc-user", "quero 2kg", None);
    pending.timestamp = base + chrono::Duration::seconds(10);
    let mut late = message("2", "tem picanha?", None);
    late.timestamp = base + chrono::Duration::seconds(5);

    let mut printed = HashSet::new();
    let shown = unseen_lines(&merge(&[first.clone()], &[pending.clone()]), &mut printed);
    assert_eq!(shown.len(), 2);

    let view = merge(&[first, late], &[pending]);
    assert_eq!(view[1].id, "2");
    let shown = unseen_lines(&view, &mut printed);
    assert_eq!(shown.len(), 1);
    assert!(shown[0].ends_with("customer: tem picanha?"));
    assert!(unseen_lines(&view, &mut printed).is_empty());
}

#[test]
fn test_load_seed_fills_tables() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seed.json");
    std::fs::write(
        &path,
        json!({
            LEADS_TABLE: [{"id": 1, "nome": "Ana", "telefone": "1", "lead_status": "novo"}],
            MESSAGES_TABLE: [{"id": 1, "cliente_id": 1}, {"id": 2, "cliente_id": 1}]
        })
        .to_string(),
    )
    .unwrap();

    let store = MemoryStore::new();
    assert_eq!(load_seed(&store, &path).unwrap(), 3);
    assert_eq!(store.rows(LEADS_TABLE).len(), 1);
    assert_eq!(store.rows(MESSAGES_TABLE).len(), 2);
}

#[test]
fn test_load_seed_rejects_bad_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seed.json");
    std::fs::write(&path, "[1, 2]").unwrap();
    let err = load_seed(&MemoryStore::new(), &path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse seed file"));
}
