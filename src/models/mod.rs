//! Records shared by the store, the synchronizer and the dashboard API.
//!
//! Rows come from a store whose columns carry Portuguese names; serde renames
//! keep the Rust side in English while reading and writing the same columns.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

pub const LEADS_TABLE: &str = "clientes_delivery";
pub const MESSAGES_TABLE: &str = "temp_messages";
pub const CAMPAIGNS_TABLE: &str = "campanhas_marketing";

/// Column holding the owning lead on message rows.
pub const MESSAGE_LEAD_COLUMN: &str = "cliente_id";

pub const MAX_LEAD_SCORE: u8 = 10;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MessageKind {
    #[default]
    #[serde(rename = "texto")]
    Text,
    #[serde(rename = "audio")]
    Audio,
}

impl MessageKind {
    fn from_column(value: &str) -> Self {
        if value.eq_ignore_ascii_case("audio") {
            Self::Audio
        } else {
            Self::Text
        }
    }
}

/// One exchange in a lead's conversation: the customer's text and, when
/// present, the reply sent by the bot or an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub lead_id: String,
    pub customer_text: String,
    pub bot_text: Option<String>,
    pub kind: MessageKind,
    pub responded_by: Option<String>,
    pub special_action: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Decode a `temp_messages` row.
    ///
    /// Older rows use `mensagem`/`tipo`/`created_at` instead of the current
    /// columns, and ids may be numeric, so decoding is by hand rather than
    /// through a derive.
    pub fn from_row(row: &Value) -> Option<Self> {
        let id = scalar_string(row.get("id")?)?;
        let lead_id = row
            .get(MESSAGE_LEAD_COLUMN)
            .and_then(scalar_string)
            .unwrap_or_default();
        let customer_text = first_str(row, &["mensagem_cliente", "mensagem"])
            .unwrap_or_default()
            .to_string();
        let bot_text = first_str(row, &["resposta_bot"])
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let kind = first_str(row, &["tipo_mensagem", "tipo"])
            .map(MessageKind::from_column)
            .unwrap_or_default();
        let timestamp = first_str(row, &["timestamp", "created_at"])
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        Some(Self {
            id,
            lead_id,
            customer_text,
            bot_text,
            kind,
            responded_by: first_str(row, &["agente_responsavel"]).map(str::to_string),
            special_action: first_str(row, &["acao_especial"]).map(str::to_string),
            timestamp,
        })
    }

    /// Decode every row, dropping rows without an id.
    pub fn from_rows(rows: &[Value]) -> Vec<Self> {
        rows.iter()
            .filter_map(|row| {
                let decoded = Self::from_row(row);
                if decoded.is_none() {
                    warn!("skipping message row without id");
                }
                decoded
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Leads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeadStatus {
    #[serde(rename = "novo")]
    New,
    #[serde(rename = "interessado")]
    Interested,
    #[serde(rename = "pronto_para_comprar")]
    ReadyToBuy,
}

impl LeadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "novo",
            Self::Interested => "interessado",
            Self::ReadyToBuy => "pronto_para_comprar",
        }
    }

    /// Parse either the stored value or its English name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "novo" | "new" => Some(Self::New),
            "interessado" | "interested" => Some(Self::Interested),
            "pronto_para_comprar" | "ready_to_buy" | "ready-to-buy" => Some(Self::ReadyToBuy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(rename = "nome", default, deserialize_with = "de_null_string")]
    pub name: String,
    #[serde(rename = "telefone", default, deserialize_with = "de_null_string")]
    pub phone: String,
    #[serde(rename = "endereco", default)]
    pub address: Option<String>,
    #[serde(rename = "lead_score", default, deserialize_with = "de_score")]
    pub score: u8,
    #[serde(rename = "lead_status")]
    pub status: LeadStatus,
    #[serde(rename = "interesse_declarado", default)]
    pub declared_interest: Option<String>,
    #[serde(rename = "frequencia_compra", default)]
    pub purchase_frequency: Option<String>,
    #[serde(rename = "valor_potencial", default)]
    pub potential_value: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Lead {
    pub fn from_rows(rows: Vec<Value>) -> Vec<Self> {
        decode_rows(rows, "lead")
    }
}

// ---------------------------------------------------------------------------
// Campaigns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(rename = "nome", default, deserialize_with = "de_null_string")]
    pub name: String,
    #[serde(rename = "produtos", default, deserialize_with = "de_null_list")]
    pub products: Vec<String>,
    #[serde(rename = "oferta", default, deserialize_with = "de_null_string")]
    pub offer: String,
    #[serde(rename = "data_inicio", deserialize_with = "de_timestamp")]
    pub starts_at: DateTime<Utc>,
    #[serde(rename = "data_fim", deserialize_with = "de_timestamp")]
    pub ends_at: DateTime<Utc>,
    #[serde(rename = "segmento", default = "empty_object", deserialize_with = "de_segment")]
    pub segment: Value,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Campaign {
    pub fn from_rows(rows: Vec<Value>) -> Vec<Self> {
        decode_rows(rows, "campaign")
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

/// Parse an RFC 3339 timestamp, or a naive `YYYY-MM-DDTHH:MM[:SS[.f]]`
/// (what `timestamp without time zone` columns and form inputs produce) as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    let normalized = value.replacen(' ', "T", 1);
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
        .map(|naive| naive.and_utc())
}

pub(crate) fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_str<'a>(row: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| row.get(*key).and_then(Value::as_str))
}

fn decode_rows<T: serde::de::DeserializeOwned>(rows: Vec<Value>, what: &str) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("skipping undecodable {} row: {}", what, e);
                None
            }
        })
        .collect()
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn de_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value = Value::deserialize(d)?;
    scalar_string(&value).ok_or_else(|| serde::de::Error::custom("id must be a string or number"))
}

fn de_null_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

fn de_null_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(d)?.unwrap_or_default())
}

fn de_score<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    let score = Option::<f64>::deserialize(d)?.unwrap_or(0.0);
    Ok(score.round().clamp(0.0, f64::from(MAX_LEAD_SCORE)) as u8)
}

fn de_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(d)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
}

fn de_opt_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(Option::<String>::deserialize(d)?
        .as_deref()
        .and_then(parse_timestamp))
}

fn de_segment<'de, D: Deserializer<'de>>(d: D) -> Result<Value, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Null => empty_object(),
        other => other,
    })
}
