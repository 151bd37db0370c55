use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::broadcast;

use crate::models::{MESSAGE_LEAD_COLUMN, MESSAGES_TABLE, scalar_string};

const DEFAULT_FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// A row change reported by the database webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    /// Owning lead of the changed message row, when the row carries one.
    pub lead_id: Option<String>,
}

#[derive(Deserialize)]
struct RawChange {
    #[serde(rename = "type")]
    kind: String,
    table: String,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
}

impl ChangeEvent {
    pub fn messages(kind: ChangeKind, lead_id: &str) -> Self {
        Self {
            table: MESSAGES_TABLE.to_string(),
            kind,
            lead_id: Some(lead_id.to_string()),
        }
    }

    /// Decode a `{type, table, record, old_record}` payload. Deletes only
    /// carry `old_record`, so the lead id falls back to it.
    pub fn parse(payload: &[u8]) -> anyhow::Result<Self> {
        let raw: RawChange = serde_json::from_slice(payload)?;
        let kind = ChangeKind::parse(&raw.kind)
            .ok_or_else(|| anyhow::anyhow!("unknown change type: {}", raw.kind))?;
        if raw.table.trim().is_empty() {
            anyhow::bail!("change payload has an empty table name");
        }
        let lead_id = [raw.record.as_ref(), raw.old_record.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|row| row.get(MESSAGE_LEAD_COLUMN).and_then(scalar_string));
        Ok(Self {
            table: raw.table,
            kind,
            lead_id,
        })
    }

    /// Re-encode as a payload [`ChangeEvent::parse`] accepts. Only the lead
    /// column of the changed row survives.
    pub fn to_payload(&self) -> Value {
        let record = self.lead_id.as_ref().map_or(Value::Null, |lead_id| {
            let mut row = Map::new();
            row.insert(MESSAGE_LEAD_COLUMN.to_string(), Value::String(lead_id.clone()));
            Value::Object(row)
        });
        json!({
            "type": self.kind.as_str(),
            "table": self.table,
            "record": record
        })
    }

    pub fn is_messages(&self) -> bool {
        self.table == MESSAGES_TABLE
    }

    pub fn concerns_lead(&self, lead_id: &str) -> bool {
        self.is_messages() && self.lead_id.as_deref() == Some(lead_id)
    }
}

/// Fan-out of change events to every active synchronizer and cache.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns how many subscribers received the event.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
