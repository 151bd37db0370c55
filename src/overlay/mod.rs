//! Local Overlay Reconciler.
//!
//! Holds messages the operator sent but the store has not confirmed yet.
//! Entries are never matched against the confirmed rows, so an optimistic
//! entry and its stored copy can both appear until the overlay is reset.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Message, MessageKind};

pub const OPERATOR_ATTRIBUTION: &str = "Operador";
pub const MANUAL_MESSAGE_ACTION: &str = "mensagem_manual_dashboard";

/// Who an optimistic entry speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Text typed on behalf of the customer; shown on the customer side.
    Customer,
    /// Manual reply sent by the operator in place of the bot.
    Operator,
}

impl Direction {
    fn id_suffix(self) -> &'static str {
        match self {
            Self::Customer => "user",
            Self::Operator => "bot",
        }
    }
}

#[derive(Debug, Default)]
pub struct Overlay {
    lead_id: Option<String>,
    entries: Vec<Message>,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lead_id(&self) -> Option<&str> {
        self.lead_id.as_deref()
    }

    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Bind the overlay to `lead_id`, clearing it only when the lead changes.
    /// Returns whether a reset happened.
    pub fn select_lead(&mut self, lead_id: &str) -> bool {
        if self.lead_id.as_deref() == Some(lead_id) {
            return false;
        }
        self.lead_id = Some(lead_id.to_string());
        self.reset();
        true
    }

    /// Unbind from any lead and drop every entry.
    pub fn clear_lead(&mut self) {
        self.lead_id = None;
        self.reset();
    }

    /// Record an unconfirmed message and return a copy of the new entry.
    /// Temporary ids use a `tmp-` prefix the store never produces.
    pub fn append_optimistic(
        &mut self,
        direction: Direction,
        text: &str,
        timestamp: DateTime<Utc>,
    ) -> Message {
        let text = text.trim().to_string();
        let (customer_text, bot_text, responded_by, special_action) = match direction {
            Direction::Customer => (text, None, None, None),
            Direction::Operator => (
                String::new(),
                Some(text),
                Some(OPERATOR_ATTRIBUTION.to_string()),
                Some(MANUAL_MESSAGE_ACTION.to_string()),
            ),
        };
        let entry = Message {
            id: format!("tmp-{}-{}", Uuid::new_v4(), direction.id_suffix()),
            lead_id: self.lead_id.clone().unwrap_or_default(),
            customer_text,
            bot_text,
            kind: MessageKind::Text,
            responded_by,
            special_action,
            timestamp,
        };
        self.entries.push(entry.clone());
        entry
    }

    /// `merge(confirmed, self.entries())`.
    pub fn merged_with(&self, confirmed: &[Message]) -> Vec<Message> {
        merge(confirmed, &self.entries)
    }
}

/// Whether `id` was generated by [`Overlay::append_optimistic`].
pub fn is_temporary_id(id: &str) -> bool {
    id.starts_with("tmp-")
}

/// Concatenate confirmed and optimistic messages, then stable-sort by
/// timestamp. Equal timestamps keep confirmed rows first, each list in its
/// own order. No de-duplication.
pub fn merge(confirmed: &[Message], overlay: &[Message]) -> Vec<Message> {
    let mut merged: Vec<Message> = confirmed.iter().chain(overlay).cloned().collect();
    merged.sort_by_key(|m| m.timestamp);
    merged
}
