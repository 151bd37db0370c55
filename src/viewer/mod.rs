//! Conversation viewer: the synchronizer, the overlay and the outbound
//! webhook bound to whichever lead is currently selected.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::WhatsAppConfig;
use crate::errors::{LeaddeskError, LeaddeskResult};
use crate::models::{Lead, Message};
use crate::outbound::{OutboundAction, WebhookClient, WebhookPayload};
use crate::overlay::{Direction, Overlay};
use crate::sync::{ConversationSync, ConversationWatch};

pub struct ConversationViewer {
    sync: ConversationSync,
    webhook: WebhookClient,
    whatsapp: WhatsAppConfig,
    lead: Option<Lead>,
    watch: Option<ConversationWatch>,
    overlay: Overlay,
    manual_mode: bool,
}

impl ConversationViewer {
    pub fn new(sync: ConversationSync, webhook: WebhookClient, whatsapp: WhatsAppConfig) -> Self {
        Self {
            sync,
            webhook,
            whatsapp,
            lead: None,
            watch: None,
            overlay: Overlay::new(),
            manual_mode: false,
        }
    }

    pub fn lead(&self) -> Option<&Lead> {
        self.lead.as_ref()
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn manual_mode(&self) -> bool {
        self.manual_mode
    }

    pub fn set_manual_mode(&mut self, enabled: bool) {
        self.manual_mode = enabled;
    }

    /// Show `lead`. Selecting the lead already shown only refreshes its
    /// record; any other lead tears down the previous watch and overlay.
    pub fn select_lead(&mut self, lead: Lead) {
        if self.lead.as_ref().is_some_and(|current| current.id == lead.id) {
            self.lead = Some(lead);
            return;
        }
        // Stop the old lead's refreshes before the new watch starts
        self.watch = None;
        self.overlay.select_lead(&lead.id);
        self.watch = Some(self.sync.watch(&lead.id));
        debug!("viewer switched to lead {}", lead.id);
        self.lead = Some(lead);
    }

    pub fn close(&mut self) {
        self.watch = None;
        self.overlay.clear_lead();
        self.lead = None;
    }

    /// Synchronized conversation merged with unconfirmed local entries.
    pub fn messages(&self) -> Vec<Message> {
        let confirmed = self
            .watch
            .as_ref()
            .map(ConversationWatch::messages)
            .unwrap_or_default();
        self.overlay.merged_with(&confirmed)
    }

    /// Wait until the synchronized conversation changes. Returns `false`
    /// when nothing is being watched.
    pub async fn changed(&mut self) -> bool {
        match self.watch.as_mut() {
            Some(watch) => watch.changed().await,
            None => false,
        }
    }

    /// Show `text` immediately and dispatch it. Blank input does nothing.
    ///
    /// Manual mode posts an operator reply; otherwise the text goes out as
    /// the customer's message. A failed dispatch leaves the local entry in
    /// place and returns the error for the caller to alert on.
    pub async fn send(&mut self, text: &str) -> LeaddeskResult<Option<Value>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let lead = self.selected()?.clone();
        let (direction, action) = if self.manual_mode {
            (Direction::Operator, OutboundAction::ManualReply)
        } else {
            (Direction::Customer, OutboundAction::SendMessage)
        };
        self.overlay.append_optimistic(direction, text, Utc::now());

        let payload = WebhookPayload::message(action, &lead, text, &self.whatsapp);
        match self.webhook.dispatch(&payload).await {
            Ok(body) => {
                if let Some(watch) = &self.watch {
                    watch.refresh();
                }
                Ok(Some(body))
            }
            Err(e) => {
                warn!("send to lead {} failed: {}", lead.id, e);
                Err(e)
            }
        }
    }

    /// Ask the backend to run the bot again for the selected lead.
    pub async fn reprocess(&self, text: &str) -> LeaddeskResult<Value> {
        let lead = self.selected()?;
        let payload = WebhookPayload::reprocess(lead, text, &self.whatsapp);
        self.webhook.dispatch(&payload).await
    }

    fn selected(&self) -> LeaddeskResult<&Lead> {
        self.lead
            .as_ref()
            .ok_or_else(|| LeaddeskError::validation("lead", "no lead selected"))
    }
}
