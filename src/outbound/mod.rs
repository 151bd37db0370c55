//! Outbound message actions posted to the message backend's webhook.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::config::{BackendConfig, WhatsAppConfig};
use crate::errors::{LeaddeskError, LeaddeskResult};
use crate::models::Lead;
use crate::utils::http::{DEFAULT_MAX_BODY_BYTES, content_type_or, default_http_client, read_capped};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundAction {
    /// Deliver a message on the customer's behalf through the bot pipeline.
    #[serde(rename = "enviar-mensagem")]
    SendMessage,
    /// Send the operator's text directly, bypassing the bot.
    #[serde(rename = "responder-manual")]
    ManualReply,
    /// Run the bot again over the lead's latest message.
    #[serde(rename = "reprocessar")]
    Reprocess,
}

/// Evolution API credentials forwarded so the backend can deliver on WhatsApp.
/// Unset values are omitted from the payload.
#[derive(Clone, Default, Serialize)]
pub struct EvolutionCredentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(rename = "nomeInstancia", skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(rename = "apikey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for EvolutionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvolutionCredentials")
            .field("server_url", &self.server_url)
            .field("instance", &self.instance)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl From<&WhatsAppConfig> for EvolutionCredentials {
    fn from(config: &WhatsAppConfig) -> Self {
        let non_empty = |s: &str| Some(s.trim().to_string()).filter(|s| !s.is_empty());
        Self {
            server_url: non_empty(&config.server_url),
            instance: non_empty(&config.instance),
            api_key: non_empty(&config.api_key),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WhatsAppEnvelope {
    pub evo: EvolutionCredentials,
}

/// Body posted to `{backend}/webhook`.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    #[serde(rename = "acao")]
    pub action: OutboundAction,
    #[serde(rename = "telefone")]
    pub phone: String,
    #[serde(rename = "telefoneCliente")]
    pub customer_phone: String,
    #[serde(rename = "clienteId", skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<String>,
    #[serde(rename = "nomeCliente", skip_serializing_if = "Option::is_none")]
    pub lead_name: Option<String>,
    #[serde(rename = "mensagem")]
    pub text: String,
    #[serde(rename = "dryRun")]
    pub dry_run: bool,
    pub whatsapp: WhatsAppEnvelope,
}

impl WebhookPayload {
    /// A send or manual reply addressed to `lead`.
    pub fn message(
        action: OutboundAction,
        lead: &Lead,
        text: &str,
        whatsapp: &WhatsAppConfig,
    ) -> Self {
        Self {
            action,
            phone: lead.phone.clone(),
            customer_phone: lead.phone.clone(),
            lead_id: Some(lead.id.clone()),
            lead_name: None,
            text: text.trim().to_string(),
            dry_run: whatsapp.dry_run,
            whatsapp: WhatsAppEnvelope {
                evo: EvolutionCredentials::from(whatsapp),
            },
        }
    }

    /// Reprocess requests identify the lead by name rather than id.
    pub fn reprocess(lead: &Lead, text: &str, whatsapp: &WhatsAppConfig) -> Self {
        Self {
            lead_id: None,
            lead_name: Some(lead.name.clone()),
            ..Self::message(OutboundAction::Reprocess, lead, text, whatsapp)
        }
    }
}

pub struct WebhookClient {
    http: Client,
    url: String,
}

impl WebhookClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: default_http_client(),
            url: url.into(),
        }
    }

    pub fn from_config(backend: &BackendConfig) -> Self {
        Self::new(backend.webhook_url())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Post `payload` and return the response body: parsed JSON, a string for
    /// non-JSON text, `Null` when empty. Non-2xx and transport failures become
    /// `Webhook` errors carrying the backend's detail.
    pub async fn dispatch(&self, payload: &WebhookPayload) -> LeaddeskResult<Value> {
        debug!("dispatching {:?} to {}", payload.action, self.url);
        let resp = self
            .http
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                error!("webhook unreachable: {}", e);
                LeaddeskError::Webhook {
                    status: None,
                    detail: e.to_string(),
                }
            })?;

        let status = resp.status();
        let content_type = content_type_or(&resp, "");
        let body = read_capped(resp, DEFAULT_MAX_BODY_BYTES)
            .await
            .map_err(|e| LeaddeskError::Webhook {
                status: Some(status.as_u16()),
                detail: format!("unreadable response: {}", e),
            })?;

        if !status.is_success() {
            let detail = failure_detail(&content_type, &body);
            error!("webhook failed: status={} detail={}", status.as_u16(), detail);
            return Err(LeaddeskError::Webhook {
                status: Some(status.as_u16()),
                detail,
            });
        }

        if body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned())))
    }
}

/// Human-readable reason from a failed webhook response: the JSON `detail`,
/// else `error`, else the whole JSON document; raw text otherwise.
pub fn failure_detail(content_type: &str, body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if !content_type.contains("application/json") {
        return text.trim().to_string();
    }
    let Ok(json) = serde_json::from_slice::<Value>(body) else {
        return text.trim().to_string();
    };
    if let Value::String(s) = json {
        return s;
    }
    ["detail", "error"]
        .iter()
        .filter_map(|key| json.get(*key))
        .find(|v| is_truthy(v))
        .map_or_else(|| json.to_string(), display_value)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
