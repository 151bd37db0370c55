//! Campaign reads, creation and audience segmentation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::errors::{LeaddeskError, LeaddeskResult};
use crate::models::{CAMPAIGNS_TABLE, Campaign, Lead, LeadStatus, parse_timestamp};
use crate::store::{DataStore, Direction, Query};

impl Campaign {
    /// Active iff `starts_at <= now <= ends_at`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && now <= self.ends_at
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    /// Parsed segment rules keyed by the lead attribute they test.
    pub fn rules(&self) -> Vec<(SegmentField, SegmentRule)> {
        let Some(segment) = self.segment.as_object() else {
            return Vec::new();
        };
        segment
            .iter()
            .filter_map(|(key, value)| Some((SegmentField::from_key(key)?, SegmentRule::parse(value)?)))
            .collect()
    }

    /// Leads satisfying every recognized segment rule.
    pub fn audience(&self, leads: &[Lead]) -> Vec<Lead> {
        let rules = self.rules();
        leads
            .iter()
            .filter(|lead| rules.iter().all(|(field, rule)| field.matches(rule, lead)))
            .cloned()
            .collect()
    }
}

/// Newest campaigns first. Read failures degrade to empty.
pub async fn list_campaigns(store: &dyn DataStore) -> Vec<Campaign> {
    let query = Query::table(CAMPAIGNS_TABLE).order("created_at", Direction::Desc);
    match store.select(&query).await {
        Ok(rows) => Campaign::from_rows(rows),
        Err(e) => {
            error!("failed to load campaigns: {}", e);
            Vec::new()
        }
    }
}

/// Campaigns running at `now`, newest first. Read failures degrade to empty.
pub async fn active_campaigns(store: &dyn DataStore, now: DateTime<Utc>) -> Vec<Campaign> {
    let now = now.to_rfc3339();
    let query = Query::table(CAMPAIGNS_TABLE)
        .lte("data_inicio", &now)
        .gte("data_fim", &now)
        .order("created_at", Direction::Desc);
    match store.select(&query).await {
        Ok(rows) => Campaign::from_rows(rows),
        Err(e) => {
            error!("failed to load active campaigns: {}", e);
            Vec::new()
        }
    }
}

/// The campaign with `id`, if any. Failures propagate.
pub async fn find_campaign(store: &dyn DataStore, id: &str) -> LeaddeskResult<Option<Campaign>> {
    let rows = store
        .select(&Query::table(CAMPAIGNS_TABLE).eq("id", id).limit(1))
        .await?;
    Ok(Campaign::from_rows(rows).into_iter().next())
}

/// Campaign form input, every field as typed by the operator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CampaignDraft {
    pub name: String,
    /// Comma-separated product names.
    pub products: String,
    pub offer: String,
    pub starts_at: String,
    pub ends_at: String,
    /// JSON text; empty means no segmentation.
    pub segment: String,
}

/// A validated campaign ready to insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCampaign {
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "produtos")]
    pub products: Vec<String>,
    #[serde(rename = "oferta")]
    pub offer: String,
    #[serde(rename = "data_inicio")]
    pub starts_at: DateTime<Utc>,
    #[serde(rename = "data_fim")]
    pub ends_at: DateTime<Utc>,
    #[serde(rename = "segmento")]
    pub segment: Value,
}

impl CampaignDraft {
    pub fn validate(&self) -> LeaddeskResult<NewCampaign> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(LeaddeskError::validation("name", "is required"));
        }
        let products: Vec<String> = self
            .products
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        if products.is_empty() {
            return Err(LeaddeskError::validation(
                "products",
                "list at least one product",
            ));
        }
        let offer = self.offer.trim();
        if offer.is_empty() {
            return Err(LeaddeskError::validation("offer", "is required"));
        }
        let starts_at = parse_timestamp(&self.starts_at)
            .ok_or_else(|| LeaddeskError::validation("startsAt", "is not a valid date"))?;
        let ends_at = parse_timestamp(&self.ends_at)
            .ok_or_else(|| LeaddeskError::validation("endsAt", "is not a valid date"))?;
        if starts_at >= ends_at {
            return Err(LeaddeskError::validation(
                "endsAt",
                "must be after the start date",
            ));
        }
        let segment = if self.segment.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&self.segment)
                .map_err(|e| LeaddeskError::validation("segment", format!("invalid JSON: {}", e)))?
        };

        Ok(NewCampaign {
            name: name.to_string(),
            products,
            offer: offer.to_string(),
            starts_at,
            ends_at,
            segment,
        })
    }
}

/// Insert a validated campaign and return it as stored. Failures propagate.
pub async fn create_campaign(
    store: &dyn DataStore,
    campaign: &NewCampaign,
) -> LeaddeskResult<Campaign> {
    let mut row = serde_json::to_value(campaign).map_err(anyhow::Error::from)?;
    if let Some(fields) = row.as_object_mut() {
        fields.insert("created_at".into(), Value::from(Utc::now().to_rfc3339()));
    }
    let stored = store.insert(CAMPAIGNS_TABLE, row).await?;
    let created: Campaign = serde_json::from_value(stored).map_err(|e| LeaddeskError::Store {
        message: format!("created campaign is malformed: {}", e),
        retryable: false,
    })?;
    info!("created campaign {} ({})", created.name, created.id);
    Ok(created)
}

/// Lead attribute a segment key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentField {
    Score,
    Interest,
    Status,
}

impl SegmentField {
    /// Unknown keys are ignored.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "lead_score" => Some(Self::Score),
            "interesse" | "interesseProduto" | "interesse_declarado" => Some(Self::Interest),
            "lead_status" => Some(Self::Status),
            _ => None,
        }
    }

    fn matches(self, rule: &SegmentRule, lead: &Lead) -> bool {
        match self {
            Self::Score => rule.matches(&lead.score.to_string()),
            Self::Interest => lead
                .declared_interest
                .as_deref()
                .is_some_and(|interest| rule.matches(interest)),
            Self::Status => match rule {
                SegmentRule::Equals(expected) => {
                    LeadStatus::parse(expected) == Some(lead.status)
                }
                other => other.matches(lead.status.as_str()),
            },
        }
    }
}

/// One segment condition: `">n"`, `">=n"`, `"<n"`, `"<=n"`, `"contains x"`,
/// or a plain value compared for equality.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentRule {
    Gt(f64),
    Gte(f64),
    Lt(f64),
    Lte(f64),
    Contains(String),
    Equals(String),
}

impl SegmentRule {
    /// `None` for values that cannot express a condition (objects, arrays, null).
    pub fn parse(value: &Value) -> Option<Self> {
        let raw = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        // Two-character operators first so ">=" is not read as ">"
        let numeric: [(&str, fn(f64) -> Self); 4] = [
            (">=", Self::Gte),
            ("<=", Self::Lte),
            (">", Self::Gt),
            ("<", Self::Lt),
        ];
        for (prefix, build) in numeric {
            if let Some(rest) = raw.strip_prefix(prefix)
                && let Ok(n) = rest.trim().parse::<f64>()
            {
                return Some(build(n));
            }
        }
        if let Some(keyword) = raw.get(..9)
            && keyword.eq_ignore_ascii_case("contains ")
        {
            return Some(Self::Contains(raw[9..].trim().to_lowercase()));
        }
        Some(Self::Equals(raw))
    }

    pub fn matches(&self, actual: &str) -> bool {
        let number = || actual.trim().parse::<f64>().ok();
        match self {
            Self::Gt(n) => number().is_some_and(|v| v > *n),
            Self::Gte(n) => number().is_some_and(|v| v >= *n),
            Self::Lt(n) => number().is_some_and(|v| v < *n),
            Self::Lte(n) => number().is_some_and(|v| v <= *n),
            Self::Contains(needle) => actual.to_lowercase().contains(needle),
            Self::Equals(expected) => match (expected.parse::<f64>(), number()) {
                (Ok(a), Some(b)) => (a - b).abs() < f64::EPSILON,
                _ => expected.eq_ignore_ascii_case(actual.trim()),
            },
        }
    }
}
