//! Lead reads, writes and list predicates.

use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::errors::{LeaddeskError, LeaddeskResult};
use crate::models::{LEADS_TABLE, Lead, LeadStatus, MAX_LEAD_SCORE};
use crate::store::{DataStore, Direction, Query};

/// All leads, most recently updated first. Read failures degrade to empty.
pub async fn list_leads(store: &dyn DataStore) -> Vec<Lead> {
    let query = Query::table(LEADS_TABLE).order("updated_at", Direction::Desc);
    match store.select(&query).await {
        Ok(rows) => Lead::from_rows(rows),
        Err(e) => {
            error!("failed to load leads: {}", e);
            Vec::new()
        }
    }
}

/// Leads scoring at least `min_score`, highest first. Read failures degrade to empty.
pub async fn leads_by_min_score(store: &dyn DataStore, min_score: u8) -> Vec<Lead> {
    let query = Query::table(LEADS_TABLE)
        .gte("lead_score", min_score)
        .order("lead_score", Direction::Desc);
    match store.select(&query).await {
        Ok(rows) => Lead::from_rows(rows),
        Err(e) => {
            error!("failed to load leads with score >= {}: {}", min_score, e);
            Vec::new()
        }
    }
}

/// The lead with `id`, if any. Failures propagate.
pub async fn find_lead(store: &dyn DataStore, id: &str) -> LeaddeskResult<Option<Lead>> {
    let rows = store
        .select(&Query::table(LEADS_TABLE).eq("id", id).limit(1))
        .await?;
    Ok(Lead::from_rows(rows).into_iter().next())
}

/// Partial lead update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LeadUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub score: Option<i64>,
    pub status: Option<LeadStatus>,
    pub declared_interest: Option<String>,
    pub purchase_frequency: Option<String>,
    pub potential_value: Option<f64>,
}

impl LeadUpdate {
    /// Column patch for the store, `updated_at` stamped to now.
    pub fn to_patch(&self) -> LeaddeskResult<Value> {
        let mut patch = Map::new();
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(LeaddeskError::validation("name", "must not be empty"));
            }
            patch.insert("nome".into(), Value::from(name.trim()));
        }
        if let Some(phone) = &self.phone {
            patch.insert("telefone".into(), Value::from(phone.trim()));
        }
        if let Some(address) = &self.address {
            patch.insert("endereco".into(), Value::from(address.as_str()));
        }
        if let Some(score) = self.score {
            if !(0..=i64::from(MAX_LEAD_SCORE)).contains(&score) {
                return Err(LeaddeskError::validation(
                    "score",
                    format!("must be between 0 and {} (got {})", MAX_LEAD_SCORE, score),
                ));
            }
            patch.insert("lead_score".into(), Value::from(score));
        }
        if let Some(status) = self.status {
            patch.insert("lead_status".into(), Value::from(status.as_str()));
        }
        if let Some(interest) = &self.declared_interest {
            patch.insert("interesse_declarado".into(), Value::from(interest.as_str()));
        }
        if let Some(frequency) = &self.purchase_frequency {
            patch.insert("frequencia_compra".into(), Value::from(frequency.as_str()));
        }
        if let Some(value) = self.potential_value {
            if !value.is_finite() || value < 0.0 {
                return Err(LeaddeskError::validation(
                    "potentialValue",
                    "must be a non-negative number",
                ));
            }
            patch.insert("valor_potencial".into(), Value::from(value));
        }
        patch.insert("updated_at".into(), Value::from(Utc::now().to_rfc3339()));
        Ok(Value::Object(patch))
    }
}

/// Apply `update` to lead `id` and return the stored row. Failures propagate.
pub async fn update_lead(
    store: &dyn DataStore,
    id: &str,
    update: &LeadUpdate,
) -> LeaddeskResult<Lead> {
    let patch = update.to_patch()?;
    debug!("updating lead {}", id);
    let row = store.update(LEADS_TABLE, id, patch).await?;
    serde_json::from_value(row).map_err(|e| LeaddeskError::Store {
        message: format!("updated lead {} is malformed: {}", id, e),
        retryable: false,
    })
}

/// Mark a lead as hot: top score and ready to buy.
pub async fn qualify_as_hot(store: &dyn DataStore, id: &str) -> LeaddeskResult<Lead> {
    let update = LeadUpdate {
        score: Some(i64::from(MAX_LEAD_SCORE)),
        status: Some(LeadStatus::ReadyToBuy),
        ..LeadUpdate::default()
    };
    update_lead(store, id, &update).await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    /// 7 and above
    High,
    /// 4 to 6
    Medium,
    /// below 4
    Low,
}

impl ScoreBand {
    /// Parse a list filter value. `all` (or empty) means no band.
    pub fn parse(value: &str) -> LeaddeskResult<Option<Self>> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(None),
            "high" => Ok(Some(Self::High)),
            "medium" => Ok(Some(Self::Medium)),
            "low" => Ok(Some(Self::Low)),
            other => Err(LeaddeskError::validation(
                "score",
                format!("expected high, medium, low or all (got {})", other),
            )),
        }
    }

    pub fn contains(self, score: u8) -> bool {
        match self {
            Self::High => score >= 7,
            Self::Medium => (4..7).contains(&score),
            Self::Low => score < 4,
        }
    }
}

/// Display tier for a lead score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreTier {
    Hot,
    Warm,
    Cold,
    Frozen,
}

impl ScoreTier {
    pub fn of(score: u8) -> Self {
        match score {
            8.. => Self::Hot,
            5..=7 => Self::Warm,
            3..=4 => Self::Cold,
            _ => Self::Frozen,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
            Self::Frozen => "frozen",
        }
    }
}

/// List predicates combined with AND.
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    /// Case-insensitive name substring, or phone substring.
    pub search: Option<String>,
    pub status: Option<LeadStatus>,
    pub band: Option<ScoreBand>,
    /// Keep only leads with a message in the recent window.
    pub with_conversations: bool,
}

impl LeadFilter {
    /// Build a filter from raw list parameters. Empty or `all` status and
    /// band mean no restriction; anything unrecognized is a field error.
    pub fn from_params(
        status: Option<&str>,
        band: Option<&str>,
        search: Option<String>,
    ) -> LeaddeskResult<Self> {
        let status = match status.map(str::trim) {
            None | Some("" | "all") => None,
            Some(raw) => Some(LeadStatus::parse(raw).ok_or_else(|| {
                LeaddeskError::validation("status", format!("unknown lead status: {}", raw))
            })?),
        };
        let band = match band {
            Some(raw) => ScoreBand::parse(raw)?,
            None => None,
        };
        Ok(Self {
            search,
            status,
            band,
            with_conversations: false,
        })
    }

    pub fn matches(&self, lead: &Lead, recent_lead_ids: &HashSet<String>) -> bool {
        if let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let in_name = lead.name.to_lowercase().contains(&term.to_lowercase());
            if !in_name && !lead.phone.contains(term) {
                return false;
            }
        }
        if self.status.is_some_and(|s| s != lead.status) {
            return false;
        }
        if self.band.is_some_and(|b| !b.contains(lead.score)) {
            return false;
        }
        !self.with_conversations || recent_lead_ids.contains(&lead.id)
    }

    pub fn apply(&self, leads: Vec<Lead>, recent_lead_ids: &HashSet<String>) -> Vec<Lead> {
        leads
            .into_iter()
            .filter(|lead| self.matches(lead, recent_lead_ids))
            .collect()
    }
}
