//! Dashboard JSON API over leads, conversations and campaigns.

use std::collections::HashSet;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};

use super::GatewayState;
use crate::campaigns::{self, CampaignDraft};
use crate::errors::LeaddeskError;
use crate::leads::{self, LeadFilter, LeadUpdate, ScoreTier};
use crate::models::{Campaign, Lead};
use crate::sync::fetch_conversation;

/// Maps typed errors onto HTTP statuses: field errors to 422, store and
/// webhook failures to 502, the rest to 500.
pub struct ApiError(LeaddeskError);

impl From<LeaddeskError> for ApiError {
    fn from(e: LeaddeskError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self.0 {
            LeaddeskError::Validation { field, .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"error": self.0.to_string(), "field": field})),
            )
                .into_response(),
            LeaddeskError::Store { .. } | LeaddeskError::Webhook { .. } => {
                error!("dashboard API upstream failure: {}", self.0);
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({"error": self.0.alert_message()})),
                )
                    .into_response()
            }
            LeaddeskError::Config(_) | LeaddeskError::Internal(_) => {
                error!("dashboard API failure: {}", self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": self.0.to_string()})),
                )
                    .into_response()
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn not_found(what: &str, id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": format!("{} {} not found", what, id)})),
    )
        .into_response()
}

/// A lead with its display tier.
#[derive(Debug, Serialize)]
pub struct LeadView {
    #[serde(flatten)]
    pub lead: Lead,
    pub tier: ScoreTier,
}

impl From<Lead> for LeadView {
    fn from(lead: Lead) -> Self {
        let tier = ScoreTier::of(lead.score);
        Self { lead, tier }
    }
}

/// A campaign with its current active flag.
#[derive(Debug, Serialize)]
pub struct CampaignView {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub active: bool,
}

impl From<Campaign> for CampaignView {
    fn from(campaign: Campaign) -> Self {
        let active = campaign.is_active();
        Self { campaign, active }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LeadListParams {
    pub status: Option<String>,
    pub score: Option<String>,
    pub q: Option<String>,
    #[serde(rename = "withConversations")]
    pub with_conversations: Option<bool>,
}

impl LeadListParams {
    fn to_filter(&self) -> Result<LeadFilter, LeaddeskError> {
        let mut filter = LeadFilter::from_params(
            self.status.as_deref(),
            self.score.as_deref(),
            self.q.clone(),
        )?;
        filter.with_conversations = self.with_conversations.unwrap_or(false);
        Ok(filter)
    }
}

/// GET /api/leads
pub(crate) async fn list_leads_handler(
    State(state): State<GatewayState>,
    Query(params): Query<LeadListParams>,
) -> ApiResult<Json<Vec<LeadView>>> {
    let filter = params.to_filter()?;
    let leads = leads::list_leads(state.store.as_ref()).await;
    let recent: HashSet<String> = if filter.with_conversations {
        state.recent.lead_ids().await
    } else {
        HashSet::new()
    };
    Ok(Json(
        filter
            .apply(leads, &recent)
            .into_iter()
            .map(LeadView::from)
            .collect(),
    ))
}

/// PATCH /api/leads/{id}
pub(crate) async fn update_lead_handler(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(update): Json<LeadUpdate>,
) -> ApiResult<Json<LeadView>> {
    let lead = leads::update_lead(state.store.as_ref(), &id, &update).await?;
    Ok(Json(lead.into()))
}

/// POST /api/leads/{id}/qualify
pub(crate) async fn qualify_lead_handler(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<LeadView>> {
    let lead = leads::qualify_as_hot(state.store.as_ref(), &id).await?;
    Ok(Json(lead.into()))
}

/// GET /api/leads/{id}/messages
pub(crate) async fn lead_messages_handler(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    Json(fetch_conversation(state.store.as_ref(), &id).await)
}

/// GET /api/conversations/recent
pub(crate) async fn recent_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(state.recent.get().await)
}

/// GET /api/campaigns
pub(crate) async fn list_campaigns_handler(
    State(state): State<GatewayState>,
) -> Json<Vec<CampaignView>> {
    let campaigns = campaigns::list_campaigns(state.store.as_ref()).await;
    Json(campaigns.into_iter().map(CampaignView::from).collect())
}

/// GET /api/campaigns/active
pub(crate) async fn active_campaigns_handler(
    State(state): State<GatewayState>,
) -> Json<Vec<CampaignView>> {
    let campaigns = campaigns::active_campaigns(state.store.as_ref(), Utc::now()).await;
    Json(campaigns.into_iter().map(CampaignView::from).collect())
}

/// POST /api/campaigns: validate the draft, then insert it.
pub(crate) async fn create_campaign_handler(
    State(state): State<GatewayState>,
    Json(draft): Json<CampaignDraft>,
) -> ApiResult<Response> {
    let new = draft.validate().inspect_err(|e| {
        warn!("campaign draft rejected: {}", e);
    })?;
    let created = campaigns::create_campaign(state.store.as_ref(), &new).await?;
    Ok((StatusCode::CREATED, Json(CampaignView::from(created))).into_response())
}

/// GET /api/campaigns/{id}/audience
pub(crate) async fn audience_handler(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let Some(campaign) = campaigns::find_campaign(state.store.as_ref(), &id).await? else {
        return Ok(not_found("campaign", &id));
    };
    let leads = leads::list_leads(state.store.as_ref()).await;
    let audience: Vec<LeadView> = campaign
        .audience(&leads)
        .into_iter()
        .map(LeadView::from)
        .collect();
    Ok(Json(audience).into_response())
}

#[cfg(test)]
mod tests;
