//! API route handlers for the gateway.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use dialcast_core::error::DialError;
use dialcast_core::types::{AuthDescriptor, Campaign, CampaignState};
use dialcast_engine::StatePatch;

use super::server::AppState;

/// `DialError` wrapper so handlers can use `?`.
pub struct ApiError(DialError);

impl From<DialError> for ApiError {
    fn from(e: DialError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = error_status(&self.0);
        let body = Json(serde_json::json!({"ok": false, "error": self.0.to_string()}));
        (status, body).into_response()
    }
}

fn error_status(e: &DialError) -> StatusCode {
    match e {
        DialError::NotFound(_) => StatusCode::NOT_FOUND,
        DialError::DuplicateProject(_) => StatusCode::CONFLICT,
        DialError::InvalidState(_) | DialError::InvalidTransition(_) => StatusCode::CONFLICT,
        DialError::Config(_) => StatusCode::BAD_REQUEST,
        DialError::AuthExpired
        | DialError::AgentUnavailable(_)
        | DialError::Platform(_)
        | DialError::Crm(_) => StatusCode::BAD_GATEWAY,
        DialError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Reject states that belong to the scheduler (`calling`, `waiting`, ...).
fn validate_operator_state(state: CampaignState) -> Result<(), DialError> {
    if state.operator_settable() {
        Ok(())
    } else {
        Err(DialError::InvalidTransition(format!(
            "state {state} is scheduler-internal and cannot be set by an operator"
        )))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignRequest {
    pub project_id: String,
    pub call_flow_id: String,
    pub auth: AuthDescriptor,
    /// Initial state; defaults to `start`.
    #[serde(default)]
    pub state: Option<CampaignState>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCampaignRequest {
    pub call_flow_id: String,
    pub auth: AuthDescriptor,
}

#[derive(Deserialize)]
pub struct SetStateRequest {
    pub state: CampaignState,
}

#[derive(Deserialize)]
pub struct AutoRestartRequest {
    pub enabled: bool,
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "dialcast-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "ticking": state.guards.is_ticking(),
    }))
}

pub async fn list_campaigns(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let views = state.registry.views().await;
    Json(serde_json::json!({"ok": true, "campaigns": views}))
}

pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateCampaignRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let _guard = state.guards.begin_mutation().await;

    let initial = body.state.unwrap_or(CampaignState::Start);
    validate_operator_state(initial)?;
    if body.project_id.is_empty() || body.call_flow_id.is_empty() {
        return Err(DialError::Config("projectId and callFlowId are required".into()).into());
    }

    let campaign = Campaign::new(body.project_id, body.call_flow_id, body.auth, initial);
    let view = campaign.view();
    state.registry.add(campaign).await?;
    Ok(Json(serde_json::json!({"ok": true, "campaign": view})))
}

pub async fn update_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateCampaignRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let _guard = state.guards.begin_mutation().await;
    let updated = state.registry.update_meta(&id, body.call_flow_id, body.auth).await?;
    Ok(Json(serde_json::json!({"ok": true, "campaign": updated.view()})))
}

/// Operator state change. Pausing a campaign mid-call also drops the call on
/// the platform so the contact isn't left ringing.
pub async fn set_campaign_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<SetStateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let _guard = state.guards.begin_mutation().await;
    validate_operator_state(body.state)?;

    let campaign = state.registry.get(&id).await?;

    if body.state == CampaignState::Pause {
        if let Some(handle) = &campaign.active_call {
            // Best-effort: the watchdog covers us if the drop fails.
            match state.telephony.issue_token(&campaign.auth).await {
                Ok(token) => {
                    if let Err(e) = state
                        .telephony
                        .hangup(&token, &handle.device, handle.participant_id)
                        .await
                    {
                        tracing::warn!(project = %id, "hangup on pause failed: {e}");
                    }
                }
                Err(e) => tracing::warn!(project = %id, "token for pause hangup failed: {e}"),
            }
        }
        let updated = state
            .registry
            .transition(&id, CampaignState::Pause, StatePatch::none().clear_call_state())
            .await?;
        return Ok(Json(serde_json::json!({"ok": true, "campaign": updated.view()})));
    }

    // Resuming (or restarting) clears any stale error.
    let updated = state
        .registry
        .transition(&id, body.state, StatePatch::none().clear_error())
        .await?;
    Ok(Json(serde_json::json!({"ok": true, "campaign": updated.view()})))
}

pub async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let _guard = state.guards.begin_mutation().await;
    state.registry.remove(&id).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}

pub async fn get_auto_restart(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true, "enabled": state.auto_restart.load(Ordering::SeqCst)}))
}

pub async fn set_auto_restart(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AutoRestartRequest>,
) -> Json<serde_json::Value> {
    state.auto_restart.store(body.enabled, Ordering::SeqCst);
    tracing::info!(enabled = body.enabled, "auto-restart policy changed");
    Json(serde_json::json!({"ok": true, "enabled": body.enabled}))
}
