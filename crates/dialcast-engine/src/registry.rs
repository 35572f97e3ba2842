//! Authoritative in-memory campaign registry.
//!
//! The only shared mutable state in the system. Every mutation goes through
//! one of the atomic operations below; state changes specifically go through
//! [`CampaignRegistry::transition`] so they stay observable and orderable.
//! Snapshot reads clone the whole set under one lock acquisition — callers
//! never see a partial write.

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use dialcast_core::error::{DialError, Result};
use dialcast_core::types::{
    ActiveCallHandle, ActiveCallRecord, AuthDescriptor, Campaign, CampaignState, CampaignView,
    PendingCall,
};

/// Auxiliary fields merged atomically with a state change.
///
/// Nested options: outer `None` keeps the current value, `Some(None)` clears
/// it, `Some(Some(v))` sets it.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub error: Option<Option<String>>,
    pub pending_call: Option<Option<PendingCall>>,
    pub active_call: Option<Option<ActiveCallHandle>>,
    pub matched_call: Option<Option<ActiveCallRecord>>,
    pub last_dialed_at: Option<DateTime<Utc>>,
}

impl StatePatch {
    /// Keep everything; change state only.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(Some(message.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = Some(None);
        self
    }

    pub fn pending(mut self, call: PendingCall) -> Self {
        self.pending_call = Some(Some(call));
        self
    }

    pub fn active(mut self, handle: ActiveCallHandle) -> Self {
        self.active_call = Some(Some(handle));
        self
    }

    pub fn matched(mut self, record: ActiveCallRecord) -> Self {
        self.matched_call = Some(Some(record));
        self
    }

    pub fn dialed_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_dialed_at = Some(at);
        self
    }

    /// Drop every transient call field: matched record, handle, and (via the
    /// handle invariant) the pending contact.
    pub fn clear_call_state(mut self) -> Self {
        self.matched_call = Some(None);
        self.active_call = Some(None);
        self.pending_call = Some(None);
        self
    }
}

pub struct CampaignRegistry {
    campaigns: RwLock<Vec<Campaign>>,
}

impl CampaignRegistry {
    pub fn new() -> Self {
        Self { campaigns: RwLock::new(Vec::new()) }
    }

    /// Register a new campaign. Rejects duplicates.
    pub async fn add(&self, campaign: Campaign) -> Result<()> {
        let mut campaigns = self.campaigns.write().await;
        if campaigns.iter().any(|c| c.project_id == campaign.project_id) {
            return Err(DialError::DuplicateProject(campaign.project_id));
        }
        tracing::info!(
            project = %campaign.project_id,
            state = %campaign.state,
            "campaign registered"
        );
        campaigns.push(campaign);
        Ok(())
    }

    pub async fn get(&self, project_id: &str) -> Result<Campaign> {
        let campaigns = self.campaigns.read().await;
        campaigns
            .iter()
            .find(|c| c.project_id == project_id)
            .cloned()
            .ok_or_else(|| DialError::NotFound(project_id.to_string()))
    }

    /// Update campaign metadata. State and transient call fields are
    /// preserved; only the flow id and credentials change.
    pub async fn update_meta(
        &self,
        project_id: &str,
        call_flow_id: String,
        auth: AuthDescriptor,
    ) -> Result<Campaign> {
        let mut campaigns = self.campaigns.write().await;
        let campaign = campaigns
            .iter_mut()
            .find(|c| c.project_id == project_id)
            .ok_or_else(|| DialError::NotFound(project_id.to_string()))?;
        campaign.call_flow_id = call_flow_id;
        campaign.auth = auth;
        Ok(campaign.clone())
    }

    /// The only path that mutates campaign state: atomically set `state` and
    /// merge the patch.
    ///
    /// Invariant: clearing the active-call handle always clears the pending
    /// contact with it.
    pub async fn transition(
        &self,
        project_id: &str,
        state: CampaignState,
        patch: StatePatch,
    ) -> Result<Campaign> {
        let mut campaigns = self.campaigns.write().await;
        let campaign = campaigns
            .iter_mut()
            .find(|c| c.project_id == project_id)
            .ok_or_else(|| DialError::NotFound(project_id.to_string()))?;

        let old_state = campaign.state;
        let pending_specified = patch.pending_call.is_some();
        campaign.state = state;
        if let Some(error) = patch.error {
            campaign.last_error = error;
        }
        if let Some(pending) = patch.pending_call {
            campaign.pending_call = pending;
        }
        if let Some(active) = patch.active_call {
            if active.is_none() && !pending_specified {
                campaign.pending_call = None;
            }
            campaign.active_call = active;
        }
        if let Some(matched) = patch.matched_call {
            campaign.matched_call = matched;
        }
        if let Some(at) = patch.last_dialed_at {
            campaign.last_dialed_at = Some(at);
        }
        if old_state != state {
            tracing::debug!(project = %project_id, from = %old_state, to = %state, "transition");
        }
        Ok(campaign.clone())
    }

    /// Delete a campaign. Only allowed from `pause`.
    pub async fn remove(&self, project_id: &str) -> Result<()> {
        let mut campaigns = self.campaigns.write().await;
        let campaign = campaigns
            .iter()
            .find(|c| c.project_id == project_id)
            .ok_or_else(|| DialError::NotFound(project_id.to_string()))?;
        if campaign.state != CampaignState::Pause {
            return Err(DialError::InvalidState(format!(
                "project {project_id} is {}, only paused campaigns can be deleted",
                campaign.state
            )));
        }
        campaigns.retain(|c| c.project_id != project_id);
        tracing::info!(project = %project_id, "campaign deleted");
        Ok(())
    }

    /// Consistent point-in-time clone of all campaigns.
    pub async fn snapshot(&self) -> Vec<Campaign> {
        self.campaigns.read().await.clone()
    }

    /// Observer projection of all campaigns.
    pub async fn views(&self) -> Vec<CampaignView> {
        self.campaigns.read().await.iter().map(Campaign::view).collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.campaigns.read().await.is_empty()
    }

    /// Replace the whole set. Startup restore only.
    pub async fn restore(&self, campaigns: Vec<Campaign>) {
        let mut guard = self.campaigns.write().await;
        *guard = campaigns;
    }
}

impl Default for CampaignRegistry {
    fn default() -> Self {
        Self::new()
    }
}
