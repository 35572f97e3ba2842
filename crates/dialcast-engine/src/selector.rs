//! Per-campaign dial attempt.
//!
//! Invoked once per tick for each campaign in `active`. Picks the next
//! contact (fresh list first, then the retry list), gates on the assigned
//! agent being in the "Available" profile, places the call, and moves the
//! campaign to `waiting` with a correlation handle.
//!
//! An unavailable agent is not a failure: the campaign is tagged
//! `error_not_available` and auto-clears next tick, outside the
//! auto-restart policy.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use dialcast_core::error::DialError;
use dialcast_core::traits::{CrmAdapter, TelephonyAdapter};
use dialcast_core::types::{
    ActiveCallHandle, Campaign, CampaignState, Contact, CorrelationEntry, PendingCall,
};

use crate::registry::{CampaignRegistry, StatePatch};

/// The only agent profile a dial may proceed under. Exact match; every
/// other profile is a soft skip.
const AVAILABLE_PROFILE: &str = "Available";

/// CRM list states: 0 = fresh, 2 = attempted once.
const FRESH_LIST: u8 = 0;
const RETRY_LIST: u8 = 2;

pub struct OutboundSelector {
    registry: Arc<CampaignRegistry>,
    telephony: Arc<dyn TelephonyAdapter>,
    crm: Arc<dyn CrmAdapter>,
}

impl OutboundSelector {
    pub fn new(
        registry: Arc<CampaignRegistry>,
        telephony: Arc<dyn TelephonyAdapter>,
        crm: Arc<dyn CrmAdapter>,
    ) -> Self {
        Self { registry, telephony, crm }
    }

    /// Attempt one dial for an `active` campaign. Returns the correlation
    /// entry on success; `None` means no dial happened this tick (no
    /// candidates, soft skip, or failure — the campaign state already
    /// reflects which).
    pub async fn try_dial(&self, campaign: &Campaign) -> Option<CorrelationEntry> {
        debug_assert_eq!(campaign.state, CampaignState::Active);

        let contact = match self.next_candidate(campaign).await {
            Ok(Some(contact)) => contact,
            Ok(None) => {
                tracing::debug!(project = %campaign.project_id, "no dialable candidates");
                return None;
            }
            Err(e) => {
                self.fail(campaign, e).await;
                return None;
            }
        };

        match self.place(campaign, &contact).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                self.fail(campaign, e).await;
                None
            }
        }
    }

    /// Fresh list first; fall back to contacts already attempted once. At
    /// most one candidate per tick.
    async fn next_candidate(
        &self,
        campaign: &Campaign,
    ) -> dialcast_core::Result<Option<Contact>> {
        for list_state in [FRESH_LIST, RETRY_LIST] {
            let mut contacts = self
                .crm
                .next_contacts(&campaign.call_flow_id, &campaign.project_id, list_state, 1)
                .await?;
            if let Some(contact) = contacts.drain(..).next() {
                return Ok(Some(contact));
            }
        }
        Ok(None)
    }

    async fn place(
        &self,
        campaign: &Campaign,
        contact: &Contact,
    ) -> dialcast_core::Result<CorrelationEntry> {
        let token = self.telephony.issue_token(&campaign.auth).await?;
        let device = self.telephony.get_dialable_device(&token).await?;

        let status = self.telephony.get_agent_status(&token, &device).await?;
        if status != AVAILABLE_PROFILE {
            return Err(DialError::AgentUnavailable(status));
        }

        let placed = self.telephony.place_call(&token, &device, &contact.phone).await?;
        tracing::info!(
            project = %campaign.project_id,
            phone = %contact.phone,
            callid = placed.platform_call_id,
            "dial placed"
        );

        let correlation_id = Uuid::new_v4();
        self.registry
            .transition(
                &campaign.project_id,
                CampaignState::Waiting,
                StatePatch::none()
                    .clear_error()
                    .pending(PendingCall {
                        phone: contact.phone.clone(),
                        customer_id: contact.customer_id.clone(),
                    })
                    .active(ActiveCallHandle {
                        correlation_id,
                        platform_call_id: placed.platform_call_id,
                        participant_id: placed.participant_id,
                        device,
                    })
                    .dialed_at(Utc::now()),
            )
            .await?;

        Ok(CorrelationEntry {
            request_id: correlation_id,
            platform_call_id: placed.platform_call_id,
            phone: contact.phone.clone(),
            project_id: campaign.project_id.clone(),
            customer_id: contact.customer_id.clone(),
            call_flow_id: campaign.call_flow_id.clone(),
            token,
        })
    }

    /// Map a failure to the campaign state it halts in: soft skips go to
    /// `error_not_available`, everything else to `error`.
    async fn fail(&self, campaign: &Campaign, e: DialError) {
        let (state, log_as_error) = if e.is_soft() {
            (CampaignState::ErrorNotAvailable, false)
        } else {
            (CampaignState::Error, true)
        };
        if log_as_error {
            tracing::error!(project = %campaign.project_id, "dial failed: {e}");
        } else {
            tracing::warn!(project = %campaign.project_id, "dial skipped: {e}");
        }
        if let Err(te) = self
            .registry
            .transition(&campaign.project_id, state, StatePatch::none().error(e.to_string()))
            .await
        {
            tracing::warn!(project = %campaign.project_id, "failed to record dial failure: {te}");
        }
    }
}
