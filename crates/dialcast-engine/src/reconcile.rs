//! Per-tick reconciliation of campaigns against the platform snapshot.
//!
//! Two signals drive this pass: a campaign whose call is still listed in the
//! snapshot (a [`MatchResult`]) moves to `calling`; a campaign that *was*
//! matched on a previous tick but has no match now has an ended call, and
//! gets the ordered CRM write sequence before returning to `active`.

use std::sync::Arc;
use std::time::Duration;

use dialcast_core::traits::CrmAdapter;
use dialcast_core::types::{Campaign, CampaignState, MatchResult};

use crate::registry::{CampaignRegistry, StatePatch};

/// CRM outcome codes.
const STATUS_CONNECTED: u8 = 1;
const STATUS_NO_ANSWER: u8 = 2;

/// Visit outcome text for an answered call.
const VISIT_OUTCOME_CONNECTED: &str = "撥打成功";

pub struct ReconciliationEngine {
    registry: Arc<CampaignRegistry>,
    crm: Arc<dyn CrmAdapter>,
    /// Grace before the visit write, letting the CRM settle the status write
    /// it just received.
    visit_delay: Duration,
}

impl ReconciliationEngine {
    pub fn new(
        registry: Arc<CampaignRegistry>,
        crm: Arc<dyn CrmAdapter>,
        visit_delay_ms: u64,
    ) -> Self {
        Self { registry, crm, visit_delay: Duration::from_millis(visit_delay_ms) }
    }

    pub async fn reconcile(&self, matches: &[MatchResult]) {
        for campaign in self.registry.snapshot().await {
            // Operator pause and hard errors stick; the scheduler's dial pass
            // owns error recovery.
            if matches!(campaign.state, CampaignState::Pause | CampaignState::Error) {
                continue;
            }

            let matched = matches.iter().find(|m| m.project_id == campaign.project_id);
            match matched {
                Some(m) => {
                    if let Err(e) = self
                        .registry
                        .transition(
                            &campaign.project_id,
                            CampaignState::Calling,
                            StatePatch::none().matched(m.active_call.clone()),
                        )
                        .await
                    {
                        tracing::warn!(project = %campaign.project_id, "match update failed: {e}");
                    }
                }
                None if campaign.matched_call.is_some() => {
                    // Freshly re-dialed this tick; the new call has not hit a
                    // snapshot yet, so the stale match means nothing.
                    if campaign.state == CampaignState::Waiting {
                        continue;
                    }
                    self.finalize(&campaign).await;
                }
                None => {
                    // Never matched. Transitional states fall back to
                    // `active`; steady states are left alone.
                    if matches!(
                        campaign.state,
                        CampaignState::Start | CampaignState::Calling | CampaignState::Recording
                    ) {
                        if let Err(e) = self
                            .registry
                            .transition(
                                &campaign.project_id,
                                CampaignState::Active,
                                StatePatch::none(),
                            )
                            .await
                        {
                            tracing::warn!(project = %campaign.project_id, "reset failed: {e}");
                        }
                    }
                }
            }
        }
    }

    /// The call has left the platform. Write the outcome sequence, then
    /// release the campaign back to `active` (unless an operator paused it
    /// mid-write).
    async fn finalize(&self, campaign: &Campaign) {
        let Some(record) = &campaign.matched_call else { return };
        let Some(pending) = &campaign.pending_call else {
            tracing::warn!(
                project = %campaign.project_id,
                "ended call has no pending contact, dropping match"
            );
            let _ = self
                .registry
                .transition(
                    &campaign.project_id,
                    CampaignState::Active,
                    StatePatch::none().clear_call_state(),
                )
                .await;
            return;
        };

        let connected = record.is_talking();
        let outcome = if connected { STATUS_CONNECTED } else { STATUS_NO_ANSWER };
        let last_change = record.last_change_status.clone();

        tracing::info!(
            project = %campaign.project_id,
            customer = %pending.customer_id,
            connected,
            "call ended, recording outcome"
        );

        if let Err(e) = self
            .registry
            .transition(
                &campaign.project_id,
                CampaignState::Recording,
                StatePatch::none().clear_call_state(),
            )
            .await
        {
            tracing::warn!(project = %campaign.project_id, "recording transition failed: {e}");
            return;
        }

        // CRM writes are sequential and best-effort: a failed write is logged
        // and the sequence continues, so one flaky endpoint cannot wedge the
        // campaign.
        if let Err(e) = self
            .crm
            .write_call_status(&campaign.project_id, &pending.customer_id, outcome)
            .await
        {
            tracing::error!(project = %campaign.project_id, "callStatus write failed: {e}");
        }
        if let Err(e) =
            self.crm.mark_dial_executed(&campaign.project_id, &campaign.call_flow_id).await
        {
            tracing::error!(project = %campaign.project_id, "dial-executed write failed: {e}");
        }

        if connected {
            match last_change {
                Some(visited_at) => {
                    tokio::time::sleep(self.visit_delay).await;
                    if let Err(e) = self
                        .crm
                        .write_visit_record(
                            &campaign.project_id,
                            &pending.customer_id,
                            VISIT_OUTCOME_CONNECTED,
                            &visited_at,
                        )
                        .await
                    {
                        tracing::error!(project = %campaign.project_id, "visit write failed: {e}");
                    }
                }
                None => {
                    tracing::warn!(
                        project = %campaign.project_id,
                        "connected call carries no status timestamp, skipping visit record"
                    );
                }
            }
        } else if let Err(e) =
            self.crm.write_dial_retry_marker(&campaign.project_id, &pending.customer_id).await
        {
            tracing::error!(project = %campaign.project_id, "retry-marker write failed: {e}");
        }

        // An operator may have paused during the writes; honor that over the
        // release to `active`.
        match self.registry.get(&campaign.project_id).await {
            Ok(current) if current.state == CampaignState::Pause => {}
            Ok(_) => {
                if let Err(e) = self
                    .registry
                    .transition(&campaign.project_id, CampaignState::Active, StatePatch::none())
                    .await
                {
                    tracing::warn!(project = %campaign.project_id, "release failed: {e}");
                }
            }
            Err(_) => {}
        }
    }
}
