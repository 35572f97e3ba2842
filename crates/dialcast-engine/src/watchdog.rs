//! Stuck-campaign watchdog.
//!
//! A campaign in `waiting` whose dial was placed more than the threshold
//! ago (default 90s) is force-resolved: its contact gets a no-answer status
//! write and the campaign returns to `active`. Without this, a platform
//! that never reports completion would wedge the campaign forever.

use std::sync::Arc;

use chrono::Utc;

use dialcast_core::traits::CrmAdapter;
use dialcast_core::types::CampaignState;

use crate::registry::{CampaignRegistry, StatePatch};

/// Forced outcome for a timed-out call: 2 = not connected / no answer.
const NO_ANSWER_STATUS: u8 = 2;

pub struct WatchdogMonitor {
    registry: Arc<CampaignRegistry>,
    crm: Arc<dyn CrmAdapter>,
    threshold: chrono::Duration,
}

impl WatchdogMonitor {
    pub fn new(
        registry: Arc<CampaignRegistry>,
        crm: Arc<dyn CrmAdapter>,
        threshold_secs: u64,
    ) -> Self {
        Self {
            registry,
            crm,
            threshold: chrono::Duration::seconds(threshold_secs as i64),
        }
    }

    /// Scan every `waiting` campaign once. Returns how many were tripped.
    pub async fn scan(&self) -> usize {
        let now = Utc::now();
        let mut tripped = 0;
        for campaign in self.registry.snapshot().await {
            if campaign.state != CampaignState::Waiting {
                continue;
            }
            let Some(dialed_at) = campaign.last_dialed_at else {
                continue;
            };
            if now - dialed_at < self.threshold {
                continue;
            }

            // Cannot force-reconcile without a target contact.
            let Some(pending) = &campaign.pending_call else {
                tracing::warn!(
                    project = %campaign.project_id,
                    "watchdog tripped but no pending contact is known, leaving as-is"
                );
                continue;
            };

            tracing::warn!(
                project = %campaign.project_id,
                customer = %pending.customer_id,
                waited_secs = (now - dialed_at).num_seconds(),
                "watchdog: forcing no-answer resolution"
            );

            if let Err(e) = self
                .crm
                .write_call_status(&campaign.project_id, &pending.customer_id, NO_ANSWER_STATUS)
                .await
            {
                tracing::error!(project = %campaign.project_id, "forced status write failed: {e}");
            }

            if let Err(e) = self
                .registry
                .transition(
                    &campaign.project_id,
                    CampaignState::Active,
                    StatePatch::none().clear_error().clear_call_state(),
                )
                .await
            {
                tracing::warn!(project = %campaign.project_id, "watchdog reset failed: {e}");
                continue;
            }
            tripped += 1;
        }
        tripped
    }
}
