//! Registry backup through the CRM's config store.
//!
//! The registry is in-memory only; a periodic JSON snapshot in the CRM's
//! named-config endpoint survives restarts. Only durable identity is kept
//! per campaign. Transient call bookkeeping is deliberately dropped, and
//! mid-call states are normalized back to `active` on restore since the
//! correlation queue they referred to died with the old process.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use dialcast_core::error::{DialError, Result};
use dialcast_core::traits::CrmAdapter;
use dialcast_core::types::{AuthDescriptor, Campaign, CampaignState};

use crate::registry::CampaignRegistry;

/// What survives a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupEntry {
    pub project_id: String,
    pub call_flow_id: String,
    pub auth: AuthDescriptor,
    pub state: CampaignState,
}

impl BackupEntry {
    fn from_campaign(c: &Campaign) -> Self {
        Self {
            project_id: c.project_id.clone(),
            call_flow_id: c.call_flow_id.clone(),
            auth: c.auth.clone(),
            state: c.state,
        }
    }

    fn into_campaign(self) -> Campaign {
        let state = match self.state {
            CampaignState::Calling
            | CampaignState::Waiting
            | CampaignState::Recording
            | CampaignState::ErrorNotAvailable => CampaignState::Active,
            other => other,
        };
        Campaign::new(self.project_id, self.call_flow_id, self.auth, state)
    }
}

pub struct PersistenceBridge {
    registry: Arc<CampaignRegistry>,
    crm: Arc<dyn CrmAdapter>,
    name: String,
}

impl PersistenceBridge {
    pub fn new(
        registry: Arc<CampaignRegistry>,
        crm: Arc<dyn CrmAdapter>,
        name: impl Into<String>,
    ) -> Self {
        Self { registry, crm, name: name.into() }
    }

    /// Load the stored snapshot into the registry. Returns how many
    /// campaigns came back; 0 when no backup exists yet.
    pub async fn restore(&self) -> Result<usize> {
        let Some(payload) = self.crm.get_backup(&self.name).await? else {
            tracing::info!(name = %self.name, "no stored backup, starting empty");
            return Ok(0);
        };
        let entries: Vec<BackupEntry> = serde_json::from_str(&payload)
            .map_err(|e| DialError::Crm(format!("backup payload is not valid JSON: {e}")))?;
        let count = entries.len();
        let campaigns = entries.into_iter().map(BackupEntry::into_campaign).collect();
        self.registry.restore(campaigns).await;
        tracing::info!(name = %self.name, count, "registry restored from backup");
        Ok(count)
    }

    /// Push the current registry to the config store.
    pub async fn backup(&self) -> Result<()> {
        let snapshot = self.registry.snapshot().await;
        let entries: Vec<BackupEntry> =
            snapshot.iter().map(BackupEntry::from_campaign).collect();
        let payload = serde_json::to_string(&entries)
            .map_err(|e| DialError::Crm(format!("backup serialization failed: {e}")))?;
        self.crm.put_backup(&self.name, &payload).await
    }

    /// Spawn the periodic backup task.
    pub fn spawn(self, interval_secs: u64) -> tokio::task::JoinHandle<()> {
        let interval = Duration::from_secs(interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.backup().await {
                    tracing::warn!("registry backup failed: {e}");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_auth, waiting_campaign, MockCrm};
    use chrono::Utc;

    fn bridge() -> (Arc<CampaignRegistry>, Arc<MockCrm>, PersistenceBridge) {
        let registry = Arc::new(CampaignRegistry::new());
        let crm = Arc::new(MockCrm::new());
        let bridge = PersistenceBridge::new(registry.clone(), crm.clone(), "dialcast-projects");
        (registry, crm, bridge)
    }

    #[tokio::test]
    async fn backup_then_restore_round_trips_identity() {
        let (registry, crm, bridge) = bridge();
        registry
            .add(Campaign::new("P1", "CF1", test_auth(), CampaignState::Pause))
            .await
            .unwrap();
        bridge.backup().await.unwrap();

        registry.restore(Vec::new()).await;
        assert_eq!(bridge.restore().await.unwrap(), 1);
        let c = registry.get("P1").await.unwrap();
        assert_eq!(c.call_flow_id, "CF1");
        assert_eq!(c.state, CampaignState::Pause);
        assert!(crm.stored_backup().is_some());
    }

    #[tokio::test]
    async fn restore_normalizes_mid_call_states() {
        let (registry, _crm, bridge) = bridge();
        registry.add(waiting_campaign("P1", "C1", Utc::now())).await.unwrap();
        bridge.backup().await.unwrap();

        registry.restore(Vec::new()).await;
        bridge.restore().await.unwrap();
        let c = registry.get("P1").await.unwrap();
        assert_eq!(c.state, CampaignState::Active);
        assert!(c.pending_call.is_none());
        assert!(c.active_call.is_none());
        assert!(c.last_dialed_at.is_none());
    }

    #[tokio::test]
    async fn missing_backup_is_empty_start() {
        let (registry, _crm, bridge) = bridge();
        assert_eq!(bridge.restore().await.unwrap(), 0);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn corrupt_backup_is_an_error() {
        let (registry, crm, bridge) = bridge();
        crm.set_backup("not json");
        assert!(bridge.restore().await.is_err());
        assert!(registry.is_empty().await);
    }
}
