//! Error-change alerting.
//!
//! A background task diffs the registry's error map on an interval and posts
//! one webhook message per change. Only *changes* alert: a campaign that
//! stays broken does not repost every interval, and a campaign whose error
//! clears posts a recovery note.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dialcast_core::config::AlertConfig;
use dialcast_core::types::Campaign;

use crate::registry::CampaignRegistry;

pub struct AlertNotifier {
    registry: Arc<CampaignRegistry>,
    config: AlertConfig,
    client: reqwest::Client,
    last_errors: HashMap<String, String>,
}

impl AlertNotifier {
    pub fn new(registry: Arc<CampaignRegistry>, config: AlertConfig) -> Self {
        Self {
            registry,
            config,
            client: reqwest::Client::new(),
            last_errors: HashMap::new(),
        }
    }

    /// Compare a registry snapshot against the last seen error map and return
    /// the messages to send. Updates the map in place.
    fn diff(&mut self, snapshot: &[Campaign]) -> Vec<String> {
        let mut messages = Vec::new();

        for campaign in snapshot {
            match (&campaign.last_error, self.last_errors.get(&campaign.project_id)) {
                (Some(error), Some(previous)) if error == previous => {}
                (Some(error), _) => {
                    messages.push(format!(
                        "[dialcast] project {} entered {}: {}",
                        campaign.project_id, campaign.state, error
                    ));
                    self.last_errors.insert(campaign.project_id.clone(), error.clone());
                }
                (None, Some(_)) => {
                    messages.push(format!(
                        "[dialcast] project {} recovered (now {})",
                        campaign.project_id, campaign.state
                    ));
                    self.last_errors.remove(&campaign.project_id);
                }
                (None, None) => {}
            }
        }

        // Deleted campaigns drop out of the map without a recovery message.
        self.last_errors
            .retain(|project_id, _| snapshot.iter().any(|c| &c.project_id == project_id));

        messages
    }

    async fn send(&self, url: &str, message: &str) {
        let body = serde_json::json!({ "text": message });
        match self.client.post(url).json(&body).send().await {
            Ok(resp) if !resp.status().is_success() => {
                tracing::warn!(status = %resp.status(), "alert webhook rejected message");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("alert webhook unreachable: {e}"),
        }
    }

    async fn check(&mut self) {
        let snapshot = self.registry.snapshot().await;
        let messages = self.diff(&snapshot);
        if messages.is_empty() {
            return;
        }
        let Some(url) = self.config.webhook_url.clone() else { return };
        for message in messages {
            tracing::info!(%message, "sending error alert");
            self.send(&url, &message).await;
        }
    }

    /// Spawn the periodic checker. No-op (not spawned) when no webhook is
    /// configured.
    pub fn spawn(mut self) -> Option<tokio::task::JoinHandle<()>> {
        self.config.webhook_url.as_ref()?;
        let interval = Duration::from_secs(self.config.check_interval_secs.max(1));
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.check().await;
            }
        }))
    }
}
