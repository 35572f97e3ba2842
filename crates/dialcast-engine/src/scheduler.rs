//! The tick loop.
//!
//! One pass per second: watchdog, dial pass, shared-token upkeep, one
//! active-call snapshot, reconciliation, then an observer broadcast. The
//! broadcast happens even when the tick bails early, so observers always see
//! the current registry within one tick.
//!
//! Token discipline: dials use per-campaign credentials, the snapshot poll
//! uses one shared admin token fetched lazily. The tick that fetches it ends
//! right after, and a 401 on the poll just clears it for the next tick.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::broadcast;

use dialcast_core::config::SchedulerConfig;
use dialcast_core::error::DialError;
use dialcast_core::traits::{CrmAdapter, TelephonyAdapter};
use dialcast_core::types::{AuthDescriptor, CampaignState, CampaignView};

use crate::reconcile::ReconciliationEngine;
use crate::registry::{CampaignRegistry, StatePatch};
use crate::selector::OutboundSelector;
use crate::tracker::ActiveCallTracker;
use crate::watchdog::WatchdogMonitor;

/// Mutual exclusion between the tick loop and the operator API, in both
/// directions: the scheduler skips ticks while a mutation guard is held,
/// and taking a guard waits out any tick already in flight. A tick and an
/// operator write therefore never interleave on the registry.
pub struct SchedulerGuards {
    tick_running: AtomicBool,
    mutations: AtomicUsize,
}

impl SchedulerGuards {
    pub fn new() -> Self {
        Self { tick_running: AtomicBool::new(false), mutations: AtomicUsize::new(0) }
    }

    /// Take the write lockout. The mutation count is raised first so no new
    /// tick starts, then any in-flight tick is waited out before the guard
    /// is handed back.
    pub async fn begin_mutation(&self) -> MutationGuard<'_> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        while self.tick_running.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        MutationGuard { guards: self }
    }

    pub fn mutation_pending(&self) -> bool {
        self.mutations.load(Ordering::SeqCst) > 0
    }

    pub fn is_ticking(&self) -> bool {
        self.tick_running.load(Ordering::SeqCst)
    }
}

impl Default for SchedulerGuards {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MutationGuard<'a> {
    guards: &'a SchedulerGuards,
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        self.guards.mutations.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct DialScheduler {
    registry: Arc<CampaignRegistry>,
    telephony: Arc<dyn TelephonyAdapter>,
    selector: OutboundSelector,
    watchdog: WatchdogMonitor,
    reconciler: ReconciliationEngine,
    tracker: ActiveCallTracker,
    guards: Arc<SchedulerGuards>,
    feed: broadcast::Sender<Vec<CampaignView>>,
    config: SchedulerConfig,
    admin_auth: AuthDescriptor,
    auto_restart: Arc<AtomicBool>,
    /// Shared poll token. `None` until fetched, cleared on 401.
    token: Option<String>,
}

impl DialScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<CampaignRegistry>,
        telephony: Arc<dyn TelephonyAdapter>,
        crm: Arc<dyn CrmAdapter>,
        feed: broadcast::Sender<Vec<CampaignView>>,
        guards: Arc<SchedulerGuards>,
        auto_restart: Arc<AtomicBool>,
        config: SchedulerConfig,
        admin_auth: AuthDescriptor,
    ) -> Self {
        let selector =
            OutboundSelector::new(registry.clone(), telephony.clone(), crm.clone());
        let watchdog =
            WatchdogMonitor::new(registry.clone(), crm.clone(), config.watchdog_threshold_secs);
        let reconciler =
            ReconciliationEngine::new(registry.clone(), crm.clone(), config.visit_record_delay_ms);
        Self {
            registry,
            telephony,
            selector,
            watchdog,
            reconciler,
            tracker: ActiveCallTracker::new(),
            guards,
            feed,
            config,
            admin_auth,
            auto_restart,
            token: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Vec<CampaignView>> {
        self.feed.subscribe()
    }

    pub async fn run(mut self) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.tick_interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            tick_secs = self.config.tick_interval_secs,
            "dial scheduler started"
        );
        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    /// One scheduler pass. Public for tests; `run` is the production driver.
    pub async fn tick(&mut self) {
        if self.guards.mutation_pending() {
            tracing::debug!("operator mutation in flight, skipping tick");
            return;
        }
        self.guards.tick_running.store(true, Ordering::SeqCst);
        self.tick_inner().await;
        self.publish().await;
        self.guards.tick_running.store(false, Ordering::SeqCst);
    }

    async fn tick_inner(&mut self) {
        if self.registry.is_empty().await {
            return;
        }

        self.watchdog.scan().await;
        self.dial_pass().await;

        // Lazy shared token. The fetch itself ends the tick; polling starts
        // next tick with a known-good token.
        let token = match &self.token {
            Some(token) => token.clone(),
            None => {
                match self.telephony.issue_token(&self.admin_auth).await {
                    Ok(token) => {
                        tracing::info!("shared poll token issued");
                        self.token = Some(token);
                    }
                    Err(e) => tracing::error!("shared token fetch failed: {e}"),
                }
                return;
            }
        };

        let snapshot = match self.telephony.list_active_calls(&token).await {
            Ok(snapshot) => snapshot,
            Err(DialError::AuthExpired) => {
                tracing::warn!("poll token rejected, will refresh next tick");
                self.token = None;
                return;
            }
            Err(e) => {
                tracing::error!("active-call poll failed: {e}");
                return;
            }
        };

        let matches = self.tracker.match_snapshot(&snapshot);
        self.reconciler.reconcile(&matches).await;
    }

    /// Visit every campaign once: recover soft errors, apply the restart
    /// policy, dial the eligible ones.
    async fn dial_pass(&mut self) {
        for campaign in self.registry.snapshot().await {
            self.stagger().await;
            match campaign.state {
                CampaignState::ErrorNotAvailable => {
                    // Soft skip from last tick; eligible again.
                    if let Err(e) = self
                        .registry
                        .transition(
                            &campaign.project_id,
                            CampaignState::Active,
                            StatePatch::none().clear_error(),
                        )
                        .await
                    {
                        tracing::warn!(project = %campaign.project_id, "soft-error clear failed: {e}");
                    }
                }
                CampaignState::Error if self.auto_restart.load(Ordering::SeqCst) => {
                    tracing::info!(project = %campaign.project_id, "auto-restart: clearing error");
                    if let Err(e) = self
                        .registry
                        .transition(
                            &campaign.project_id,
                            CampaignState::Active,
                            StatePatch::none().clear_error(),
                        )
                        .await
                    {
                        tracing::warn!(project = %campaign.project_id, "auto-restart failed: {e}");
                    }
                }
                CampaignState::Active => {
                    if let Some(entry) = self.selector.try_dial(&campaign).await {
                        self.tracker.push(entry);
                    }
                }
                _ => {}
            }
        }
    }

    /// Small random gap between campaigns so dials never hit the platform in
    /// lockstep.
    async fn stagger(&self) {
        if self.config.jitter_max_ms == 0 {
            return;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=self.config.jitter_max_ms);
        tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
    }

    async fn publish(&self) {
        // No receivers is fine; the next subscriber catches the next tick.
        let _ = self.feed.send(self.registry.views().await);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_auth, MockCrm, MockTelephony};
    use dialcast_core::types::{ActiveCallRecord, Campaign};

    struct Harness {
        registry: Arc<CampaignRegistry>,
        telephony: Arc<MockTelephony>,
        crm: Arc<MockCrm>,
        guards: Arc<SchedulerGuards>,
        auto_restart: Arc<AtomicBool>,
        scheduler: DialScheduler,
    }

    fn harness() -> Harness {
        let registry = Arc::new(CampaignRegistry::new());
        let telephony = Arc::new(MockTelephony::new());
        let crm = Arc::new(MockCrm::new());
        let guards = Arc::new(SchedulerGuards::new());
        let auto_restart = Arc::new(AtomicBool::new(false));
        let (feed, _) = broadcast::channel(16);
        let config = SchedulerConfig {
            tick_interval_secs: 1,
            watchdog_threshold_secs: 90,
            jitter_max_ms: 0,
            visit_record_delay_ms: 0,
            auto_restart: false,
        };
        let scheduler = DialScheduler::new(
            registry.clone(),
            telephony.clone(),
            crm.clone(),
            feed,
            guards.clone(),
            auto_restart.clone(),
            config,
            test_auth(),
        );
        Harness { registry, telephony, crm, guards, auto_restart, scheduler }
    }

    fn active_campaign(id: &str) -> Campaign {
        Campaign::new(id, "CF1", test_auth(), CampaignState::Active)
    }

    fn record(id: u64, status: &str) -> ActiveCallRecord {
        ActiveCallRecord {
            id,
            status: status.into(),
            last_change_status: Some("2025-07-23T08:00:04Z".into()),
        }
    }

    #[tokio::test]
    async fn full_call_lifecycle() {
        let mut h = harness();
        h.registry.add(active_campaign("P1")).await.unwrap();
        h.crm.push_fresh("0900000000", "C1");

        // Tick 1: dial goes out, shared token is fetched, tick ends early.
        h.scheduler.tick().await;
        let c = h.registry.get("P1").await.unwrap();
        assert_eq!(c.state, CampaignState::Waiting);
        let call_id = c.active_call.as_ref().unwrap().platform_call_id;
        assert_eq!(h.telephony.placed_calls(), vec!["0900000000"]);

        // Tick 2: snapshot lists the call, campaign is talking.
        h.telephony.set_active_calls(vec![record(call_id, "Talking")]);
        h.scheduler.tick().await;
        assert_eq!(h.registry.get("P1").await.unwrap().state, CampaignState::Calling);

        // Tick 3: call gone, outcome recorded, campaign released.
        h.telephony.set_active_calls(vec![]);
        h.scheduler.tick().await;
        let done = h.registry.get("P1").await.unwrap();
        assert_eq!(done.state, CampaignState::Active);
        assert!(done.active_call.is_none());
        assert_eq!(
            h.crm.write_log(),
            vec![
                "call_status:P1:C1:1",
                "executed:P1:CF1",
                "visit:P1:C1:撥打成功:2025-07-23T08:00:04Z",
            ]
        );
    }

    #[tokio::test]
    async fn waiting_campaign_is_not_redialed() {
        let mut h = harness();
        h.registry.add(active_campaign("P1")).await.unwrap();
        h.crm.push_fresh("0900000000", "C1");
        h.crm.push_fresh("0911111111", "C2");

        h.scheduler.tick().await;
        let first = h.registry.get("P1").await.unwrap().active_call.unwrap();
        h.telephony
            .set_active_calls(vec![record(first.platform_call_id, "Routing")]);

        // Campaign stays waiting; the second contact is untouched.
        h.scheduler.tick().await;
        assert_eq!(h.telephony.placed_calls().len(), 1);
        let still = h.registry.get("P1").await.unwrap();
        assert_eq!(still.active_call.unwrap().platform_call_id, first.platform_call_id);
    }

    #[tokio::test]
    async fn expired_poll_token_is_refreshed() {
        let mut h = harness();
        h.registry.add(active_campaign("P1")).await.unwrap();

        // Tick 1 fetches the token; dial token + poll token = 2 issuances at
        // most, but with no contacts only the shared one is fetched.
        h.scheduler.tick().await;
        assert_eq!(h.telephony.tokens_issued(), 1);

        h.telephony.set_poll_unauthorized(true);
        h.scheduler.tick().await;

        h.telephony.set_poll_unauthorized(false);
        // Token was dropped; this tick refetches and ends early.
        h.scheduler.tick().await;
        assert_eq!(h.telephony.tokens_issued(), 2);

        // And the next one polls normally again.
        h.scheduler.tick().await;
        assert_eq!(h.telephony.tokens_issued(), 2);
    }

    #[tokio::test]
    async fn token_fetch_failure_is_retried_next_tick() {
        let mut h = harness();
        h.registry.add(active_campaign("P1")).await.unwrap();
        h.telephony.fail_token(true);

        h.scheduler.tick().await;
        assert_eq!(h.telephony.tokens_issued(), 0);

        h.telephony.fail_token(false);
        h.scheduler.tick().await;
        assert_eq!(h.telephony.tokens_issued(), 1);
    }

    #[tokio::test]
    async fn mutation_guard_skips_tick() {
        let mut h = harness();
        h.registry.add(active_campaign("P1")).await.unwrap();
        h.crm.push_fresh("0900000000", "C1");

        let guard = h.guards.begin_mutation().await;
        h.scheduler.tick().await;
        assert!(h.telephony.placed_calls().is_empty());
        assert_eq!(h.registry.get("P1").await.unwrap().state, CampaignState::Active);

        drop(guard);
        h.scheduler.tick().await;
        assert_eq!(h.telephony.placed_calls(), vec!["0900000000"]);
    }

    #[tokio::test]
    async fn pause_during_in_flight_dial_is_not_clobbered() {
        let mut h = harness();
        h.registry.add(active_campaign("P1")).await.unwrap();
        h.crm.push_fresh("0900000000", "C1");
        h.telephony.delay_dials(100);

        let guards = h.guards.clone();
        let registry = h.registry.clone();
        let tick = tokio::spawn(async move {
            h.scheduler.tick().await;
            h
        });

        // Let the tick get into the (slow) makecall before the operator
        // write arrives.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let guard = guards.begin_mutation().await;
        // The guard must not be handed out while the tick is in flight.
        assert!(!guards.is_ticking());
        registry
            .transition("P1", CampaignState::Pause, StatePatch::none().clear_call_state())
            .await
            .unwrap();
        drop(guard);

        let h = tick.await.unwrap();
        let after = h.registry.get("P1").await.unwrap();
        // The dial's Waiting transition landed inside the tick; the pause
        // came strictly after it and sticks.
        assert_eq!(after.state, CampaignState::Pause);
        assert!(after.active_call.is_none());
        assert_eq!(h.telephony.placed_calls(), vec!["0900000000"]);
    }

    #[tokio::test]
    async fn soft_error_recovers_without_auto_restart() {
        let mut h = harness();
        let mut c = active_campaign("P1");
        c.state = CampaignState::ErrorNotAvailable;
        c.last_error = Some("agent profile is DoNotDisturb".into());
        h.registry.add(c).await.unwrap();

        h.scheduler.tick().await;
        let after = h.registry.get("P1").await.unwrap();
        assert_eq!(after.state, CampaignState::Active);
        assert!(after.last_error.is_none());
        // No CRM traffic from the recovery itself.
        assert!(h.crm.write_log().is_empty());
    }

    #[tokio::test]
    async fn hard_error_needs_auto_restart() {
        let mut h = harness();
        let mut c = active_campaign("P1");
        c.state = CampaignState::Error;
        c.last_error = Some("makecall returned 500".into());
        h.registry.add(c).await.unwrap();

        h.scheduler.tick().await;
        assert_eq!(h.registry.get("P1").await.unwrap().state, CampaignState::Error);

        h.auto_restart.store(true, Ordering::SeqCst);
        h.scheduler.tick().await;
        assert_eq!(h.registry.get("P1").await.unwrap().state, CampaignState::Active);
    }

    #[tokio::test]
    async fn every_tick_broadcasts_views() {
        let mut h = harness();
        h.registry.add(active_campaign("P1")).await.unwrap();
        let mut rx = h.scheduler.subscribe();

        h.scheduler.tick().await;
        let views = rx.recv().await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].project_id, "P1");
    }

    #[tokio::test]
    async fn empty_registry_still_broadcasts() {
        let mut h = harness();
        let mut rx = h.scheduler.subscribe();
        h.scheduler.tick().await;
        assert!(rx.recv().await.unwrap().is_empty());
        assert_eq!(h.telephony.tokens_issued(), 0);
    }
}
