//! In-memory adapter fakes shared by the engine's test modules.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use dialcast_core::error::{DialError, Result};
use dialcast_core::traits::{CrmAdapter, TelephonyAdapter};
use dialcast_core::types::{
    ActiveCallHandle, ActiveCallRecord, AuthDescriptor, Campaign, CampaignState, Contact,
    DeviceRef, PendingCall, PlacedCall,
};
use uuid::Uuid;

pub fn test_auth() -> AuthDescriptor {
    AuthDescriptor {
        grant_type: "client_credentials".into(),
        client_id: "leo".into(),
        client_secret: "secret".into(),
    }
}

/// A campaign stuck in `waiting` on a dial to `customer_id` placed at
/// `dialed_at`.
pub fn waiting_campaign(
    project_id: &str,
    customer_id: &str,
    dialed_at: DateTime<Utc>,
) -> Campaign {
    let mut c = Campaign::new(project_id, "CF1", test_auth(), CampaignState::Waiting);
    c.pending_call =
        Some(PendingCall { phone: "0900000000".into(), customer_id: customer_id.into() });
    c.active_call = Some(ActiveCallHandle {
        correlation_id: Uuid::new_v4(),
        platform_call_id: 31337,
        participant_id: 7001,
        device: DeviceRef { dn: "801".into(), device_id: "dev-1".into() },
    });
    c.last_dialed_at = Some(dialed_at);
    c
}

pub struct MockTelephony {
    agent_status: Mutex<String>,
    active_calls: Mutex<Vec<ActiveCallRecord>>,
    placed: Mutex<Vec<String>>,
    hangups: Mutex<Vec<u64>>,
    next_call_id: AtomicU64,
    dial_delay_ms: AtomicU64,
    fail_next_dial: AtomicBool,
    poll_unauthorized: AtomicBool,
    fail_token: AtomicBool,
    tokens_issued: AtomicU64,
}

impl MockTelephony {
    pub fn new() -> Self {
        Self {
            agent_status: Mutex::new("Available".into()),
            active_calls: Mutex::new(Vec::new()),
            placed: Mutex::new(Vec::new()),
            hangups: Mutex::new(Vec::new()),
            next_call_id: AtomicU64::new(100),
            dial_delay_ms: AtomicU64::new(0),
            fail_next_dial: AtomicBool::new(false),
            poll_unauthorized: AtomicBool::new(false),
            fail_token: AtomicBool::new(false),
            tokens_issued: AtomicU64::new(0),
        }
    }

    pub fn set_agent_status(&self, status: &str) {
        *self.agent_status.lock().unwrap() = status.into();
    }

    pub fn set_active_calls(&self, calls: Vec<ActiveCallRecord>) {
        *self.active_calls.lock().unwrap() = calls;
    }

    pub fn fail_next_dial(&self) {
        self.fail_next_dial.store(true, Ordering::SeqCst);
    }

    /// Make every `place_call` take this long, to hold a tick in flight.
    pub fn delay_dials(&self, ms: u64) {
        self.dial_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn set_poll_unauthorized(&self, v: bool) {
        self.poll_unauthorized.store(v, Ordering::SeqCst);
    }

    pub fn fail_token(&self, v: bool) {
        self.fail_token.store(v, Ordering::SeqCst);
    }

    /// Phone numbers dialed, in order.
    pub fn placed_calls(&self) -> Vec<String> {
        self.placed.lock().unwrap().clone()
    }

    /// Participant ids dropped, in order.
    pub fn hangups(&self) -> Vec<u64> {
        self.hangups.lock().unwrap().clone()
    }

    pub fn tokens_issued(&self) -> u64 {
        self.tokens_issued.load(Ordering::SeqCst)
    }
}

impl Default for MockTelephony {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelephonyAdapter for MockTelephony {
    async fn issue_token(&self, auth: &AuthDescriptor) -> Result<String> {
        if self.fail_token.load(Ordering::SeqCst) {
            return Err(DialError::Platform("token endpoint returned 400".into()));
        }
        self.tokens_issued.fetch_add(1, Ordering::SeqCst);
        Ok(format!("tok-{}", auth.client_id))
    }

    async fn get_dialable_device(&self, _token: &str) -> Result<DeviceRef> {
        Ok(DeviceRef { dn: "801".into(), device_id: "dev-1".into() })
    }

    async fn get_agent_status(&self, _token: &str, _device: &DeviceRef) -> Result<String> {
        Ok(self.agent_status.lock().unwrap().clone())
    }

    async fn place_call(
        &self,
        _token: &str,
        _device: &DeviceRef,
        phone: &str,
    ) -> Result<PlacedCall> {
        let delay_ms = self.dial_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }
        if self.fail_next_dial.swap(false, Ordering::SeqCst) {
            return Err(DialError::Platform("makecall returned 500".into()));
        }
        let id = self.next_call_id.fetch_add(1, Ordering::SeqCst);
        self.placed.lock().unwrap().push(phone.into());
        Ok(PlacedCall { platform_call_id: id, participant_id: 7000 + id })
    }

    async fn hangup(&self, _token: &str, _device: &DeviceRef, participant_id: u64) -> Result<()> {
        self.hangups.lock().unwrap().push(participant_id);
        Ok(())
    }

    async fn list_active_calls(&self, _token: &str) -> Result<Vec<ActiveCallRecord>> {
        if self.poll_unauthorized.load(Ordering::SeqCst) {
            return Err(DialError::AuthExpired);
        }
        Ok(self.active_calls.lock().unwrap().clone())
    }
}

pub struct MockCrm {
    fresh: Mutex<Vec<Contact>>,
    retry: Mutex<Vec<Contact>>,
    log: Mutex<Vec<String>>,
    backup: Mutex<Option<String>>,
    fail_next_status_write: AtomicBool,
}

impl MockCrm {
    pub fn new() -> Self {
        Self {
            fresh: Mutex::new(Vec::new()),
            retry: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
            backup: Mutex::new(None),
            fail_next_status_write: AtomicBool::new(false),
        }
    }

    pub fn push_fresh(&self, phone: &str, customer_id: &str) {
        self.fresh
            .lock()
            .unwrap()
            .push(Contact { phone: phone.into(), customer_id: customer_id.into() });
    }

    pub fn push_retry(&self, phone: &str, customer_id: &str) {
        self.retry
            .lock()
            .unwrap()
            .push(Contact { phone: phone.into(), customer_id: customer_id.into() });
    }

    pub fn fail_next_status_write(&self) {
        self.fail_next_status_write.store(true, Ordering::SeqCst);
    }

    /// Every mutating CRM call, in order, as "op:args" strings.
    pub fn write_log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn stored_backup(&self) -> Option<String> {
        self.backup.lock().unwrap().clone()
    }

    pub fn set_backup(&self, payload: &str) {
        *self.backup.lock().unwrap() = Some(payload.into());
    }
}

impl Default for MockCrm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CrmAdapter for MockCrm {
    async fn next_contacts(
        &self,
        _call_flow_id: &str,
        _project_id: &str,
        list_state: u8,
        limit: u32,
    ) -> Result<Vec<Contact>> {
        let source = if list_state == 0 { &self.fresh } else { &self.retry };
        let mut pool = source.lock().unwrap();
        let take = (limit as usize).min(pool.len());
        Ok(pool.drain(..take).collect())
    }

    async fn write_call_status(
        &self,
        project_id: &str,
        customer_id: &str,
        status_code: u8,
    ) -> Result<()> {
        if self.fail_next_status_write.swap(false, Ordering::SeqCst) {
            return Err(DialError::Crm("callStatus write returned 500".into()));
        }
        self.log.lock().unwrap().push(format!("call_status:{project_id}:{customer_id}:{status_code}"));
        Ok(())
    }

    async fn mark_dial_executed(&self, project_id: &str, call_flow_id: &str) -> Result<()> {
        self.log.lock().unwrap().push(format!("executed:{project_id}:{call_flow_id}"));
        Ok(())
    }

    async fn write_dial_retry_marker(&self, project_id: &str, customer_id: &str) -> Result<()> {
        self.log.lock().unwrap().push(format!("retry:{project_id}:{customer_id}"));
        Ok(())
    }

    async fn write_visit_record(
        &self,
        project_id: &str,
        customer_id: &str,
        outcome: &str,
        visited_at: &str,
    ) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("visit:{project_id}:{customer_id}:{outcome}:{visited_at}"));
        Ok(())
    }

    async fn get_backup(&self, _name: &str) -> Result<Option<String>> {
        Ok(self.backup.lock().unwrap().clone())
    }

    async fn put_backup(&self, _name: &str, payload: &str) -> Result<()> {
        *self.backup.lock().unwrap() = Some(payload.into());
        Ok(())
    }
}
