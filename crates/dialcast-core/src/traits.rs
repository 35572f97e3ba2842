//! Adapter traits — the seams between the engine and the outside world.
//!
//! The engine only ever sees these two traits; the HTTP clients in
//! `dialcast-telephony` and `dialcast-crm` implement them, and tests swap in
//! in-memory fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ActiveCallRecord, AuthDescriptor, Contact, DeviceRef, PlacedCall};

/// The telephony platform: token issuance, call control, agent availability,
/// and the per-tick active-call snapshot.
#[async_trait]
pub trait TelephonyAdapter: Send + Sync {
    /// Exchange a campaign's credential bundle for a bearer token.
    async fn issue_token(&self, auth: &AuthDescriptor) -> Result<String>;

    /// The queue extension + device that outbound calls are placed from.
    async fn get_dialable_device(&self, token: &str) -> Result<DeviceRef>;

    /// Current profile name of the agent assigned to the device's queue
    /// (e.g. "Available", "DoNotDisturb").
    async fn get_agent_status(&self, token: &str, device: &DeviceRef) -> Result<String>;

    /// Place an outbound call. Returns the platform call id and the
    /// participant id needed for a later hangup.
    async fn place_call(&self, token: &str, device: &DeviceRef, phone: &str)
    -> Result<PlacedCall>;

    /// Best-effort hangup of an outstanding call.
    async fn hangup(&self, token: &str, device: &DeviceRef, participant_id: u64) -> Result<()>;

    /// Snapshot of all currently active calls. A 401 from the platform maps
    /// to [`crate::DialError::AuthExpired`] so the scheduler can refresh the
    /// shared token.
    async fn list_active_calls(&self, token: &str) -> Result<Vec<ActiveCallRecord>>;
}

/// The CRM: candidate lists, outcome writes, and the config-store backup.
#[async_trait]
pub trait CrmAdapter: Send + Sync {
    /// Next dialable contacts for a project. `list_state` 0 = fresh,
    /// 2 = attempted once.
    async fn next_contacts(
        &self,
        call_flow_id: &str,
        project_id: &str,
        list_state: u8,
        limit: u32,
    ) -> Result<Vec<Contact>>;

    /// Call outcome: 1 = connected, 2 = not connected / no answer.
    async fn write_call_status(
        &self,
        project_id: &str,
        customer_id: &str,
        status_code: u8,
    ) -> Result<()>;

    /// Stamp the project's dial flow as executed.
    async fn mark_dial_executed(&self, project_id: &str, call_flow_id: &str) -> Result<()>;

    /// Mark the contact for a retry round after a miss.
    async fn write_dial_retry_marker(&self, project_id: &str, customer_id: &str) -> Result<()>;

    /// Record a visit/interview entry for a connected call. `visited_at` is
    /// the platform's last status-change timestamp.
    async fn write_visit_record(
        &self,
        project_id: &str,
        customer_id: &str,
        outcome: &str,
        visited_at: &str,
    ) -> Result<()>;

    /// Fetch a named payload from the CRM config store, if present.
    async fn get_backup(&self, name: &str) -> Result<Option<String>>;

    /// Store a named payload in the CRM config store.
    async fn put_backup(&self, name: &str, payload: &str) -> Result<()>;
}
