//! Campaign domain model.
//!
//! One `Campaign` per registered project. All call-lifecycle bookkeeping the
//! scheduler needs lives here; the transient per-tick structures
//! (`CorrelationEntry`, `MatchResult`) are owned by the tracker and never
//! persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Campaign lifecycle state.
///
/// A proper tagged enum; the old string-compound encodings
/// (`"error - notAvailable"`) are gone and `error_not_available` is its own
/// variant so the auto-restart policy never has to string-split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignState {
    /// Registered but not yet picked up by the scheduler.
    Start,
    /// Eligible to dial.
    Active,
    /// A live call matched this campaign this tick.
    Calling,
    /// Dial placed, awaiting platform resolution.
    Waiting,
    /// Reconciliation writes are in flight.
    Recording,
    /// Operator-suspended.
    Pause,
    /// Dial or poll failed; halted until operator action or auto-restart.
    Error,
    /// Last failure was "no idle agent". Auto-clears next tick.
    ErrorNotAvailable,
}

impl CampaignState {
    /// States an operator may set through the API. Everything else is
    /// scheduler-internal.
    pub fn operator_settable(self) -> bool {
        matches!(self, Self::Active | Self::Start | Self::Pause)
    }
}

impl std::fmt::Display for CampaignState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::Active => "active",
            Self::Calling => "calling",
            Self::Waiting => "waiting",
            Self::Recording => "recording",
            Self::Pause => "pause",
            Self::Error => "error",
            Self::ErrorNotAvailable => "error_not_available",
        };
        f.write_str(s)
    }
}

/// Opaque credential bundle a campaign dials with. Passed through to the
/// telephony platform's token endpoint untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthDescriptor {
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
}

/// The contact currently being dialed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCall {
    pub phone: String,
    pub customer_id: String,
}

/// Queue extension + device the platform dials from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRef {
    pub dn: String,
    pub device_id: String,
}

/// Handle to an outstanding call.
///
/// The platform hangs up by *participant* id, not call id, so both are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCallHandle {
    pub correlation_id: Uuid,
    pub platform_call_id: u64,
    pub participant_id: u64,
    pub device: DeviceRef,
}

/// One row of the platform's active-call snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCallRecord {
    #[serde(rename = "Id")]
    pub id: u64,
    #[serde(rename = "Status")]
    pub status: String,
    /// Timestamp of the last status change, as reported by the platform.
    #[serde(rename = "LastChangeStatus")]
    pub last_change_status: Option<String>,
}

impl ActiveCallRecord {
    /// "Talking" is the platform's connected-and-answered status.
    pub fn is_talking(&self) -> bool {
        self.status == "Talking"
    }
}

/// One registered outbound-calling project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub project_id: String,
    pub call_flow_id: String,
    pub auth: AuthDescriptor,
    pub state: CampaignState,
    #[serde(default)]
    pub pending_call: Option<PendingCall>,
    #[serde(default)]
    pub active_call: Option<ActiveCallHandle>,
    /// Snapshot of the matched active-call record from the last
    /// reconciliation pass.
    #[serde(default)]
    pub matched_call: Option<ActiveCallRecord>,
    #[serde(default)]
    pub last_dialed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Campaign {
    pub fn new(
        project_id: impl Into<String>,
        call_flow_id: impl Into<String>,
        auth: AuthDescriptor,
        state: CampaignState,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            call_flow_id: call_flow_id.into(),
            auth,
            state,
            pending_call: None,
            active_call: None,
            matched_call: None,
            last_dialed_at: None,
            last_error: None,
        }
    }

    /// Read-only projection pushed to observers after every tick.
    pub fn view(&self) -> CampaignView {
        CampaignView {
            project_id: self.project_id.clone(),
            state: self.state,
            call_flow_id: self.call_flow_id.clone(),
            matched_call: self.matched_call.clone(),
        }
    }
}

/// What observers see: `{projectId, state, callFlowId, matchedCall}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignView {
    pub project_id: String,
    pub state: CampaignState,
    pub call_flow_id: String,
    pub matched_call: Option<ActiveCallRecord>,
}

/// A dialable contact returned by the CRM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub phone: String,
    pub customer_id: String,
}

/// What the platform returns for a successful makecall: the call id used to
/// correlate against later snapshots, and the participant id used to drop it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedCall {
    pub platform_call_id: u64,
    pub participant_id: u64,
}

/// One outstanding dial attempt, queued until the platform's snapshot stops
/// listing `platform_call_id`. Removal is the reconciliation trigger.
#[derive(Debug, Clone)]
pub struct CorrelationEntry {
    pub request_id: Uuid,
    pub platform_call_id: u64,
    pub phone: String,
    pub project_id: String,
    pub customer_id: String,
    pub call_flow_id: String,
    pub token: String,
}

/// A correlation entry paired with the platform's current status record.
/// Produced fresh each tick; never persisted.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub request_id: Uuid,
    pub phone: String,
    pub project_id: String,
    pub customer_id: String,
    pub call_flow_id: String,
    pub active_call: ActiveCallRecord,
}
