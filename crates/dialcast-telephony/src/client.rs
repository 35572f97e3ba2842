//! PBX call-control client.
//!
//! Endpoint map:
//! - `POST /connect/token` — credential bundle → bearer token (form encoded)
//! - `GET  /callcontrol` — owners; the Wqueue-typed owner's first device is
//!   the dialable device
//! - `GET  /xapi/v1/ReportAgentsInQueueStatistics` + `GET /xapi/v1/Users` —
//!   assigned agent's current profile name
//! - `POST /callcontrol/{dn}/devices/{device}/makecall` — place a call
//! - `POST /callcontrol/{dn}/participants/{id}/drop` — hangup
//! - `POST /xapi/v1/ActiveCalls` — snapshot; 401 means the shared token
//!   expired

use async_trait::async_trait;
use serde::Deserialize;

use dialcast_core::config::TelephonyConfig;
use dialcast_core::error::{DialError, Result};
use dialcast_core::traits::TelephonyAdapter;
use dialcast_core::types::{ActiveCallRecord, AuthDescriptor, DeviceRef, PlacedCall};

/// Default platform-side ring timeout for makecall, in seconds.
const MAKECALL_TIMEOUT_SECS: u32 = 30;

pub struct PbxClient {
    host: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct CallControlOwner {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    devices: Vec<OwnerDevice>,
}

#[derive(Debug, Deserialize)]
struct OwnerDevice {
    dn: String,
    device_id: String,
}

#[derive(Debug, Deserialize)]
struct MakeCallResponse {
    result: MakeCallResult,
}

#[derive(Debug, Deserialize)]
struct MakeCallResult {
    id: u64,
    callid: u64,
}

#[derive(Debug, Deserialize)]
struct ODataValue<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct QueueAgentRow {
    #[serde(rename = "Dn")]
    dn: String,
}

#[derive(Debug, Deserialize)]
struct UserRow {
    #[serde(rename = "CurrentProfileName")]
    current_profile_name: String,
}

impl PbxClient {
    pub fn new(config: &TelephonyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| DialError::Config(format!("telephony client: {e}")))?;
        Ok(Self { host: config.host.trim_end_matches('/').to_string(), client })
    }

    /// Pick the dialable device out of the call-control owner list: the
    /// Wqueue-typed owner's first device.
    fn pick_device(owners: Vec<CallControlOwner>) -> Result<DeviceRef> {
        let owner = owners
            .into_iter()
            .find(|o| o.kind == "Wqueue")
            .ok_or_else(|| DialError::Platform("no Wqueue owner in call control".into()))?;
        let device = owner
            .devices
            .into_iter()
            .next()
            .ok_or_else(|| DialError::Platform("Wqueue owner has no devices".into()))?;
        Ok(DeviceRef { dn: device.dn, device_id: device.device_id })
    }
}

#[async_trait]
impl TelephonyAdapter for PbxClient {
    async fn issue_token(&self, auth: &AuthDescriptor) -> Result<String> {
        let params = [
            ("grant_type", auth.grant_type.as_str()),
            ("client_id", auth.client_id.as_str()),
            ("client_secret", auth.client_secret.as_str()),
        ];
        let resp = self
            .client
            .post(format!("{}/connect/token", self.host))
            .form(&params)
            .send()
            .await
            .map_err(|e| DialError::Platform(format!("token request: {e}")))?;
        if !resp.status().is_success() {
            return Err(DialError::Platform(format!(
                "token request rejected for {}: {}",
                auth.client_id,
                resp.status()
            )));
        }
        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| DialError::Platform(format!("token response: {e}")))?;
        Ok(token.access_token)
    }

    async fn get_dialable_device(&self, token: &str) -> Result<DeviceRef> {
        let resp = self
            .client
            .get(format!("{}/callcontrol", self.host))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| DialError::Platform(format!("callcontrol list: {e}")))?;
        if !resp.status().is_success() {
            return Err(DialError::Platform(format!("callcontrol list: {}", resp.status())));
        }
        let owners: Vec<CallControlOwner> = resp
            .json()
            .await
            .map_err(|e| DialError::Platform(format!("callcontrol payload: {e}")))?;
        Self::pick_device(owners)
    }

    async fn get_agent_status(&self, token: &str, device: &DeviceRef) -> Result<String> {
        // Two hops: queue statistics give the assigned agent's extension,
        // the user record gives that agent's current profile name.
        let now = chrono::Utc::now().to_rfc3339();
        let resp = self
            .client
            .get(format!("{}/xapi/v1/ReportAgentsInQueueStatistics", self.host))
            .bearer_auth(token)
            .query(&[
                ("queueDnStr", device.dn.as_str()),
                ("startDt", now.as_str()),
                ("endDt", now.as_str()),
                ("waitInterval", "0:00:0"),
            ])
            .send()
            .await
            .map_err(|e| DialError::Platform(format!("queue statistics: {e}")))?;
        if !resp.status().is_success() {
            return Err(DialError::Platform(format!("queue statistics: {}", resp.status())));
        }
        let agents: ODataValue<QueueAgentRow> = resp
            .json()
            .await
            .map_err(|e| DialError::Platform(format!("queue statistics payload: {e}")))?;
        let agent = agents
            .value
            .into_iter()
            .next()
            .ok_or_else(|| DialError::Platform(format!("queue {} has no agents", device.dn)))?;

        let resp = self
            .client
            .get(format!("{}/xapi/v1/Users", self.host))
            .bearer_auth(token)
            .query(&[("$filter", format!("Number eq '{}'", agent.dn))])
            .send()
            .await
            .map_err(|e| DialError::Platform(format!("user lookup: {e}")))?;
        if !resp.status().is_success() {
            return Err(DialError::Platform(format!("user lookup: {}", resp.status())));
        }
        let users: ODataValue<UserRow> = resp
            .json()
            .await
            .map_err(|e| DialError::Platform(format!("user payload: {e}")))?;
        let user = users
            .value
            .into_iter()
            .next()
            .ok_or_else(|| DialError::Platform(format!("agent {} not found", agent.dn)))?;
        Ok(user.current_profile_name)
    }

    async fn place_call(
        &self,
        token: &str,
        device: &DeviceRef,
        phone: &str,
    ) -> Result<PlacedCall> {
        let body = serde_json::json!({
            "reason": "outbound",
            "destination": phone,
            "timeout": MAKECALL_TIMEOUT_SECS,
        });
        let resp = self
            .client
            .post(format!(
                "{}/callcontrol/{}/devices/{}/makecall",
                self.host, device.dn, device.device_id
            ))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| DialError::Platform(format!("makecall: {e}")))?;
        if !resp.status().is_success() {
            return Err(DialError::Platform(format!("makecall to {phone}: {}", resp.status())));
        }
        let placed: MakeCallResponse = resp
            .json()
            .await
            .map_err(|e| DialError::Platform(format!("makecall payload: {e}")))?;
        tracing::debug!(
            callid = placed.result.callid,
            participant = placed.result.id,
            "call placed to {phone}"
        );
        Ok(PlacedCall {
            platform_call_id: placed.result.callid,
            participant_id: placed.result.id,
        })
    }

    async fn hangup(&self, token: &str, device: &DeviceRef, participant_id: u64) -> Result<()> {
        let resp = self
            .client
            .post(format!(
                "{}/callcontrol/{}/participants/{}/drop",
                self.host, device.dn, participant_id
            ))
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| DialError::Platform(format!("hangup: {e}")))?;
        if !resp.status().is_success() {
            return Err(DialError::Platform(format!(
                "hangup participant {participant_id}: {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn list_active_calls(&self, token: &str) -> Result<Vec<ActiveCallRecord>> {
        let resp = self
            .client
            .post(format!("{}/xapi/v1/ActiveCalls", self.host))
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| DialError::Platform(format!("active calls: {e}")))?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(DialError::AuthExpired);
        }
        if !resp.status().is_success() {
            return Err(DialError::Platform(format!("active calls: {}", resp.status())));
        }
        let calls: ODataValue<ActiveCallRecord> = resp
            .json()
            .await
            .map_err(|e| DialError::Platform(format!("active calls payload: {e}")))?;
        Ok(calls.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_device_takes_wqueue_first_device() {
        let owners: Vec<CallControlOwner> = serde_json::from_value(serde_json::json!([
            {"type": "Extension", "devices": [{"dn": "100", "device_id": "ext-dev"}]},
            {"type": "Wqueue", "devices": [
                {"dn": "801", "device_id": "q-dev-1"},
                {"dn": "801", "device_id": "q-dev-2"}
            ]}
        ]))
        .unwrap();
        let device = PbxClient::pick_device(owners).unwrap();
        assert_eq!(device.dn, "801");
        assert_eq!(device.device_id, "q-dev-1");
    }

    #[test]
    fn pick_device_requires_wqueue_owner() {
        let owners: Vec<CallControlOwner> = serde_json::from_value(serde_json::json!([
            {"type": "Extension", "devices": []}
        ]))
        .unwrap();
        assert!(matches!(PbxClient::pick_device(owners), Err(DialError::Platform(_))));
    }

    #[test]
    fn pick_device_requires_a_device() {
        let owners: Vec<CallControlOwner> =
            serde_json::from_value(serde_json::json!([{"type": "Wqueue", "devices": []}])).unwrap();
        assert!(matches!(PbxClient::pick_device(owners), Err(DialError::Platform(_))));
    }

    #[test]
    fn makecall_response_parses() {
        let resp: MakeCallResponse = serde_json::from_value(serde_json::json!({
            "result": {
                "id": 7001,
                "callid": 31337,
                "dn": "801",
                "device_id": "q-dev-1",
                "party_caller_id": "0900000000"
            }
        }))
        .unwrap();
        assert_eq!(resp.result.callid, 31337);
        assert_eq!(resp.result.id, 7001);
    }

    #[test]
    fn active_calls_payload_parses() {
        let calls: ODataValue<ActiveCallRecord> = serde_json::from_value(serde_json::json!({
            "value": [
                {"Id": 31337, "Status": "Talking", "LastChangeStatus": "2025-07-23T08:00:04Z"},
                {"Id": 31338, "Status": "Routing", "LastChangeStatus": null}
            ]
        }))
        .unwrap();
        assert_eq!(calls.value.len(), 2);
        assert!(calls.value[0].is_talking());
        assert!(!calls.value[1].is_talking());
    }
}
