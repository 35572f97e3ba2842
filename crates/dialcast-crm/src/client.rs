//! CRM client.
//!
//! Every request carries the `X-API-KEY` / `X-API-SECRET` header pair.
//! Endpoint map:
//! - `GET  /outbound` — dialable contacts for a call flow + project
//! - `PUT  /project/{p}/customer/{c}/callStatus` — call outcome
//! - `PUT  /project/{p}/auto-dial/{cf}/execute` — dial-flow executed stamp
//! - `PUT  /project/{p}/customer/{c}/dialUpdate` — retry marker
//! - `POST /project/customer/visit` — visit/interview record
//! - `GET|PUT /config/{name}` — named config-store payload (registry backup)

use async_trait::async_trait;
use serde::Deserialize;

use dialcast_core::config::CrmConfig;
use dialcast_core::error::{DialError, Result};
use dialcast_core::traits::CrmAdapter;
use dialcast_core::types::Contact;

pub struct CrmClient {
    host: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct OutboundList {
    #[serde(default)]
    list: Vec<OutboundRow>,
}

#[derive(Debug, Deserialize)]
struct OutboundRow {
    customer: OutboundCustomer,
}

#[derive(Debug, Deserialize)]
struct OutboundCustomer {
    id: String,
    phone: String,
}

#[derive(Debug, Deserialize)]
struct ConfigPayload {
    #[serde(rename = "confValue")]
    conf_value: String,
}

impl CrmClient {
    pub fn new(config: &CrmConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "X-API-KEY",
            config
                .api_key
                .parse()
                .map_err(|_| DialError::Config("CRM api_key is not a valid header value".into()))?,
        );
        headers.insert(
            "X-API-SECRET",
            config.api_secret.parse().map_err(|_| {
                DialError::Config("CRM api_secret is not a valid header value".into())
            })?,
        );
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| DialError::Config(format!("CRM client: {e}")))?;
        Ok(Self { host: config.host.trim_end_matches('/').to_string(), client })
    }

    fn parse_contacts(list: OutboundList) -> Vec<Contact> {
        list.list
            .into_iter()
            .map(|row| Contact { phone: row.customer.phone, customer_id: row.customer.id })
            .collect()
    }
}

#[async_trait]
impl CrmAdapter for CrmClient {
    async fn next_contacts(
        &self,
        call_flow_id: &str,
        project_id: &str,
        list_state: u8,
        limit: u32,
    ) -> Result<Vec<Contact>> {
        let resp = self
            .client
            .get(format!("{}/outbound", self.host))
            .query(&[
                ("callFlowIdOutbound", call_flow_id),
                ("projectIdOutbound", project_id),
                ("callStatus", &list_state.to_string()),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| DialError::Crm(format!("outbound list: {e}")))?;
        if !resp.status().is_success() {
            return Err(DialError::Crm(format!(
                "outbound list for {project_id}: {}",
                resp.status()
            )));
        }
        let list: OutboundList = resp
            .json()
            .await
            .map_err(|e| DialError::Crm(format!("outbound payload: {e}")))?;
        Ok(Self::parse_contacts(list))
    }

    async fn write_call_status(
        &self,
        project_id: &str,
        customer_id: &str,
        status_code: u8,
    ) -> Result<()> {
        let resp = self
            .client
            .put(format!(
                "{}/project/{}/customer/{}/callStatus",
                self.host, project_id, customer_id
            ))
            .json(&serde_json::json!({ "callStatus": status_code }))
            .send()
            .await
            .map_err(|e| DialError::Crm(format!("callStatus write: {e}")))?;
        if !resp.status().is_success() {
            return Err(DialError::Crm(format!(
                "callStatus write for {project_id}/{customer_id}: {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn mark_dial_executed(&self, project_id: &str, call_flow_id: &str) -> Result<()> {
        let resp = self
            .client
            .put(format!(
                "{}/project/{}/auto-dial/{}/execute",
                self.host, project_id, call_flow_id
            ))
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| DialError::Crm(format!("execute stamp: {e}")))?;
        if !resp.status().is_success() {
            return Err(DialError::Crm(format!(
                "execute stamp for {project_id}/{call_flow_id}: {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn write_dial_retry_marker(&self, project_id: &str, customer_id: &str) -> Result<()> {
        let resp = self
            .client
            .put(format!(
                "{}/project/{}/customer/{}/dialUpdate",
                self.host, project_id, customer_id
            ))
            .send()
            .await
            .map_err(|e| DialError::Crm(format!("dialUpdate: {e}")))?;
        if !resp.status().is_success() {
            return Err(DialError::Crm(format!(
                "dialUpdate for {project_id}/{customer_id}: {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn write_visit_record(
        &self,
        project_id: &str,
        customer_id: &str,
        outcome: &str,
        visited_at: &str,
    ) -> Result<()> {
        // Auto-dial visits are always "intro" visits recorded under the
        // admin account.
        let body = serde_json::json!({
            "projectId": project_id,
            "customerId": customer_id,
            "visitType": "intro",
            "visitedUsername": "admin",
            "visitedAt": visited_at,
            "description": outcome,
            "visitedResult": outcome,
        });
        let resp = self
            .client
            .post(format!("{}/project/customer/visit", self.host))
            .json(&body)
            .send()
            .await
            .map_err(|e| DialError::Crm(format!("visit record: {e}")))?;
        if !resp.status().is_success() {
            return Err(DialError::Crm(format!(
                "visit record for {project_id}/{customer_id}: {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn get_backup(&self, name: &str) -> Result<Option<String>> {
        let resp = self
            .client
            .get(format!("{}/config/{}", self.host, name))
            .send()
            .await
            .map_err(|e| DialError::Crm(format!("config read: {e}")))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(DialError::Crm(format!("config read {name}: {}", resp.status())));
        }
        let payload: ConfigPayload = resp
            .json()
            .await
            .map_err(|e| DialError::Crm(format!("config payload: {e}")))?;
        Ok(Some(payload.conf_value))
    }

    async fn put_backup(&self, name: &str, payload: &str) -> Result<()> {
        let resp = self
            .client
            .put(format!("{}/config/{}", self.host, name))
            .json(&serde_json::json!({ "confValue": payload }))
            .send()
            .await
            .map_err(|e| DialError::Crm(format!("config write: {e}")))?;
        if !resp.status().is_success() {
            return Err(DialError::Crm(format!("config write {name}: {}", resp.status())));
        }
        tracing::debug!("registry backup stored under config '{name}'");
        Ok(())
    }
}
