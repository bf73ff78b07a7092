//! Telemetry fan-out across the fleet.
//!
//! One request per host to its local agent, all in flight at once (these are
//! short HTTP calls, not SSH sessions). Whatever happens to individual agents,
//! the output holds exactly one record per requested host id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::models::{HostId, HostInfo, InfoCategory, TelemetryRecord};

pub const DEFAULT_AGENT_PORT: u16 = 12000;
pub const DEFAULT_TELEMETRY_TIMEOUT: Duration = Duration::from_secs(5);
pub const AGENT_INFO_PATH: &str = "/v1/agent/host/info";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TelemetryError {
    #[error("agent did not answer within {0:?}")]
    Timeout(Duration),
    #[error("transport: {0}")]
    Transport(String),
    #[error("agent answered with status {0}")]
    AgentStatus(String),
    #[error("malformed agent payload: {0}")]
    Payload(String),
}

/// Where a host's agent listens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentEndpoint {
    pub ip: IpAddr,
    pub port: u16,
}

/// Request body understood by `fleet-agent`.
#[derive(Debug, Serialize)]
struct AgentInfoRequest<'a> {
    info_type: &'a [InfoCategory],
}

/// Response body sent by `fleet-agent`.
#[derive(Debug, Deserialize)]
struct AgentInfoResponse {
    status: String,
    #[serde(default)]
    host_info: Option<HostInfo>,
    #[serde(default)]
    message: Option<String>,
}

#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn fetch_host_info(
        &self,
        endpoint: AgentEndpoint,
        categories: &[InfoCategory],
    ) -> Result<HostInfo, TelemetryError>;
}

/// HTTP client for the agent endpoint.
#[derive(Debug, Clone)]
pub struct HttpAgentClient {
    client: reqwest::Client,
    scheme: String,
}

impl HttpAgentClient {
    pub fn new(timeout: Duration, scheme: impl Into<String>) -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TelemetryError::Transport(e.to_string()))?;
        Ok(Self { client, scheme: scheme.into() })
    }

    fn url(&self, endpoint: AgentEndpoint) -> String {
        let host = match endpoint.ip {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => format!("[{}]", v6),
        };
        format!("{}://{}:{}{}", self.scheme, host, endpoint.port, AGENT_INFO_PATH)
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn fetch_host_info(
        &self,
        endpoint: AgentEndpoint,
        categories: &[InfoCategory],
    ) -> Result<HostInfo, TelemetryError> {
        let response = self
            .client
            .post(self.url(endpoint))
            .json(&AgentInfoRequest { info_type: categories })
            .send()
            .await
            .map_err(|e| TelemetryError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TelemetryError::AgentStatus(response.status().to_string()));
        }

        let body: AgentInfoResponse = response
            .json()
            .await
            .map_err(|e| TelemetryError::Payload(e.to_string()))?;

        if body.status != "succeeded" {
            return Err(TelemetryError::AgentStatus(
                body.message.unwrap_or(body.status),
            ));
        }
        body.host_info
            .ok_or_else(|| TelemetryError::Payload("missing host_info".into()))
    }
}

#[derive(Clone)]
pub struct TelemetryFanout {
    client: Arc<dyn AgentClient>,
    agent_port: u16,
    timeout: Duration,
}

impl TelemetryFanout {
    pub fn new(client: Arc<dyn AgentClient>) -> Self {
        Self {
            client,
            agent_port: DEFAULT_AGENT_PORT,
            timeout: DEFAULT_TELEMETRY_TIMEOUT,
        }
    }

    pub fn with_agent_port(mut self, port: u16) -> Self {
        self.agent_port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Polls every resolvable host. `addresses` comes from the inventory and
    /// may lack some of `host_ids`; those get empty records.
    pub async fn collect(
        &self,
        host_ids: &[HostId],
        addresses: &HashMap<HostId, IpAddr>,
        filter: &[InfoCategory],
    ) -> Vec<TelemetryRecord> {
        let requested = unique_ids(host_ids);
        if addresses.is_empty() {
            debug!("no agent address resolved, returning {} empty records", requested.len());
            return requested.into_iter().map(TelemetryRecord::empty).collect();
        }

        let categories: Arc<[InfoCategory]> = InfoCategory::resolve(filter).into();
        let mut tasks = JoinSet::new();

        for host_id in &requested {
            let Some(ip) = addresses.get(host_id).copied() else { continue };
            let client = Arc::clone(&self.client);
            let categories = Arc::clone(&categories);
            let endpoint = AgentEndpoint { ip, port: self.agent_port };
            let timeout = self.timeout;
            let host_id = *host_id;

            tasks.spawn(async move {
                let fetched = tokio::time::timeout(timeout, client.fetch_host_info(endpoint, &categories))
                    .await
                    .unwrap_or(Err(TelemetryError::Timeout(timeout)));
                match fetched {
                    Ok(host_info) => TelemetryRecord { host_id, host_info },
                    Err(e) => {
                        warn!("telemetry for host {} at {}: {}", host_id, endpoint.ip, e);
                        TelemetryRecord::empty(host_id)
                    }
                }
            });
        }

        let mut results = Vec::with_capacity(requested.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(record) => results.push(record),
                Err(e) => warn!("telemetry task aborted: {}", e),
            }
        }

        let records = fill_gaps(&requested, results);
        let populated = records.iter().filter(|r| !r.host_info.is_empty()).count();
        info!("telemetry collected for {}/{} hosts", populated, records.len());
        records
    }
}

fn unique_ids(host_ids: &[HostId]) -> Vec<HostId> {
    let mut seen = HashSet::new();
    host_ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Keeps the populated records and appends an empty one for every other
/// requested id, so the output id set equals the requested id set.
pub fn fill_gaps(requested: &[HostId], results: Vec<TelemetryRecord>) -> Vec<TelemetryRecord> {
    let wanted: HashSet<HostId> = requested.iter().copied().collect();
    let mut answered = HashSet::new();
    let mut records: Vec<TelemetryRecord> = results
        .into_iter()
        .filter(|r| !r.host_info.is_empty() && wanted.contains(&r.host_id))
        .filter(|r| answered.insert(r.host_id))
        .collect();

    records.extend(
        requested
            .iter()
            .filter(|id| !answered.contains(*id))
            .map(|id| TelemetryRecord::empty(*id)),
    );
    records
}
