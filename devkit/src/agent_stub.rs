/*!
Scripted agent client

Replaces `HttpAgentClient`. Unscripted agents answer with one small object
per requested category; scripted ones can hang, fail or answer empty.
*/

use async_trait::async_trait;
use fleet_kernel::models::{HostInfo, InfoCategory};
use fleet_kernel::telemetry::{AgentClient, AgentEndpoint, TelemetryError};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum AgentScript {
    Answer,
    /// Never answers within any sane timeout.
    Hang,
    Refuse,
    /// Reports success with an empty `host_info`.
    AnswerEmpty,
}

#[derive(Clone, Default)]
pub struct ScriptedAgentClient {
    scripts: Arc<Mutex<HashMap<IpAddr, AgentScript>>>,
    requests: Arc<Mutex<Vec<(AgentEndpoint, Vec<InfoCategory>)>>>,
}

impl ScriptedAgentClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, ip: IpAddr, script: AgentScript) -> &Self {
        self.scripts.lock().insert(ip, script);
        self
    }

    pub fn requests(&self) -> Vec<(AgentEndpoint, Vec<InfoCategory>)> {
        self.requests.lock().clone()
    }
}

/// What an unscripted agent returns for `categories`.
pub fn sample_host_info(categories: &[InfoCategory]) -> HostInfo {
    let mut info = HostInfo::new();
    for category in categories {
        let (key, value) = match category {
            InfoCategory::Cpu => ("cpu", json!({ "logical_cores": 4, "percent": 12.5 })),
            InfoCategory::Os => ("os", json!({ "name": "Linux", "kernel": "6.1.0" })),
            InfoCategory::Memory => ("memory", json!({ "total_mb": 8192, "used_mb": 2048 })),
            InfoCategory::Disk => ("disk", json!([{ "mount_point": "/", "total_gb": 100.0 }])),
        };
        info.insert(key.to_string(), value);
    }
    info
}

#[async_trait]
impl AgentClient for ScriptedAgentClient {
    async fn fetch_host_info(
        &self,
        endpoint: AgentEndpoint,
        categories: &[InfoCategory],
    ) -> Result<HostInfo, TelemetryError> {
        self.requests.lock().push((endpoint, categories.to_vec()));
        let script = self.scripts.lock().get(&endpoint.ip).cloned().unwrap_or(AgentScript::Answer);
        match script {
            AgentScript::Answer => Ok(sample_host_info(categories)),
            AgentScript::AnswerEmpty => Ok(HostInfo::new()),
            AgentScript::Refuse => Err(TelemetryError::Transport(format!("{} refused", endpoint.ip))),
            AgentScript::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(TelemetryError::Timeout(Duration::from_secs(24 * 3600)))
            }
        }
    }
}
