/*!
Test harness for the fleet kernel

Builds a `HostService` wired to scripted collaborators so a test can drive
onboarding, updates and telemetry end to end and then inspect what the
fakes saw.
*/

use anyhow::Result;
use fleet_kernel::inventory::InventoryStore;
use fleet_kernel::keys::{KeyError, KeyMaterial, KeyMaterialGenerator};
use fleet_kernel::models::{GroupId, HostCandidate, SshAddress};
use fleet_kernel::provision::{ProvisioningOrchestrator, DEFAULT_CHUNK_SIZE};
use fleet_kernel::telemetry::TelemetryFanout;
use fleet_kernel::HostService;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::agent_stub::ScriptedAgentClient;
use crate::ssh_stub::ScriptedConnector;
use crate::store_stub::{MemoryInventoryStore, ScriptedWorkflows};

pub const OWNER: &str = "admin";

/// Deterministic keys: `PRIVATE-<n>` / `ssh-ed25519 KEY<n> fleet@test`.
#[derive(Debug, Default)]
pub struct FixedKeys {
    issued: AtomicUsize,
}

impl FixedKeys {
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

impl KeyMaterialGenerator for FixedKeys {
    fn generate(&self) -> Result<KeyMaterial, KeyError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(KeyMaterial {
            private_key: format!("PRIVATE-{}", n),
            public_key: format!("ssh-ed25519 KEY{} fleet@test", n),
        })
    }
}

pub struct TestHarness {
    pub connector: ScriptedConnector,
    pub agents: ScriptedAgentClient,
    pub store: MemoryInventoryStore,
    pub workflows: ScriptedWorkflows,
    pub keys: Arc<FixedKeys>,
    chunk_size: usize,
    telemetry_timeout: Duration,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        tracing_subscriber::fmt().with_test_writer().try_init().ok();

        Self {
            connector: ScriptedConnector::new(),
            agents: ScriptedAgentClient::new(),
            store: MemoryInventoryStore::new(),
            workflows: ScriptedWorkflows::new(),
            keys: Arc::new(FixedKeys::default()),
            chunk_size: DEFAULT_CHUNK_SIZE,
            telemetry_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_connector(mut self, connector: ScriptedConnector) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_telemetry_timeout(mut self, timeout: Duration) -> Self {
        self.telemetry_timeout = timeout;
        self
    }

    /// Service over the harness fakes. Cheap; build one per call if needed.
    pub fn service(&self) -> HostService {
        let orchestrator = ProvisioningOrchestrator::new(Arc::new(self.connector.clone()), self.keys.clone())
            .with_chunk_size(self.chunk_size);
        let telemetry = TelemetryFanout::new(Arc::new(self.agents.clone())).with_timeout(self.telemetry_timeout);
        HostService::new(
            Arc::new(self.store.clone()),
            Arc::new(self.workflows.clone()),
            orchestrator,
            telemetry,
        )
    }

    pub async fn seed_group(&self, name: &str) -> Result<GroupId> {
        Ok(self.store.insert_group(OWNER, name, "").await?)
    }
}

pub fn ip(text: &str) -> IpAddr {
    text.parse().unwrap_or(IpAddr::from([0, 0, 0, 0]))
}

pub fn address(text: &str, port: u16) -> SshAddress {
    SshAddress::new(ip(text), port)
}

/// Candidate in group `web` with password `pw`.
pub fn candidate(name: &str, host_ip: &str) -> HostCandidate {
    HostCandidate {
        host_name: name.to_string(),
        host_ip: ip(host_ip),
        ssh_port: 22,
        ssh_user: "root".to_string(),
        password: "pw".to_string(),
        host_group_name: "web".to_string(),
        management: false,
    }
}
