/**
 * PROVISIONING ORCHESTRATOR - Installs access keys on many hosts at once
 *
 * ROLE:
 * Takes validated `(host, password)` pairs and returns exactly one host per
 * pair: ONLINE with a `pkey`, or UNESTABLISHED without one.
 *
 * CONCURRENCY:
 * - Input split into consecutive chunks (30 by default)
 * - One tokio task per pair inside a chunk, joined before the next chunk
 * - Each task owns its inputs and writes to its own result slot
 */

use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::ProvisionError;
use crate::keys::{KeyMaterial, KeyMaterialGenerator};
use crate::models::{Host, HostStatus};
use crate::ssh::{SessionConnector, SessionError, SshTarget};

pub const DEFAULT_CHUNK_SIZE: usize = 30;

/// A validated host waiting for its key, with the password it will consume.
pub struct ProvisionRequest {
    pub host: Host,
    pub password: String,
}

/// Result of one provisioning attempt.
#[derive(Debug, Clone)]
pub struct Provisioned {
    pub host: Host,
    pub error: Option<ProvisionError>,
}

impl Provisioned {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Shell sequence creating `~/.ssh` (700), appending the key, and setting
/// `authorized_keys` to 600.
pub fn authorized_keys_command(public_key: &str) -> String {
    format!(
        "mkdir -p -m 700 ~/.ssh && echo {} >> ~/.ssh/authorized_keys && chmod 600 ~/.ssh/authorized_keys",
        shell_words::quote(public_key)
    )
}

/// Applies the outcome of a provisioning attempt to a host.
pub fn apply_outcome(host: &mut Host, outcome: &Result<KeyMaterial, ProvisionError>) {
    match outcome {
        Ok(keys) => {
            host.status = HostStatus::Online;
            host.pkey = Some(keys.private_key.clone());
        }
        Err(_) => {
            host.status = HostStatus::Unestablished;
            host.pkey = None;
        }
    }
}

#[derive(Clone)]
pub struct ProvisioningOrchestrator {
    connector: Arc<dyn SessionConnector>,
    keys: Arc<dyn KeyMaterialGenerator>,
    chunk_size: usize,
}

impl ProvisioningOrchestrator {
    pub fn new(connector: Arc<dyn SessionConnector>, keys: Arc<dyn KeyMaterialGenerator>) -> Self {
        Self { connector, keys, chunk_size: DEFAULT_CHUNK_SIZE }
    }

    /// Caps the number of SSH sessions in flight. Zero is treated as one.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Generates a key pair and installs its public half on one host.
    /// The session is closed on every path once it is open.
    pub async fn install_key(
        &self,
        target: &SshTarget,
        password: &str,
    ) -> Result<KeyMaterial, ProvisionError> {
        install_key(self.connector.as_ref(), self.keys.as_ref(), target, password).await
    }

    /// Provisions every request, chunk after chunk. Output order matches input.
    pub async fn provision(&self, requests: Vec<ProvisionRequest>) -> Vec<Provisioned> {
        let total = requests.len();
        let mut results = Vec::with_capacity(total);
        let mut pending = requests.into_iter().peekable();
        let mut chunk_index = 0usize;

        while pending.peek().is_some() {
            let chunk: Vec<ProvisionRequest> = pending.by_ref().take(self.chunk_size).collect();
            debug!("provisioning chunk {} ({} hosts)", chunk_index, chunk.len());
            results.extend(self.provision_chunk(chunk).await);
            chunk_index += 1;
        }

        let online = results.iter().filter(|r| r.succeeded()).count();
        info!("provisioned {} hosts: {} online, {} unestablished", total, online, total - online);
        results
    }

    async fn provision_chunk(&self, chunk: Vec<ProvisionRequest>) -> Vec<Provisioned> {
        // Kept so a task that dies still yields its host.
        let originals: Vec<Host> = chunk.iter().map(|r| r.host.clone()).collect();
        let mut slots: Vec<Option<Provisioned>> = vec![None; chunk.len()];
        let mut tasks = JoinSet::new();

        for (slot, request) in chunk.into_iter().enumerate() {
            let connector = Arc::clone(&self.connector);
            let keys = Arc::clone(&self.keys);
            tasks.spawn(async move {
                let ProvisionRequest { mut host, password } = request;
                let target = SshTarget { address: host.address(), user: host.ssh_user.clone() };
                let outcome = install_key(connector.as_ref(), keys.as_ref(), &target, &password).await;
                drop(password);
                apply_outcome(&mut host, &outcome);
                (slot, Provisioned { host, error: outcome.err() })
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, provisioned)) => slots[slot] = Some(provisioned),
                Err(e) => warn!("provisioning task aborted: {}", e),
            }
        }

        slots
            .into_iter()
            .zip(originals)
            .map(|(slot, original)| {
                slot.unwrap_or_else(|| Provisioned {
                    host: Host { status: HostStatus::Unestablished, pkey: None, ..original },
                    error: Some(ProvisionError::Connectivity("provisioning task aborted".into())),
                })
            })
            .collect()
    }
}

async fn install_key(
    connector: &dyn SessionConnector,
    keys: &dyn KeyMaterialGenerator,
    target: &SshTarget,
    password: &str,
) -> Result<KeyMaterial, ProvisionError> {
    let material = keys.generate().map_err(|e| {
        warn!("no key material for {}: {}", target.address, e);
        ProvisionError::from(e)
    })?;
    let command = authorized_keys_command(&material.public_key);

    let mut session = connector.open(target, password).await.map_err(|e| {
        warn!("cannot open ssh session to {}: {}", target.address, e);
        match e {
            SessionError::Auth(msg) => ProvisionError::Auth(msg),
            SessionError::Connectivity(msg) | SessionError::Channel(msg) => {
                ProvisionError::Connectivity(msg)
            }
        }
    })?;

    let executed = session.execute(&command).await;
    session.close().await;

    let output = executed.map_err(|e| {
        warn!("key installation on {} interrupted: {}", target.address, e);
        match e {
            SessionError::Connectivity(msg) => ProvisionError::Connectivity(msg),
            SessionError::Auth(msg) => ProvisionError::Auth(msg),
            SessionError::Channel(msg) => ProvisionError::RemoteExecution { exit_status: None, stderr: msg },
        }
    })?;

    if !output.success() {
        warn!(
            "saving public key on {} failed (exit status {:?}): {}",
            target.address,
            output.exit_status,
            output.stderr.trim()
        );
        return Err(ProvisionError::RemoteExecution {
            exit_status: output.exit_status,
            stderr: output.stderr,
        });
    }
    if !output.stderr.trim().is_empty() {
        debug!("key installed on {} with stderr: {}", target.address, output.stderr.trim());
    }
    Ok(material)
}
