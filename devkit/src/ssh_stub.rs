/*!
Scripted SSH connector

Stands in for `RusshConnector` without any network. Each ssh address can be
given a `Script`; unscripted addresses accept the login and run the command
successfully. Counts opens, closes and the peak number of live sessions.
*/

use async_trait::async_trait;
use fleet_kernel::models::SshAddress;
use fleet_kernel::ssh::{CommandOutput, RemoteSession, SessionConnector, SessionError, SshTarget};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How a scripted host behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    Succeed,
    /// TCP level failure on open.
    Refuse,
    /// Login rejected.
    RejectPassword,
    /// Command runs but exits non-zero.
    FailCommand { exit_status: u32, stderr: String },
    /// Connection drops while the command runs.
    DropMidCommand,
}

#[derive(Debug, Default)]
struct Counters {
    opens: AtomicUsize,
    closes: AtomicUsize,
    live: AtomicUsize,
    peak: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct ScriptedConnector {
    scripts: Arc<Mutex<HashMap<SshAddress, Script>>>,
    passwords: Arc<Mutex<HashMap<SshAddress, String>>>,
    commands: Arc<Mutex<Vec<(SshAddress, String)>>>,
    counters: Arc<Counters>,
    latency: Duration,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each session holds for `latency` while executing, so concurrent
    /// sessions overlap and show up in `peak_sessions`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn script(&self, address: SshAddress, script: Script) -> &Self {
        self.scripts.lock().insert(address, script);
        self
    }

    /// Only `password` is accepted for `address` from now on.
    pub fn require_password(&self, address: SshAddress, password: &str) -> &Self {
        self.passwords.lock().insert(address, password.to_string());
        self
    }

    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub fn peak_sessions(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<(SshAddress, String)> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl SessionConnector for ScriptedConnector {
    async fn open(&self, target: &SshTarget, password: &str) -> Result<Box<dyn RemoteSession>, SessionError> {
        let script = self.scripts.lock().get(&target.address).cloned().unwrap_or(Script::Succeed);
        match script {
            Script::Refuse => return Err(SessionError::Connectivity(format!("{} refused", target.address))),
            Script::RejectPassword => return Err(SessionError::Auth(format!("{} denied", target.user))),
            _ => {}
        }
        if let Some(expected) = self.passwords.lock().get(&target.address) {
            if expected != password {
                return Err(SessionError::Auth(format!("{} denied", target.user)));
            }
        }

        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(live, Ordering::SeqCst);

        Ok(Box::new(ScriptedSession {
            address: target.address,
            script,
            latency: self.latency,
            commands: Arc::clone(&self.commands),
            counters: Arc::clone(&self.counters),
            closed: false,
        }))
    }
}

pub struct ScriptedSession {
    address: SshAddress,
    script: Script,
    latency: Duration,
    commands: Arc<Mutex<Vec<(SshAddress, String)>>>,
    counters: Arc<Counters>,
    closed: bool,
}

#[async_trait]
impl RemoteSession for ScriptedSession {
    async fn execute(&mut self, command: &str) -> Result<CommandOutput, SessionError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.commands.lock().push((self.address, command.to_string()));
        match &self.script {
            Script::FailCommand { exit_status, stderr } => Ok(CommandOutput {
                exit_status: Some(*exit_status),
                stdout: String::new(),
                stderr: stderr.clone(),
            }),
            Script::DropMidCommand => Err(SessionError::Channel("connection reset during exec".into())),
            _ => Ok(CommandOutput { exit_status: Some(0), stdout: String::new(), stderr: String::new() }),
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
    }
}
