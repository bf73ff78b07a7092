//! SSH sessions to managed hosts.
//!
//! `SessionConnector::open` classifies failures into connectivity vs auth;
//! `RemoteSession::execute` never fails on a non-zero exit status, it only
//! reports it. `close` is idempotent and callers invoke it on every path.

use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

use crate::models::SshAddress;

/// Output of one remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_status: Option<u32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// Socket level: refused, unreachable, timed out, dropped.
    #[error("connectivity: {0}")]
    Connectivity(String),
    /// Handshake or credentials rejected.
    #[error("authentication: {0}")]
    Auth(String),
    /// Channel failed after the session was established.
    #[error("channel: {0}")]
    Channel(String),
}

/// Where and as whom to log in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub address: SshAddress,
    pub user: String,
}

#[async_trait]
pub trait RemoteSession: Send {
    async fn execute(&mut self, command: &str) -> Result<CommandOutput, SessionError>;

    /// Releases the connection. Safe to call more than once.
    async fn close(&mut self);
}

#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn open(
        &self,
        target: &SshTarget,
        password: &str,
    ) -> Result<Box<dyn RemoteSession>, SessionError>;
}

struct AcceptingHandler;

#[async_trait]
impl client::Handler for AcceptingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        // TODO: pin host keys in the inventory on first successful provisioning.
        Ok(true)
    }
}

/// Password-authenticated connector backed by russh.
#[derive(Debug, Clone)]
pub struct RusshConnector {
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl RusshConnector {
    pub fn new(connect_timeout: Duration, command_timeout: Duration) -> Self {
        Self { connect_timeout, command_timeout }
    }
}

fn classify_open_error(err: russh::Error) -> SessionError {
    match err {
        russh::Error::IO(e) => SessionError::Connectivity(e.to_string()),
        russh::Error::Disconnect | russh::Error::ConnectionTimeout => {
            SessionError::Connectivity(err.to_string())
        }
        other => SessionError::Auth(other.to_string()),
    }
}

fn classify_channel_error(err: russh::Error) -> SessionError {
    match err {
        russh::Error::IO(e) => SessionError::Connectivity(e.to_string()),
        russh::Error::Disconnect | russh::Error::ConnectionTimeout => {
            SessionError::Connectivity(err.to_string())
        }
        other => SessionError::Channel(other.to_string()),
    }
}

#[async_trait]
impl SessionConnector for RusshConnector {
    async fn open(
        &self,
        target: &SshTarget,
        password: &str,
    ) -> Result<Box<dyn RemoteSession>, SessionError> {
        let addr = target.address.socket_addr();
        let config = Arc::new(client::Config {
            inactivity_timeout: Some(self.command_timeout),
            ..Default::default()
        });

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| SessionError::Connectivity(format!("connection to {} timed out", addr)))?
            .map_err(|e| SessionError::Connectivity(e.to_string()))?;

        let mut handle = client::connect_stream(config, stream, AcceptingHandler)
            .await
            .map_err(classify_open_error)?;

        let authenticated = handle
            .authenticate_password(&target.user, password)
            .await
            .map_err(classify_open_error)?;
        if !authenticated {
            let _ = handle
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await;
            return Err(SessionError::Auth(format!(
                "password rejected for {}@{}",
                target.user, target.address
            )));
        }

        debug!("ssh session opened to {}@{}", target.user, target.address);
        Ok(Box::new(RusshSession {
            handle,
            command_timeout: self.command_timeout,
            closed: false,
        }))
    }
}

struct RusshSession {
    handle: client::Handle<AcceptingHandler>,
    command_timeout: Duration,
    closed: bool,
}

impl RusshSession {
    async fn run(&mut self, command: &str) -> Result<CommandOutput, SessionError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(classify_channel_error)?;
        channel
            .exec(true, command)
            .await
            .map_err(classify_channel_error)?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;

        loop {
            match channel.wait().await {
                Some(russh::ChannelMsg::Data { data }) => stdout.extend_from_slice(&data),
                Some(russh::ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(russh::ChannelMsg::ExitStatus { exit_status: status }) => {
                    exit_status = Some(status);
                }
                Some(russh::ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }

        Ok(CommandOutput {
            exit_status,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

#[async_trait]
impl RemoteSession for RusshSession {
    async fn execute(&mut self, command: &str) -> Result<CommandOutput, SessionError> {
        if self.closed {
            return Err(SessionError::Channel("session already closed".into()));
        }
        tokio::time::timeout(self.command_timeout, self.run(command))
            .await
            .map_err(|_| SessionError::Channel("command timed out".into()))?
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
        {
            debug!("ssh disconnect: {}", e);
        }
    }
}
