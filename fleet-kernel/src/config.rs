use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

use crate::provision::DEFAULT_CHUNK_SIZE;
use crate::telemetry::DEFAULT_AGENT_PORT;

pub const CONFIG_ENV: &str = "FLEET_KERNEL_CONFIG";
pub const API_KEY_ENV: &str = "FLEET_API_KEY";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct KernelConfig {
    pub http: HttpConf,
    pub inventory: InventoryConf,
    pub provisioning: ProvisioningConf,
    pub telemetry: TelemetryConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct InventoryConf {
    pub data_file: String,
}

impl Default for InventoryConf {
    fn default() -> Self {
        Self { data_file: "./data/inventory.json".into() }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ProvisioningConf {
    pub chunk_size: usize,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub key_comment: String, // ends up as the third field of the authorized_keys line
}

impl Default for ProvisioningConf {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout_secs: 10,
            command_timeout_secs: 30,
            key_comment: "fleet-kernel".into(),
        }
    }
}

impl ProvisioningConf {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryConf {
    pub agent_port: u16,
    pub timeout_secs: u64,
    pub scheme: String,
}

impl Default for TelemetryConf {
    fn default() -> Self {
        Self { agent_port: DEFAULT_AGENT_PORT, timeout_secs: 5, scheme: "http".into() }
    }
}

impl TelemetryConf {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Parses a YAML document, falling back to defaults on empty or invalid input.
pub fn parse_config(txt: &str) -> KernelConfig {
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }
    serde_yaml::from_str(txt).unwrap_or_else(|e| {
        warn!("invalid kernel config: {e}");
        KernelConfig::default()
    })
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "kernel.yaml".into());
    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        parse_config(&txt)
    } else {
        info!("no {path}, using default config");
        KernelConfig::default()
    }
}
