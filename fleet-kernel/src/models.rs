//! Fleet data model: hosts, groups, onboarding candidates and the per-item
//! records returned by batch operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

pub type HostId = u64;
pub type GroupId = u64;

/// Free-form telemetry returned by an agent, keyed by info category.
pub type HostInfo = serde_json::Map<String, serde_json::Value>;

/// Onboarding status of a host. Only a provisioning attempt moves it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostStatus {
    #[default]
    Unestablished,
    Online,
}

/// `(host_ip, ssh_port)`, unique across the hosts of one owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SshAddress {
    pub ip: IpAddr,
    pub port: u16,
}

impl SshAddress {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl fmt::Display for SshAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// A managed host as stored in the inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    /// Assigned by the inventory on insert.
    pub host_id: Option<HostId>,
    pub host_name: String,
    pub host_ip: IpAddr,
    pub ssh_port: u16,
    pub ssh_user: String,
    pub host_group_id: GroupId,
    pub host_group_name: String,
    pub management: bool,
    pub status: HostStatus,
    /// Private key installed during provisioning, `None` until it succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkey: Option<String>,
    pub owner: String,
}

impl Host {
    /// A freshly described host: not yet stored, not yet provisioned.
    pub fn unestablished(candidate: &HostCandidate, group_id: GroupId, owner: &str) -> Self {
        Self {
            host_id: None,
            host_name: candidate.host_name.clone(),
            host_ip: candidate.host_ip,
            ssh_port: candidate.ssh_port,
            ssh_user: candidate.ssh_user.clone(),
            host_group_id: group_id,
            host_group_name: candidate.host_group_name.clone(),
            management: candidate.management,
            status: HostStatus::Unestablished,
            pkey: None,
            owner: owner.to_string(),
        }
    }

    pub fn address(&self) -> SshAddress {
        SshAddress::new(self.host_ip, self.ssh_port)
    }

    /// Copy safe to hand out to API callers.
    pub fn without_pkey(&self) -> Self {
        Self { pkey: None, ..self.clone() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostGroup {
    pub host_group_id: GroupId,
    pub host_group_name: String,
    pub description: String,
    pub owner: String,
}

/// Group as listed to callers; `host_count` is recomputed on every read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostGroupView {
    pub host_group_id: GroupId,
    pub host_group_name: String,
    pub description: String,
    pub host_count: usize,
}

/// One host submitted for onboarding, password included.
#[derive(Clone, Deserialize)]
pub struct HostCandidate {
    pub host_name: String,
    pub host_ip: IpAddr,
    pub ssh_port: u16,
    pub ssh_user: String,
    pub password: String,
    pub host_group_name: String,
    #[serde(default)]
    pub management: bool,
}

impl HostCandidate {
    pub fn address(&self) -> SshAddress {
        SshAddress::new(self.host_ip, self.ssh_port)
    }
}

impl fmt::Debug for HostCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCandidate")
            .field("host_name", &self.host_name)
            .field("host_ip", &self.host_ip)
            .field("ssh_port", &self.ssh_port)
            .field("ssh_user", &self.ssh_user)
            .field("password", &"<redacted>")
            .field("host_group_name", &self.host_group_name)
            .field("management", &self.management)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Succeeded,
    Failed,
}

/// Per-candidate line of a batch add. One per submitted candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddHostResult {
    pub host_name: String,
    pub host_ip: IpAddr,
    pub ssh_port: u16,
    pub ssh_user: String,
    pub host_group_name: String,
    pub management: bool,
    pub result: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Status the host was registered with, when it was registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<HostStatus>,
}

impl AddHostResult {
    pub fn failed(candidate: &HostCandidate, reason: impl Into<String>) -> Self {
        Self {
            host_name: candidate.host_name.clone(),
            host_ip: candidate.host_ip,
            ssh_port: candidate.ssh_port,
            ssh_user: candidate.ssh_user.clone(),
            host_group_name: candidate.host_group_name.clone(),
            management: candidate.management,
            result: Outcome::Failed,
            reason: Some(reason.into()),
            status: None,
        }
    }

    pub fn registered(host: &Host, note: Option<String>) -> Self {
        Self {
            host_name: host.host_name.clone(),
            host_ip: host.host_ip,
            ssh_port: host.ssh_port,
            ssh_user: host.ssh_user.clone(),
            host_group_name: host.host_group_name.clone(),
            management: host.management,
            result: Outcome::Succeeded,
            reason: note,
            status: Some(host.status),
        }
    }
}

/// Telemetry for one requested host id; `host_info` is empty on any failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub host_id: HostId,
    pub host_info: HostInfo,
}

impl TelemetryRecord {
    pub fn empty(host_id: HostId) -> Self {
        Self { host_id, host_info: HostInfo::new() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfoCategory {
    Cpu,
    Os,
    Memory,
    Disk,
}

impl InfoCategory {
    pub const ALL: [InfoCategory; 4] = [
        InfoCategory::Cpu,
        InfoCategory::Os,
        InfoCategory::Memory,
        InfoCategory::Disk,
    ];

    /// An empty filter asks for every category.
    pub fn resolve(filter: &[InfoCategory]) -> Vec<InfoCategory> {
        if filter.is_empty() {
            Self::ALL.to_vec()
        } else {
            filter.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> HostCandidate {
        HostCandidate {
            host_name: "web-01".into(),
            host_ip: "10.0.0.5".parse().unwrap(),
            ssh_port: 22,
            ssh_user: "root".into(),
            password: "hunter2".into(),
            host_group_name: "web".into(),
            management: false,
        }
    }

    #[test]
    fn test_candidate_debug_hides_password() {
        let out = format!("{:?}", candidate());
        assert!(!out.contains("hunter2"));
        assert!(out.contains("<redacted>"));
    }

    #[test]
    fn test_new_host_starts_unestablished() {
        let host = Host::unestablished(&candidate(), 3, "admin");
        assert_eq!(host.status, HostStatus::Unestablished);
        assert!(host.pkey.is_none());
        assert!(host.host_id.is_none());
        assert_eq!(host.address().to_string(), "10.0.0.5:22");
    }

    #[test]
    fn test_ipv6_address_display() {
        let addr = SshAddress::new("fe80::1".parse().unwrap(), 2222);
        assert_eq!(addr.to_string(), "[fe80::1]:2222");
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&HostStatus::Unestablished).unwrap();
        assert_eq!(json, "\"UNESTABLISHED\"");
    }

    #[test]
    fn test_empty_filter_means_all_categories() {
        assert_eq!(InfoCategory::resolve(&[]).len(), 4);
        assert_eq!(InfoCategory::resolve(&[InfoCategory::Os]), vec![InfoCategory::Os]);
    }
}
