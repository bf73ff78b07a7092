//! Host lifecycle: how an update request turns into persisted changes.
//!
//! Status only moves as the result of a provisioning attempt. Changing the
//! ssh user or port needs a fresh password, and any password triggers a new
//! key installation before anything is written.

use serde::Deserialize;
use std::fmt;

use crate::error::{FleetError, ProvisionError};
use crate::keys::KeyMaterial;
use crate::models::{GroupId, Host, HostGroup, HostId, HostStatus, SshAddress};
use crate::ssh::SshTarget;
use crate::validate::MAX_HOST_NAME_LEN;

/// Caller supplied update. Absent fields are left untouched.
#[derive(Clone, Default, Deserialize)]
pub struct HostUpdate {
    pub host_id: HostId,
    #[serde(default)]
    pub host_name: Option<String>,
    #[serde(default)]
    pub host_group_name: Option<String>,
    #[serde(default)]
    pub ssh_user: Option<String>,
    #[serde(default)]
    pub ssh_port: Option<u16>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub management: Option<bool>,
}

impl fmt::Debug for HostUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostUpdate")
            .field("host_id", &self.host_id)
            .field("host_name", &self.host_name)
            .field("host_group_name", &self.host_group_name)
            .field("ssh_user", &self.ssh_user)
            .field("ssh_port", &self.ssh_port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("management", &self.management)
            .finish()
    }
}

/// Field changes handed to the inventory. `pkey: Some(None)` clears the key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostChanges {
    pub host_name: Option<String>,
    pub host_group: Option<(GroupId, String)>,
    pub ssh_user: Option<String>,
    pub ssh_port: Option<u16>,
    pub management: Option<bool>,
    pub status: Option<HostStatus>,
    pub pkey: Option<Option<String>>,
}

impl HostChanges {
    pub fn is_empty(&self) -> bool {
        *self == HostChanges::default()
    }

    pub fn apply(&self, host: &mut Host) {
        if let Some(name) = &self.host_name {
            host.host_name = name.clone();
        }
        if let Some((group_id, group_name)) = &self.host_group {
            host.host_group_id = *group_id;
            host.host_group_name = group_name.clone();
        }
        if let Some(user) = &self.ssh_user {
            host.ssh_user = user.clone();
        }
        if let Some(port) = self.ssh_port {
            host.ssh_port = port;
        }
        if let Some(management) = self.management {
            host.management = management;
        }
        if let Some(status) = self.status {
            host.status = status;
        }
        if let Some(pkey) = &self.pkey {
            host.pkey = pkey.clone();
        }
    }

    /// Records the outcome of a re-provisioning attempt.
    pub fn record_provisioning(&mut self, outcome: &Result<KeyMaterial, ProvisionError>) {
        match outcome {
            Ok(keys) => {
                self.status = Some(HostStatus::Online);
                self.pkey = Some(Some(keys.private_key.clone()));
            }
            Err(_) => {
                self.status = Some(HostStatus::Unestablished);
                self.pkey = Some(None);
            }
        }
    }
}

/// Key installation the update needs before it is persisted.
pub struct Reprovision {
    pub target: SshTarget,
    pub password: String,
}

pub struct UpdatePlan {
    pub host_id: HostId,
    pub changes: HostChanges,
    pub reprovision: Option<Reprovision>,
}

/// Checks an update against the owner's inventory and works out what to
/// write and whether the key must be reinstalled. No I/O.
pub fn plan_update(
    update: HostUpdate,
    hosts: &[Host],
    groups: &[HostGroup],
) -> Result<UpdatePlan, FleetError> {
    let current = hosts
        .iter()
        .find(|h| h.host_id == Some(update.host_id))
        .ok_or_else(|| FleetError::NoData(format!("host id {} is not in inventory", update.host_id)))?;
    let others = || hosts.iter().filter(move |h| h.host_id != current.host_id);

    let mut changes = HostChanges::default();

    if let Some(name) = update.host_name {
        if name.is_empty()
            || name.chars().count() > MAX_HOST_NAME_LEN
            || name.chars().any(char::is_whitespace)
        {
            return Err(FleetError::Param("invalid field: host_name".into()));
        }
        if others().any(|h| h.host_name == name) {
            return Err(FleetError::Param("duplicate host name in inventory".into()));
        }
        changes.host_name = Some(name);
    }

    if let Some(group_name) = update.host_group_name {
        let group = groups
            .iter()
            .find(|g| g.host_group_name == group_name)
            .ok_or_else(|| FleetError::Param(format!("no host group named {}", group_name)))?;
        changes.host_group = Some((group.host_group_id, group_name));
    }

    if let Some(port) = update.ssh_port {
        if port == 0 {
            return Err(FleetError::Param("invalid field: ssh_port".into()));
        }
        let address = SshAddress::new(current.host_ip, port);
        if others().any(|h| h.address() == address) {
            return Err(FleetError::Param("duplicate host ssh address in inventory".into()));
        }
    }

    if let Some(user) = &update.ssh_user {
        if user.is_empty() {
            return Err(FleetError::Param("invalid field: ssh_user".into()));
        }
    }

    let password = update.password.filter(|p| !p.is_empty());
    let credentials_changed = update.ssh_user.is_some() || update.ssh_port.is_some();
    if credentials_changed && password.is_none() {
        return Err(FleetError::Param("please update password".into()));
    }

    changes.management = update.management;

    let reprovision = password.map(|password| {
        let user = update.ssh_user.clone().unwrap_or_else(|| current.ssh_user.clone());
        let port = update.ssh_port.unwrap_or(current.ssh_port);
        changes.ssh_user = Some(user.clone());
        changes.ssh_port = Some(port);
        Reprovision {
            target: SshTarget { address: SshAddress::new(current.host_ip, port), user },
            password,
        }
    });

    Ok(UpdatePlan { host_id: update.host_id, changes, reprovision })
}
