/**
 * INVENTORY - Persistence seam for hosts and host groups
 *
 * ROLE:
 * Everything the kernel reads or writes about the fleet goes through
 * `InventoryStore`. Every call is scoped to one owner. Errors are
 * `StoreError` and abort the request that hit them.
 *
 * ALSO:
 * `WorkflowChecker` answers whether a host is referenced by a running
 * external workflow; only the delete path consults it.
 */

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;

use crate::error::StoreError;
use crate::lifecycle::HostChanges;
use crate::models::{GroupId, Host, HostGroup, HostId};

mod json_store;

pub use json_store::JsonInventoryStore;

#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Snapshot of every host and group the owner can see.
    async fn hosts_and_groups(&self, owner: &str) -> Result<(Vec<Host>, Vec<HostGroup>), StoreError>;

    async fn insert_host(&self, host: Host) -> Result<HostId, StoreError>;

    /// All or nothing: on error no host of the batch is stored.
    async fn insert_hosts(&self, hosts: Vec<Host>) -> Result<Vec<HostId>, StoreError>;

    async fn update_host(&self, owner: &str, host_id: HostId, changes: HostChanges) -> Result<(), StoreError>;

    /// Agent addresses for the ids the owner actually has. Unknown ids are absent.
    async fn addresses(&self, owner: &str, host_ids: &[HostId]) -> Result<HashMap<HostId, IpAddr>, StoreError>;

    /// Returns the ids that were removed.
    async fn delete_hosts(&self, owner: &str, host_ids: &[HostId]) -> Result<Vec<HostId>, StoreError>;

    async fn insert_group(&self, owner: &str, name: &str, description: &str) -> Result<GroupId, StoreError>;

    /// Removes the named groups that own no host. Returns the removed names.
    async fn delete_groups(&self, owner: &str, names: &[String]) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
pub trait WorkflowChecker: Send + Sync {
    /// `true` for every host currently referenced by an active workflow.
    async fn hosts_in_active_workflow(&self, host_ids: &[HostId]) -> Result<HashMap<HostId, bool>, StoreError>;
}

/// Used when no workflow engine is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoActiveWorkflows;

#[async_trait]
impl WorkflowChecker for NoActiveWorkflows {
    async fn hosts_in_active_workflow(&self, host_ids: &[HostId]) -> Result<HashMap<HostId, bool>, StoreError> {
        Ok(host_ids.iter().map(|id| (*id, false)).collect())
    }
}
