/*!
In-memory inventory and workflow checker

`MemoryInventoryStore` follows the same contract as `JsonInventoryStore`
(owner scoping, id allocation, unique names and addresses, all-or-nothing
batch insert) and can be told to fail reads or writes. `ScriptedWorkflows`
marks chosen hosts as busy.
*/

use async_trait::async_trait;
use fleet_kernel::error::StoreError;
use fleet_kernel::inventory::{InventoryStore, WorkflowChecker};
use fleet_kernel::lifecycle::HostChanges;
use fleet_kernel::models::{GroupId, Host, HostGroup, HostId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Tables {
    next_host_id: HostId,
    next_group_id: GroupId,
    hosts: BTreeMap<HostId, Host>,
    groups: BTreeMap<GroupId, HostGroup>,
}

impl Tables {
    /// `pending` holds hosts of the same insert not yet stored.
    fn check_unique(&self, host: &Host, pending: &[Host]) -> Result<(), StoreError> {
        let clash = |other: &Host| {
            other.owner == host.owner && (other.host_name == host.host_name || other.address() == host.address())
        };
        let stored_clash = self.hosts.values().filter(|h| h.host_id != host.host_id).any(|h| clash(h));
        if stored_clash || pending.iter().any(|h| clash(h)) {
            return Err(StoreError::Conflict(format!(
                "host {} or address {} already exists",
                host.host_name,
                host.address()
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryInventoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every stored host regardless of owner, `pkey` included.
    pub fn all_hosts(&self) -> Vec<Host> {
        self.tables.lock().hosts.values().cloned().collect()
    }

    pub fn host_by_name(&self, name: &str) -> Option<Host> {
        self.tables.lock().hosts.values().find(|h| h.host_name == name).cloned()
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Connect("scripted read failure".into()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write("scripted write failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for MemoryInventoryStore {
    async fn hosts_and_groups(&self, owner: &str) -> Result<(Vec<Host>, Vec<HostGroup>), StoreError> {
        self.check_read()?;
        let tables = self.tables.lock();
        Ok((
            tables.hosts.values().filter(|h| h.owner == owner).cloned().collect(),
            tables.groups.values().filter(|g| g.owner == owner).cloned().collect(),
        ))
    }

    async fn insert_host(&self, host: Host) -> Result<HostId, StoreError> {
        let mut ids = self.insert_hosts(vec![host]).await?;
        ids.pop().ok_or_else(|| StoreError::Write("insert returned no id".into()))
    }

    async fn insert_hosts(&self, hosts: Vec<Host>) -> Result<Vec<HostId>, StoreError> {
        self.check_write()?;
        let mut tables = self.tables.lock();
        if let Some(orphan) = hosts.iter().find(|h| !tables.groups.contains_key(&h.host_group_id)) {
            return Err(StoreError::Write(format!("host group {} does not exist", orphan.host_group_id)));
        }
        for (index, host) in hosts.iter().enumerate() {
            tables.check_unique(host, &hosts[..index])?;
        }
        let mut ids = Vec::with_capacity(hosts.len());
        for mut host in hosts {
            tables.next_host_id += 1;
            let id = tables.next_host_id;
            host.host_id = Some(id);
            tables.hosts.insert(id, host);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn update_host(&self, owner: &str, host_id: HostId, changes: HostChanges) -> Result<(), StoreError> {
        self.check_write()?;
        let mut tables = self.tables.lock();
        let Some(mut updated) = tables.hosts.get(&host_id).filter(|h| h.owner == owner).cloned() else {
            return Err(StoreError::Write(format!("host {} not found", host_id)));
        };
        changes.apply(&mut updated);
        tables.check_unique(&updated, &[])?;
        tables.hosts.insert(host_id, updated);
        Ok(())
    }

    async fn addresses(&self, owner: &str, host_ids: &[HostId]) -> Result<HashMap<HostId, IpAddr>, StoreError> {
        self.check_read()?;
        let tables = self.tables.lock();
        Ok(host_ids
            .iter()
            .filter_map(|id| tables.hosts.get(id).filter(|h| h.owner == owner).map(|h| (*id, h.host_ip)))
            .collect())
    }

    async fn delete_hosts(&self, owner: &str, host_ids: &[HostId]) -> Result<Vec<HostId>, StoreError> {
        self.check_write()?;
        let mut tables = self.tables.lock();
        let removable: Vec<HostId> = host_ids
            .iter()
            .copied()
            .filter(|id| tables.hosts.get(id).is_some_and(|h| h.owner == owner))
            .collect();
        for id in &removable {
            tables.hosts.remove(id);
        }
        Ok(removable)
    }

    async fn insert_group(&self, owner: &str, name: &str, description: &str) -> Result<GroupId, StoreError> {
        self.check_write()?;
        let mut tables = self.tables.lock();
        if tables.groups.values().any(|g| g.owner == owner && g.host_group_name == name) {
            return Err(StoreError::Write(format!("host group {} already exists", name)));
        }
        tables.next_group_id += 1;
        let id = tables.next_group_id;
        tables.groups.insert(
            id,
            HostGroup {
                host_group_id: id,
                host_group_name: name.to_string(),
                description: description.to_string(),
                owner: owner.to_string(),
            },
        );
        Ok(id)
    }

    async fn delete_groups(&self, owner: &str, names: &[String]) -> Result<Vec<String>, StoreError> {
        self.check_write()?;
        let mut tables = self.tables.lock();
        let busy: HashSet<GroupId> = tables.hosts.values().map(|h| h.host_group_id).collect();
        let doomed: Vec<(GroupId, String)> = tables
            .groups
            .values()
            .filter(|g| g.owner == owner && names.contains(&g.host_group_name) && !busy.contains(&g.host_group_id))
            .map(|g| (g.host_group_id, g.host_group_name.clone()))
            .collect();
        for (id, _) in &doomed {
            tables.groups.remove(id);
        }
        Ok(doomed.into_iter().map(|(_, name)| name).collect())
    }
}

/// Workflow checker with a settable busy list.
#[derive(Clone, Default)]
pub struct ScriptedWorkflows {
    busy: Arc<Mutex<HashSet<HostId>>>,
}

impl ScriptedWorkflows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_busy(&self, host_id: HostId) {
        self.busy.lock().insert(host_id);
    }
}

#[async_trait]
impl WorkflowChecker for ScriptedWorkflows {
    async fn hosts_in_active_workflow(&self, host_ids: &[HostId]) -> Result<HashMap<HostId, bool>, StoreError> {
        let busy = self.busy.lock();
        Ok(host_ids.iter().map(|id| (*id, busy.contains(id))).collect())
    }
}
