//! JSON file inventory. Whole document in memory, rewritten after each
//! mutation; a failed write rolls the in-memory state back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{error, info};

use super::InventoryStore;
use crate::error::StoreError;
use crate::lifecycle::HostChanges;
use crate::models::{GroupId, Host, HostGroup, HostId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Document {
    next_host_id: HostId,
    next_group_id: GroupId,
    hosts: BTreeMap<HostId, Host>,
    groups: BTreeMap<GroupId, HostGroup>,
}

impl Document {
    fn allocate_host_id(&mut self) -> HostId {
        self.next_host_id += 1;
        self.next_host_id
    }

    fn allocate_group_id(&mut self) -> GroupId {
        self.next_group_id += 1;
        self.next_group_id
    }

    fn owned_host(&self, owner: &str, host_id: HostId) -> Option<&Host> {
        self.hosts.get(&host_id).filter(|h| h.owner == owner)
    }

    /// Refuses `host` when another host of its owner has the same name or
    /// ssh address.
    fn check_unique(&self, host: &Host) -> Result<(), StoreError> {
        let taken = self.hosts.values().any(|other| {
            other.owner == host.owner
                && other.host_id != host.host_id
                && (other.host_name == host.host_name || other.address() == host.address())
        });
        if taken {
            return Err(StoreError::Conflict(format!(
                "host {} or address {} already exists",
                host.host_name,
                host.address()
            )));
        }
        Ok(())
    }
}

pub struct JsonInventoryStore {
    data_file: PathBuf,
    document: RwLock<Document>,
}

impl JsonInventoryStore {
    /// Opens the inventory at `data_file`, starting empty when it does not exist.
    pub async fn open(data_file: impl AsRef<Path>) -> Result<Self, StoreError> {
        let data_file = data_file.as_ref().to_path_buf();
        let document = if data_file.exists() {
            let content = tokio::fs::read_to_string(&data_file)
                .await
                .map_err(|e| StoreError::Connect(format!("{}: {}", data_file.display(), e)))?;
            let document: Document = serde_json::from_str(&content)
                .map_err(|e| StoreError::Connect(format!("{}: {}", data_file.display(), e)))?;
            info!(
                "loaded {} hosts and {} groups from {}",
                document.hosts.len(),
                document.groups.len(),
                data_file.display()
            );
            document
        } else {
            info!("no inventory at {}, starting fresh", data_file.display());
            Document::default()
        };

        Ok(Self { data_file, document: RwLock::new(document) })
    }

    async fn save(&self, document: &Document) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(document)
            .map_err(|e| StoreError::Write(e.to_string()))?;
        tokio::fs::write(&self.data_file, content).await.map_err(|e| {
            error!("failed to save inventory to {}: {}", self.data_file.display(), e);
            StoreError::Write(e.to_string())
        })
    }

    /// Applies `mutate` to a copy, persists it, and only then publishes it.
    async fn commit<T>(
        &self,
        mutate: impl FnOnce(&mut Document) -> Result<T, StoreError> + Send,
    ) -> Result<T, StoreError> {
        let mut document = self.document.write().await;
        let mut draft = document.clone();
        let value = mutate(&mut draft)?;
        self.save(&draft).await?;
        *document = draft;
        Ok(value)
    }
}

#[async_trait]
impl InventoryStore for JsonInventoryStore {
    async fn hosts_and_groups(&self, owner: &str) -> Result<(Vec<Host>, Vec<HostGroup>), StoreError> {
        let document = self.document.read().await;
        let hosts = document.hosts.values().filter(|h| h.owner == owner).cloned().collect();
        let groups = document.groups.values().filter(|g| g.owner == owner).cloned().collect();
        Ok((hosts, groups))
    }

    async fn insert_host(&self, host: Host) -> Result<HostId, StoreError> {
        let mut ids = self.insert_hosts(vec![host]).await?;
        ids.pop().ok_or_else(|| StoreError::Write("insert returned no id".into()))
    }

    async fn insert_hosts(&self, hosts: Vec<Host>) -> Result<Vec<HostId>, StoreError> {
        self.commit(move |doc| {
            let mut ids = Vec::with_capacity(hosts.len());
            for mut host in hosts {
                let exists = doc.groups.get(&host.host_group_id).is_some_and(|g| g.owner == host.owner);
                if !exists {
                    return Err(StoreError::Write(format!(
                        "host group {} does not exist",
                        host.host_group_id
                    )));
                }
                let id = doc.allocate_host_id();
                host.host_id = Some(id);
                // earlier hosts of the same batch are already in the draft
                doc.check_unique(&host)?;
                doc.hosts.insert(id, host);
                ids.push(id);
            }
            Ok(ids)
        })
        .await
    }

    async fn update_host(&self, owner: &str, host_id: HostId, changes: HostChanges) -> Result<(), StoreError> {
        self.commit(move |doc| {
            let Some(current) = doc.owned_host(owner, host_id) else {
                return Err(StoreError::Write(format!("host {} not found", host_id)));
            };
            let mut updated = current.clone();
            changes.apply(&mut updated);
            doc.check_unique(&updated)?;
            doc.hosts.insert(host_id, updated);
            Ok(())
        })
        .await
    }

    async fn addresses(&self, owner: &str, host_ids: &[HostId]) -> Result<HashMap<HostId, IpAddr>, StoreError> {
        let document = self.document.read().await;
        Ok(host_ids
            .iter()
            .filter_map(|id| document.owned_host(owner, *id).map(|h| (*id, h.host_ip)))
            .collect())
    }

    async fn delete_hosts(&self, owner: &str, host_ids: &[HostId]) -> Result<Vec<HostId>, StoreError> {
        self.commit(move |doc| {
            let removable: Vec<HostId> = host_ids
                .iter()
                .copied()
                .filter(|id| doc.owned_host(owner, *id).is_some())
                .collect();
            for id in &removable {
                doc.hosts.remove(id);
            }
            Ok(removable)
        })
        .await
    }

    async fn insert_group(&self, owner: &str, name: &str, description: &str) -> Result<GroupId, StoreError> {
        self.commit(move |doc| {
            if doc.groups.values().any(|g| g.owner == owner && g.host_group_name == name) {
                return Err(StoreError::Write(format!("host group {} already exists", name)));
            }
            let id = doc.allocate_group_id();
            doc.groups.insert(
                id,
                HostGroup {
                    host_group_id: id,
                    host_group_name: name.to_string(),
                    description: description.to_string(),
                    owner: owner.to_string(),
                },
            );
            Ok(id)
        })
        .await
    }

    async fn delete_groups(&self, owner: &str, names: &[String]) -> Result<Vec<String>, StoreError> {
        self.commit(move |doc| {
            let doomed: Vec<(GroupId, String)> = doc
                .groups
                .values()
                .filter(|g| g.owner == owner && names.contains(&g.host_group_name))
                .filter(|g| !doc.hosts.values().any(|h| h.host_group_id == g.host_group_id))
                .map(|g| (g.host_group_id, g.host_group_name.clone()))
                .collect();
            for (id, _) in &doomed {
                doc.groups.remove(id);
            }
            Ok(doomed.into_iter().map(|(_, name)| name).collect())
        })
        .await
    }
}
