/**
 * HOST SERVICE - Operations exposed to callers of the kernel
 *
 * ROLE:
 * Glues the pieces together for one owner at a time:
 * validate -> provision -> commit for onboarding, plan -> reprovision ->
 * update for edits, and fan-out for telemetry.
 *
 * BATCH CONTRACT:
 * Batch operations always return one record per submitted item. A store
 * failure fails every item it touched and is reported as the batch code.
 */

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{FleetError, ResultCode, StoreError};
use crate::inventory::{InventoryStore, WorkflowChecker};
use crate::lifecycle::{plan_update, HostUpdate};
use crate::models::{
    AddHostResult, GroupId, Host, HostCandidate, HostId, InfoCategory, TelemetryRecord,
};
use crate::provision::{apply_outcome, ProvisionRequest, ProvisioningOrchestrator};
use crate::ssh::SshTarget;
use crate::query::{GroupItems, GroupQuery, HostItems, HostQuery, Page};
use crate::telemetry::TelemetryFanout;
use crate::validate::{check_fields, validate_batch, InventorySnapshot, Rejection, Verdict};

const INSERT_FAILED: &str = "insert database error";
const ACTIVE_WORKFLOW: &str = "active workflow in progress";
const MAX_GROUP_NAME_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchAddReport {
    pub code: ResultCode,
    pub results: Vec<AddHostResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateReport {
    pub host: Host,
    /// Why re-provisioning failed, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteReport<K: Ord> {
    pub code: ResultCode,
    pub succeed_list: Vec<K>,
    pub fail_list: BTreeMap<K, String>,
}

impl<K: Ord> DeleteReport<K> {
    fn new(succeed_list: Vec<K>, fail_list: BTreeMap<K, String>) -> Self {
        let code = match (succeed_list.is_empty(), fail_list.is_empty()) {
            (false, true) => ResultCode::Succeeded,
            (false, false) => ResultCode::PartialSucceeded,
            (true, _) => ResultCode::NoData,
        };
        Self { code, succeed_list, fail_list }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostInfoQuery {
    pub host_list: Vec<HostId>,
    /// Inventory rows only, no agent round-trip.
    #[serde(default)]
    pub basic: bool,
    #[serde(default)]
    pub info_type: Vec<InfoCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HostInfoView {
    Basic(Vec<Host>),
    Telemetry(Vec<TelemetryRecord>),
}

#[derive(Clone)]
pub struct HostService {
    store: Arc<dyn InventoryStore>,
    workflows: Arc<dyn WorkflowChecker>,
    orchestrator: ProvisioningOrchestrator,
    telemetry: TelemetryFanout,
}

impl HostService {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        workflows: Arc<dyn WorkflowChecker>,
        orchestrator: ProvisioningOrchestrator,
        telemetry: TelemetryFanout,
    ) -> Self {
        Self { store, workflows, orchestrator, telemetry }
    }

    /// Onboards one host. Unreachable hosts are still registered, UNESTABLISHED.
    pub async fn add_host(&self, owner: &str, candidate: HostCandidate) -> Result<AddHostResult, FleetError> {
        check_fields(&candidate).map_err(|r| FleetError::Param(r.to_string()))?;

        let (hosts, groups) = self.store.hosts_and_groups(owner).await?;
        let snapshot = InventorySnapshot::new(&hosts, &groups);
        let group_id = snapshot
            .group_id(&candidate.host_group_name)
            .ok_or_else(|| FleetError::Param(format!("no host group named {}", candidate.host_group_name)))?;
        if snapshot.collides(&candidate.host_name, &candidate.address()) {
            return Err(FleetError::DataExists(format!(
                "host {} or address {} already exists",
                candidate.host_name,
                candidate.address()
            )));
        }

        let mut host = Host::unestablished(&candidate, group_id, owner);
        let target = SshTarget { address: host.address(), user: host.ssh_user.clone() };
        let outcome = self.orchestrator.install_key(&target, &candidate.password).await;
        apply_outcome(&mut host, &outcome);
        let note = outcome.err().map(|e| e.to_string());

        let host_id = self.store.insert_host(host.clone()).await.map_err(|e| {
            error!("cannot store host {}: {}", host.host_name, e);
            e
        })?;
        host.host_id = Some(host_id);
        info!("host {} added as {} ({:?})", host.host_name, host_id, host.status);
        Ok(AddHostResult::registered(&host, note))
    }

    /// Onboards a batch. One result per candidate, in submission order.
    pub async fn add_host_batch(&self, owner: &str, candidates: Vec<HostCandidate>) -> BatchAddReport {
        let span = info_span!("add_host_batch", batch_id = %Uuid::new_v4(), owner = %owner);
        self.run_batch(owner, candidates).instrument(span).await
    }

    async fn run_batch(&self, owner: &str, candidates: Vec<HostCandidate>) -> BatchAddReport {
        if candidates.is_empty() {
            return BatchAddReport { code: ResultCode::ParamError, results: Vec::new() };
        }

        let (hosts, groups) = match self.store.hosts_and_groups(owner).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("cannot read inventory: {}", e);
                let results = candidates.iter().map(|c| AddHostResult::failed(c, e.to_string())).collect();
                return BatchAddReport { code: e.code(), results };
            }
        };
        let snapshot = InventorySnapshot::new(&hosts, &groups);
        let verdicts = validate_batch(&candidates, &snapshot);

        let mut results: Vec<Option<AddHostResult>> = vec![None; candidates.len()];
        let mut admitted = Vec::new();
        let mut requests = Vec::new();
        for (index, (candidate, verdict)) in candidates.iter().zip(verdicts).enumerate() {
            match verdict {
                Verdict::Valid { group_id } => {
                    admitted.push(index);
                    requests.push(ProvisionRequest {
                        host: Host::unestablished(candidate, group_id, owner),
                        password: candidate.password.clone(),
                    });
                }
                Verdict::Invalid(rejection) => {
                    info!("candidate {} rejected: {}", candidate.host_name, rejection);
                    results[index] = Some(AddHostResult::failed(candidate, rejection.to_string()));
                }
            }
        }

        if requests.is_empty() {
            warn!("no candidate of {} passed validation", candidates.len());
            return BatchAddReport { code: ResultCode::ParamError, results: results.into_iter().flatten().collect() };
        }

        let provisioned = self.orchestrator.provision(requests).await;
        let notes: Vec<Option<String>> = provisioned.iter().map(|p| p.error.as_ref().map(|e| e.to_string())).collect();
        let mut to_insert: Vec<Host> = provisioned.into_iter().map(|p| p.host).collect();

        let code = match self.store.insert_hosts(to_insert.clone()).await {
            Ok(ids) => {
                for (host, id) in to_insert.iter_mut().zip(ids) {
                    host.host_id = Some(id);
                }
                for ((index, host), note) in admitted.iter().zip(&to_insert).zip(notes) {
                    results[*index] = Some(AddHostResult::registered(host, note));
                }
                if to_insert.len() == candidates.len() {
                    ResultCode::Succeeded
                } else {
                    ResultCode::PartialSucceeded
                }
            }
            Err(e) => {
                error!("batch insert of {} hosts failed: {}", to_insert.len(), e);
                // a concurrent request registered one of these hosts first
                let reason = match &e {
                    StoreError::Conflict(_) => Rejection::AlreadyRegistered.to_string(),
                    _ => INSERT_FAILED.to_string(),
                };
                for index in &admitted {
                    results[*index] = Some(AddHostResult::failed(&candidates[*index], reason.clone()));
                }
                e.code()
            }
        };

        info!("batch of {} candidates finished: {:?}", candidates.len(), code);
        BatchAddReport { code, results: results.into_iter().flatten().collect() }
    }

    /// Applies an update, re-installing the key first when credentials change.
    pub async fn update_host(&self, owner: &str, update: HostUpdate) -> Result<UpdateReport, FleetError> {
        let host_id = update.host_id;
        let (hosts, groups) = self.store.hosts_and_groups(owner).await?;
        let plan = plan_update(update, &hosts, &groups)?;
        let mut changes = plan.changes;
        let mut reason = None;

        if let Some(reprovision) = plan.reprovision {
            let outcome = self.orchestrator.install_key(&reprovision.target, &reprovision.password).await;
            if let Err(e) = &outcome {
                warn!("re-provisioning host {} failed: {}", host_id, e);
                reason = Some(e.to_string());
            }
            changes.record_provisioning(&outcome);
        }

        let mut host = hosts
            .into_iter()
            .find(|h| h.host_id == Some(host_id))
            .ok_or_else(|| FleetError::NoData(format!("host id {} is not in inventory", host_id)))?;
        changes.apply(&mut host);

        if !changes.is_empty() {
            self.store.update_host(owner, host_id, changes).await?;
            info!("host {} updated ({:?})", host_id, host.status);
        }
        Ok(UpdateReport { host: host.without_pkey(), reason })
    }

    /// Deletes hosts not held by an active workflow.
    pub async fn delete_hosts(&self, owner: &str, host_ids: &[HostId]) -> Result<DeleteReport<HostId>, FleetError> {
        if host_ids.is_empty() {
            return Err(FleetError::Param("host_list is empty".into()));
        }
        let mut seen = HashSet::new();
        let unique: Vec<HostId> = host_ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        let active = self.workflows.hosts_in_active_workflow(&unique).await?;
        let mut fail_list = BTreeMap::new();
        let mut candidates = Vec::new();
        for id in unique {
            if active.get(&id).copied().unwrap_or(false) {
                fail_list.insert(id, ACTIVE_WORKFLOW.to_string());
            } else {
                candidates.push(id);
            }
        }

        let deleted = if candidates.is_empty() {
            Vec::new()
        } else {
            self.store.delete_hosts(owner, &candidates).await?
        };
        let gone: HashSet<HostId> = deleted.iter().copied().collect();
        for id in candidates.into_iter().filter(|id| !gone.contains(id)) {
            fail_list.insert(id, "host not found".to_string());
        }

        info!("deleted {} hosts, {} refused", deleted.len(), fail_list.len());
        Ok(DeleteReport::new(deleted, fail_list))
    }

    pub async fn list_hosts(&self, owner: &str, query: &HostQuery) -> Result<Page<HostItems>, FleetError> {
        let (hosts, _) = self.store.hosts_and_groups(owner).await?;
        query.apply(hosts)
    }

    pub async fn host_count(&self, owner: &str) -> Result<usize, FleetError> {
        let (hosts, _) = self.store.hosts_and_groups(owner).await?;
        Ok(hosts.len())
    }

    /// Inventory rows when `basic`, otherwise live agent telemetry.
    pub async fn get_host_info(&self, owner: &str, query: &HostInfoQuery) -> Result<HostInfoView, FleetError> {
        if query.host_list.is_empty() {
            return Err(FleetError::Param("host_list is empty".into()));
        }

        if query.basic {
            let (hosts, _) = self.store.hosts_and_groups(owner).await?;
            let wanted: HashSet<HostId> = query.host_list.iter().copied().collect();
            let rows = hosts
                .into_iter()
                .filter(|h| h.host_id.is_some_and(|id| wanted.contains(&id)))
                .map(|h| h.without_pkey())
                .collect();
            return Ok(HostInfoView::Basic(rows));
        }

        let span = info_span!("host_telemetry", batch_id = %Uuid::new_v4(), hosts = query.host_list.len());
        async {
            let addresses = self.store.addresses(owner, &query.host_list).await?;
            let records = self.telemetry.collect(&query.host_list, &addresses, &query.info_type).await;
            Ok::<_, FleetError>(HostInfoView::Telemetry(records))
        }
        .instrument(span)
        .await
    }

    pub async fn add_host_group(&self, owner: &str, name: &str, description: &str) -> Result<GroupId, FleetError> {
        if name.is_empty() || name.chars().count() > MAX_GROUP_NAME_LEN {
            return Err(FleetError::Param("invalid field: host_group_name".into()));
        }
        let (_, groups) = self.store.hosts_and_groups(owner).await?;
        if groups.iter().any(|g| g.host_group_name == name) {
            return Err(FleetError::DataExists(format!("host group {} already exists", name)));
        }
        let id = self.store.insert_group(owner, name, description).await?;
        info!("host group {} added as {}", name, id);
        Ok(id)
    }

    /// Deletes empty groups; groups that still own hosts are refused.
    pub async fn delete_host_groups(&self, owner: &str, names: &[String]) -> Result<DeleteReport<String>, FleetError> {
        if names.is_empty() {
            return Err(FleetError::Param("host_group_list is empty".into()));
        }
        let (hosts, groups) = self.store.hosts_and_groups(owner).await?;

        let mut fail_list = BTreeMap::new();
        let mut deletable = Vec::new();
        for name in names.iter().collect::<BTreeSet<_>>() {
            match groups.iter().find(|g| &g.host_group_name == name) {
                None => {
                    fail_list.insert(name.clone(), "host group not found".to_string());
                }
                Some(g) if hosts.iter().any(|h| h.host_group_id == g.host_group_id) => {
                    fail_list.insert(name.clone(), "there are hosts in host group".to_string());
                }
                Some(_) => deletable.push(name.clone()),
            }
        }

        let deleted = if deletable.is_empty() {
            Vec::new()
        } else {
            self.store.delete_groups(owner, &deletable).await?
        };
        for name in deletable.into_iter().filter(|n| !deleted.contains(n)) {
            fail_list.insert(name, "there are hosts in host group".to_string());
        }
        Ok(DeleteReport::new(deleted, fail_list))
    }

    pub async fn list_host_groups(&self, owner: &str, query: &GroupQuery) -> Result<Page<GroupItems>, FleetError> {
        let (hosts, groups) = self.store.hosts_and_groups(owner).await?;
        query.apply(groups, &hosts)
    }
}
