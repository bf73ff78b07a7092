/**
 * DUPLICATE VALIDATOR - Admission check for a batch of candidate hosts
 *
 * ROLE:
 * Decides, per candidate index, whether the host may go on to provisioning.
 * Runs without any I/O: the caller hands in the inventory snapshot once.
 *
 * ORDER OF CHECKS:
 * 1. malformed fields
 * 2. in-batch duplicates of name or ssh address (both sides rejected)
 * 3. unknown host group
 * 4. collision with the existing inventory (only the newcomer rejected)
 */

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::models::{GroupId, Host, HostCandidate, HostGroup, SshAddress};

pub const MAX_HOST_NAME_LEN: usize = 50;

/// Why a candidate was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    InvalidField(&'static str),
    DuplicateInBatch,
    UnknownGroup,
    AlreadyRegistered,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::InvalidField(field) => write!(f, "invalid field: {}", field),
            Rejection::DuplicateInBatch => f.write_str("duplicate host name or address"),
            Rejection::UnknownGroup => f.write_str("invalid host group name"),
            Rejection::AlreadyRegistered => f.write_str("host name or address already exists"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid { group_id: GroupId },
    Invalid(Rejection),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid { .. })
    }
}

/// Materialised view of what one owner already has.
#[derive(Debug, Default, Clone)]
pub struct InventorySnapshot {
    names: HashSet<String>,
    addresses: HashSet<SshAddress>,
    groups: HashMap<String, GroupId>,
}

impl InventorySnapshot {
    pub fn new(hosts: &[Host], groups: &[HostGroup]) -> Self {
        Self {
            names: hosts.iter().map(|h| h.host_name.clone()).collect(),
            addresses: hosts.iter().map(Host::address).collect(),
            groups: groups
                .iter()
                .map(|g| (g.host_group_name.clone(), g.host_group_id))
                .collect(),
        }
    }

    pub fn group_id(&self, name: &str) -> Option<GroupId> {
        self.groups.get(name).copied()
    }

    pub fn collides(&self, name: &str, address: &SshAddress) -> bool {
        self.names.contains(name) || self.addresses.contains(address)
    }
}

/// Field checks applied before any identity comparison.
pub fn check_fields(candidate: &HostCandidate) -> Result<(), Rejection> {
    let name = &candidate.host_name;
    if name.is_empty()
        || name.chars().count() > MAX_HOST_NAME_LEN
        || name.chars().any(char::is_whitespace)
    {
        return Err(Rejection::InvalidField("host_name"));
    }
    if candidate.ssh_user.is_empty() {
        return Err(Rejection::InvalidField("ssh_user"));
    }
    if candidate.password.is_empty() {
        return Err(Rejection::InvalidField("password"));
    }
    if candidate.ssh_port == 0 {
        return Err(Rejection::InvalidField("ssh_port"));
    }
    if candidate.host_group_name.is_empty() {
        return Err(Rejection::InvalidField("host_group_name"));
    }
    Ok(())
}

/// One verdict per candidate, in input order.
pub fn validate_batch(candidates: &[HostCandidate], snapshot: &InventorySnapshot) -> Vec<Verdict> {
    let mut rejected: Vec<Option<Rejection>> = candidates
        .iter()
        .map(|c| check_fields(c).err())
        .collect();

    let mut first_by_name: HashMap<&str, usize> = HashMap::new();
    let mut first_by_address: HashMap<SshAddress, usize> = HashMap::new();

    for (index, candidate) in candidates.iter().enumerate() {
        if rejected[index].is_some() {
            continue;
        }
        let address = candidate.address();
        let name_hit = first_by_name.get(candidate.host_name.as_str()).copied();
        let address_hit = first_by_address.get(&address).copied();

        if name_hit.is_none() && address_hit.is_none() {
            first_by_name.insert(candidate.host_name.as_str(), index);
            first_by_address.insert(address, index);
            continue;
        }

        // Earlier entries are invalidated retroactively.
        for earlier in [name_hit, address_hit].into_iter().flatten() {
            rejected[earlier] = Some(Rejection::DuplicateInBatch);
        }
        rejected[index] = Some(Rejection::DuplicateInBatch);
        first_by_name.entry(candidate.host_name.as_str()).or_insert(index);
        first_by_address.entry(address).or_insert(index);
    }

    candidates
        .iter()
        .zip(rejected)
        .map(|(candidate, rejection)| {
            if let Some(rejection) = rejection {
                return Verdict::Invalid(rejection);
            }
            let Some(group_id) = snapshot.group_id(&candidate.host_group_name) else {
                return Verdict::Invalid(Rejection::UnknownGroup);
            };
            if snapshot.collides(&candidate.host_name, &candidate.address()) {
                return Verdict::Invalid(Rejection::AlreadyRegistered);
            }
            Verdict::Valid { group_id }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HostStatus;

    fn candidate(name: &str, ip: &str, port: u16) -> HostCandidate {
        HostCandidate {
            host_name: name.into(),
            host_ip: ip.parse().unwrap(),
            ssh_port: port,
            ssh_user: "root".into(),
            password: "pw".into(),
            host_group_name: "web".into(),
            management: false,
        }
    }

    fn snapshot_with(hosts: Vec<Host>) -> InventorySnapshot {
        let groups = vec![HostGroup {
            host_group_id: 7,
            host_group_name: "web".into(),
            description: String::new(),
            owner: "admin".into(),
        }];
        InventorySnapshot::new(&hosts, &groups)
    }

    fn stored(name: &str, ip: &str, port: u16) -> Host {
        Host {
            host_id: Some(1),
            host_name: name.into(),
            host_ip: ip.parse().unwrap(),
            ssh_port: port,
            ssh_user: "root".into(),
            host_group_id: 7,
            host_group_name: "web".into(),
            management: false,
            status: HostStatus::Online,
            pkey: None,
            owner: "admin".into(),
        }
    }

    #[test]
    fn test_duplicate_names_reject_both_entries() {
        let batch = vec![candidate("x", "10.0.0.1", 22), candidate("x", "10.0.0.2", 22)];
        let verdicts = validate_batch(&batch, &snapshot_with(vec![]));
        assert_eq!(verdicts, vec![
            Verdict::Invalid(Rejection::DuplicateInBatch),
            Verdict::Invalid(Rejection::DuplicateInBatch),
        ]);
    }

    #[test]
    fn test_duplicate_address_rejects_both_entries() {
        let batch = vec![
            candidate("a", "10.0.0.1", 22),
            candidate("b", "10.0.0.9", 22),
            candidate("c", "10.0.0.1", 22),
        ];
        let verdicts = validate_batch(&batch, &snapshot_with(vec![]));
        assert!(!verdicts[0].is_valid());
        assert!(verdicts[1].is_valid());
        assert!(!verdicts[2].is_valid());
    }

    #[test]
    fn test_same_ip_different_port_is_not_a_duplicate() {
        let batch = vec![candidate("a", "10.0.0.1", 22), candidate("b", "10.0.0.1", 2222)];
        let verdicts = validate_batch(&batch, &snapshot_with(vec![]));
        assert!(verdicts.iter().all(Verdict::is_valid));
    }

    #[test]
    fn test_singleton_batch_has_no_duplicate_errors() {
        let verdicts = validate_batch(&[candidate("solo", "10.0.0.1", 22)], &snapshot_with(vec![]));
        assert_eq!(verdicts, vec![Verdict::Valid { group_id: 7 }]);
    }

    #[test]
    fn test_collision_with_two_different_earlier_entries() {
        let batch = vec![
            candidate("x", "10.0.0.1", 22),
            candidate("y", "10.0.0.2", 22),
            candidate("x", "10.0.0.2", 22),
        ];
        let verdicts = validate_batch(&batch, &snapshot_with(vec![]));
        assert!(verdicts.iter().all(|v| *v == Verdict::Invalid(Rejection::DuplicateInBatch)));
    }

    #[test]
    fn test_inventory_collision_rejects_only_newcomer() {
        let snapshot = snapshot_with(vec![stored("db-01", "10.0.0.50", 22)]);
        let batch = vec![
            candidate("db-01", "10.0.0.3", 22),
            candidate("db-02", "10.0.0.50", 22),
            candidate("db-03", "10.0.0.4", 22),
        ];
        let verdicts = validate_batch(&batch, &snapshot);
        assert_eq!(verdicts[0], Verdict::Invalid(Rejection::AlreadyRegistered));
        assert_eq!(verdicts[1], Verdict::Invalid(Rejection::AlreadyRegistered));
        assert!(verdicts[2].is_valid());
    }

    #[test]
    fn test_unknown_group_is_rejected() {
        let mut c = candidate("a", "10.0.0.1", 22);
        c.host_group_name = "nope".into();
        let verdicts = validate_batch(&[c], &snapshot_with(vec![]));
        assert_eq!(verdicts, vec![Verdict::Invalid(Rejection::UnknownGroup)]);
        assert_eq!(Rejection::UnknownGroup.to_string(), "invalid host group name");
    }

    #[test]
    fn test_malformed_fields_are_rejected_before_dedup() {
        let spaced = candidate("has space", "10.0.0.1", 22);
        let no_port = candidate("ok", "10.0.0.2", 0);
        let verdicts = validate_batch(&[spaced, no_port], &snapshot_with(vec![]));
        assert_eq!(verdicts[0], Verdict::Invalid(Rejection::InvalidField("host_name")));
        assert_eq!(verdicts[1], Verdict::Invalid(Rejection::InvalidField("ssh_port")));
    }

    #[test]
    fn test_malformed_entry_does_not_claim_identity() {
        // The malformed first entry must not make the second look duplicated.
        let mut bad = candidate("x", "10.0.0.1", 22);
        bad.password.clear();
        let verdicts = validate_batch(&[bad, candidate("x", "10.0.0.1", 22)], &snapshot_with(vec![]));
        assert!(!verdicts[0].is_valid());
        assert!(verdicts[1].is_valid());
    }
}
