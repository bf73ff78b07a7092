//! Host updates, deletion, groups and listings through `HostService`.

use fleet_devkit::test_utils::address;
use fleet_devkit::{candidate, Script, TestHarness, OWNER};
use fleet_kernel::lifecycle::HostUpdate;
use fleet_kernel::models::{HostId, HostStatus};
use fleet_kernel::query::{Direction, GroupQuery, GroupSort, HostQuery};
use fleet_kernel::service::HostService;
use fleet_kernel::{FleetError, ResultCode};

async fn onboard(harness: &TestHarness, service: &HostService, hosts: &[(&str, &str)]) -> Vec<HostId> {
    let batch = hosts.iter().map(|(name, ip)| candidate(name, ip)).collect();
    service.add_host_batch(OWNER, batch).await;
    hosts
        .iter()
        .map(|(name, _)| harness.store.host_by_name(name).and_then(|h| h.host_id).unwrap())
        .collect()
}

#[tokio::test]
async fn test_rename_without_credentials_skips_ssh() {
    let harness = TestHarness::new();
    harness.seed_group("web").await.unwrap();
    let service = harness.service();
    let ids = onboard(&harness, &service, &[("a", "10.0.0.1")]).await;
    let opens = harness.connector.opens();

    let update = HostUpdate { host_id: ids[0], host_name: Some("renamed".into()), ..Default::default() };
    let report = service.update_host(OWNER, update).await.unwrap();

    assert_eq!(report.host.host_name, "renamed");
    assert!(report.reason.is_none());
    assert_eq!(harness.connector.opens(), opens);
    let stored = harness.store.host_by_name("renamed").unwrap();
    assert_eq!(stored.pkey.as_deref(), Some("PRIVATE-1"));
}

#[tokio::test]
async fn test_password_change_reinstalls_key() {
    let harness = TestHarness::new();
    harness.seed_group("web").await.unwrap();
    let service = harness.service();
    let ids = onboard(&harness, &service, &[("a", "10.0.0.1")]).await;

    let update = HostUpdate {
        host_id: ids[0],
        ssh_port: Some(2222),
        password: Some("new-pw".into()),
        ..Default::default()
    };
    let report = service.update_host(OWNER, update).await.unwrap();

    assert_eq!(report.host.ssh_port, 2222);
    assert_eq!(report.host.status, HostStatus::Online);
    assert!(report.host.pkey.is_none());
    let stored = harness.store.host_by_name("a").unwrap();
    assert_eq!(stored.pkey.as_deref(), Some("PRIVATE-2"));
    let commands = harness.connector.commands();
    assert_eq!(commands.last().map(|(addr, _)| *addr), Some(address("10.0.0.1", 2222)));
}

#[tokio::test]
async fn test_failed_reprovision_clears_key() {
    let harness = TestHarness::new();
    harness.seed_group("web").await.unwrap();
    let service = harness.service();
    let ids = onboard(&harness, &service, &[("a", "10.0.0.1")]).await;
    harness.connector.script(address("10.0.0.1", 22), Script::RejectPassword);

    let update = HostUpdate { host_id: ids[0], password: Some("wrong".into()), ..Default::default() };
    let report = service.update_host(OWNER, update).await.unwrap();

    assert_eq!(report.host.status, HostStatus::Unestablished);
    assert!(report.reason.is_some());
    let stored = harness.store.host_by_name("a").unwrap();
    assert_eq!(stored.status, HostStatus::Unestablished);
    assert!(stored.pkey.is_none());
}

#[tokio::test]
async fn test_port_change_requires_password() {
    let harness = TestHarness::new();
    harness.seed_group("web").await.unwrap();
    let service = harness.service();
    let ids = onboard(&harness, &service, &[("a", "10.0.0.1")]).await;

    let update = HostUpdate { host_id: ids[0], ssh_port: Some(2200), ..Default::default() };
    let err = service.update_host(OWNER, update).await.unwrap_err();
    assert_eq!(err.code(), ResultCode::ParamError);
    assert!(err.to_string().contains("please update password"));
    assert_eq!(harness.store.host_by_name("a").unwrap().ssh_port, 22);
}

#[tokio::test]
async fn test_update_rejects_name_collision_and_unknown_host() {
    let harness = TestHarness::new();
    harness.seed_group("web").await.unwrap();
    let service = harness.service();
    let ids = onboard(&harness, &service, &[("a", "10.0.0.1"), ("b", "10.0.0.2")]).await;

    let clash = HostUpdate { host_id: ids[1], host_name: Some("a".into()), ..Default::default() };
    assert!(matches!(service.update_host(OWNER, clash).await, Err(FleetError::Param(_))));

    let missing = HostUpdate { host_id: 999, host_name: Some("z".into()), ..Default::default() };
    let err = service.update_host(OWNER, missing).await.unwrap_err();
    assert_eq!(err.code(), ResultCode::NoData);
}

#[tokio::test]
async fn test_delete_respects_active_workflows() {
    let harness = TestHarness::new();
    harness.seed_group("web").await.unwrap();
    let service = harness.service();
    let ids = onboard(&harness, &service, &[("a", "10.0.0.1"), ("b", "10.0.0.2")]).await;
    harness.workflows.mark_busy(ids[1]);

    let report = service.delete_hosts(OWNER, &[ids[0], ids[1], 404]).await.unwrap();
    assert_eq!(report.code, ResultCode::PartialSucceeded);
    assert_eq!(report.succeed_list, vec![ids[0]]);
    assert_eq!(report.fail_list[&ids[1]], "active workflow in progress");
    assert_eq!(report.fail_list[&404u64], "host not found");
    assert!(harness.store.host_by_name("b").is_some());
}

#[tokio::test]
async fn test_delete_outcome_codes() {
    let harness = TestHarness::new();
    harness.seed_group("web").await.unwrap();
    let service = harness.service();
    let ids = onboard(&harness, &service, &[("a", "10.0.0.1")]).await;

    let err = service.delete_hosts(OWNER, &[]).await.unwrap_err();
    assert_eq!(err.code(), ResultCode::ParamError);

    let none = service.delete_hosts(OWNER, &[77]).await.unwrap();
    assert_eq!(none.code, ResultCode::NoData);

    let all = service.delete_hosts(OWNER, &[ids[0], ids[0]]).await.unwrap();
    assert_eq!(all.code, ResultCode::Succeeded);
    assert_eq!(all.succeed_list, vec![ids[0]]);
    assert_eq!(service.host_count(OWNER).await.unwrap(), 0);
}

#[tokio::test]
async fn test_group_lifecycle() {
    let harness = TestHarness::new();
    let service = harness.service();

    service.add_host_group(OWNER, "web", "frontends").await.unwrap();
    service.add_host_group(OWNER, "spare", "").await.unwrap();
    let err = service.add_host_group(OWNER, "web", "").await.unwrap_err();
    assert_eq!(err.code(), ResultCode::DataExists);
    assert_eq!(service.add_host_group(OWNER, "", "").await.unwrap_err().code(), ResultCode::ParamError);

    onboard(&harness, &service, &[("a", "10.0.0.1"), ("b", "10.0.0.2")]).await;

    let query = GroupQuery { sort: Some(GroupSort::HostCount), direction: Direction::Desc, ..Default::default() };
    let page = service.list_host_groups(OWNER, &query).await.unwrap();
    let counts: Vec<_> = page
        .items
        .host_group_infos
        .iter()
        .map(|g| (g.host_group_name.clone(), g.host_count))
        .collect();
    assert_eq!(counts, vec![("web".to_string(), 2), ("spare".to_string(), 0)]);

    let names = vec!["web".to_string(), "spare".to_string(), "ghost".to_string()];
    let report = service.delete_host_groups(OWNER, &names).await.unwrap();
    assert_eq!(report.code, ResultCode::PartialSucceeded);
    assert_eq!(report.succeed_list, vec!["spare".to_string()]);
    assert_eq!(report.fail_list["web"], "there are hosts in host group");
    assert_eq!(report.fail_list["ghost"], "host group not found");
}

#[tokio::test]
async fn test_listing_filters_and_hides_keys() {
    let harness = TestHarness::new();
    harness.seed_group("web").await.unwrap();
    harness.connector.script(address("10.0.0.2", 22), Script::Refuse);
    let service = harness.service();
    onboard(&harness, &service, &[("a", "10.0.0.1"), ("b", "10.0.0.2"), ("c", "10.0.0.3")]).await;

    let online = HostQuery { status: Some(vec![HostStatus::Online]), ..Default::default() };
    let page = service.list_hosts(OWNER, &online).await.unwrap();
    assert_eq!(page.total_count, 2);
    assert!(page.items.host_infos.iter().all(|h| h.pkey.is_none()));

    let paged = HostQuery { page: Some(2), per_page: Some(2), ..Default::default() };
    let page = service.list_hosts(OWNER, &paged).await.unwrap();
    assert_eq!((page.total_count, page.total_page), (3, 2));
    assert_eq!(page.items.host_infos[0].host_name, "c");

    assert_eq!(service.host_count("someone-else").await.unwrap(), 0);
}
