//! Batch onboarding end to end: validation, provisioning and commit.

use fleet_devkit::test_utils::address;
use fleet_devkit::{candidate, FixedKeys, Script, ScriptedAgentClient, ScriptedConnector, TestHarness, OWNER};
use fleet_kernel::inventory::{InventoryStore, JsonInventoryStore, NoActiveWorkflows};
use fleet_kernel::models::{HostStatus, Outcome};
use fleet_kernel::provision::ProvisioningOrchestrator;
use fleet_kernel::telemetry::TelemetryFanout;
use fleet_kernel::{HostService, ResultCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_every_candidate_gets_one_result() {
    let harness = TestHarness::new();
    harness.seed_group("web").await.unwrap();
    harness.connector.script(address("10.0.0.2", 22), Script::Refuse);
    harness.connector.script(address("10.0.0.3", 22), Script::RejectPassword);

    let mut unknown_group = candidate("h5", "10.0.0.5");
    unknown_group.host_group_name = "nope".into();
    let batch = vec![
        candidate("h1", "10.0.0.1"),
        candidate("h2", "10.0.0.2"),
        candidate("h3", "10.0.0.3"),
        candidate("h1", "10.0.0.4"),
        unknown_group,
    ];

    let report = harness.service().add_host_batch(OWNER, batch).await;
    assert_eq!(report.results.len(), 5);
    let names: Vec<_> = report.results.iter().map(|r| r.host_name.as_str()).collect();
    assert_eq!(names, vec!["h1", "h2", "h3", "h1", "h5"]);
}

#[tokio::test]
async fn test_in_batch_duplicates_are_both_rejected() {
    let harness = TestHarness::new();
    harness.seed_group("web").await.unwrap();

    let report = harness
        .service()
        .add_host_batch(OWNER, vec![candidate("x", "10.0.0.1"), candidate("x", "10.0.0.2")])
        .await;

    assert_eq!(report.code, ResultCode::ParamError);
    for result in &report.results {
        assert_eq!(result.result, Outcome::Failed);
        assert_eq!(result.reason.as_deref(), Some("duplicate host name or address"));
    }
    assert_eq!(harness.connector.opens(), 0);
    assert!(harness.store.all_hosts().is_empty());
}

#[tokio::test]
async fn test_singleton_batch_succeeds() {
    let harness = TestHarness::new();
    harness.seed_group("web").await.unwrap();

    let report = harness.service().add_host_batch(OWNER, vec![candidate("solo", "10.0.0.1")]).await;
    assert_eq!(report.code, ResultCode::Succeeded);
    assert_eq!(report.results[0].result, Outcome::Succeeded);
    assert_eq!(report.results[0].status, Some(HostStatus::Online));

    let stored = harness.store.host_by_name("solo").unwrap();
    assert_eq!(stored.pkey.as_deref(), Some("PRIVATE-1"));
    let commands = harness.connector.commands();
    assert_eq!(commands.len(), 1);
    assert!(commands[0].1.contains("'ssh-ed25519 KEY1 fleet@test'"));
}

#[tokio::test]
async fn test_partial_success_with_two_duplicates() {
    let harness = TestHarness::new();
    harness.seed_group("web").await.unwrap();

    let batch = vec![
        candidate("a", "10.0.0.1"),
        candidate("dup", "10.0.0.2"),
        candidate("b", "10.0.0.3"),
        candidate("dup", "10.0.0.4"),
        candidate("c", "10.0.0.5"),
    ];
    let report = harness.service().add_host_batch(OWNER, batch).await;

    assert_eq!(report.code, ResultCode::PartialSucceeded);
    assert_eq!(report.results.len(), 5);
    let failed: Vec<_> = report
        .results
        .iter()
        .filter(|r| r.result == Outcome::Failed)
        .map(|r| r.host_ip.to_string())
        .collect();
    assert_eq!(failed, vec!["10.0.0.2", "10.0.0.4"]);
    assert_eq!(harness.store.all_hosts().len(), 3);
}

#[tokio::test]
async fn test_failed_provisioning_still_registers_host() {
    let connector = ScriptedConnector::new();
    connector.require_password(address("10.0.0.7", 22), "the-real-one");
    let harness = TestHarness::new().with_connector(connector);
    harness.seed_group("web").await.unwrap();

    let report = harness.service().add_host_batch(OWNER, vec![candidate("locked", "10.0.0.7")]).await;

    assert_eq!(report.code, ResultCode::Succeeded);
    assert_eq!(report.results[0].result, Outcome::Succeeded);
    assert_eq!(report.results[0].status, Some(HostStatus::Unestablished));
    assert!(report.results[0].reason.as_deref().unwrap_or_default().contains("authentication"));

    let stored = harness.store.host_by_name("locked").unwrap();
    assert_eq!(stored.status, HostStatus::Unestablished);
    assert!(stored.pkey.is_none());
}

#[tokio::test]
async fn test_existing_inventory_collision_rejects_only_newcomer() {
    let harness = TestHarness::new();
    harness.seed_group("web").await.unwrap();
    let service = harness.service();
    service.add_host_batch(OWNER, vec![candidate("db-01", "10.0.0.1")]).await;

    let report = service
        .add_host_batch(OWNER, vec![candidate("db-01", "10.0.0.9"), candidate("db-02", "10.0.0.2")])
        .await;
    assert_eq!(report.code, ResultCode::PartialSucceeded);
    assert_eq!(report.results[0].reason.as_deref(), Some("host name or address already exists"));
    assert_eq!(report.results[1].result, Outcome::Succeeded);
    assert_eq!(harness.store.host_by_name("db-01").unwrap().host_ip.to_string(), "10.0.0.1");
}

async fn outcomes_with_chunk_size(chunk_size: usize) -> (HashMap<String, (HostStatus, bool)>, usize) {
    let connector = ScriptedConnector::new().with_latency(Duration::from_millis(20));
    for i in 0..65u8 {
        let host = address(&format!("10.1.0.{}", i), 22);
        match i % 5 {
            1 => {
                connector.script(host, Script::Refuse);
            }
            2 => {
                connector.script(host, Script::FailCommand { exit_status: 1, stderr: "read-only".into() });
            }
            3 => {
                connector.script(host, Script::DropMidCommand);
            }
            _ => {}
        }
    }
    let harness = TestHarness::new().with_connector(connector).with_chunk_size(chunk_size);
    harness.seed_group("web").await.unwrap();

    let batch = (0..65u8).map(|i| candidate(&format!("n{}", i), &format!("10.1.0.{}", i))).collect();
    let report = harness.service().add_host_batch(OWNER, batch).await;
    assert_eq!(report.results.len(), 65);
    assert_eq!(report.code, ResultCode::Succeeded);

    let outcomes = harness
        .store
        .all_hosts()
        .into_iter()
        .map(|h| (h.host_name, (h.status, h.pkey.is_some())))
        .collect();
    (outcomes, harness.connector.peak_sessions())
}

#[tokio::test]
async fn test_chunk_size_changes_concurrency_not_outcomes() {
    let (by_thirty, peak_thirty) = outcomes_with_chunk_size(30).await;
    let (by_twenty, peak_twenty) = outcomes_with_chunk_size(20).await;

    assert_eq!(by_thirty.len(), 65);
    assert_eq!(by_thirty, by_twenty);
    assert!(peak_thirty <= 30);
    assert!(peak_twenty <= 20);

    let online = by_thirty.values().filter(|(status, _)| *status == HostStatus::Online).count();
    assert_eq!(online, 26);
    assert!(by_thirty.values().all(|(status, has_key)| (*status == HostStatus::Online) == *has_key));
}

#[tokio::test]
async fn test_sessions_closed_once_on_every_path() {
    let harness = TestHarness::new();
    harness.seed_group("web").await.unwrap();
    harness.connector.script(address("10.0.0.1", 22), Script::DropMidCommand);
    harness
        .connector
        .script(address("10.0.0.2", 22), Script::FailCommand { exit_status: 2, stderr: "denied".into() });

    let batch = vec![candidate("a", "10.0.0.1"), candidate("b", "10.0.0.2"), candidate("c", "10.0.0.3")];
    harness.service().add_host_batch(OWNER, batch).await;

    assert_eq!(harness.connector.opens(), 3);
    assert_eq!(harness.connector.closes(), 3);
}

#[tokio::test]
async fn test_store_write_failure_fails_admitted_hosts() {
    let harness = TestHarness::new();
    harness.seed_group("web").await.unwrap();
    harness.store.fail_writes(true);

    let batch = vec![candidate("a", "10.0.0.1"), candidate("a", "10.0.0.2"), candidate("b", "10.0.0.3")];
    let report = harness.service().add_host_batch(OWNER, batch).await;

    assert_eq!(report.code, ResultCode::StoreWriteError);
    assert_eq!(report.results.len(), 3);
    assert!(report.results.iter().all(|r| r.result == Outcome::Failed));
    assert_eq!(report.results[2].reason.as_deref(), Some("insert database error"));
}

#[tokio::test]
async fn test_unreachable_inventory_fails_whole_batch() {
    let harness = TestHarness::new();
    harness.store.fail_reads(true);

    let report = harness.service().add_host_batch(OWNER, vec![candidate("a", "10.0.0.1")]).await;
    assert_eq!(report.code, ResultCode::StoreConnectError);
    assert_eq!(report.results.len(), 1);
    assert_eq!(harness.connector.opens(), 0);
}

#[tokio::test]
async fn test_single_add_reports_collisions() {
    let harness = TestHarness::new();
    harness.seed_group("web").await.unwrap();
    let service = harness.service();

    let added = service.add_host(OWNER, candidate("one", "10.0.0.1")).await.unwrap();
    assert_eq!(added.status, Some(HostStatus::Online));

    let err = service.add_host(OWNER, candidate("two", "10.0.0.1")).await.unwrap_err();
    assert_eq!(err.code(), ResultCode::DataExists);

    let mut stray = candidate("three", "10.0.0.3");
    stray.host_group_name = "missing".into();
    let err = service.add_host(OWNER, stray).await.unwrap_err();
    assert_eq!(err.code(), ResultCode::ParamError);
}

#[tokio::test]
async fn test_overlapping_batches_register_a_host_once() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(JsonInventoryStore::open(dir.path().join("inventory.json")).await.unwrap());
    store.insert_group(OWNER, "web", "").await.unwrap();

    let connector = ScriptedConnector::new().with_latency(Duration::from_millis(100));
    let orchestrator = ProvisioningOrchestrator::new(Arc::new(connector), Arc::new(FixedKeys::default()));
    let telemetry = TelemetryFanout::new(Arc::new(ScriptedAgentClient::new()));
    let service = HostService::new(store.clone(), Arc::new(NoActiveWorkflows), orchestrator, telemetry);

    let (first, second) = tokio::join!(
        service.add_host_batch(OWNER, vec![candidate("web-01", "10.0.0.1")]),
        service.add_host_batch(OWNER, vec![candidate("web-01", "10.0.0.1")]),
    );

    let mut codes = vec![first.code, second.code];
    codes.sort_by_key(|c| *c != ResultCode::Succeeded);
    assert_eq!(codes, vec![ResultCode::Succeeded, ResultCode::DataExists]);
    let loser = if first.code == ResultCode::Succeeded { &second } else { &first };
    assert_eq!(loser.results[0].result, Outcome::Failed);
    assert_eq!(loser.results[0].reason.as_deref(), Some("host name or address already exists"));

    let (hosts, _) = store.hosts_and_groups(OWNER).await.unwrap();
    assert_eq!(hosts.len(), 1);
}

#[tokio::test]
async fn test_overlapping_single_adds_register_a_host_once() {
    let connector = ScriptedConnector::new().with_latency(Duration::from_millis(50));
    let harness = TestHarness::new().with_connector(connector);
    harness.seed_group("web").await.unwrap();
    let service = harness.service();

    let (first, second) = tokio::join!(
        service.add_host(OWNER, candidate("db-01", "10.0.0.7")),
        service.add_host(OWNER, candidate("db-02", "10.0.0.7")),
    );

    assert_eq!([&first, &second].iter().filter(|r| r.is_ok()).count(), 1);
    let err = first.err().or(second.err()).unwrap();
    assert_eq!(err.code(), ResultCode::DataExists);
    assert_eq!(harness.store.all_hosts().len(), 1);
}
