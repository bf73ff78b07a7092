/**
 * FLEET KERNEL - Server entry point
 *
 * ROLE: loads config and inventory, wires the SSH connector, key generator
 * and agent client into `HostService`, then serves the HTTP API.
 */

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use fleet_kernel::config::{load_config, API_KEY_ENV};
use fleet_kernel::http::{build_router, AppState};
use fleet_kernel::inventory::{JsonInventoryStore, NoActiveWorkflows};
use fleet_kernel::keys::Ed25519Generator;
use fleet_kernel::provision::ProvisioningOrchestrator;
use fleet_kernel::ssh::RusshConnector;
use fleet_kernel::telemetry::{HttpAgentClient, TelemetryFanout};
use fleet_kernel::HostService;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // missing .env is fine
    tracing_subscriber::fmt().init();

    let cfg = load_config().await;

    if let Some(dir) = std::path::Path::new(&cfg.inventory.data_file).parent() {
        if !dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("cannot create {}", dir.display()))?;
        }
    }
    let store = JsonInventoryStore::open(&cfg.inventory.data_file)
        .await
        .context("failed to open inventory")?;

    let connector = RusshConnector::new(
        cfg.provisioning.connect_timeout(),
        cfg.provisioning.command_timeout(),
    );
    let orchestrator = ProvisioningOrchestrator::new(
        Arc::new(connector),
        Arc::new(Ed25519Generator::new(cfg.provisioning.key_comment.clone())),
    )
    .with_chunk_size(cfg.provisioning.chunk_size);

    let agent_client = HttpAgentClient::new(cfg.telemetry.timeout(), cfg.telemetry.scheme.clone())
        .context("failed to build agent client")?;
    let telemetry = TelemetryFanout::new(Arc::new(agent_client))
        .with_agent_port(cfg.telemetry.agent_port)
        .with_timeout(cfg.telemetry.timeout());

    let service = HostService::new(Arc::new(store), Arc::new(NoActiveWorkflows), orchestrator, telemetry);
    let api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
    let app = build_router(AppState { service, api_key: api_key.into() });

    let listener = TcpListener::bind(&cfg.http.bind)
        .await
        .with_context(|| format!("cannot bind {}", cfg.http.bind))?;
    info!("fleet kernel listening on http://{}", cfg.http.bind);
    axum::serve(listener, app).await.context("http server failed")?;
    Ok(())
}
