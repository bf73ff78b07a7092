//! Fleet agent
//!
//! Runs on every managed host and answers the kernel's host info requests.

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use fleet_agent::api;
use fleet_agent::config::AgentConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt().init();

    let config = match AgentConfig::load_or_init().await {
        Ok(config) => config,
        Err(e) => {
            warn!("cannot read agent config, using defaults: {:#}", e);
            AgentConfig::default()
        }
    };

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;
    info!("fleet agent listening on http://{}", addr);

    axum::serve(listener, api::build_router())
        .await
        .context("Agent execution failed")?;
    Ok(())
}
