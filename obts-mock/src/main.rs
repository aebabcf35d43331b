use std::env;

use anyhow::Context;
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::EnvFilter;

use obts_common::Service;
use obts_mock::MockServer;

/// Serves all three mock services on their default ports.
///
/// `OBTS_MOCK_HOST` picks the listen address (default `127.0.0.1`);
/// `RUST_LOG` sets the log filter (default `info`).
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let host = env::var("OBTS_MOCK_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

    let mut servers = JoinSet::new();
    for service in Service::ALL {
        let addr = format!("{host}:{}", service.default_port());
        let server = MockServer::bind(&addr, service)
            .await
            .with_context(|| format!("failed to bind {service} on {addr}"))?;
        servers.spawn(server.serve());
    }
    info!(%host, "mock services started");

    while let Some(joined) = servers.join_next().await {
        joined.context("mock server task panicked")??;
    }
    Ok(())
}
