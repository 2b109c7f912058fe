use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod panel;
mod poller;
mod session;
mod status;
mod transport;

#[cfg(test)]
mod testing;

use panel::{panel_router, PanelState};
use poller::{PollerOptions, StatusPoller};
use session::PanelSession;
use transport::HttpTransport;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!(
        r#"
  statuspanel {}
  server status at a glance
"#,
        env!("CARGO_PKG_VERSION")
    );

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_FILE));
    let config = config::load_or_create(&config_path).await?;

    let transport = Arc::new(HttpTransport::new(&config.upstream)?);
    let session = Arc::new(PanelSession::new(
        config.session.user.clone(),
        config.upstream.entry_url.clone(),
    ));
    let poller = StatusPoller::start(
        transport,
        session.clone(),
        PollerOptions {
            fetch_timeout: config.upstream.fetch_timeout(),
        },
    );
    info!(status_url = %config.upstream.status_url, "polling server status");

    let state = Arc::new(PanelState {
        poller: poller.clone(),
        session,
        labels: config.labels.clone(),
    });
    let app = panel_router(state);

    let addr: SocketAddr = format!("{}:{}", config.panel.host, config.panel.port)
        .parse()
        .context("Invalid panel listen address")?;
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "status panel listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    poller.dispose();
    Ok(())
}
