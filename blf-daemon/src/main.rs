//! BLF Relay Daemon
//!
//! Mirrors PBX busy-lamp switches onto daisy-chained serial relay boards and
//! reports switch changes back to every configured PBX.
//!
//! Usage: `blf-relayd [config.json]`

mod config;
mod port_watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use blf_protocol::SerialOpener;
use blf_sync::{ManagerSettings, Service};
use config::{manager_name, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "blf_relayd=info,blf_protocol=info,blf_logic=info,blf_manager=info,blf_sync=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = match std::env::args_os().nth(1) {
        Some(arg) => PathBuf::from(arg),
        None => Config::default_path()?,
    };
    tracing::info!("Starting BLF relay daemon with {}", path.display());

    let config = Config::load(&path)?;
    let model = Arc::new(config.build_model().context("invalid model configuration")?);
    tracing::info!(
        "Loaded {} switch(es) and {} board(s)",
        model.switches().len(),
        model.boards().len()
    );

    let mut service = Service::new(model, SerialOpener, config.serial.port_settings());
    for endpoint in &config.managers {
        service.add_manager(manager_name(endpoint), endpoint.clone(), ManagerSettings::from(endpoint));
    }
    service.start_all();

    let watcher = tokio::spawn(port_watch::watch_ports(
        service.port_wakers(),
        port_watch::POLL_INTERVAL,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");

    watcher.abort();
    service.stop_all();
    Ok(())
}
