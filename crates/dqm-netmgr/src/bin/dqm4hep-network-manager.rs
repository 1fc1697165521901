//! Binary entry point for the DQM4hep Network Manager.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use dqm_core::BindConfig;
use dqm_netmgr::NetworkManager;
use dqm_runtime::{LoggingBuilder, ProcessRuntime, load_config};

#[derive(Parser, Debug)]
#[command(name = "dqm4hep-network-manager", version, about)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the configured bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref()).context("loading configuration")?;

    LoggingBuilder::new()
        .with_level(config.logging.level.to_tracing_level())
        .with_target(config.logging.with_target)
        .with_thread_ids(config.logging.with_thread_ids)
        .init();

    let port = args.port.unwrap_or(config.network_manager.port);

    let runtime = ProcessRuntime::new();
    let netmgr = NetworkManager::new(runtime.manager());
    let bound_port = netmgr
        .bind(BindConfig::new(port as i32))
        .await
        .context("binding network manager endpoint")?;
    info!(port = bound_port, "network manager listening on /servers and /list");

    runtime.run_until_shutdown().await;
    Ok(())
}
