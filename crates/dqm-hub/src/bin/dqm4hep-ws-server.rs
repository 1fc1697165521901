//! Binary entry point for the DQM4hep Service Forwarding Hub's gateway.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use dqm_core::BindConfig;
use dqm_hub::ServiceForwardingHub;
use dqm_runtime::{LoggingBuilder, ProcessRuntime, load_config};

#[derive(Parser, Debug)]
#[command(name = "dqm4hep-ws-server", version, about)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the configured bind port.
    #[arg(long)]
    port: Option<u16>,

    /// Overrides the fixed width of the service-name field.
    #[arg(long)]
    name_field_width: Option<usize>,
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

    let port = args.port.unwrap_or(config.hub.port);
    let name_field_width = args.name_field_width.unwrap_or(config.hub.name_field_width);

    let runtime = ProcessRuntime::new();
    let hub = ServiceForwardingHub::new(
        runtime.manager(),
        &config.hub.netmgr_host,
        config.hub.netmgr_port,
        name_field_width,
    )
    .context("constructing service forwarding hub")?;

    let bound_port = hub
        .bind(BindConfig::new(port as i32))
        .await
        .context("binding service forwarding hub endpoint")?;
    info!(
        port = bound_port,
        netmgr_host = %config.hub.netmgr_host,
        netmgr_port = config.hub.netmgr_port,
        "service forwarding hub listening on /service"
    );

    runtime.run_until_shutdown().await;
    Ok(())
}
