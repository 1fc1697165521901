//! A bare test producer: binds a Server Endpoint and, if asked, registers
//! with a Network Manager — named after the original tooling's
//! `test-server.cc` (CLI shape only).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use dqm_core::{
    BindConfig, ConnectConfig, RegisterAction, RegisterMessage, ServiceInfo, ServiceType,
    WebsocketFrame,
};
use dqm_core::util::find_available_port;
use dqm_runtime::{LoggingBuilder, ProcessRuntime};
use dqm_transport::{ClientEndpoint, EventLoopManager, ReconnectPolicy, ServerEndpoint};

#[derive(Parser, Debug)]
#[command(name = "dqm4hep-test-server", version, about)]
struct Args {
    /// Port to bind the producer's own Server Endpoint on. Omit to have one
    /// picked automatically from the fabric's default range.
    #[arg(long)]
    port: Option<u16>,

    /// Name this producer advertises when registering.
    #[arg(long, default_value = "test-server")]
    name: String,

    /// Host this producer advertises as reachable at.
    #[arg(long, default_value = "127.0.0.1")]
    advertise_host: String,

    /// `host:port` of a Network Manager to register with. Omit to run
    /// standalone.
    #[arg(long)]
    register_with: Option<String>,

    /// Service names this producer advertises (repeatable), all tagged
    /// PUB_SUB — the only service type the core exercises.
    #[arg(long = "service", default_values_t = vec!["/test".to_string()])]
    services: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    LoggingBuilder::new().init();

    let runtime = ProcessRuntime::new();
    let server = Arc::new(ServerEndpoint::new(runtime.manager()));
    server.set_on_new_connection(|conn| info!(%conn, "subscriber connected"));
    server.set_on_connection_close(|conn| info!(%conn, "subscriber disconnected"));

    let port = match args.port {
        Some(port) => port,
        None => {
            let found = find_available_port(5556, 6556);
            u16::try_from(found).context("no available port found in 5556..=6556")?
        }
    };
    let bound_port = server
        .bind(BindConfig::new(port as i32))
        .await
        .context("binding test server endpoint")?;
    info!(port = bound_port, "test server listening");

    if let Some(netmgr_addr) = args.register_with.as_deref() {
        let (host, port) = netmgr_addr
            .rsplit_once(':')
            .context("--register-with must be HOST:PORT")?;
        let port: u16 = port.parse().context("--register-with port must be numeric")?;

        let mut services = ServiceInfo::new();
        for name in &args.services {
            services.insert(name.clone(), ServiceType::PubSub);
        }

        let register = RegisterMessage {
            action: RegisterAction::Register,
            server: args.name.clone(),
            host: args.advertise_host.clone(),
            port: bound_port,
            services,
        };

        let _client = register_with_retry(runtime.manager(), host.to_string(), port, register).await;
    }

    runtime.run_until_shutdown().await;
    Ok(())
}

/// Connects to the Network Manager's `/servers` route and sends `register`,
/// retrying with backoff on rejection or a dropped connection — the
/// mitigation for registration identity races under concurrent restarts.
async fn register_with_retry(
    manager: EventLoopManager,
    host: String,
    port: u16,
    register: RegisterMessage,
) -> ClientEndpoint {
    let client = ClientEndpoint::new(manager);
    let rejected = Arc::new(AtomicBool::new(false));
    {
        let rejected = rejected.clone();
        client.set_on_message(move |_conn, frame| {
            if let Some(text) = frame.as_str()
                && let Ok(value) = serde_json::from_str::<serde_json::Value>(text)
                && value.get("subject").and_then(|s| s.as_str()) == Some("regfail")
            {
                let reason = value.get("reason").and_then(|r| r.as_str()).unwrap_or("");
                warn!(reason, "registration rejected by network manager");
                rejected.store(true, Ordering::SeqCst);
            }
        });
    }
    client
        .set_connect_config(ConnectConfig::new(host, port as i32, "/servers"))
        .expect("client endpoint is freshly created and cannot already be connected");

    let mut policy = ReconnectPolicy::default();
    loop {
        rejected.store(false, Ordering::SeqCst);
        let connected = client.connect().await;
        if let Err(e) = connected {
            warn!(error = %e, "connecting to network manager failed");
        } else {
            match serde_json::to_string(&register) {
                Ok(json) => {
                    if let Err(e) = client.send(WebsocketFrame::text(json)) {
                        warn!(error = %e, "sending registration frame failed");
                    } else {
                        // Grace period to observe an immediate regfail/close
                        // before declaring the registration successful.
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        if !rejected.load(Ordering::SeqCst) && client.is_connected() {
                            info!(server = %register.server, "registered with network manager");
                            return client;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "serializing registration message failed"),
            }
        }

        // Drop any connection left over from a rejected/unconfirmed attempt
        // so the next loop iteration's `connect()` isn't rejected itself.
        client.close();

        match policy.next_delay() {
            Some(delay) => tokio::time::sleep(delay).await,
            None => {
                warn!("giving up on network manager registration after max retries");
                return client;
            }
        }
    }
}
