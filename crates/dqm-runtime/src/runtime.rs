//! Process-level orchestration: owns the [`EventLoop`] a binary's endpoints
//! share and waits for a shutdown signal, ported from `AlloyRuntime`'s
//! `wait_for_shutdown` (the adapter registry/dispatcher machinery around it
//! has no counterpart here — endpoints are wired up directly by each binary
//! in `dqm-cli`/`dqm-netmgr`/`dqm-hub`).

use dqm_transport::{DEFAULT_POLL_MILLIS, EventLoop, EventLoopManager};
use tokio::signal;
use tracing::info;

/// Owns the process's [`EventLoop`] and blocks `main` until Ctrl+C/SIGTERM.
pub struct ProcessRuntime {
    event_loop: EventLoop,
}

impl ProcessRuntime {
    /// Builds and immediately starts the process's event loop on its own
    /// background thread. Panics only if the OS refuses to spawn that
    /// thread, which a binary can't meaningfully recover from anyway.
    pub fn new() -> Self {
        let event_loop = EventLoop::new();
        event_loop
            .start(false, DEFAULT_POLL_MILLIS)
            .expect("starting the process event loop");
        Self { event_loop }
    }

    pub fn manager(&self) -> EventLoopManager {
        self.event_loop.manager()
    }

    /// Blocks until a shutdown signal arrives, then stops the event loop.
    pub async fn run_until_shutdown(&self) {
        wait_for_shutdown().await;
        info!("stopping event loop");
        self.event_loop.stop();
    }
}

impl Default for ProcessRuntime {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .expect("failed to listen for Ctrl+C");
        info!("received Ctrl+C, shutting down");
    }
}
