//! Wires a [`ServerEndpoint`] (the `/service` route consumers subscribe on)
//! to the [`ForwardingTable`] and an upstream [`ClientEndpoint`] per active
//! service.

use std::sync::Arc;

use tracing::{debug, info, warn};

use dqm_core::{
    BindConfig, Connection, ConnectConfig, DEFAULT_NAME_FIELD_WIDTH, NetResult, WebsocketFrame,
    build_subscription_frame, parse_subscription_frame,
};
use dqm_transport::{ClientEndpoint, EventLoopManager, ReconnectPolicy, ServerEndpoint};

use crate::forwarding::{ForwardingTable, SubscribeOutcome};
use crate::locator::ProducerLocator;

/// The Service Forwarding Hub: one bound `/service` port, one forwarding
/// table, one producer locator.
pub struct ServiceForwardingHub {
    inner: Arc<Inner>,
}

struct Inner {
    server: Arc<ServerEndpoint>,
    manager: EventLoopManager,
    table: ForwardingTable,
    locator: ProducerLocator,
    name_field_width: usize,
}

impl ServiceForwardingHub {
    /// `netmgr_host`/`netmgr_port` locate the Network Manager this hub
    /// resolves producers through. `name_field_width` must match whatever
    /// producers and consumers pad their service names to (default
    /// [`DEFAULT_NAME_FIELD_WIDTH`]).
    pub fn new(
        manager: EventLoopManager,
        netmgr_host: &str,
        netmgr_port: u16,
        name_field_width: usize,
    ) -> NetResult<Self> {
        let server = Arc::new(ServerEndpoint::new(manager.clone()));
        let inner = Arc::new(Inner {
            server,
            manager,
            table: ForwardingTable::new(),
            locator: ProducerLocator::new(netmgr_host, netmgr_port)?,
            name_field_width,
        });
        inner.wire_callbacks();
        Ok(Self { inner })
    }

    pub fn with_default_name_field_width(
        manager: EventLoopManager,
        netmgr_host: &str,
        netmgr_port: u16,
    ) -> NetResult<Self> {
        Self::new(manager, netmgr_host, netmgr_port, DEFAULT_NAME_FIELD_WIDTH)
    }

    pub async fn bind(&self, config: BindConfig) -> NetResult<u16> {
        self.inner.server.bind(config).await
    }

    pub fn actual_port(&self) -> Option<u16> {
        self.inner.server.actual_port()
    }

    /// Number of services currently ACTIVE (at least one subscriber), for
    /// diagnostics/tests.
    pub fn active_service_count(&self) -> usize {
        self.inner.table.active_service_count()
    }
}

impl Inner {
    fn wire_callbacks(self: &Arc<Self>) {
        let this = self.clone();
        self.server.set_on_message(move |conn, frame| {
            this.on_downstream_message(conn, frame);
        });

        let this = self.clone();
        self.server.set_on_connection_close(move |conn| {
            this.on_downstream_close(&conn);
        });
    }

    fn on_downstream_message(self: &Arc<Self>, conn: Connection, frame: WebsocketFrame) {
        let parsed = parse_subscription_frame(&frame.payload, self.name_field_width);
        let (name, action) = match parsed {
            Ok(pair) => pair,
            Err(e) => {
                warn!(%conn, error = %e, "malformed subscription frame, ignoring");
                return;
            }
        };

        match action.as_str() {
            "subscribe" => self.on_subscribe(conn, name),
            "unsubscribe" => self.on_unsubscribe(&conn, &name),
            other => warn!(%conn, action = other, "unknown hub action, ignoring"),
        }
    }

    fn on_subscribe(self: &Arc<Self>, conn: Connection, name: String) {
        match self.table.subscribe(&name, &conn) {
            SubscribeOutcome::Joined => {
                debug!(%conn, service = %name, "subscriber joined existing forwarding entry");
            }
            SubscribeOutcome::Created => {
                info!(%conn, service = %name, "new forwarding entry, opening upstream subscription");
                let this = self.clone();
                tokio::spawn(async move {
                    this.establish_upstream(name).await;
                });
            }
        }
    }

    fn on_unsubscribe(self: &Arc<Self>, conn: &Connection, name: &str) {
        if let Some(upstream) = self.table.unsubscribe(name, conn) {
            info!(%conn, service = %name, "last subscriber left, releasing upstream subscription");
            upstream.close();
        }
    }

    fn on_downstream_close(self: &Arc<Self>, conn: &Connection) {
        for upstream in self.table.drop_connection(conn) {
            upstream.close();
        }
    }

    /// Attempts to establish the upstream subscription for `name`, retrying
    /// with backoff while subscribers remain (a "deferred" failure
    /// policy, implemented with the same [`ReconnectPolicy`] the Network
    /// Manager registration retry uses).
    async fn establish_upstream(self: Arc<Self>, name: String) {
        let mut policy = ReconnectPolicy::default();
        let client = Arc::new(ClientEndpoint::new(self.manager.clone()));
        self.wire_upstream(&client, name.clone());
        loop {
            match self.try_open_upstream(&client, &name).await {
                Ok(upstream) => {
                    if let Some(stale) = self.table.install_upstream(&name, upstream) {
                        // every subscriber left while we were connecting
                        stale.close();
                    }
                    return;
                }
                Err(e) => {
                    warn!(service = %name, error = %e, "upstream subscription attempt failed");
                    if !self.table.clear_upstream_for_retry(&name) {
                        return; // no subscribers left, stop retrying
                    }
                    match policy.next_delay() {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => {
                            warn!(service = %name, "giving up on upstream subscription after max retries");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Resolves `name` to its producer and (re)connects `client` to it,
    /// reusing the one [`ClientEndpoint`] [`Self::establish_upstream`]
    /// allocated across every retry attempt — only the stored
    /// [`ConnectConfig`] is replaced, in case the locator resolves the
    /// producer to a new address between attempts.
    async fn try_open_upstream(
        self: &Arc<Self>,
        client: &Arc<ClientEndpoint>,
        name: &str,
    ) -> NetResult<Arc<ClientEndpoint>> {
        let (host, port) = self.locator.find(name).await?;
        let config = ConnectConfig::new(host, port as i32, "/service");
        client.set_connect_config(config)?;
        client.connect().await?;

        let subscribe = build_subscription_frame(name, "subscribe", self.name_field_width)?;
        client.send(WebsocketFrame::binary(subscribe))?;
        Ok(client.clone())
    }

    fn wire_upstream(self: &Arc<Self>, client: &Arc<ClientEndpoint>, name: String) {
        let this = self.clone();
        let fwd_name = name.clone();
        client.set_on_message(move |_conn, frame| {
            // Frames arriving from upstream are already name-prefixed (the
            // upstream speaks the same `/service` protocol, whether it's
            // the original producer or another hub), so they're forwarded
            // to every current subscriber verbatim.
            this.forward_to_subscribers(&fwd_name, &frame);
        });

        let this = self.clone();
        client.set_on_close(move |_conn| {
            let this = this.clone();
            let name = name.clone();
            tokio::spawn(async move {
                if this.table.clear_upstream_for_retry(&name) {
                    warn!(service = %name, "upstream subscription dropped, resubscribing");
                    this.establish_upstream(name).await;
                }
            });
        });
    }

    fn forward_to_subscribers(&self, name: &str, frame: &WebsocketFrame) {
        let subscribers = self.table.subscribers_of(name);
        if subscribers.is_empty() {
            return;
        }
        for conn in subscribers {
            if let Err(e) = self.server.send(&conn, frame.clone()) {
                debug!(%conn, service = %name, error = %e, "forward to subscriber failed");
            }
        }
    }
}
