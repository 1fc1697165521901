//! The Client Endpoint: an outbound WebSocket connection whose send/receive
//! loop is driven by the owning [`crate::EventLoopManager`].
//!
//! Reconnection is deliberately NOT automatic here. A lost connection calls
//! the close callback once and the loop exits; callers that want retries call
//! [`ClientEndpoint::connect`] (or [`ClientEndpoint::connect_with`]) again,
//! timed with [`crate::ReconnectPolicy`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dqm_core::{Connection, ConnectConfig, ConnectionIdGen, NetError, NetResult, WebsocketFrame, WsOpcode};

type OpenCallback = Box<dyn Fn(Connection) + Send + Sync>;
type CloseCallback = Box<dyn Fn(Connection) + Send + Sync>;
type MessageCallback = Box<dyn Fn(Connection, WebsocketFrame) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_open: RwLock<Option<OpenCallback>>,
    on_close: RwLock<Option<CloseCallback>>,
    on_message: RwLock<Option<MessageCallback>>,
}

struct Live {
    connection: Connection,
    outbound: mpsc::Sender<WebsocketFrame>,
    shutdown: CancellationToken,
}

/// Outstanding request/response correlations: a map keyed by an
/// application-chosen correlation id, generalized from a single
/// capture-a-closure-await-the-response shape. The wire format that carries
/// that id in the request/response frames is left to the caller, since
/// nothing in this fabric mandates one.
#[derive(Default)]
struct PendingRequests {
    waiters: Mutex<HashMap<String, oneshot::Sender<Vec<u8>>>>,
}

impl PendingRequests {
    fn register(&self, correlation_id: String) -> oneshot::Receiver<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(correlation_id, tx);
        rx
    }

    fn cancel(&self, correlation_id: &str) {
        self.waiters.lock().remove(correlation_id);
    }

    fn resolve(&self, correlation_id: &str, payload: Vec<u8>) -> bool {
        match self.waiters.lock().remove(correlation_id) {
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        }
    }
}

/// One outbound websocket connection, reused across reconnect attempts.
pub struct ClientEndpoint {
    manager: crate::EventLoopManager,
    conn_ids: ConnectionIdGen,
    callbacks: Arc<Callbacks>,
    live: Arc<Mutex<Option<Live>>>,
    pending: Arc<PendingRequests>,
    stored_config: Mutex<Option<ConnectConfig>>,
}

impl ClientEndpoint {
    pub fn new(manager: crate::EventLoopManager) -> Self {
        Self {
            manager,
            conn_ids: ConnectionIdGen::new(),
            callbacks: Arc::new(Callbacks::default()),
            live: Arc::new(Mutex::new(None)),
            pending: Arc::new(PendingRequests::default()),
            stored_config: Mutex::new(None),
        }
    }

    pub fn set_on_open(&self, cb: impl Fn(Connection) + Send + Sync + 'static) {
        *self.callbacks.on_open.write() = Some(Box::new(cb));
    }

    pub fn set_on_close(&self, cb: impl Fn(Connection) + Send + Sync + 'static) {
        *self.callbacks.on_close.write() = Some(Box::new(cb));
    }

    pub fn set_on_message(&self, cb: impl Fn(Connection, WebsocketFrame) + Send + Sync + 'static) {
        *self.callbacks.on_message.write() = Some(Box::new(cb));
    }

    pub fn is_connected(&self) -> bool {
        self.live.lock().is_some()
    }

    /// Stores `config` for later zero-argument [`ClientEndpoint::connect`]
    /// calls, the way a reconnect loop wants to configure once and retry
    /// many times. Fails with [`NetError::AlreadyPresent`] while a
    /// connection is already live — reconfiguring a live client is not
    /// supported, only a disconnected one.
    pub fn set_connect_config(&self, config: ConnectConfig) -> NetResult<()> {
        config.validate()?;
        if self.live.lock().is_some() {
            return Err(NetError::AlreadyPresent(
                "client endpoint is already connected; cannot change its connect config".to_string(),
            ));
        }
        *self.stored_config.lock() = Some(config);
        Ok(())
    }

    /// Connects using the config previously stored by
    /// [`ClientEndpoint::set_connect_config`]. Fails with
    /// [`NetError::NotInitialized`] if none has been set.
    pub async fn connect(&self) -> NetResult<Connection> {
        let config = self
            .stored_config
            .lock()
            .clone()
            .ok_or_else(|| NetError::NotInitialized("no connect config has been set".to_string()))?;
        self.connect_with(config).await
    }

    /// Connects to `config.ws_url()`, spawns the send/receive tasks, and
    /// dispatches `on_open` once the handshake completes. A second call while
    /// already connected fails with [`NetError::AlreadyInitialized`].
    ///
    /// A one-shot shortcut distinct from
    /// [`ClientEndpoint::set_connect_config`] + [`ClientEndpoint::connect`]:
    /// it also remembers `config`, so a later bare `connect()` (e.g. from a
    /// reconnect loop) reuses it.
    pub async fn connect_with(&self, config: ConnectConfig) -> NetResult<Connection> {
        config.validate()?;
        if self.live.lock().is_some() {
            return Err(NetError::AlreadyInitialized(
                "client endpoint is already connected".to_string(),
            ));
        }

        let url = config.ws_url();
        info!(url = %url, "client endpoint connecting");
        let (stream, _response) = connect_async(&url)
            .await
            .map_err(|e| NetError::TransportFailure(format!("connect to {url} failed: {e}")))?;

        let conn = Connection::new(self.conn_ids.next(), config.route.clone());
        *self.stored_config.lock() = Some(config.clone());
        let (ws_tx_half, mut ws_rx_half) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<WebsocketFrame>(256);
        let shutdown = CancellationToken::new();

        *self.live.lock() = Some(Live {
            connection: conn.clone(),
            outbound: outbound_tx,
            shutdown: shutdown.clone(),
        });

        let callbacks = self.callbacks.clone();
        let conn_open = conn.clone();
        let _ = self.manager.dispatch(move || {
            if let Some(cb) = callbacks.on_open.read().as_ref() {
                cb(conn_open);
            }
        });

        let manager = self.manager.clone();
        let callbacks = self.callbacks.clone();
        let conn_task = conn.clone();
        let shutdown_task = shutdown.clone();
        let live_slot = self.live.clone();

        tokio::spawn(async move {
            let mut ws_tx = ws_tx_half;
            loop {
                tokio::select! {
                    () = shutdown_task.cancelled() => {
                        let _ = ws_tx.close().await;
                        break;
                    }
                    Some(frame) = outbound_rx.recv() => {
                        let message = match frame.opcode {
                            WsOpcode::Text => Message::Text(String::from_utf8_lossy(&frame.payload).into_owned().into()),
                            WsOpcode::Binary => Message::Binary(frame.payload.into()),
                        };
                        if let Err(e) = ws_tx.send(message).await {
                            warn!(conn = %conn_task, error = %e, "client endpoint send failed");
                        }
                    }
                    msg = ws_rx_half.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                debug!(conn = %conn_task, len = text.len(), "client endpoint received text");
                                let frame = WebsocketFrame::text(text.to_string());
                                dispatch_message(&manager, &callbacks, &conn_task, frame);
                            }
                            Some(Ok(Message::Binary(data))) => {
                                debug!(conn = %conn_task, len = data.len(), "client endpoint received binary");
                                let frame = WebsocketFrame::binary(data.to_vec());
                                dispatch_message(&manager, &callbacks, &conn_task, frame);
                            }
                            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                            Some(Ok(Message::Close(_))) => {
                                info!(conn = %conn_task, "server closed client endpoint connection");
                                break;
                            }
                            Some(Ok(Message::Frame(_))) => {}
                            Some(Err(e)) => {
                                warn!(conn = %conn_task, error = %e, "client endpoint websocket error");
                                break;
                            }
                            None => {
                                info!(conn = %conn_task, "client endpoint stream ended");
                                break;
                            }
                        }
                    }
                }
            }

            // Clear the live slot before notifying callbacks, so an on_close
            // handler that immediately reconnects doesn't race the "already
            // connected" check in `connect`. Only clear if it's still us —
            // an explicit `close()` may already have taken it.
            {
                let mut guard = live_slot.lock();
                if guard.as_ref().is_some_and(|l| l.connection == conn_task) {
                    guard.take();
                }
            }

            let conn_close = conn_task.clone();
            let _ = manager.dispatch(move || {
                if let Some(cb) = callbacks.on_close.read().as_ref() {
                    cb(conn_close);
                }
            });
        });

        Ok(conn)
    }

    /// Sends a frame over the currently open connection.
    pub fn send(&self, frame: WebsocketFrame) -> NetResult<()> {
        let guard = self.live.lock();
        let live = guard
            .as_ref()
            .ok_or_else(|| NetError::NotInitialized("client endpoint is not connected".to_string()))?;
        live.outbound
            .try_send(frame)
            .map_err(|e| NetError::TransportFailure(format!("send failed: {e}")))
    }

    pub fn connection(&self) -> Option<Connection> {
        self.live.lock().as_ref().map(|l| l.connection.clone())
    }

    /// Closes the connection; the send/receive task's own shutdown branch
    /// fires the `on_close` callback once the close frame has been flushed.
    pub fn close(&self) {
        if let Some(live) = self.live.lock().take() {
            live.shutdown.cancel();
        }
    }

    /// Sends `frame` and awaits the matching response, correlated by
    /// `correlation_id` — the embedding of that id into `frame`'s payload,
    /// and the recognition of it in an incoming reply, are both the caller's
    /// responsibility (typically from inside the `on_message` callback,
    /// calling [`ClientEndpoint::resolve_pending`] once it recognizes a
    /// reply). Fails with [`NetError::TransportFailure`] if no matching
    /// reply arrives within `timeout`.
    pub async fn request(
        &self,
        correlation_id: impl Into<String>,
        frame: WebsocketFrame,
        timeout: Duration,
    ) -> NetResult<Vec<u8>> {
        let correlation_id = correlation_id.into();
        let rx = self.pending.register(correlation_id.clone());
        if let Err(e) = self.send(frame) {
            self.pending.cancel(&correlation_id);
            return Err(e);
        }
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(NetError::InternalFailure(
                "pending request dropped before a reply arrived".to_string(),
            )),
            Err(_) => {
                self.pending.cancel(&correlation_id);
                Err(NetError::TransportFailure(format!(
                    "request '{correlation_id}' timed out after {timeout:?}"
                )))
            }
        }
    }

    /// Delivers `payload` to the pending [`ClientEndpoint::request`] waiting
    /// on `correlation_id`, if any. Returns `false` if nothing was waiting
    /// (already timed out, or not a correlated reply at all) — the caller's
    /// `on_message` callback should fall through to its normal handling in
    /// that case.
    pub fn resolve_pending(&self, correlation_id: &str, payload: Vec<u8>) -> bool {
        self.pending.resolve(correlation_id, payload)
    }
}

fn dispatch_message(
    manager: &crate::EventLoopManager,
    callbacks: &Arc<Callbacks>,
    conn: &Connection,
    frame: WebsocketFrame,
) {
    let callbacks = callbacks.clone();
    let conn = conn.clone();
    let _ = manager.dispatch(move || {
        if let Some(cb) = callbacks.on_message.read().as_ref() {
            cb(conn, frame);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_delivers_to_the_matching_waiter() {
        let pending = PendingRequests::default();
        let rx = pending.register("req-1".to_string());
        assert!(pending.resolve("req-1", b"reply".to_vec()));
        assert_eq!(rx.await.unwrap(), b"reply");
    }

    #[test]
    fn resolve_with_no_waiter_is_a_no_op() {
        let pending = PendingRequests::default();
        assert!(!pending.resolve("missing", vec![]));
    }

    #[test]
    fn cancel_removes_the_waiter() {
        let pending = PendingRequests::default();
        let _rx = pending.register("req-2".to_string());
        pending.cancel("req-2");
        assert!(!pending.resolve("req-2", vec![]));
    }
}
