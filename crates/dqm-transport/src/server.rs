//! The Server Endpoint: binds one TCP port and dispatches inbound HTTP
//! requests and WebSocket frames to callbacks through an [`EventLoopManager`].
//!
//! Each [`ServerEndpoint`] owns its bind address outright rather than sharing
//! a process-wide address registry — a DQM4hep Network Manager or Hub binds
//! exactly one port for its own lifetime, so there is no need to multiplex
//! several independent listeners over one port.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::to_bytes,
    extract::{ConnectInfo, FromRequestParts, Request, State, WebSocketUpgrade, ws::Message},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::any,
};
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use dqm_core::{
    BindConfig, Connection, ConnectionIdGen, HttpMessage, HttpResponse, NetError, NetResult,
    WebsocketFrame, WsOpcode,
};

type HttpCallback = Box<dyn Fn(Connection, HttpMessage) -> HttpResponse + Send + Sync>;
type NewConnectionCallback = Box<dyn Fn(Connection) + Send + Sync>;
type CloseCallback = Box<dyn Fn(Connection) + Send + Sync>;
type MessageCallback = Box<dyn Fn(Connection, WebsocketFrame) + Send + Sync>;

/// Callback slots for one [`ServerEndpoint`]. Each setter replaces whatever
/// was previously registered ("last assignment wins" — there is no adapter
/// chain to fan a callback out to).
#[derive(Default)]
struct Callbacks {
    on_new_connection: RwLock<Option<NewConnectionCallback>>,
    on_connection_close: RwLock<Option<CloseCallback>>,
    on_message: RwLock<Option<MessageCallback>>,
    on_http_request: RwLock<Option<HttpCallback>>,
}

impl Callbacks {
    fn call_new_connection(&self, conn: Connection) {
        if let Some(cb) = self.on_new_connection.read().as_ref() {
            cb(conn);
        }
    }

    fn call_close(&self, conn: Connection) {
        if let Some(cb) = self.on_connection_close.read().as_ref() {
            cb(conn);
        }
    }

    fn call_message(&self, conn: Connection, frame: WebsocketFrame) {
        if let Some(cb) = self.on_message.read().as_ref() {
            cb(conn, frame);
        }
    }

    fn call_http(&self, conn: Connection, msg: HttpMessage) -> HttpResponse {
        match self.on_http_request.read().as_ref() {
            Some(cb) => cb(conn, msg),
            None => HttpResponse::not_implemented("No http request handler has been set!"),
        }
    }
}

/// Shared state reachable from every axum handler for one bound port.
struct ServerShared {
    conn_ids: ConnectionIdGen,
    callbacks: Arc<Callbacks>,
    manager: crate::EventLoopManager,
    connections: Mutex<HashMap<u64, PeerHandle>>,
    enable_http: bool,
    enable_websockets: bool,
}

/// Everything `send`/`broadcast`/`close` need to reach one live peer.
#[derive(Clone)]
struct PeerHandle {
    route: String,
    outbound: mpsc::Sender<WebsocketFrame>,
    close: CancellationToken,
}

/// A bound listener and the resources it owns; dropping this tears down the
/// accept loop and every live connection's tasks.
struct Bound {
    actual_port: u16,
    shutdown: CancellationToken,
}

impl Drop for Bound {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// One bound TCP port speaking HTTP and/or WebSocket to peers.
///
/// Connections accepted here are anonymous: the URI path requested at
/// connect/upgrade time becomes the [`Connection`]'s `route`, and it is up to
/// the registered callbacks to interpret that route (the Network Manager
/// only expects `/servers`; the Hub only expects `/service`).
pub struct ServerEndpoint {
    manager: crate::EventLoopManager,
    callbacks: Arc<Callbacks>,
    shared: Arc<Mutex<Option<Arc<ServerShared>>>>,
    bound: Mutex<Option<Bound>>,
}

impl ServerEndpoint {
    pub fn new(manager: crate::EventLoopManager) -> Self {
        Self {
            manager,
            callbacks: Arc::new(Callbacks::default()),
            shared: Arc::new(Mutex::new(None)),
            bound: Mutex::new(None),
        }
    }

    pub fn set_on_new_connection(&self, cb: impl Fn(Connection) + Send + Sync + 'static) {
        *self.callbacks.on_new_connection.write() = Some(Box::new(cb));
    }

    pub fn set_on_connection_close(&self, cb: impl Fn(Connection) + Send + Sync + 'static) {
        *self.callbacks.on_connection_close.write() = Some(Box::new(cb));
    }

    pub fn set_on_message(&self, cb: impl Fn(Connection, WebsocketFrame) + Send + Sync + 'static) {
        *self.callbacks.on_message.write() = Some(Box::new(cb));
    }

    pub fn set_on_http_request(
        &self,
        cb: impl Fn(Connection, HttpMessage) -> HttpResponse + Send + Sync + 'static,
    ) {
        *self.callbacks.on_http_request.write() = Some(Box::new(cb));
    }

    /// Binds `0.0.0.0:{config.port}` after validation (`port` must be a
    /// concrete positive value — callers that want an OS-assigned port
    /// should call [`dqm_core::util::find_available_port`] up front and
    /// pass the result in). Returns the actual bound port.
    pub async fn bind(&self, config: BindConfig) -> NetResult<u16> {
        config.validate()?;
        if self.bound.lock().is_some() {
            return Err(NetError::AlreadyInitialized(
                "server endpoint is already bound".to_string(),
            ));
        }

        let addr = format!("0.0.0.0:{}", config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| NetError::TransportFailure(format!("bind {addr} failed: {e}")))?;
        let actual_addr = listener
            .local_addr()
            .map_err(|e| NetError::TransportFailure(e.to_string()))?;

        let shared = Arc::new(ServerShared {
            conn_ids: ConnectionIdGen::new(),
            callbacks: self.callbacks.clone(),
            manager: self.manager.clone(),
            connections: Mutex::new(HashMap::new()),
            enable_http: config.enable_http,
            enable_websockets: config.enable_websockets,
        });
        *self.shared.lock() = Some(shared.clone());

        let router = build_router(shared);
        let shutdown = CancellationToken::new();
        let shutdown_serve = shutdown.clone();

        tokio::spawn(async move {
            let server = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            );
            tokio::select! {
                result = server => {
                    if let Err(e) = result {
                        error!(error = %e, "server endpoint accept loop failed");
                    }
                }
                () = shutdown_serve.cancelled() => {
                    info!(addr = %actual_addr, "server endpoint shutting down");
                }
            }
        });

        info!(addr = %actual_addr, "server endpoint bound");
        *self.bound.lock() = Some(Bound {
            actual_port: actual_addr.port(),
            shutdown,
        });
        Ok(actual_addr.port())
    }

    pub fn actual_port(&self) -> Option<u16> {
        self.bound.lock().as_ref().map(|b| b.actual_port)
    }

    pub fn is_bound(&self) -> bool {
        self.bound.lock().is_some()
    }

    /// Sends a frame to one live connection. A closed or unknown connection
    /// yields [`NetError::NotFound`] rather than panicking.
    pub fn send(&self, conn: &Connection, frame: WebsocketFrame) -> NetResult<()> {
        let shared = self.shared.lock().clone().ok_or_else(|| {
            NetError::NotInitialized("server endpoint is not bound".to_string())
        })?;
        let peer = shared
            .connections
            .lock()
            .get(&conn.id())
            .cloned()
            .ok_or_else(|| NetError::NotFound(format!("no live connection {conn}")))?;
        peer.outbound
            .try_send(frame)
            .map_err(|e| NetError::TransportFailure(format!("send to {conn} failed: {e}")))
    }

    /// Sends a clone of `frame` to every live connection whose route equals
    /// `route`. Individual send failures (a peer that disconnected between
    /// the snapshot and the send) are logged and do not abort the broadcast.
    pub fn broadcast_route(&self, route: &str, frame: WebsocketFrame) -> NetResult<usize> {
        self.broadcast_filtered(frame, |r| r == route)
    }

    /// Sends a clone of `frame` to every live websocket peer regardless of
    /// route.
    pub fn broadcast(&self, frame: WebsocketFrame) -> NetResult<usize> {
        self.broadcast_filtered(frame, |_| true)
    }

    fn broadcast_filtered(
        &self,
        frame: WebsocketFrame,
        mut keep: impl FnMut(&str) -> bool,
    ) -> NetResult<usize> {
        let shared = self.shared.lock().clone().ok_or_else(|| {
            NetError::NotInitialized("server endpoint is not bound".to_string())
        })?;
        let targets: Vec<_> = shared
            .connections
            .lock()
            .iter()
            .filter(|(_, peer)| keep(&peer.route))
            .map(|(id, peer)| (*id, peer.outbound.clone()))
            .collect();
        let mut delivered = 0;
        for (id, tx) in targets {
            if tx.try_send(frame.clone()).is_ok() {
                delivered += 1;
            } else {
                warn!(conn_id = id, "broadcast: drop, sender full or closed");
            }
        }
        Ok(delivered)
    }

    /// Closes one peer connection immediately. A peer that already
    /// disconnected is a silent no-op, matching `send`'s failure semantics.
    /// The peer's `onConnectionClose` callback still fires, from
    /// `handle_ws`'s teardown once its receive loop observes the
    /// cancellation.
    pub fn close(&self, conn: &Connection) {
        let Some(shared) = self.shared.lock().clone() else {
            return;
        };
        if let Some(peer) = shared.connections.lock().remove(&conn.id()) {
            peer.close.cancel();
        }
    }

    /// Unbinds the listener and marks every currently live websocket peer
    /// for immediate close; each peer's `onConnectionClose` still
    /// fires as its receive loop observes the cancellation. Idempotent.
    pub fn stop(&self) {
        if let Some(shared) = self.shared.lock().clone() {
            let peers: Vec<_> = shared.connections.lock().drain().collect();
            for (_, peer) in peers {
                peer.close.cancel();
            }
        }
        self.bound.lock().take();
        self.shared.lock().take();
    }
}

fn build_router(shared: Arc<ServerShared>) -> Router {
    Router::new()
        .route("/{*path}", any(route_dispatch))
        .route("/", any(route_dispatch))
        .with_state(shared)
}

/// Single entry point for every method on every path: a request carrying
/// `Upgrade: websocket` is handed to the websocket handshake, everything
/// else goes through the HTTP callback. One axum route per path (rather
/// than a separate GET-for-websocket / POST-for-HTTP split) is what lets a
/// plain HTTP GET — as `dqm4hep-probe` issues — reach `onHttpRequest`.
async fn route_dispatch(
    State(shared): State<Arc<ServerShared>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
) -> Response {
    let wants_upgrade = req
        .headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));

    if wants_upgrade {
        if !shared.enable_websockets {
            return (StatusCode::FORBIDDEN, "websockets disabled on this endpoint").into_response();
        }
        let route = req.uri().path().to_string();
        let (mut parts, _body) = req.into_parts();
        return match WebSocketUpgrade::from_request_parts(&mut parts, &shared).await {
            Ok(ws) => {
                debug!(remote_addr = %addr, route = %route, "new websocket connection request");
                ws.on_upgrade(move |socket| handle_ws(socket, route, shared))
                    .into_response()
            }
            Err(rejection) => rejection.into_response(),
        };
    }

    if !shared.enable_http {
        return (
            StatusCode::FORBIDDEN,
            "Http requests have been disabled for this server!",
        )
            .into_response();
    }

    let method = req.method().as_str().to_string();
    let uri = req.uri().to_string();
    let route = req.uri().path().to_string();
    let headers = req.headers().clone();
    let body = match to_bytes(req.into_body(), usize::MAX).await {
        Ok(b) => b,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("reading request body: {e}")).into_response();
        }
    };

    let conn = Connection::new(shared.conn_ids.next(), route);
    let mut msg = HttpMessage::new(method, uri).with_body(body.to_vec());
    for (name, value) in &headers {
        if let Ok(v) = value.to_str() {
            msg = msg.with_header(name.as_str().to_lowercase(), v.to_string());
        }
    }

    let (tx, rx) = oneshot::channel();
    let callbacks = shared.callbacks.clone();
    let conn_for_job = conn.clone();
    if shared
        .manager
        .dispatch(move || {
            let resp = callbacks.call_http(conn_for_job, msg);
            let _ = tx.send(resp);
        })
        .is_err()
    {
        return (StatusCode::SERVICE_UNAVAILABLE, "event loop stopped").into_response();
    }

    match rx.await {
        Ok(resp) => response_from(resp),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "callback dropped").into_response(),
    }
}

fn response_from(resp: HttpResponse) -> Response {
    let status =
        StatusCode::from_u16(resp.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [("content-type", resp.content_type)], resp.body).into_response()
}

async fn handle_ws(socket: axum::extract::ws::WebSocket, route: String, shared: Arc<ServerShared>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let id = shared.conn_ids.next();
    let conn = Connection::new(id, route.clone());

    let (tx, mut rx) = mpsc::channel::<WebsocketFrame>(256);
    let close_token = CancellationToken::new();
    shared.connections.lock().insert(
        id,
        PeerHandle {
            route,
            outbound: tx,
            close: close_token.clone(),
        },
    );

    let callbacks = shared.callbacks.clone();
    let conn_new = conn.clone();
    let _ = shared.manager.dispatch(move || callbacks.call_new_connection(conn_new));

    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let message = match frame.opcode {
                WsOpcode::Text => Message::Text(String::from_utf8_lossy(&frame.payload).into_owned().into()),
                WsOpcode::Binary => Message::Binary(frame.payload.into()),
            };
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        tokio::select! {
            () = close_token.cancelled() => {
                info!(conn = %conn, "websocket connection closed by endpoint");
                break;
            }
            result = ws_rx.next() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        let frame = WebsocketFrame::text(text.to_string());
                        dispatch_message(&shared, &conn, frame);
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let frame = WebsocketFrame::binary(data.to_vec());
                        dispatch_message(&shared, &conn, frame);
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        info!(conn = %conn, "websocket connection closed by peer");
                        break;
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        warn!(conn = %conn, error = %e, "websocket error");
                        break;
                    }
                    None => {
                        info!(conn = %conn, "websocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Dropping the peer's outbound `Sender` (by removing it from the
    // connections map, here or already done by an explicit `close()`) lets
    // `send_task` drain whatever was already queued before it observes the
    // channel close and exits on its own; intentionally not aborted, so a
    // `send` immediately followed by `close` still reaches the peer.
    shared.connections.lock().remove(&id);
    let callbacks = shared.callbacks.clone();
    let conn_close = conn.clone();
    let _ = shared.manager.dispatch(move || callbacks.call_close(conn_close));
}

fn dispatch_message(shared: &Arc<ServerShared>, conn: &Connection, frame: WebsocketFrame) {
    let callbacks = shared.callbacks.clone();
    let conn = conn.clone();
    let _ = shared.manager.dispatch(move || callbacks.call_message(conn, frame));
}
