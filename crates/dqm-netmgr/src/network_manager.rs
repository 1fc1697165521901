//! Wires a [`ServerEndpoint`] and a [`Fleet`] together into the Network
//! Manager: the `/servers` registration handshake and the `/list` HTTP query.

use std::sync::Arc;

use tracing::{info, warn};

use dqm_core::{
    BindConfig, Connection, HttpMessage, HttpResponse, NetResult, RegFailMessage, RegisterAction,
    RegisterMessage, ServerInfo, WebsocketFrame, validate_service_name,
};
use dqm_transport::ServerEndpoint;

use crate::fleet::Fleet;

/// Binds one port that producers register on (`/servers`, WebSocket) and
/// consumers query (`/list`, HTTP GET).
///
/// Wires a callback table the same way a [`ServerEndpoint`] is normally
/// driven; the registration protocol itself follows the JSON shapes in
/// [`dqm_core::wire`] directly.
pub struct NetworkManager {
    server: Arc<ServerEndpoint>,
    fleet: Arc<Fleet>,
}

impl NetworkManager {
    pub fn new(manager: dqm_transport::EventLoopManager) -> Self {
        let server = Arc::new(ServerEndpoint::new(manager));
        let fleet = Arc::new(Fleet::new());
        let this = Self { server, fleet };
        this.wire_callbacks();
        this
    }

    pub fn fleet(&self) -> Arc<Fleet> {
        self.fleet.clone()
    }

    pub async fn bind(&self, config: BindConfig) -> NetResult<u16> {
        self.server.bind(config).await
    }

    pub fn actual_port(&self) -> Option<u16> {
        self.server.actual_port()
    }

    fn wire_callbacks(&self) {
        let fleet = self.fleet.clone();
        let server_for_message = self.server.clone();
        self.server.set_on_message(move |conn, frame| {
            handle_registration_frame(&server_for_message, &fleet, &conn, &frame);
        });

        let fleet = self.fleet.clone();
        self.server.set_on_connection_close(move |conn| {
            if let Some(info) = fleet.unregister_connection(&conn) {
                info!(server = %info.server, %conn, "producer disconnected, retired from fleet");
            }
        });

        let fleet = self.fleet.clone();
        self.server
            .set_on_http_request(move |_conn, msg| handle_http_request(&fleet, &msg));
    }
}

fn handle_registration_frame(
    server: &ServerEndpoint,
    fleet: &Fleet,
    conn: &Connection,
    frame: &WebsocketFrame,
) {
    let Some(text) = frame.as_str() else {
        warn!(%conn, "non-utf8 frame on /servers, ignoring");
        return;
    };

    let parsed: Result<RegisterMessage, _> = serde_json::from_str(text);
    let msg = match parsed {
        Ok(msg) => msg,
        Err(e) => {
            let fail = RegFailMessage::new(format!("malformed registration: {e}"));
            send_regfail(server, conn, fail);
            return;
        }
    };

    let RegisterAction::Register = msg.action;
    if let Err(e) = validate_service_names(&msg) {
        send_regfail(server, conn, RegFailMessage::new(e));
        return;
    }
    let info = ServerInfo {
        server: msg.server.clone(),
        host: msg.host,
        port: msg.port,
        services: msg.services,
    };
    match fleet.register(conn, info) {
        Ok(()) => info!(server = %msg.server, %conn, "producer registered"),
        Err(e) => send_regfail(server, conn, RegFailMessage::new(e.to_string())),
    }
}

fn validate_service_names(msg: &RegisterMessage) -> Result<(), String> {
    for name in msg.services.keys() {
        validate_service_name(name).map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Sends the `regfail` reply then immediately closes the offending
/// connection: a rejected registration gets exactly one reply frame
/// and no further chance to retry on the same socket.
fn send_regfail(server: &ServerEndpoint, conn: &Connection, fail: RegFailMessage) {
    let Ok(json) = serde_json::to_string(&fail) else {
        server.close(conn);
        return;
    };
    if let Err(e) = server.send(conn, WebsocketFrame::text(json)) {
        warn!(%conn, error = %e, "failed to deliver regfail");
    }
    server.close(conn);
}

fn handle_http_request(fleet: &Fleet, msg: &HttpMessage) -> HttpResponse {
    if msg.uri.starts_with("/list") {
        let by_name: std::collections::HashMap<String, ServerInfo> = fleet
            .list()
            .into_iter()
            .map(|info| (info.server.clone(), info))
            .collect();
        match serde_json::to_vec(&by_name) {
            Ok(body) => HttpResponse::json(200, body),
            Err(e) => HttpResponse::new(500, e.to_string().into_bytes()),
        }
    } else {
        HttpResponse::not_found(format!("no such route: {}", msg.uri))
    }
}
