//! Core data model shared by every component of the network fabric.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{NetError, NetResult};

// =============================================================================
// Connection
// =============================================================================

/// Monotonic source for [`Connection`] identities, owned by the Event Loop's
/// manager handle (one per Server/Client Endpoint instance).
///
/// Connections are anonymous peers, so identity is a bare counter rather
/// than anything derived from the protocol they speak.
#[derive(Debug, Default)]
pub struct ConnectionIdGen(AtomicU64);

impl ConnectionIdGen {
    /// Creates a fresh generator starting at 1 (0 is reserved as "no connection").
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    /// Allocates the next identity.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Opaque handle to one live peer socket plus the route it was opened on.
///
/// Valid only between the `onNewConnection`/`onConnect` callback that
/// introduced it and the `onConnectionClose`/`onClose` callback that retires
/// it. Connections compare and hash by their stable numeric identity only;
/// the route is carried for `broadcastRoute` and diagnostics and does not
/// participate in equality.
#[derive(Clone, Debug)]
pub struct Connection {
    id: u64,
    route: Arc<str>,
}

impl Connection {
    /// Creates a handle for a socket accepted/opened on `route`.
    pub fn new(id: u64, route: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            route: route.into(),
        }
    }

    /// The connection's stable identity.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The route this connection was opened on (e.g. `/servers`, `/service`).
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Derived accessor for callers that expect a `uri` field rather than
    /// `route`. `route` is authoritative here; `uri` is never stored
    /// redundantly, only recomputed from it.
    pub fn uri(&self) -> &str {
        &self.route
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

impl Hash for Connection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Connection {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Connection {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}[{}]", self.id, self.route)
    }
}

// =============================================================================
// ServiceType / ServiceInfo / ServerInfo
// =============================================================================

/// Tagged variant attached to each service name a server registers.
///
/// Only [`ServiceType::PubSub`] is exercised by the Hub's forwarding path;
/// `Request` and `Push` are preserved from the source enum but unused by the
/// core today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ServiceType {
    #[default]
    Unknown = 0,
    Request = 1,
    PubSub = 2,
    Push = 3,
}

impl ServiceType {
    fn from_u8(value: u8) -> NetResult<Self> {
        match value {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Request),
            2 => Ok(Self::PubSub),
            3 => Ok(Self::Push),
            other => Err(NetError::ProtocolError(format!(
                "unknown service type: {other}"
            ))),
        }
    }
}

impl Serialize for ServiceType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for ServiceType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Self::from_u8(value).map_err(serde::de::Error::custom)
    }
}

/// Per-server mapping from service name (must begin with `/`) to its type.
pub type ServiceInfo = HashMap<String, ServiceType>;

/// Validates that a service name begins with `/`.
pub fn validate_service_name(name: &str) -> NetResult<()> {
    if name.starts_with('/') {
        Ok(())
    } else {
        Err(NetError::InvalidParameter(format!(
            "service name must begin with '/': {name}"
        )))
    }
}

/// Record describing one registered server in the fleet.
///
/// Unique per fleet by `name`; created on successful registration at the
/// Network Manager, mutated only by replacing its `services` set, and
/// destroyed on producer disconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub server: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub services: ServiceInfo,
}

impl ServerInfo {
    pub fn new(server: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            server: server.into(),
            host: host.into(),
            port,
            services: ServiceInfo::new(),
        }
    }
}

// =============================================================================
// BindConfig / ConnectConfig
// =============================================================================

/// Configuration for [`dqm_transport`'s] Server Endpoint bind operation.
#[derive(Debug, Clone, Copy)]
pub struct BindConfig {
    pub port: i32,
    pub enable_websockets: bool,
    pub enable_http: bool,
}

impl BindConfig {
    pub fn new(port: i32) -> Self {
        Self {
            port,
            enable_websockets: true,
            enable_http: true,
        }
    }

    /// Validates `port > 0`. Unlike `ConnectConfig`, this endpoint never
    /// accepts `0` as "let the OS assign an ephemeral port" — callers that
    /// want an OS-assigned port must discover one themselves (e.g. via
    /// [`crate::util::find_available_port`]) and bind that concrete port.
    pub fn validate(&self) -> NetResult<()> {
        if self.port > 0 {
            Ok(())
        } else {
            Err(NetError::InvalidParameter(format!(
                "bind port must be > 0, got {}",
                self.port
            )))
        }
    }
}

/// Configuration for a Client Endpoint's outbound connection.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    pub host: String,
    pub port: i32,
    pub route: String,
}

impl ConnectConfig {
    pub fn new(host: impl Into<String>, port: i32, route: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            route: route.into(),
        }
    }

    /// Validates `port > 0` and `route` starts with `/`.
    pub fn validate(&self) -> NetResult<()> {
        if self.port <= 0 {
            return Err(NetError::InvalidParameter(format!(
                "connect port must be > 0, got {}",
                self.port
            )));
        }
        if !self.route.starts_with('/') {
            return Err(NetError::InvalidParameter(format!(
                "route must begin with '/': {}",
                self.route
            )));
        }
        Ok(())
    }

    /// The `ws://host:port/route` URL sent during the handshake.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, self.route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_equality_ignores_route() {
        let a = Connection::new(1, "/servers");
        let b = Connection::new(1, "/service");
        let c = Connection::new(2, "/servers");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a < c);
    }

    #[test]
    fn bind_config_rejects_non_positive_port() {
        assert!(BindConfig::new(0).validate().is_err());
        assert!(BindConfig::new(-1).validate().is_err());
        assert!(BindConfig::new(5555).validate().is_ok());
    }

    #[test]
    fn connect_config_requires_rooted_route() {
        let cfg = ConnectConfig::new("localhost", 5555, "servers");
        assert!(cfg.validate().is_err());
        let cfg = ConnectConfig::new("localhost", 5555, "/servers");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.ws_url(), "ws://localhost:5555/servers");
    }

    #[test]
    fn service_name_validation() {
        assert!(validate_service_name("/svc").is_ok());
        assert!(validate_service_name("svc").is_err());
    }

    #[test]
    fn service_type_round_trips_through_json() {
        let v = serde_json::to_value(ServiceType::PubSub).unwrap();
        assert_eq!(v, serde_json::json!(2));
        let t: ServiceType = serde_json::from_value(v).unwrap();
        assert_eq!(t, ServiceType::PubSub);
    }
}
