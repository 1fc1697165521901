//! The fleet: every producer currently registered with this Network Manager.
//!
//! One `RwLock`-guarded map keyed by a stable name, plus a second map
//! resolving an active connection back to that name so a dropped socket can
//! retire its entry without the caller needing to remember the name itself.
//! Both maps live behind a single lock: the connection↔name relationship
//! must be updated atomically, and two separately locked maps cannot give
//! that guarantee.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;

use dqm_core::{Connection, NetError, NetResult, ServerInfo};

struct FleetInner {
    servers: HashMap<String, ServerInfo>,
    by_connection: HashMap<u64, String>,
}

/// Shared, thread-safe table of registered producers.
pub struct Fleet {
    inner: RwLock<FleetInner>,
}

impl Fleet {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(FleetInner {
                servers: HashMap::new(),
                by_connection: HashMap::new(),
            }),
        }
    }

    /// Registers `info` under `conn`. Fails with [`NetError::AlreadyPresent`]
    /// if a server with the same name is already registered — at most one
    /// producer may own a given name at a time.
    pub fn register(&self, conn: &Connection, info: ServerInfo) -> NetResult<()> {
        let mut inner = self.inner.write();
        if inner.servers.contains_key(&info.server) {
            return Err(NetError::AlreadyPresent(format!(
                "server '{}' is already registered",
                info.server
            )));
        }
        inner.by_connection.insert(conn.id(), info.server.clone());
        inner.servers.insert(info.server.clone(), info);
        Ok(())
    }

    /// Retires whatever entry `conn` owns, if any. Safe to call for a
    /// connection that never registered (a no-op).
    pub fn unregister_connection(&self, conn: &Connection) -> Option<ServerInfo> {
        let mut inner = self.inner.write();
        let name = inner.by_connection.remove(&conn.id())?;
        inner.servers.remove(&name)
    }

    pub fn lookup(&self, name: &str) -> Option<ServerInfo> {
        self.inner.read().servers.get(name).cloned()
    }

    pub fn list(&self) -> Vec<ServerInfo> {
        self.inner.read().servers.values().cloned().collect()
    }

    pub fn stats(&self) -> FleetStats {
        let inner = self.inner.read();
        FleetStats {
            server_count: inner.servers.len(),
        }
    }
}

impl Default for Fleet {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FleetStats {
    pub server_count: usize,
}

impl fmt::Display for FleetStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} server(s) registered", self.server_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dqm_core::ServiceType;

    fn conn(id: u64) -> Connection {
        Connection::new(id, "/servers")
    }

    #[test]
    fn register_then_lookup() {
        let fleet = Fleet::new();
        let mut info = ServerInfo::new("ecal-dqm", "10.0.0.5", 6000);
        info.services.insert("/x".to_string(), ServiceType::PubSub);
        fleet.register(&conn(1), info).unwrap();

        let found = fleet.lookup("ecal-dqm").unwrap();
        assert_eq!(found.host, "10.0.0.5");
        assert_eq!(fleet.stats().server_count, 1);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let fleet = Fleet::new();
        fleet
            .register(&conn(1), ServerInfo::new("ecal-dqm", "10.0.0.5", 6000))
            .unwrap();
        let err = fleet
            .register(&conn(2), ServerInfo::new("ecal-dqm", "10.0.0.6", 6001))
            .unwrap_err();
        assert!(matches!(err, NetError::AlreadyPresent(_)));
    }

    #[test]
    fn disconnect_retires_entry() {
        let fleet = Fleet::new();
        let c = conn(1);
        fleet
            .register(&c, ServerInfo::new("ecal-dqm", "10.0.0.5", 6000))
            .unwrap();
        assert!(fleet.unregister_connection(&c).is_some());
        assert!(fleet.lookup("ecal-dqm").is_none());
        assert_eq!(fleet.stats().server_count, 0);
    }

    #[test]
    fn disconnect_of_unknown_connection_is_a_no_op() {
        let fleet = Fleet::new();
        assert!(fleet.unregister_connection(&conn(99)).is_none());
    }
}
