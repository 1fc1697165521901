//! Configuration schema for DQM4hep binaries, loaded through [`super::loader`].
//!
//! # Example configuration (TOML)
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [network_manager]
//! host = "0.0.0.0"
//! port = 5555
//!
//! [hub]
//! host = "0.0.0.0"
//! port = 5556
//! netmgr_host = "127.0.0.1"
//! netmgr_port = 5555
//! ```

use serde::{Deserialize, Serialize};

/// Root configuration for any DQM4hep binary. Sections unused by a given
/// binary (e.g. `hub` when running the Network Manager) are simply ignored.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NetConfig {
    pub logging: LoggingConfig,
    pub network_manager: NetworkManagerConfig,
    pub hub: HubConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub with_target: bool,
    pub with_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_target: false,
            with_thread_ids: false,
        }
    }
}

/// Where the Network Manager binds its `/servers` (producer registration)
/// and `/list` (fleet query) routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkManagerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for NetworkManagerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5555,
        }
    }
}

/// Where the Service Forwarding Hub binds its `/service` route, and which
/// Network Manager it queries to resolve a service name to a producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub host: String,
    pub port: u16,
    pub netmgr_host: String,
    pub netmgr_port: u16,
    /// Fixed width, in bytes, of the service-name field in every frame on
    /// the `/service` route. Must match across producer and
    /// subscriber — there is no negotiation.
    pub name_field_width: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5556,
            netmgr_host: "127.0.0.1".to_string(),
            netmgr_port: 5555,
            name_field_width: dqm_core::DEFAULT_NAME_FIELD_WIDTH,
        }
    }
}
