//! Layered configuration for DQM4hep binaries (file + environment overrides).

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::load_config;
pub use schema::{HubConfig, LogLevel, LoggingConfig, NetConfig, NetworkManagerConfig};
