//! Logging, configuration and process shutdown wiring for DQM4hep binaries.
//!
//! `dqm-cli`, `dqm-netmgr` and `dqm-hub` all depend on this crate for the
//! ambient concerns a standalone binary needs beyond the networking fabric
//! itself: reading `dqm4hep.toml` plus environment overrides into a
//! [`config::NetConfig`], initializing `tracing` via [`logging::LoggingBuilder`],
//! and waiting for a shutdown signal via [`runtime::ProcessRuntime`].

pub mod config;
pub mod logging;
pub mod runtime;

pub use config::{NetConfig, load_config};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::ProcessRuntime;
