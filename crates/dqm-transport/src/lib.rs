//! Event Loop, Server Endpoint and Client Endpoint for the DQM4hep network
//! fabric.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────┐
//! │  dqm-netmgr / dqm-hub      │  (application callbacks)
//! ├───────────────────────────┤
//! │  dqm-transport              │  <- this crate
//! │   EventLoop ── ServerEndpoint
//! │            └── ClientEndpoint
//! ├───────────────────────────┤
//! │  Network (TCP / HTTP / WS) │
//! └───────────────────────────┘
//! ```
//!
//! Every callback an application registers on a [`ServerEndpoint`] or
//! [`ClientEndpoint`] is invoked from the [`EventLoop`] it was built against,
//! one at a time — see [`event_loop`] for why that matters.

mod client;
mod event_loop;
mod http_client;
mod reconnect;
mod server;

pub use client::ClientEndpoint;
pub use event_loop::{DEFAULT_POLL_MILLIS, EventLoop, EventLoopManager};
pub use http_client::HttpClient;
pub use reconnect::ReconnectPolicy;
pub use server::ServerEndpoint;
