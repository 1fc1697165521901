//! Shared data model, error types and utilities for the DQM4hep network
//! fabric. Every other crate in the workspace depends on this one; it
//! depends on nothing workspace-local.

pub mod collaborator;
pub mod error;
pub mod frame;
pub mod http;
pub mod model;
pub mod util;
pub mod wire;
pub mod ws;

pub use collaborator::{MonitorElementSink, ObjectStreamer, QualityTestPlugin, QualityTestVerdict, XmlConfigLoader};
pub use error::{NetError, NetResult};
pub use frame::{
    DEFAULT_NAME_FIELD_WIDTH, build_forwarded_frame, build_subscription_frame,
    parse_subscription_frame, pad_service_name, split_name_field,
};
pub use http::{HttpMessage, HttpResponse};
pub use model::{
    BindConfig, Connection, ConnectionIdGen, ConnectConfig, ServerInfo, ServiceInfo, ServiceType,
    validate_service_name,
};
pub use wire::{RegFailMessage, RegisterAction, RegisterMessage};
pub use ws::{WebsocketFrame, WsOpcode};
