//! Named interfaces for the modules this workspace treats as collaborators
//! rather than implements: the monitor-element data model, quality-test
//! plugins, and ROOT binary object streaming. None of these has a
//! concrete implementation here — only the trait boundary a real one would
//! plug into, handing an inbound event to protocol-specific code the core
//! never implements itself.
//!
//! XML-driven module configuration is the fourth named collaborator; this
//! fabric's own process configuration is real (`dqm-runtime::config`, TOML
//! + env vars) but an application module loading its own XML-described
//! setup on top of it is out of scope the same way, hence [`XmlConfigLoader`].

use crate::ws::WebsocketFrame;

/// Turns a service's forwarded payloads back into typed monitor elements
/// (histograms, counters). The Hub and Server Endpoint only ever see opaque
/// bytes; a real monitor-element book would be the thing registering one of
/// these against the services it cares about.
pub trait MonitorElementSink: Send + Sync {
    /// Called with each payload the sink subscribed to receives, in arrival order.
    fn publish(&self, service: &str, payload: &WebsocketFrame);
}

/// Evaluates one published payload against a quality criterion. Mirrors the
/// original DQM4hep quality-test plugin boundary; this crate never calls
/// `evaluate` itself, it only fixes the shape a test-plugin host would call
/// through.
pub trait QualityTestPlugin: Send + Sync {
    /// Stable plugin name, as it would appear in an XML module configuration.
    fn name(&self) -> &str;

    fn evaluate(&self, service: &str, payload: &[u8]) -> QualityTestVerdict;
}

/// Outcome of one [`QualityTestPlugin::evaluate`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTestVerdict {
    Pass,
    Warning,
    Failure,
}

/// Encodes/decodes the opaque binary payload this fabric forwards without
/// ever interpreting it — ROOT object streaming in the original DQM4hep
/// stack. `Vec<u8>` in and out keeps this crate free of a ROOT binding.
pub trait ObjectStreamer: Send + Sync {
    fn encode(&self, value: &dyn std::any::Any) -> Vec<u8>;

    /// Returns `None` if `bytes` doesn't decode to this streamer's type.
    fn decode(&self, bytes: &[u8]) -> Option<Box<dyn std::any::Any>>;
}

/// Loads a module's own configuration from an XML document — the original
/// tooling's `XmlHelper.h`. This fabric's process configuration does not use
/// this (see `dqm-runtime::config`); the interface is named here only so an
/// application module built on top has somewhere to plug in an XML loader
/// without this crate depending on one.
pub trait XmlConfigLoader: Send + Sync {
    fn load(&self, xml: &str) -> Result<(), String>;
}
