//! Service Forwarding Hub: multiplexes a single upstream producer
//! subscription per service to a dynamic set of downstream websocket
//! subscribers attached to the gateway's `/service` route.

mod forwarding;
mod hub;
mod locator;

pub use hub::ServiceForwardingHub;
