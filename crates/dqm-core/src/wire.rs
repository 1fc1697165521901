//! JSON wire messages exchanged between a Server Endpoint producer and the
//! Network Manager on the `/servers` route.

use serde::{Deserialize, Serialize};

use crate::model::ServiceInfo;

/// A producer's registration announcement, sent once per connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMessage {
    pub action: RegisterAction,
    pub server: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub services: ServiceInfo,
}

/// The registration protocol has exactly one action: `register`. Deregistration
/// happens only through connection close — there is no explicit
/// unregister command, so this enum carries a single variant rather than
/// inventing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterAction {
    Register,
}

/// Sent back to a producer whose registration was rejected (name collision,
/// malformed payload). `subject` is always the literal string `"regfail"`
/// — it identifies the message kind, not the offending server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegFailMessage {
    pub subject: String,
    pub reason: String,
}

impl RegFailMessage {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            subject: "regfail".to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_message_round_trips_through_json() {
        let msg = RegisterMessage {
            action: RegisterAction::Register,
            server: "ecal-dqm".to_string(),
            host: "10.0.0.5".to_string(),
            port: 6000,
            services: ServiceInfo::new(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: RegisterMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.server, "ecal-dqm");
        assert_eq!(back.action, RegisterAction::Register);
    }

    #[test]
    fn regfail_subject_is_always_the_literal_string() {
        let fail = RegFailMessage::new("server 'ecal-dqm' is already registered");
        assert_eq!(fail.subject, "regfail");
        assert_eq!(fail.reason, "server 'ecal-dqm' is already registered");
    }
}
