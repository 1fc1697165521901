//! WebSocket frame type exchanged across Server/Client Endpoint callbacks.

/// The two frame kinds the fabric forwards to application callbacks.
///
/// Control frames (ping/pong/close) are handled by the transport layer itself
/// and never reach `onMessage`/`onFrame` callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsOpcode {
    Text,
    Binary,
}

/// One payload delivered over an open websocket connection.
#[derive(Debug, Clone)]
pub struct WebsocketFrame {
    pub opcode: WsOpcode,
    pub payload: Vec<u8>,
}

impl WebsocketFrame {
    pub fn text(payload: impl Into<String>) -> Self {
        Self {
            opcode: WsOpcode::Text,
            payload: payload.into().into_bytes(),
        }
    }

    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode: WsOpcode::Binary,
            payload: payload.into(),
        }
    }

    /// Interprets the payload as UTF-8 text, for callbacks that only speak JSON.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_frame_round_trips() {
        let frame = WebsocketFrame::text("{\"action\":\"register\"}");
        assert_eq!(frame.opcode, WsOpcode::Text);
        assert_eq!(frame.as_str(), Some("{\"action\":\"register\"}"));
    }

    #[test]
    fn binary_frame_is_not_valid_utf8_in_general() {
        let frame = WebsocketFrame::binary(vec![0xff, 0x00, 0xff]);
        assert_eq!(frame.opcode, WsOpcode::Binary);
        assert!(frame.as_str().is_none());
    }
}
