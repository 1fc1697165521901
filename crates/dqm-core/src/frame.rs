//! Fixed-width name-field framing used on the Hub's `/service` route,
//! shared between `dqm-hub` (both its downstream and upstream legs) and
//! any producer that wants to speak the same protocol (`dqm-cli`'s test
//! server).
//!
//! Every frame on this route starts with a service name padded with
//! trailing spaces to a fixed width, so a single socket can multiplex
//! several services without a length-prefixed envelope. `width` is a
//! per-endpoint configuration value (default [`DEFAULT_NAME_FIELD_WIDTH`]),
//! not a wire constant, so producer and consumer must agree on it out of
//! band the same way the original DQM4hep tooling hardcodes `N = 128`.

use crate::error::{NetError, NetResult};

/// Default fixed width of the service-name field, matching the source's
/// hardcoded `N = 128`.
pub const DEFAULT_NAME_FIELD_WIDTH: usize = 128;

/// Pads `name` with trailing spaces to `width` bytes. Fails if `name` itself
/// (in bytes) does not fit.
pub fn pad_service_name(name: &str, width: usize) -> NetResult<Vec<u8>> {
    let bytes = name.as_bytes();
    if bytes.len() > width {
        return Err(NetError::InvalidParameter(format!(
            "service name '{name}' ({} bytes) exceeds the {width}-byte name field",
            bytes.len()
        )));
    }
    let mut field = vec![b' '; width];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

/// Splits a `width`-byte name field off the front of `payload`, trimming
/// trailing spaces, and returns it alongside whatever follows.
pub fn split_name_field(payload: &[u8], width: usize) -> NetResult<(String, &[u8])> {
    if payload.len() < width {
        return Err(NetError::ProtocolError(format!(
            "frame shorter than the {width}-byte name field ({} bytes)",
            payload.len()
        )));
    }
    let (name_bytes, rest) = payload.split_at(width);
    let name = std::str::from_utf8(name_bytes)
        .map_err(|e| NetError::ProtocolError(format!("name field is not valid utf-8: {e}")))?
        .trim_end()
        .to_string();
    Ok((name, rest))
}

/// Builds a `subscribe`/`unsubscribe` control frame: `[name field][action]`.
pub fn build_subscription_frame(name: &str, action: &str, width: usize) -> NetResult<Vec<u8>> {
    let mut frame = pad_service_name(name, width)?;
    frame.extend_from_slice(action.as_bytes());
    Ok(frame)
}

/// Parses a `[name field][action]` control frame sent by a subscriber.
/// Trims surrounding whitespace off the action word.
pub fn parse_subscription_frame(payload: &[u8], width: usize) -> NetResult<(String, String)> {
    let (name, rest) = split_name_field(payload, width)?;
    let action = std::str::from_utf8(rest)
        .map_err(|e| NetError::ProtocolError(format!("action word is not valid utf-8: {e}")))?
        .trim()
        .to_string();
    Ok((name, action))
}

/// Builds a forwarded data frame: `[name field][payload bytes]`.
pub fn build_forwarded_frame(name: &str, payload: &[u8], width: usize) -> NetResult<Vec<u8>> {
    let mut frame = pad_service_name(name, width)?;
    frame.extend_from_slice(payload);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_and_split_round_trip() {
        let frame = pad_service_name("/ecal/histos", 16).unwrap();
        assert_eq!(frame.len(), 16);
        let (name, rest) = split_name_field(&frame, 16).unwrap();
        assert_eq!(name, "/ecal/histos");
        assert!(rest.is_empty());
    }

    #[test]
    fn name_too_long_is_rejected() {
        assert!(pad_service_name("/way/too/long/for/this/field", 8).is_err());
    }

    #[test]
    fn subscription_frame_round_trips() {
        let frame = build_subscription_frame("/svc", "subscribe", 8).unwrap();
        let (name, action) = parse_subscription_frame(&frame, 8).unwrap();
        assert_eq!(name, "/svc");
        assert_eq!(action, "subscribe");
    }

    #[test]
    fn forwarded_frame_carries_name_and_payload() {
        let frame = build_forwarded_frame("/svc", b"payload-bytes", 8).unwrap();
        let (name, rest) = split_name_field(&frame, 8).unwrap();
        assert_eq!(name, "/svc");
        assert_eq!(rest, b"payload-bytes");
    }

    #[test]
    fn short_frame_is_a_protocol_error() {
        assert!(split_name_field(b"short", 128).is_err());
    }
}
