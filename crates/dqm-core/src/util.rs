//! Small stateless helpers shared across the fabric.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};

/// Scans `start..=end` (inclusive) on the loopback interface, binding each
/// candidate port in turn and releasing it immediately, returning the first
/// one that succeeds.
///
/// Returns `-1` if every port in the range is already taken, matching the
/// source's sentinel-return convention rather than a `Result` — callers
/// branch on the sign, not on an error variant.
///
/// There is an inherent race between this probe and a caller's later real
/// bind (the port can be reclaimed by another process in between); callers
/// that need a hard guarantee should retry the real bind on failure rather
/// than trust this function's result blindly.
pub fn find_available_port(start: u16, end: u16) -> i32 {
    for port in start..=end {
        if TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)).is_ok() {
            return port as i32;
        }
    }
    -1
}

/// The component set `buildUri` canonicalizes into one URI string.
#[derive(Debug, Clone, Default)]
pub struct UriParts<'a> {
    pub protocol: &'a str,
    pub host: &'a str,
    pub port: Option<u16>,
    pub route: &'a str,
    pub data: &'a HashMap<String, String>,
    pub fragment: Option<&'a str>,
}

/// Canonicalizes `parts` to `proto://host:port/route?k=v&…#frag`, emitting
/// only non-empty components. A `/` is always ensured between `host:port`
/// and `route` even if `route` is missing its own leading slash.
pub fn build_uri(parts: &UriParts<'_>) -> String {
    let mut uri = String::new();

    if !parts.protocol.is_empty() {
        uri.push_str(parts.protocol);
        uri.push_str("://");
    }

    uri.push_str(parts.host);
    if let Some(port) = parts.port {
        uri.push(':');
        uri.push_str(&port.to_string());
    }

    if !parts.route.is_empty() {
        if !parts.route.starts_with('/') {
            uri.push('/');
        }
        uri.push_str(parts.route);
    }

    if !parts.data.is_empty() {
        uri.push('?');
        let mut pairs: Vec<_> = parts.data.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        let query = pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        uri.push_str(&query);
    }

    if let Some(fragment) = parts.fragment
        && !fragment.is_empty()
    {
        uri.push('#');
        uri.push_str(fragment);
    }

    uri
}

/// Parses an `a=1&b=2` query string into a map, percent-decoding keys/values.
///
/// Repeated keys keep the last occurrence, matching how most HTTP frameworks
/// (and `axum::extract::Query`) resolve duplicates.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if query.is_empty() {
        return map;
    }
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (percent_decode(k), percent_decode(v)),
            None => (percent_decode(pair), String::new()),
        };
        if !key.is_empty() {
            map.insert(key, value);
        }
    }
    map
}

/// Percent-encodes everything but unreserved characters (`A-Za-z0-9-_.~`),
/// the inverse of [`percent_decode`] — lets `parse_query_string` round-trip
/// whatever `build_uri` emits for `data`.
fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(*byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_available_port_returns_a_port_in_range() {
        let port = find_available_port(20100, 20200);
        assert!((20100..=20200).contains(&(port as u16)));
    }

    #[test]
    fn find_available_port_returns_negative_one_when_the_single_candidate_is_taken() {
        let _held = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 20300)).unwrap();
        assert_eq!(find_available_port(20300, 20300), -1);
    }

    #[test]
    fn build_uri_normalizes_missing_leading_slash() {
        let empty = HashMap::new();
        let uri = build_uri(&UriParts {
            protocol: "ws",
            host: "localhost",
            port: Some(5555),
            route: "servers",
            data: &empty,
            fragment: None,
        });
        assert_eq!(uri, "ws://localhost:5555/servers");

        let uri = build_uri(&UriParts {
            protocol: "http",
            host: "localhost",
            port: Some(8080),
            route: "/service",
            data: &empty,
            fragment: None,
        });
        assert_eq!(uri, "http://localhost:8080/service");
    }

    #[test]
    fn build_uri_omits_empty_components() {
        let empty = HashMap::new();
        let uri = build_uri(&UriParts {
            protocol: "",
            host: "localhost",
            port: None,
            route: "",
            data: &empty,
            fragment: None,
        });
        assert_eq!(uri, "localhost");
    }

    #[test]
    fn build_uri_appends_query_and_fragment() {
        let mut data = HashMap::new();
        data.insert("name".to_string(), "end cap".to_string());
        let uri = build_uri(&UriParts {
            protocol: "http",
            host: "localhost",
            port: Some(5555),
            route: "/list",
            data: &data,
            fragment: Some("top"),
        });
        assert_eq!(uri, "http://localhost:5555/list?name=end%20cap#top");
    }

    #[test]
    fn query_string_round_trips_through_build_and_parse() {
        let mut data = HashMap::new();
        data.insert("name".to_string(), "end cap".to_string());
        data.insert("tag".to_string(), "ecal/barrel".to_string());

        let uri = build_uri(&UriParts {
            protocol: "http",
            host: "localhost",
            port: Some(5555),
            route: "/list",
            data: &data,
            fragment: None,
        });

        let query = uri.split_once('?').map(|(_, q)| q).unwrap_or_default();
        assert_eq!(parse_query_string(query), data);
    }

    #[test]
    fn parse_query_string_decodes_percent_and_plus() {
        let parsed = parse_query_string("name=end%20cap&tag=ecal+barrel&flag");
        assert_eq!(parsed.get("name").map(String::as_str), Some("end cap"));
        assert_eq!(parsed.get("tag").map(String::as_str), Some("ecal barrel"));
        // A parameter with no `=` maps to the empty string, not absence.
        assert_eq!(parsed.get("flag").map(String::as_str), Some(""));
    }

    #[test]
    fn parse_query_string_keeps_last_duplicate() {
        let parsed = parse_query_string("a=1&a=2");
        assert_eq!(parsed.get("a").map(String::as_str), Some("2"));
    }

    #[test]
    fn parse_query_string_empty_is_empty_map() {
        assert!(parse_query_string("").is_empty());
    }
}
